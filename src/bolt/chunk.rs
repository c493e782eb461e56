// Copyright (c) "bolt-core" contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//    https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::cmp;
use std::io::{self, Read};
use std::ops::Deref;

use log::trace;
use usize_cast::IntoUsize;

const MAX_DUMPED_BYTES: usize = 32;

/// Hex rendering for `<RAW>` trace lines; long chunks are cut short so a
/// 64 KiB chunk doesn't flood the log.
fn raw_dump(bytes: &[u8]) -> String {
    let mut dump = bytes
        .iter()
        .take(MAX_DUMPED_BYTES)
        .map(|byte| format!("{byte:02X}"))
        .collect::<Vec<_>>()
        .join(" ");
    if bytes.len() > MAX_DUMPED_BYTES {
        dump.push_str(&format!(" .. ({} bytes total)", bytes.len()));
    }
    dump
}

/// Splits buffered message bytes into wire chunks.
///
/// Yields alternating size headers and payload slices and terminates the
/// message with a zero-sized chunk. Chunk boundaries carry no meaning beyond
/// framing; a message larger than `u16::MAX` bytes is split over several
/// chunks.
#[derive(Debug)]
pub(crate) struct Chunker<'a, T: Deref<Target = [u8]>> {
    buffers: &'a [T],
    buffer_start: usize,
    chunk_size_left: u16,
    ended: bool,
}

impl<'a, T: Deref<Target = [u8]>> Chunker<'a, T> {
    pub(crate) fn new(buf: &'a [T]) -> Self {
        Chunker {
            buffers: buf,
            buffer_start: 0,
            chunk_size_left: 0,
            ended: false,
        }
    }
}

impl<'a, T: Deref<Target = [u8]>> Iterator for Chunker<'a, T> {
    type Item = Chunk<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.ended {
            return None;
        }
        while let Some(true) = self.buffers.first().map(|b| b.is_empty()) {
            self.buffers = &self.buffers[1..];
        }
        if self.buffers.is_empty() {
            self.ended = true;
            return Some(Chunk::Size([0, 0])); // message boundary
        }
        if self.chunk_size_left > 0 {
            let buffer_len = cmp::min(
                self.buffers[0].len() - self.buffer_start,
                self.chunk_size_left.into_usize(),
            );
            let buffer_end = self.buffer_start + buffer_len;
            let chunk = &self.buffers[0][self.buffer_start..buffer_end];
            self.chunk_size_left -= buffer_len as u16;
            self.buffer_start = buffer_end;
            if self.buffer_start == self.buffers[0].len() {
                self.buffers = &self.buffers[1..];
                self.buffer_start = 0;
            }
            Some(Chunk::Buffer(chunk))
        } else {
            let mut size = (self.buffers[0].len() - self.buffer_start)
                .try_into()
                .unwrap_or(u16::MAX);
            size = size.saturating_add(
                self.buffers[1..]
                    .iter()
                    .map(|b| b.len().try_into().unwrap_or(u16::MAX))
                    .reduce(|acc, x| acc.saturating_add(x))
                    .unwrap_or_default(),
            );
            self.chunk_size_left = size;
            Some(Chunk::Size(size.to_be_bytes()))
        }
    }
}

pub(crate) enum Chunk<'a> {
    Buffer(&'a [u8]),
    Size([u8; 2]),
}

impl<'a> Deref for Chunk<'a> {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        match self {
            Chunk::Buffer(buf) => {
                trace!("C: <RAW> {}", raw_dump(buf));
                buf
            }
            Chunk::Size(size) => {
                trace!("C: <RAW> {}", raw_dump(size));
                size
            }
        }
    }
}

/// Reassembles one message from the chunked byte stream.
///
/// Implicit state machine: `chunk_size == 0` and no payload read yet is
/// "awaiting header"; `chunk_size > 0` is "reading payload"; after the
/// caller has decoded the message, [`Dechunker::finish_message`] expects the
/// `00 00` boundary.
#[derive(Debug)]
pub(crate) struct Dechunker<R> {
    reader: R,
    chunk_size: usize,
    message_started: bool,
}

impl<R: Read> Dechunker<R> {
    pub(crate) fn new(reader: R) -> Self {
        Self {
            reader,
            chunk_size: 0,
            message_started: false,
        }
    }

    fn read_header(&mut self) -> io::Result<u16> {
        let mut size_buf = [0; 2];
        self.reader.read_exact(&mut size_buf)?;
        trace!("S: <RAW> {}", raw_dump(&size_buf));
        Ok(u16::from_be_bytes(size_buf))
    }

    /// Consume the end-of-message boundary.
    ///
    /// Fails when the message carries payload the decoder did not consume or
    /// when the server keeps sending chunks where a boundary is required.
    pub(crate) fn finish_message(&mut self) -> io::Result<()> {
        if self.chunk_size > 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "message boundary expected but current chunk has unconsumed payload",
            ));
        }
        let size = self.read_header()?;
        if size != 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("expected end of message, server announced another chunk of {size} bytes"),
            ));
        }
        self.chunk_size = 0;
        self.message_started = false;
        Ok(())
    }
}

impl<R: Read> Read for Dechunker<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.chunk_size == 0 {
            let size = self.read_header()?;
            if size == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    if self.message_started {
                        "message ended before its payload was complete"
                    } else {
                        "received zero-length message"
                    },
                ));
            }
            self.chunk_size = size.into_usize();
            self.message_started = true;
        }
        let new_buf_size = cmp::min(buf.len(), self.chunk_size);
        let buf = &mut buf[..new_buf_size];
        self.reader.read_exact(buf)?;
        trace!("S: <RAW> {}", raw_dump(buf));
        self.chunk_size -= new_buf_size;
        Ok(new_buf_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rstest::*;

    fn collect_chunks(buffers: &[Vec<u8>]) -> Vec<u8> {
        Chunker::new(buffers).fold(Vec::new(), |mut acc, chunk| {
            acc.extend_from_slice(&chunk);
            acc
        })
    }

    #[test]
    fn test_raw_dump_caps_long_chunks() {
        assert_eq!(raw_dump(&[0x00, 0xAB, 0xFF]), "00 AB FF");
        let dump = raw_dump(&[0xAB; 100]);
        assert!(dump.ends_with(".. (100 bytes total)"));
        assert_eq!(dump.matches("AB").count(), MAX_DUMPED_BYTES);
    }

    #[test]
    fn test_chunker_single_buffer() {
        let wire = collect_chunks(&[vec![0x01, 0x02, 0x03]]);
        assert_eq!(wire, vec![0x00, 0x03, 0x01, 0x02, 0x03, 0x00, 0x00]);
    }

    #[test]
    fn test_chunker_joins_buffers_into_one_chunk() {
        let wire = collect_chunks(&[vec![0x01], vec![], vec![0x02, 0x03]]);
        assert_eq!(wire, vec![0x00, 0x03, 0x01, 0x02, 0x03, 0x00, 0x00]);
    }

    #[test]
    fn test_chunker_empty_message() {
        let wire = collect_chunks(&[]);
        assert_eq!(wire, vec![0x00, 0x00]);
    }

    #[test]
    fn test_chunker_splits_large_messages() {
        let payload = vec![0xAB; u16::MAX as usize + 1];
        let wire = collect_chunks(&[payload]);
        assert_eq!(wire[..2], [0xFF, 0xFF]);
        let first_chunk_end = 2 + u16::MAX as usize;
        assert_eq!(wire[first_chunk_end..first_chunk_end + 2], [0x00, 0x01]);
        assert_eq!(wire[first_chunk_end + 2], 0xAB);
        assert_eq!(wire[first_chunk_end + 3..], [0x00, 0x00]);
    }

    #[rstest]
    #[case(vec![vec![1, 2, 3, 4]])]
    #[case(vec![vec![1], vec![2, 3], vec![4]])]
    #[case(vec![vec![1, 2], vec![], vec![3, 4]])]
    fn test_reassembly_round_trip(#[case] buffers: Vec<Vec<u8>>) {
        let wire = collect_chunks(&buffers);
        let mut reader = wire.as_slice();
        let mut dechunker = Dechunker::new(&mut reader);
        let mut payload = [0; 4];
        dechunker.read_exact(&mut payload).unwrap();
        dechunker.finish_message().unwrap();
        assert_eq!(payload, [1, 2, 3, 4]);
        assert!(reader.is_empty());
    }

    #[test]
    fn test_dechunker_reassembles_split_message() {
        // one message split over three chunks
        let wire = [
            vec![0x00, 0x02, 0x01, 0x02],
            vec![0x00, 0x01, 0x03],
            vec![0x00, 0x03, 0x04, 0x05, 0x06],
            vec![0x00, 0x00],
        ]
        .concat();
        let mut reader = wire.as_slice();
        let mut dechunker = Dechunker::new(&mut reader);
        let mut payload = Vec::new();
        let mut buf = [0; 6];
        dechunker.read_exact(&mut buf).unwrap();
        payload.extend_from_slice(&buf);
        dechunker.finish_message().unwrap();
        assert_eq!(payload, vec![0x01, 0x02, 0x03, 0x04, 0x05, 0x06]);
    }

    #[test]
    fn test_dechunker_accepts_max_size_chunk() {
        let mut wire = vec![0xFF, 0xFF];
        wire.extend(std::iter::repeat(0x00).take(u16::MAX.into()));
        wire.extend([0x00, 0x00]);
        let mut reader = wire.as_slice();
        let mut dechunker = Dechunker::new(&mut reader);
        let mut payload = vec![0; u16::MAX.into()];
        dechunker.read_exact(&mut payload).unwrap();
        dechunker.finish_message().unwrap();
    }

    #[test]
    fn test_dechunker_rejects_zero_length_message() {
        let wire = [0x00, 0x00];
        let mut reader = wire.as_slice();
        let mut dechunker = Dechunker::new(&mut reader);
        let mut buf = [0; 1];
        let err = dechunker.read_exact(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_dechunker_rejects_premature_end_of_message() {
        let wire = [0x00, 0x01, 0xB0, 0x00, 0x00];
        let mut reader = wire.as_slice();
        let mut dechunker = Dechunker::new(&mut reader);
        let mut buf = [0; 2];
        let err = dechunker.read_exact(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_finish_message_rejects_unconsumed_payload() {
        let wire = [0x00, 0x02, 0x01, 0x02, 0x00, 0x00];
        let mut reader = wire.as_slice();
        let mut dechunker = Dechunker::new(&mut reader);
        let mut buf = [0; 1];
        dechunker.read_exact(&mut buf).unwrap();
        let err = dechunker.finish_message().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
