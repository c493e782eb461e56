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

use std::io::{Read, Write};

use log::debug;

use super::dbg_extra;
use crate::error::{BoltError, Result};

pub(crate) const BOLT_MAGIC_PREAMBLE: [u8; 4] = [0x60, 0x60, 0xB0, 0x17];

/// One of the four version slots offered to the server.
///
/// Encoded as a big-endian u32 `00 <minor span> <minor> <major>`: a span of
/// zero offers a single version, otherwise all minors from
/// `minor - minor_span` to `minor` of the same major are offered.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct VersionOffer {
    major: u8,
    minor: u8,
    minor_span: u8,
}

impl VersionOffer {
    pub const fn single(major: u8, minor: u8) -> Self {
        Self {
            major,
            minor,
            minor_span: 0,
        }
    }

    pub const fn range(major: u8, max_minor: u8, min_minor: u8) -> Self {
        assert!(max_minor >= min_minor);
        Self {
            major,
            minor: max_minor,
            minor_span: max_minor - min_minor,
        }
    }

    fn to_be_bytes(self) -> [u8; 4] {
        [0, self.minor_span, self.minor, self.major]
    }
}

/// Slots are ordered by preference, highest first. V1, V2 and Bolt 4.0 are
/// still spoken when negotiated through a custom offer.
// [bolt-version-bump] search tag when changing bolt version support
pub(crate) const DEFAULT_VERSION_OFFER: [VersionOffer; 4] = [
    VersionOffer::range(5, 7, 0),
    VersionOffer::range(4, 4, 2),
    VersionOffer::single(4, 1),
    VersionOffer::single(3, 0),
];

/// Run the Bolt handshake over the channel: write the 20-byte preamble
/// (magic + four version slots), then decode the server's 4-byte selection.
pub(crate) fn handshake<RW: Read + Write>(
    stream: &mut RW,
    offers: &[VersionOffer; 4],
) -> Result<(u8, u8)> {
    let mut offer_bytes = [0_u8; 16];
    for (slot, offer) in offer_bytes.chunks_exact_mut(4).zip(offers) {
        slot.copy_from_slice(&offer.to_be_bytes());
    }

    debug!(
        "{}C: <HANDSHAKE> {:02X?}",
        dbg_extra(None, None),
        BOLT_MAGIC_PREAMBLE
    );
    BoltError::wrap_write(stream.write_all(&BOLT_MAGIC_PREAMBLE))?;
    debug!("{}C: <BOLT> {:02X?}", dbg_extra(None, None), offer_bytes);
    BoltError::wrap_write(stream.write_all(&offer_bytes))?;
    BoltError::wrap_write(stream.flush())?;

    let mut negotiated_version = [0_u8; 4];
    BoltError::wrap_read(stream.read_exact(&mut negotiated_version))?;
    debug!(
        "{}S: <BOLT> {:02X?}",
        dbg_extra(None, None),
        negotiated_version
    );

    decode_version_offer(&negotiated_version)
}

// [bolt-version-bump] search tag when changing bolt version support
fn decode_version_offer(offer: &[u8; 4]) -> Result<(u8, u8)> {
    match *offer {
        [0, 0, 0, 0] => Err(BoltError::InvalidConfig {
            message: String::from("server version not supported"),
        }),
        [72, 84, 84, 80] => {
            // "HTTP"
            Err(BoltError::InvalidConfig {
                message: format!(
                    "unexpected server handshake response {offer:?} \
                     (looks like an HTTP endpoint)"
                ),
            })
        }
        [_, _, minor, major] if is_supported_version(major, minor) => Ok((major, minor)),
        _ => Err(BoltError::InvalidConfig {
            message: format!("unexpected server handshake response {offer:?}"),
        }),
    }
}

fn is_supported_version(major: u8, minor: u8) -> bool {
    matches!(
        (major, minor),
        (1, 0) | (2, 0) | (3, 0) | (4, 0..=4) | (5, 0..=7)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::VecDeque;
    use std::io;

    use rstest::*;

    #[derive(Debug, Default)]
    struct MockChannel {
        written: Vec<u8>,
        response: VecDeque<u8>,
    }

    impl MockChannel {
        fn respond(response: &[u8]) -> Self {
            Self {
                written: Vec::new(),
                response: response.iter().copied().collect(),
            }
        }
    }

    impl Read for MockChannel {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.response.read(buf)
        }
    }

    impl Write for MockChannel {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.written.write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    // [bolt-version-bump] search tag when changing bolt version support
    #[rstest]
    #[case([0, 0, 0, 1], (1, 0))]
    #[case([0, 0, 0, 2], (2, 0))]
    #[case([0, 0, 0, 3], (3, 0))]
    #[case([0, 0, 0, 4], (4, 0))]
    #[case([0, 0, 4, 4], (4, 4))]
    #[case([0, 0, 0, 5], (5, 0))]
    #[case([0, 0, 4, 5], (5, 4))]
    #[case([0, 0, 7, 5], (5, 7))]
    fn test_decode_version_offer(
        #[case] mut offer: [u8; 4],
        #[case] expected: (u8, u8),
        #[values([0, 0], [1, 2], [255, 254])] garbage: [u8; 2],
    ) {
        offer[0..2].copy_from_slice(&garbage);
        assert_eq!(decode_version_offer(&offer).unwrap(), expected);
    }

    #[test]
    fn test_unsupported_server_version() {
        let res = decode_version_offer(&[0, 0, 0, 0]);
        let Err(BoltError::InvalidConfig { message }) = res else {
            panic!("Expected InvalidConfig error, got {res:?}");
        };
        assert!(message.contains("server version not supported"));
    }

    #[test]
    fn test_server_version_looks_like_http() {
        let res = decode_version_offer(&[72, 84, 84, 80]);
        let Err(BoltError::InvalidConfig { message }) = res else {
            panic!("Expected InvalidConfig error, got {res:?}");
        };
        let message = message.to_lowercase();
        assert!(message.contains("unexpected server handshake response"));
        assert!(message.contains("http"));
    }

    // [bolt-version-bump] search tag when changing bolt version support
    #[rstest]
    #[case([0, 0, 5, 4])] // no bolt version 4.5
    #[case([0, 0, 8, 5])] // no bolt version 5.8 support
    #[case([0, 0, 1, 3])] // no bolt version 3.1
    #[case([0, 0, 0, 6])] // no bolt version 6.0 support
    fn test_garbage_server_version(#[case] offer: [u8; 4]) {
        let res = decode_version_offer(&offer);
        let Err(BoltError::InvalidConfig { message }) = res else {
            panic!("Expected InvalidConfig error, got {res:?}");
        };
        assert!(message.contains("unexpected server handshake response"));
    }

    #[test]
    fn test_default_offer_preamble_bytes() {
        let mut channel = MockChannel::respond(&[0, 0, 7, 5]);
        let version = handshake(&mut channel, &DEFAULT_VERSION_OFFER).unwrap();
        assert_eq!(version, (5, 7));
        assert_eq!(
            channel.written,
            vec![
                0x60, 0x60, 0xB0, 0x17, // magic
                0x00, 0x07, 0x07, 0x05, // 5.7 - 5.0
                0x00, 0x02, 0x04, 0x04, // 4.4 - 4.2
                0x00, 0x00, 0x01, 0x04, // 4.1
                0x00, 0x00, 0x00, 0x03, // 3.0
            ]
        );
    }

    #[test]
    fn test_legacy_offer_preamble_bytes() {
        let offers = [
            VersionOffer::range(4, 4, 2),
            VersionOffer::single(4, 1),
            VersionOffer::single(4, 0),
            VersionOffer::single(3, 0),
        ];
        let mut channel = MockChannel::respond(&[0, 0, 4, 4]);
        let version = handshake(&mut channel, &offers).unwrap();
        assert_eq!(version, (4, 4));
        assert_eq!(
            channel.written,
            vec![
                0x60, 0x60, 0xB0, 0x17, // magic
                0x00, 0x02, 0x04, 0x04, // 4.4 - 4.2
                0x00, 0x00, 0x01, 0x04, // 4.1
                0x00, 0x00, 0x00, 0x04, // 4.0
                0x00, 0x00, 0x00, 0x03, // 3.0
            ]
        );
        // nothing but the negotiated version was consumed from the channel
        assert!(channel.response.is_empty());
    }
}
