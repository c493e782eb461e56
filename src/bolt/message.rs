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

use std::io::Read;

use log::trace;

use crate::error::{BoltError, Result};

/// One inbound message frame: tag plus its fixed-arity fields.
///
/// Messages are always tiny structures (at most 15 fields), so the frame
/// header is exactly two bytes: the tiny-struct marker carrying the field
/// count in its low nibble, followed by the message tag.
#[derive(Debug)]
pub(crate) struct BoltMessage<V> {
    pub(crate) tag: u8,
    pub(crate) fields: Vec<V>,
}

impl<V> BoltMessage<V> {
    pub(crate) fn load<R, CB>(reader: &mut R, mut load_value: CB) -> Result<Self>
    where
        R: Read,
        CB: FnMut(&mut R) -> Result<V>,
    {
        let (tag, field_count) = Self::load_header(reader)?;
        let mut fields = Vec::with_capacity(field_count);
        for _ in 0..field_count {
            fields.push(load_value(reader)?);
        }
        Ok(BoltMessage { tag, fields })
    }

    fn load_header(reader: &mut impl Read) -> Result<(u8, usize)> {
        let mut header = [0; 2];
        BoltError::wrap_read(reader.read_exact(&mut header))?;
        let [marker, tag] = header;
        match marker {
            0xB0..=0xBF => {
                let field_count = usize::from(marker & 0x0F);
                trace!("S: <FRAME> tag {tag:#04X} with {field_count} field(s)");
                Ok((tag, field_count))
            }
            _ => Err(BoltError::protocol_error(format!(
                "expected a message frame (tiny struct marker), received {marker:#04X}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::value::ValueReceive;

    fn load_ints(mut bytes: &[u8]) -> Result<BoltMessage<ValueReceive>> {
        BoltMessage::load(&mut bytes, |reader| {
            let mut byte = [0; 1];
            BoltError::wrap_read(reader.read_exact(&mut byte))?;
            Ok(ValueReceive::Integer(byte[0].into()))
        })
    }

    #[test]
    fn test_load_frame_header_and_fields() {
        let message = load_ints(&[0xB2, 0x70, 0x01, 0x02]).unwrap();
        assert_eq!(message.tag, 0x70);
        assert_eq!(
            message.fields,
            vec![ValueReceive::Integer(1), ValueReceive::Integer(2)]
        );
    }

    #[test]
    fn test_load_fieldless_frame() {
        let message = load_ints(&[0xB0, 0x7E]).unwrap();
        assert_eq!(message.tag, 0x7E);
        assert!(message.fields.is_empty());
    }

    #[test]
    fn test_non_frame_marker_is_protocol_error() {
        let err = load_ints(&[0xA1, 0x70]).unwrap_err();
        assert!(matches!(err, BoltError::ProtocolError { .. }));
    }
}
