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

use std::collections::HashMap;
use std::error::Error;
use std::io::Read;

use super::super::BoltStructTranslator;
use super::error::PackStreamDeserializeError;
use crate::value::ValueReceive;

/// Per-connection policy for representing received integers.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum IntegerPolicy {
    /// Integers are kept exactly as sent. Every wire integer fits `i64`.
    #[default]
    Lossless,
    /// Integers are converted to `f64`, losing precision above 2^53.
    LossyFloat,
}

impl IntegerPolicy {
    fn apply(&self, i: i64) -> ValueReceive {
        match self {
            IntegerPolicy::Lossless => ValueReceive::Integer(i),
            IntegerPolicy::LossyFloat => ValueReceive::Float(i as f64),
        }
    }
}

pub(crate) trait PackStreamDeserializer {
    type Error: Error;

    fn load(
        &mut self,
        translator: &impl BoltStructTranslator,
    ) -> Result<ValueReceive, Self::Error>;
    fn load_string(&mut self) -> Result<String, Self::Error>;
}

pub(crate) struct PackStreamDeserializerImpl<'a, R: Read> {
    reader: &'a mut R,
    integer_policy: IntegerPolicy,
}

impl<'a, R: Read + 'a> PackStreamDeserializerImpl<'a, R> {
    pub(crate) fn new(reader: &'a mut R, integer_policy: IntegerPolicy) -> Self {
        PackStreamDeserializerImpl {
            reader,
            integer_policy,
        }
    }

    fn decode_i8(reader: &mut impl Read) -> Result<i8, PackStreamDeserializeError> {
        let mut buffer = [0; 1];
        reader.read_exact(&mut buffer)?;
        Ok(i8::from_be_bytes(buffer))
    }

    fn decode_i16(reader: &mut impl Read) -> Result<i16, PackStreamDeserializeError> {
        let mut buffer = [0; 2];
        reader.read_exact(&mut buffer)?;
        Ok(i16::from_be_bytes(buffer))
    }

    fn decode_i32(reader: &mut impl Read) -> Result<i32, PackStreamDeserializeError> {
        let mut buffer = [0; 4];
        reader.read_exact(&mut buffer)?;
        Ok(i32::from_be_bytes(buffer))
    }

    fn decode_i64(reader: &mut impl Read) -> Result<i64, PackStreamDeserializeError> {
        let mut buffer = [0; 8];
        reader.read_exact(&mut buffer)?;
        Ok(i64::from_be_bytes(buffer))
    }

    fn decode_f64(reader: &mut impl Read) -> Result<f64, PackStreamDeserializeError> {
        let mut buffer = [0; 8];
        reader.read_exact(&mut buffer)?;
        Ok(f64::from_be_bytes(buffer))
    }

    fn decode_u8(reader: &mut impl Read) -> Result<u8, PackStreamDeserializeError> {
        let mut buffer = [0; 1];
        reader.read_exact(&mut buffer)?;
        Ok(u8::from_be_bytes(buffer))
    }

    fn decode_u16(reader: &mut impl Read) -> Result<u16, PackStreamDeserializeError> {
        let mut buffer = [0; 2];
        reader.read_exact(&mut buffer)?;
        Ok(u16::from_be_bytes(buffer))
    }

    fn decode_u32(reader: &mut impl Read) -> Result<u32, PackStreamDeserializeError> {
        let mut buffer = [0; 4];
        reader.read_exact(&mut buffer)?;
        Ok(u32::from_be_bytes(buffer))
    }

    fn decode_bytes(
        reader: &mut impl Read,
        size: usize,
    ) -> Result<Vec<u8>, PackStreamDeserializeError> {
        let mut bytes = vec![0; size];
        reader.read_exact(bytes.as_mut_slice())?;
        Ok(bytes)
    }

    fn decode_string(
        reader: &mut impl Read,
        size: usize,
    ) -> Result<String, PackStreamDeserializeError> {
        let bytes = Self::decode_bytes(reader, size)?;
        Ok(String::from_utf8_lossy(bytes.as_slice()).into_owned())
    }

    fn decode_list(
        &mut self,
        translator: &impl BoltStructTranslator,
        size: usize,
    ) -> Result<Vec<ValueReceive>, PackStreamDeserializeError> {
        let mut list = Vec::with_capacity(size.min(1024));
        for _ in 0..size {
            list.push(self.load(translator)?);
        }
        Ok(list)
    }

    fn decode_dict(
        &mut self,
        translator: &impl BoltStructTranslator,
        size: usize,
    ) -> Result<HashMap<String, ValueReceive>, PackStreamDeserializeError> {
        let mut dict = HashMap::with_capacity(size.min(1024));
        for _ in 0..size {
            let key = self.load_string()?;
            let value = self.load(translator)?;
            dict.insert(key, value);
        }
        Ok(dict)
    }

    fn decode_struct(
        &mut self,
        translator: &impl BoltStructTranslator,
        tag: u8,
        size: usize,
    ) -> Result<ValueReceive, PackStreamDeserializeError> {
        let fields = self.decode_list(translator, size)?;
        Ok(translator.deserialize_struct(tag, fields))
    }

    fn check_addressable(size: u32) -> Result<usize, PackStreamDeserializeError> {
        if usize::BITS < 32 {
            return Err("server wants to send more data than is addressable".into());
        }
        Ok(size as usize)
    }
}

impl<R: Read> PackStreamDeserializer for PackStreamDeserializerImpl<'_, R> {
    type Error = PackStreamDeserializeError;

    fn load(
        &mut self,
        translator: &impl BoltStructTranslator,
    ) -> Result<ValueReceive, Self::Error> {
        let mut marker = [0; 1];
        self.reader.read_exact(&mut marker)?;
        let marker = marker[0];
        if marker == 0xC0 {
            Ok(ValueReceive::Null)
        } else if marker == 0xC2 {
            Ok(ValueReceive::Boolean(false))
        } else if marker == 0xC3 {
            Ok(ValueReceive::Boolean(true))
        } else if 0xF0 <= marker || marker <= 0x7F {
            Ok(self.integer_policy.apply(i8::from_be_bytes([marker]).into()))
        } else if marker == 0xC8 {
            Ok(self.integer_policy.apply(Self::decode_i8(self.reader)?.into()))
        } else if marker == 0xC9 {
            Ok(self.integer_policy.apply(Self::decode_i16(self.reader)?.into()))
        } else if marker == 0xCA {
            Ok(self.integer_policy.apply(Self::decode_i32(self.reader)?.into()))
        } else if marker == 0xCB {
            Ok(self.integer_policy.apply(Self::decode_i64(self.reader)?))
        } else if marker == 0xC1 {
            Ok(ValueReceive::Float(Self::decode_f64(self.reader)?))
        } else if marker == 0xCC {
            let size = Self::decode_u8(self.reader)?;
            Ok(ValueReceive::Bytes(Self::decode_bytes(
                self.reader,
                size.into(),
            )?))
        } else if marker == 0xCD {
            let size = Self::decode_u16(self.reader)?;
            Ok(ValueReceive::Bytes(Self::decode_bytes(
                self.reader,
                size.into(),
            )?))
        } else if marker == 0xCE {
            let size = Self::check_addressable(Self::decode_u32(self.reader)?)?;
            Ok(ValueReceive::Bytes(Self::decode_bytes(self.reader, size)?))
        } else if (0x80..=0x8F).contains(&marker) {
            let size = marker - 0x80;
            Ok(ValueReceive::String(Self::decode_string(
                self.reader,
                size.into(),
            )?))
        } else if marker == 0xD0 {
            let size = Self::decode_u8(self.reader)?;
            Ok(ValueReceive::String(Self::decode_string(
                self.reader,
                size.into(),
            )?))
        } else if marker == 0xD1 {
            let size = Self::decode_u16(self.reader)?;
            Ok(ValueReceive::String(Self::decode_string(
                self.reader,
                size.into(),
            )?))
        } else if marker == 0xD2 {
            let size = Self::check_addressable(Self::decode_u32(self.reader)?)?;
            Ok(ValueReceive::String(Self::decode_string(self.reader, size)?))
        } else if (0x90..=0x9F).contains(&marker) {
            let size = marker - 0x90;
            Ok(ValueReceive::List(self.decode_list(translator, size.into())?))
        } else if marker == 0xD4 {
            let size = Self::decode_u8(self.reader)?;
            Ok(ValueReceive::List(self.decode_list(translator, size.into())?))
        } else if marker == 0xD5 {
            let size = Self::decode_u16(self.reader)?;
            Ok(ValueReceive::List(self.decode_list(translator, size.into())?))
        } else if marker == 0xD6 {
            let size = Self::check_addressable(Self::decode_u32(self.reader)?)?;
            Ok(ValueReceive::List(self.decode_list(translator, size)?))
        } else if (0xA0..=0xAF).contains(&marker) {
            let size = marker - 0xA0;
            Ok(ValueReceive::Map(self.decode_dict(translator, size.into())?))
        } else if marker == 0xD8 {
            let size = Self::decode_u8(self.reader)?;
            Ok(ValueReceive::Map(self.decode_dict(translator, size.into())?))
        } else if marker == 0xD9 {
            let size = Self::decode_u16(self.reader)?;
            Ok(ValueReceive::Map(self.decode_dict(translator, size.into())?))
        } else if marker == 0xDA {
            let size = Self::check_addressable(Self::decode_u32(self.reader)?)?;
            Ok(ValueReceive::Map(self.decode_dict(translator, size)?))
        } else if (0xB0..=0xBF).contains(&marker) {
            let size = marker - 0xB0;
            let tag = Self::decode_u8(self.reader)?;
            self.decode_struct(translator, tag, size.into())
        } else if marker == 0xDC {
            let size = Self::decode_u8(self.reader)?;
            let tag = Self::decode_u8(self.reader)?;
            self.decode_struct(translator, tag, size.into())
        } else if marker == 0xDD {
            let size = Self::decode_u16(self.reader)?;
            let tag = Self::decode_u8(self.reader)?;
            self.decode_struct(translator, tag, size.into())
        } else {
            Err(PackStreamDeserializeError::protocol_violation(format!(
                "unknown marker {marker:#04X}"
            )))
        }
    }

    fn load_string(&mut self) -> Result<String, Self::Error> {
        let mut marker = [0; 1];
        self.reader.read_exact(&mut marker)?;
        let marker = marker[0];
        if (0x80..=0x8F).contains(&marker) {
            let size = marker - 0x80;
            Self::decode_string(self.reader, size.into())
        } else if marker == 0xD0 {
            let size = Self::decode_u8(self.reader)?;
            Self::decode_string(self.reader, size.into())
        } else if marker == 0xD1 {
            let size = Self::decode_u16(self.reader)?;
            Self::decode_string(self.reader, size.into())
        } else if marker == 0xD2 {
            let size = Self::check_addressable(Self::decode_u32(self.reader)?)?;
            Self::decode_string(self.reader, size)
        } else {
            Err(PackStreamDeserializeError::protocol_violation(
                "expected string key",
            ))
        }
    }
}
