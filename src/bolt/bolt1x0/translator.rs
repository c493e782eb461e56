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

use std::collections::VecDeque;

use usize_cast::FromUsize;

use super::super::bolt4x4::Bolt4x4StructTranslator;
use super::super::bolt_common::*;
use super::super::BoltStructTranslator;
use crate::bolt::packstream::PackStreamSerializer;
use crate::value::{BrokenValue, BrokenValueInner, ValueReceive, ValueSend};

/// Bolt 1 struct coding rules: graph structures only. Spatial and temporal
/// types arrive with Bolt 2 and are refused on the way out; unknown tags
/// stay opaque on the way in.
#[derive(Debug, Default)]
pub(crate) struct Bolt1x0StructTranslator {
    bolt4x4_translator: Bolt4x4StructTranslator,
}

impl BoltStructTranslator for Bolt1x0StructTranslator {
    fn serialize<S: PackStreamSerializer>(
        &self,
        serializer: &mut S,
        value: &ValueSend,
    ) -> Result<(), S::Error> {
        match value {
            ValueSend::Null => serializer.write_null(),
            ValueSend::Boolean(b) => serializer.write_bool(*b),
            ValueSend::Integer(i) => serializer.write_int(*i),
            ValueSend::Float(f) => serializer.write_float(*f),
            ValueSend::Bytes(b) => serializer.write_bytes(b),
            ValueSend::String(s) => serializer.write_string(s),
            ValueSend::List(l) => {
                serializer.write_list_header(u64::from_usize(l.len()))?;
                for v in l {
                    self.serialize(serializer, v)?;
                }
                Ok(())
            }
            ValueSend::Map(d) => {
                serializer.write_dict_header(u64::from_usize(d.len()))?;
                for (k, v) in d {
                    serializer.write_string(k)?;
                    self.serialize(serializer, v)?;
                }
                Ok(())
            }
            ValueSend::Cartesian2D(_)
            | ValueSend::Cartesian3D(_)
            | ValueSend::WGS84_2D(_)
            | ValueSend::WGS84_3D(_) => Err(serializer.error(
                "spatial values require at least Bolt protocol version 2.0".into(),
            )),
            ValueSend::Duration(_)
            | ValueSend::LocalTime(_)
            | ValueSend::Time(_)
            | ValueSend::Date(_)
            | ValueSend::LocalDateTime(_)
            | ValueSend::DateTime(_)
            | ValueSend::DateTimeFixed(_) => Err(serializer.error(
                "temporal values require at least Bolt protocol version 2.0".into(),
            )),
        }
    }

    fn deserialize_struct(&self, tag: u8, fields: Vec<ValueReceive>) -> ValueReceive {
        match tag {
            TAG_NODE | TAG_RELATIONSHIP | TAG_PATH => {
                self.bolt4x4_translator.deserialize_struct(tag, fields)
            }
            _ => ValueReceive::BrokenValue(BrokenValue {
                inner: BrokenValueInner::UnknownStruct {
                    tag,
                    fields: VecDeque::from(fields),
                },
            }),
        }
    }
}
