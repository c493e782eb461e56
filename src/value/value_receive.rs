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

use std::collections::{HashMap, VecDeque};

use itertools::Itertools;

use super::graph;
use super::spatial;
use super::time;

/// Values received from the server.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum ValueReceive {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Bytes(Vec<u8>),
    String(String),
    List(Vec<ValueReceive>),
    Map(HashMap<String, ValueReceive>),
    Cartesian2D(spatial::Cartesian2D),
    Cartesian3D(spatial::Cartesian3D),
    WGS84_2D(spatial::WGS84_2D),
    WGS84_3D(spatial::WGS84_3D),
    Duration(time::Duration),
    LocalTime(time::LocalTime),
    Time(time::Time),
    Date(time::Date),
    LocalDateTime(time::LocalDateTime),
    DateTime(time::DateTime),
    DateTimeFixed(time::DateTimeFixed),
    Node(graph::Node),
    Relationship(graph::Relationship),
    Path(graph::Path),
    /// The server sent data this connection could not decode into a value.
    /// This keeps the rest of the containing message usable.
    BrokenValue(BrokenValue),
}

#[derive(Debug, Clone, PartialEq)]
pub struct BrokenValue {
    pub(crate) inner: BrokenValueInner,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum BrokenValueInner {
    Reason(String),
    /// A tagged structure this protocol version has no hydration rule for.
    UnknownStruct {
        tag: u8,
        fields: VecDeque<ValueReceive>,
    },
    /// A known tag whose field count or field types were wrong.
    InvalidStruct { reason: String },
}

impl From<BrokenValueInner> for BrokenValue {
    fn from(inner: BrokenValueInner) -> Self {
        Self { inner }
    }
}

impl BrokenValue {
    pub fn reason(&self) -> String {
        match &self.inner {
            BrokenValueInner::Reason(reason) => reason.clone(),
            BrokenValueInner::UnknownStruct { tag, .. } => {
                format!("received struct with unknown tag {tag:#04X}")
            }
            BrokenValueInner::InvalidStruct { reason } => reason.clone(),
        }
    }
}

macro_rules! impl_value_receive_accessors {
    ( $(($variant:ident, $type_:ty, $as_name:ident, $try_into_name:ident)),+ $(,)? ) => {
        $(
            impl ValueReceive {
                pub fn $as_name(&self) -> Option<&$type_> {
                    match self {
                        Self::$variant(v) => Some(v),
                        _ => None,
                    }
                }

                pub fn $try_into_name(self) -> Result<$type_, Self> {
                    match self {
                        Self::$variant(v) => Ok(v),
                        _ => Err(self),
                    }
                }
            }
        )+
    };
}

impl_value_receive_accessors!(
    (Boolean, bool, as_bool, try_into_bool),
    (Integer, i64, as_int, try_into_int),
    (Float, f64, as_float, try_into_float),
    (String, String, as_string, try_into_string),
    (List, Vec<ValueReceive>, as_list, try_into_list),
    (Map, HashMap<String, ValueReceive>, as_map, try_into_map),
    (Node, graph::Node, as_node, try_into_node),
    (Relationship, graph::Relationship, as_relationship, try_into_relationship),
    (Path, graph::Path, as_path, try_into_path),
);

impl ValueReceive {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub(crate) fn as_map_mut(&mut self) -> Option<&mut HashMap<String, ValueReceive>> {
        match self {
            Self::Map(v) => Some(v),
            _ => None,
        }
    }

    /// Recursively find an invalid-struct marker, i.e., a known structure
    /// tag that arrived with the wrong shape.
    pub(crate) fn find_invalid_struct(&self) -> Option<&str> {
        match self {
            Self::BrokenValue(BrokenValue {
                inner: BrokenValueInner::InvalidStruct { reason },
            }) => Some(reason),
            Self::BrokenValue(BrokenValue {
                inner: BrokenValueInner::UnknownStruct { fields, .. },
            }) => fields.iter().find_map(Self::find_invalid_struct),
            Self::List(values) => values.iter().find_map(Self::find_invalid_struct),
            Self::Map(map) => map.values().find_map(Self::find_invalid_struct),
            _ => None,
        }
    }

    pub(crate) fn dbg_print(&self) -> String {
        match self {
            Self::Null => "null".into(),
            Self::Boolean(v) => format!("{v}"),
            Self::Integer(v) => format!("{v}"),
            Self::Float(v) => format!("{v}"),
            Self::Bytes(v) => format!("bytes{v:02X?}"),
            Self::String(v) => format!("{v:?}"),
            Self::List(v) => format!("[{}]", v.iter().map(|e| e.dbg_print()).format(", ")),
            Self::Map(v) => format!(
                "{{{}}}",
                v.iter()
                    .map(|(k, e)| format!("{:?}: {}", k, e.dbg_print()))
                    .format(", ")
            ),
            Self::Cartesian2D(v) => format!("{v:?}"),
            Self::Cartesian3D(v) => format!("{v:?}"),
            Self::WGS84_2D(v) => format!("{v:?}"),
            Self::WGS84_3D(v) => format!("{v:?}"),
            Self::Duration(v) => format!("{v:?}"),
            Self::LocalTime(v) => format!("{v}"),
            Self::Time(v) => format!("{v:?}"),
            Self::Date(v) => format!("{v}"),
            Self::LocalDateTime(v) => format!("{v}"),
            Self::DateTime(v) => format!("{v}"),
            Self::DateTimeFixed(v) => format!("{v}"),
            Self::Node(v) => format!("{v:?}"),
            Self::Relationship(v) => format!("{v:?}"),
            Self::Path(v) => format!("{v:?}"),
            Self::BrokenValue(v) => format!("BrokenValue({:?})", v.reason()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_invalid_struct_is_recursive() {
        let broken = ValueReceive::BrokenValue(
            BrokenValueInner::InvalidStruct {
                reason: String::from("boom"),
            }
            .into(),
        );
        let nested = ValueReceive::List(vec![ValueReceive::Map(
            [(String::from("k"), broken)].into_iter().collect(),
        )]);
        assert_eq!(nested.find_invalid_struct(), Some("boom"));

        let ok = ValueReceive::List(vec![ValueReceive::Integer(1)]);
        assert_eq!(ok.find_invalid_struct(), None);
    }

    #[test]
    fn test_unknown_struct_is_not_invalid() {
        let unknown = ValueReceive::BrokenValue(
            BrokenValueInner::UnknownStruct {
                tag: 0x49,
                fields: VecDeque::new(),
            }
            .into(),
        );
        assert_eq!(unknown.find_invalid_struct(), None);
    }

    #[test]
    fn test_dbg_print() {
        let value = ValueReceive::Map(
            [(
                String::from("xs"),
                ValueReceive::List(vec![ValueReceive::Integer(1), ValueReceive::Null]),
            )]
            .into_iter()
            .collect(),
        );
        assert_eq!(value.dbg_print(), "{\"xs\": [1, null]}");
    }
}
