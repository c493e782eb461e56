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

pub mod graph;
pub mod spatial;
pub mod time;
mod value_receive;
mod value_send;

pub use value_receive::{BrokenValue, ValueReceive};
pub(crate) use value_receive::BrokenValueInner;
pub use value_send::ValueSend;

/// Build a [`ValueSend::Map`] from literal entries.
///
/// ```
/// use bolt_core::{value_map, ValueSend};
///
/// let map = value_map!({"x": 1, "y": "two"});
/// let ValueSend::Map(map) = map else { unreachable!() };
/// assert_eq!(map.get("x"), Some(&ValueSend::Integer(1)));
/// ```
#[macro_export]
macro_rules! value_map {
    ({ $($key:literal: $value:expr),* $(,)? }) => {
        {
            #[allow(unused_mut)]
            let mut map = std::collections::HashMap::new();
            $(
                map.insert(String::from($key), $crate::ValueSend::from($value));
            )*
            $crate::ValueSend::Map(map)
        }
    };
}
