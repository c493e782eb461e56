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

use std::iter;
use std::sync::Arc;

use crate::bolt::BoltRecordFields;
use crate::value::ValueReceive;

/// One row of a query result: the stream's keys paired with this row's
/// values.
#[derive(Debug)]
pub struct Record {
    entries: Vec<(Arc<String>, ValueReceive)>,
}

impl Record {
    pub(crate) fn new(keys: &[Arc<String>], fields: BoltRecordFields) -> Self {
        assert_eq!(keys.len(), fields.len());
        Self {
            entries: iter::zip(keys.iter().map(Arc::clone), fields).collect(),
        }
    }

    /// Iterate over the keys of the record.
    /// The order of the keys corresponds to the order of the values.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    /// Iterate over the values of the record.
    pub fn values(&self) -> impl Iterator<Item = &ValueReceive> {
        self.entries.iter().map(|(_, value)| value)
    }

    /// Iterate over key-value pairs.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &ValueReceive)> {
        self.entries
            .iter()
            .map(|(key, value)| (key.as_str(), value))
    }

    /// Look a value up by key (first match wins).
    pub fn value(&self, key: &str) -> Option<&ValueReceive> {
        self.entries
            .iter()
            .find(|(k, _)| k.as_str() == key)
            .map(|(_, value)| value)
    }

    /// Move the value for `key` out of the record.
    pub fn take_value(&mut self, key: &str) -> Option<ValueReceive> {
        let index = self.entries.iter().position(|(k, _)| k.as_str() == key)?;
        let (_, value) = self.entries.remove(index);
        Some(value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Consume the record, yielding its values in stream order.
    pub fn into_values(self) -> impl Iterator<Item = ValueReceive> {
        self.entries.into_iter().map(|(_, value)| value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> Record {
        let keys = [Arc::new(String::from("n")), Arc::new(String::from("m"))];
        Record::new(
            &keys,
            vec![ValueReceive::Integer(1), ValueReceive::Integer(2)],
        )
    }

    #[test]
    fn test_lookup_by_key() {
        let record = record();
        assert_eq!(record.value("n"), Some(&ValueReceive::Integer(1)));
        assert_eq!(record.value("m"), Some(&ValueReceive::Integer(2)));
        assert_eq!(record.value("x"), None);
    }

    #[test]
    fn test_keys_match_values() {
        let record = record();
        assert_eq!(record.keys().collect::<Vec<_>>(), vec!["n", "m"]);
        assert_eq!(record.len(), 2);
    }

    #[test]
    fn test_take_value() {
        let mut record = record();
        assert_eq!(record.take_value("n"), Some(ValueReceive::Integer(1)));
        assert_eq!(record.take_value("n"), None);
        assert_eq!(record.len(), 1);
    }
}
