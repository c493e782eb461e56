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

use std::borrow::Borrow;
use std::fmt::Debug;
use std::io::{Read, Write};

use super::super::bolt5x0::handle_response_common;
use super::super::bolt5x4::Bolt5x4;
use super::super::message::BoltMessage;
use super::super::message_parameters::{
    BeginParameters, CommitParameters, DiscardParameters, GoodbyeParameters, HelloParameters,
    LogoffParameters, LogonParameters, PullParameters, ResetParameters, RollbackParameters,
    RouteParameters, RunParameters, TelemetryParameters,
};
use super::super::packstream::IntegerPolicy;
use super::super::{BoltData, BoltMeta, BoltProtocol, BoltStructTranslator, ResponseCallbacks};
use crate::error::{Result, ServerError};
use crate::value::ValueReceive;

/// Bolt 5.7 reports failures as GQL errors: `neo4j_code`, `gql_status`, a
/// status description, a diagnostic record, and optionally a nested cause.
#[derive(Debug, Default)]
pub(crate) struct Bolt5x7<T: BoltStructTranslator> {
    pub(in super::super) bolt5x4: Bolt5x4<T>,
}

/// Fill in the diagnostic-record defaults the server is allowed to omit,
/// through all nested causes.
pub(in super::super) fn enrich_failure_diag_record(mut meta: &mut BoltMeta) {
    loop {
        if let Some(record) = meta
            .get_mut("diagnostic_record")
            .and_then(ValueReceive::as_map_mut)
        {
            for (key, value) in [
                ("OPERATION", ""),
                ("OPERATION_CODE", "0"),
                ("CURRENT_SCHEMA", "/"),
            ] {
                record
                    .entry(String::from(key))
                    .or_insert_with(|| ValueReceive::String(String::from(value)));
            }
        }
        match meta.get_mut("cause").and_then(ValueReceive::as_map_mut) {
            None => break,
            Some(cause) => meta = cause,
        }
    }
}

fn parse_gql_failure(mut meta: BoltMeta) -> ServerError {
    enrich_failure_diag_record(&mut meta);
    ServerError::from_meta_gql(meta)
}

impl<T: BoltStructTranslator> BoltProtocol for Bolt5x7<T> {
    #[inline]
    fn hello<RW: Read + Write>(
        &mut self,
        data: &mut BoltData<RW>,
        parameters: HelloParameters,
    ) -> Result<()> {
        self.bolt5x4.hello(data, parameters)
    }

    #[inline]
    fn logon<RW: Read + Write>(
        &mut self,
        data: &mut BoltData<RW>,
        parameters: LogonParameters,
        callbacks: ResponseCallbacks,
    ) -> Result<()> {
        self.bolt5x4.logon(data, parameters, callbacks)
    }

    #[inline]
    fn logoff<RW: Read + Write>(
        &mut self,
        data: &mut BoltData<RW>,
        parameters: LogoffParameters,
        callbacks: ResponseCallbacks,
    ) -> Result<()> {
        self.bolt5x4.logoff(data, parameters, callbacks)
    }

    #[inline]
    fn supports_reauth(&self) -> bool {
        self.bolt5x4.supports_reauth()
    }

    #[inline]
    fn goodbye<RW: Read + Write>(
        &mut self,
        data: &mut BoltData<RW>,
        parameters: GoodbyeParameters,
    ) -> Result<()> {
        self.bolt5x4.goodbye(data, parameters)
    }

    #[inline]
    fn reset<RW: Read + Write>(
        &mut self,
        data: &mut BoltData<RW>,
        parameters: ResetParameters,
    ) -> Result<()> {
        self.bolt5x4.reset(data, parameters)
    }

    #[inline]
    fn run<RW: Read + Write, KP: Borrow<str> + Debug, KM: Borrow<str> + Debug>(
        &mut self,
        data: &mut BoltData<RW>,
        parameters: RunParameters<KP, KM>,
        callbacks: ResponseCallbacks,
    ) -> Result<()> {
        self.bolt5x4.run(data, parameters, callbacks)
    }

    #[inline]
    fn discard<RW: Read + Write>(
        &mut self,
        data: &mut BoltData<RW>,
        parameters: DiscardParameters,
        callbacks: ResponseCallbacks,
    ) -> Result<()> {
        self.bolt5x4.discard(data, parameters, callbacks)
    }

    #[inline]
    fn pull<RW: Read + Write>(
        &mut self,
        data: &mut BoltData<RW>,
        parameters: PullParameters,
        callbacks: ResponseCallbacks,
    ) -> Result<()> {
        self.bolt5x4.pull(data, parameters, callbacks)
    }

    #[inline]
    fn begin<RW: Read + Write, K: Borrow<str> + Debug>(
        &mut self,
        data: &mut BoltData<RW>,
        parameters: BeginParameters<K>,
        callbacks: ResponseCallbacks,
    ) -> Result<()> {
        self.bolt5x4.begin(data, parameters, callbacks)
    }

    #[inline]
    fn commit<RW: Read + Write>(
        &mut self,
        data: &mut BoltData<RW>,
        parameters: CommitParameters,
        callbacks: ResponseCallbacks,
    ) -> Result<()> {
        self.bolt5x4.commit(data, parameters, callbacks)
    }

    #[inline]
    fn rollback<RW: Read + Write>(
        &mut self,
        data: &mut BoltData<RW>,
        parameters: RollbackParameters,
    ) -> Result<()> {
        self.bolt5x4.rollback(data, parameters)
    }

    #[inline]
    fn route<RW: Read + Write>(
        &mut self,
        data: &mut BoltData<RW>,
        parameters: RouteParameters,
        callbacks: ResponseCallbacks,
    ) -> Result<()> {
        self.bolt5x4.route(data, parameters, callbacks)
    }

    #[inline]
    fn telemetry<RW: Read + Write>(
        &mut self,
        data: &mut BoltData<RW>,
        parameters: TelemetryParameters,
        callbacks: ResponseCallbacks,
    ) -> Result<()> {
        self.bolt5x4.telemetry(data, parameters, callbacks)
    }

    #[inline]
    fn load_value<R: Read>(
        &mut self,
        reader: &mut R,
        integer_policy: IntegerPolicy,
    ) -> Result<ValueReceive> {
        self.bolt5x4.load_value(reader, integer_policy)
    }

    #[inline]
    fn handle_response<RW: Read + Write>(
        &mut self,
        data: &mut BoltData<RW>,
        message: BoltMessage<ValueReceive>,
    ) -> Result<()> {
        handle_response_common(data, message, parse_gql_failure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashMap;

    #[test]
    fn test_enrich_fills_missing_defaults_recursively() {
        let mut cause = HashMap::new();
        cause.insert(
            String::from("diagnostic_record"),
            ValueReceive::Map(HashMap::new()),
        );
        let mut meta = HashMap::new();
        meta.insert(
            String::from("diagnostic_record"),
            ValueReceive::Map(
                [(
                    String::from("OPERATION"),
                    ValueReceive::String(String::from("custom")),
                )]
                .into_iter()
                .collect(),
            ),
        );
        meta.insert(String::from("cause"), ValueReceive::Map(cause));

        enrich_failure_diag_record(&mut meta);

        let record = meta
            .get("diagnostic_record")
            .and_then(ValueReceive::as_map)
            .unwrap();
        assert_eq!(
            record.get("OPERATION"),
            Some(&ValueReceive::String(String::from("custom")))
        );
        assert_eq!(
            record.get("OPERATION_CODE"),
            Some(&ValueReceive::String(String::from("0")))
        );
        assert_eq!(
            record.get("CURRENT_SCHEMA"),
            Some(&ValueReceive::String(String::from("/")))
        );

        let cause = meta.get("cause").and_then(ValueReceive::as_map).unwrap();
        let cause_record = cause
            .get("diagnostic_record")
            .and_then(ValueReceive::as_map)
            .unwrap();
        assert_eq!(
            cause_record.get("OPERATION"),
            Some(&ValueReceive::String(String::from("")))
        );
    }
}
