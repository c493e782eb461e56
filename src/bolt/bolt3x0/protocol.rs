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

use super::super::bolt5x0::Bolt5x0;
use super::super::bolt_common::{
    route_via_procedure, unsupported_protocol_feature_error, ServerAwareBoltVersion,
};
use super::super::message::BoltMessage;
use super::super::message_parameters::{
    BeginParameters, CommitParameters, DiscardParameters, GoodbyeParameters, HelloParameters,
    LogoffParameters, LogonParameters, PullParameters, ResetParameters, RollbackParameters,
    RouteParameters, RunParameters, TelemetryParameters,
};
use super::super::packstream::{
    IntegerPolicy, PackStreamSerializer, PackStreamSerializerImpl,
};
use super::super::{
    debug_buf, debug_buf_end, debug_buf_start, BoltData, BoltProtocol, BoltResponse,
    BoltStructTranslator, ResponseCallbacks, ResponseMessage,
};
use crate::error::Result;
use crate::value::ValueReceive;

const ROUTING_PROCEDURE_CALL: &str = "CALL dbms.cluster.routing.getRoutingTable($context)";

/// Bolt 3: HELLO/GOODBYE and explicit transaction messages exist, streams
/// are still consumed wholesale with PULL_ALL/DISCARD_ALL and there is only
/// one database.
#[derive(Debug, Default)]
pub(crate) struct Bolt3x0<T: BoltStructTranslator> {
    pub(in super::super) bolt5x0: Bolt5x0<T>,
}

impl<T: BoltStructTranslator> Bolt3x0<T> {
    fn check_tx_parameters(
        &self,
        data: &BoltData<impl Read + Write>,
        db: Option<&str>,
        imp_user: Option<&str>,
    ) -> Result<()> {
        if db.is_some() {
            return Err(unsupported_protocol_feature_error(
                "multi-database support",
                data.protocol_version,
                ServerAwareBoltVersion::V4x0,
            ));
        }
        if imp_user.is_some() {
            return Err(unsupported_protocol_feature_error(
                "impersonation",
                data.protocol_version,
                ServerAwareBoltVersion::V4x4,
            ));
        }
        Ok(())
    }

    fn pull_all_or_discard_all<RW: Read + Write>(
        &mut self,
        data: &mut BoltData<RW>,
        callbacks: ResponseCallbacks,
        name: &str,
        tag: u8,
        response: ResponseMessage,
    ) -> Result<()> {
        debug_buf_start!(log_buf);
        debug_buf!(log_buf, "C: {}", name);
        let mut message_buff = Vec::new();
        let mut serializer = PackStreamSerializerImpl::new(&mut message_buff);
        serializer.write_struct_header(tag, 0)?;
        data.message_buff.push_back(vec![message_buff]);
        data.push_response(BoltResponse::new(response, callbacks));
        debug_buf_end!(data, log_buf);
        Ok(())
    }
}

impl<T: BoltStructTranslator> BoltProtocol for Bolt3x0<T> {
    fn hello<RW: Read + Write>(
        &mut self,
        data: &mut BoltData<RW>,
        parameters: HelloParameters,
    ) -> Result<()> {
        // no server-side routing entry before 4.1
        let parameters = HelloParameters {
            routing_context: None,
            ..parameters
        };
        self.bolt5x0.hello(data, parameters)
    }

    #[inline]
    fn logon<RW: Read + Write>(
        &mut self,
        data: &mut BoltData<RW>,
        parameters: LogonParameters,
        callbacks: ResponseCallbacks,
    ) -> Result<()> {
        self.bolt5x0.logon(data, parameters, callbacks)
    }

    #[inline]
    fn logoff<RW: Read + Write>(
        &mut self,
        data: &mut BoltData<RW>,
        parameters: LogoffParameters,
        callbacks: ResponseCallbacks,
    ) -> Result<()> {
        self.bolt5x0.logoff(data, parameters, callbacks)
    }

    #[inline]
    fn supports_reauth(&self) -> bool {
        self.bolt5x0.supports_reauth()
    }

    #[inline]
    fn goodbye<RW: Read + Write>(
        &mut self,
        data: &mut BoltData<RW>,
        parameters: GoodbyeParameters,
    ) -> Result<()> {
        self.bolt5x0.goodbye(data, parameters)
    }

    #[inline]
    fn reset<RW: Read + Write>(
        &mut self,
        data: &mut BoltData<RW>,
        parameters: ResetParameters,
    ) -> Result<()> {
        self.bolt5x0.reset(data, parameters)
    }

    fn run<RW: Read + Write, KP: Borrow<str> + Debug, KM: Borrow<str> + Debug>(
        &mut self,
        data: &mut BoltData<RW>,
        parameters: RunParameters<KP, KM>,
        callbacks: ResponseCallbacks,
    ) -> Result<()> {
        self.check_tx_parameters(data, parameters.db, parameters.imp_user)?;
        self.bolt5x0.run(data, parameters, callbacks)
    }

    fn discard<RW: Read + Write>(
        &mut self,
        data: &mut BoltData<RW>,
        _parameters: DiscardParameters,
        callbacks: ResponseCallbacks,
    ) -> Result<()> {
        // DISCARD_ALL has no extra map; n and qid cannot be expressed
        self.pull_all_or_discard_all(data, callbacks, "DISCARD_ALL", 0x2F, ResponseMessage::Discard)
    }

    fn pull<RW: Read + Write>(
        &mut self,
        data: &mut BoltData<RW>,
        _parameters: PullParameters,
        callbacks: ResponseCallbacks,
    ) -> Result<()> {
        // PULL_ALL has no extra map; n and qid cannot be expressed
        self.pull_all_or_discard_all(data, callbacks, "PULL_ALL", 0x3F, ResponseMessage::Pull)
    }

    fn begin<RW: Read + Write, K: Borrow<str> + Debug>(
        &mut self,
        data: &mut BoltData<RW>,
        parameters: BeginParameters<K>,
        callbacks: ResponseCallbacks,
    ) -> Result<()> {
        self.check_tx_parameters(data, parameters.db, parameters.imp_user)?;
        self.bolt5x0.begin(data, parameters, callbacks)
    }

    #[inline]
    fn commit<RW: Read + Write>(
        &mut self,
        data: &mut BoltData<RW>,
        parameters: CommitParameters,
        callbacks: ResponseCallbacks,
    ) -> Result<()> {
        self.bolt5x0.commit(data, parameters, callbacks)
    }

    #[inline]
    fn rollback<RW: Read + Write>(
        &mut self,
        data: &mut BoltData<RW>,
        parameters: RollbackParameters,
    ) -> Result<()> {
        self.bolt5x0.rollback(data, parameters)
    }

    fn route<RW: Read + Write>(
        &mut self,
        data: &mut BoltData<RW>,
        parameters: RouteParameters,
        callbacks: ResponseCallbacks,
    ) -> Result<()> {
        self.check_tx_parameters(data, parameters.db, parameters.imp_user)?;
        route_via_procedure(
            self,
            data,
            parameters,
            callbacks,
            ROUTING_PROCEDURE_CALL,
            false,
        )
    }

    #[inline]
    fn telemetry<RW: Read + Write>(
        &mut self,
        data: &mut BoltData<RW>,
        parameters: TelemetryParameters,
        callbacks: ResponseCallbacks,
    ) -> Result<()> {
        self.bolt5x0.telemetry(data, parameters, callbacks)
    }

    #[inline]
    fn load_value<R: Read>(
        &mut self,
        reader: &mut R,
        integer_policy: IntegerPolicy,
    ) -> Result<ValueReceive> {
        self.bolt5x0.load_value(reader, integer_policy)
    }

    #[inline]
    fn handle_response<RW: Read + Write>(
        &mut self,
        data: &mut BoltData<RW>,
        message: BoltMessage<ValueReceive>,
    ) -> Result<()> {
        self.bolt5x0.handle_response(data, message)
    }
}
