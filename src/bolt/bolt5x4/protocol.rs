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

use super::super::bolt5x3::Bolt5x3;
use super::super::message::BoltMessage;
use super::super::message_parameters::{
    BeginParameters, CommitParameters, DiscardParameters, GoodbyeParameters, HelloParameters,
    LogoffParameters, LogonParameters, PullParameters, ResetParameters, RollbackParameters,
    RouteParameters, RunParameters, TelemetryParameters,
};
use super::super::packstream::{
    IntegerPolicy, PackStreamSerializer, PackStreamSerializerDebugImpl, PackStreamSerializerImpl,
};
use super::super::{
    debug_buf, debug_buf_end, debug_buf_start, BoltData, BoltProtocol, BoltResponse,
    BoltStructTranslator, ResponseCallbacks, ResponseMessage,
};
use crate::error::Result;
use crate::value::ValueReceive;

/// Bolt 5.4 adds the TELEMETRY message (driver API usage hints). Nothing
/// else changed on the wire in 5.5 and 5.6, so this implementation also
/// speaks those versions.
#[derive(Debug, Default)]
pub(crate) struct Bolt5x4<T: BoltStructTranslator> {
    pub(in super::super) bolt5x3: Bolt5x3<T>,
}

impl<T: BoltStructTranslator> BoltProtocol for Bolt5x4<T> {
    #[inline]
    fn hello<RW: Read + Write>(
        &mut self,
        data: &mut BoltData<RW>,
        parameters: HelloParameters,
    ) -> Result<()> {
        self.bolt5x3.hello(data, parameters)
    }

    #[inline]
    fn logon<RW: Read + Write>(
        &mut self,
        data: &mut BoltData<RW>,
        parameters: LogonParameters,
        callbacks: ResponseCallbacks,
    ) -> Result<()> {
        self.bolt5x3.logon(data, parameters, callbacks)
    }

    #[inline]
    fn logoff<RW: Read + Write>(
        &mut self,
        data: &mut BoltData<RW>,
        parameters: LogoffParameters,
        callbacks: ResponseCallbacks,
    ) -> Result<()> {
        self.bolt5x3.logoff(data, parameters, callbacks)
    }

    #[inline]
    fn supports_reauth(&self) -> bool {
        self.bolt5x3.supports_reauth()
    }

    #[inline]
    fn goodbye<RW: Read + Write>(
        &mut self,
        data: &mut BoltData<RW>,
        parameters: GoodbyeParameters,
    ) -> Result<()> {
        self.bolt5x3.goodbye(data, parameters)
    }

    #[inline]
    fn reset<RW: Read + Write>(
        &mut self,
        data: &mut BoltData<RW>,
        parameters: ResetParameters,
    ) -> Result<()> {
        self.bolt5x3.reset(data, parameters)
    }

    #[inline]
    fn run<RW: Read + Write, KP: Borrow<str> + Debug, KM: Borrow<str> + Debug>(
        &mut self,
        data: &mut BoltData<RW>,
        parameters: RunParameters<KP, KM>,
        callbacks: ResponseCallbacks,
    ) -> Result<()> {
        self.bolt5x3.run(data, parameters, callbacks)
    }

    #[inline]
    fn discard<RW: Read + Write>(
        &mut self,
        data: &mut BoltData<RW>,
        parameters: DiscardParameters,
        callbacks: ResponseCallbacks,
    ) -> Result<()> {
        self.bolt5x3.discard(data, parameters, callbacks)
    }

    #[inline]
    fn pull<RW: Read + Write>(
        &mut self,
        data: &mut BoltData<RW>,
        parameters: PullParameters,
        callbacks: ResponseCallbacks,
    ) -> Result<()> {
        self.bolt5x3.pull(data, parameters, callbacks)
    }

    #[inline]
    fn begin<RW: Read + Write, K: Borrow<str> + Debug>(
        &mut self,
        data: &mut BoltData<RW>,
        parameters: BeginParameters<K>,
        callbacks: ResponseCallbacks,
    ) -> Result<()> {
        self.bolt5x3.begin(data, parameters, callbacks)
    }

    #[inline]
    fn commit<RW: Read + Write>(
        &mut self,
        data: &mut BoltData<RW>,
        parameters: CommitParameters,
        callbacks: ResponseCallbacks,
    ) -> Result<()> {
        self.bolt5x3.commit(data, parameters, callbacks)
    }

    #[inline]
    fn rollback<RW: Read + Write>(
        &mut self,
        data: &mut BoltData<RW>,
        parameters: RollbackParameters,
    ) -> Result<()> {
        self.bolt5x3.rollback(data, parameters)
    }

    #[inline]
    fn route<RW: Read + Write>(
        &mut self,
        data: &mut BoltData<RW>,
        parameters: RouteParameters,
        callbacks: ResponseCallbacks,
    ) -> Result<()> {
        self.bolt5x3.route(data, parameters, callbacks)
    }

    fn telemetry<RW: Read + Write>(
        &mut self,
        data: &mut BoltData<RW>,
        parameters: TelemetryParameters,
        callbacks: ResponseCallbacks,
    ) -> Result<()> {
        let TelemetryParameters { api } = parameters;
        debug_buf_start!(log_buf);
        debug_buf!(log_buf, "C: TELEMETRY");
        let mut dbg_serializer = PackStreamSerializerDebugImpl::new();
        let mut message_buff = Vec::new();
        let mut serializer = PackStreamSerializerImpl::new(&mut message_buff);
        serializer.write_struct_header(0x54, 1)?;
        serializer.write_int(api)?;
        debug_buf!(log_buf, " {}", {
            dbg_serializer.write_int(api).unwrap();
            dbg_serializer.flush()
        });

        data.message_buff.push_back(vec![message_buff]);
        data.push_response(BoltResponse::new(ResponseMessage::Telemetry, callbacks));
        debug_buf_end!(data, log_buf);
        Ok(())
    }

    #[inline]
    fn load_value<R: Read>(
        &mut self,
        reader: &mut R,
        integer_policy: IntegerPolicy,
    ) -> Result<ValueReceive> {
        self.bolt5x3.load_value(reader, integer_policy)
    }

    #[inline]
    fn handle_response<RW: Read + Write>(
        &mut self,
        data: &mut BoltData<RW>,
        message: BoltMessage<ValueReceive>,
    ) -> Result<()> {
        self.bolt5x3.handle_response(data, message)
    }
}
