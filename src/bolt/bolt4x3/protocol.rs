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
use super::super::bolt_common::{unsupported_protocol_feature_error, ServerAwareBoltVersion};
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

/// Bolt 4.3: first version with the dedicated ROUTE message (carrying the
/// database as a plain string); impersonation arrives in 4.4.
#[derive(Debug, Default)]
pub(crate) struct Bolt4x3<T: BoltStructTranslator> {
    pub(in super::super) bolt5x0: Bolt5x0<T>,
}

impl<T: BoltStructTranslator> Bolt4x3<T> {
    pub(in super::super) fn check_no_imp_user(
        &self,
        data: &BoltData<impl Read + Write>,
        imp_user: Option<&str>,
    ) -> Result<()> {
        match imp_user {
            None => Ok(()),
            Some(_) => Err(unsupported_protocol_feature_error(
                "impersonation",
                data.protocol_version,
                ServerAwareBoltVersion::V4x4,
            )),
        }
    }
}

impl<T: BoltStructTranslator> BoltProtocol for Bolt4x3<T> {
    #[inline]
    fn hello<RW: Read + Write>(
        &mut self,
        data: &mut BoltData<RW>,
        parameters: HelloParameters,
    ) -> Result<()> {
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
        self.check_no_imp_user(data, parameters.imp_user)?;
        self.bolt5x0.run(data, parameters, callbacks)
    }

    #[inline]
    fn discard<RW: Read + Write>(
        &mut self,
        data: &mut BoltData<RW>,
        parameters: DiscardParameters,
        callbacks: ResponseCallbacks,
    ) -> Result<()> {
        self.bolt5x0.discard(data, parameters, callbacks)
    }

    #[inline]
    fn pull<RW: Read + Write>(
        &mut self,
        data: &mut BoltData<RW>,
        parameters: PullParameters,
        callbacks: ResponseCallbacks,
    ) -> Result<()> {
        self.bolt5x0.pull(data, parameters, callbacks)
    }

    fn begin<RW: Read + Write, K: Borrow<str> + Debug>(
        &mut self,
        data: &mut BoltData<RW>,
        parameters: BeginParameters<K>,
        callbacks: ResponseCallbacks,
    ) -> Result<()> {
        self.check_no_imp_user(data, parameters.imp_user)?;
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
        let RouteParameters {
            routing_context,
            bookmarks,
            db,
            imp_user,
        } = parameters;
        self.check_no_imp_user(data, imp_user)?;

        debug_buf_start!(log_buf);
        debug_buf!(log_buf, "C: ROUTE");
        let mut dbg_serializer = PackStreamSerializerDebugImpl::new();
        let mut message_buff = Vec::new();
        let mut serializer = PackStreamSerializerImpl::new(&mut message_buff);
        serializer.write_struct_header(0x66, 3)?;

        data.serialize_routing_context(&mut serializer, &self.bolt5x0.translator, routing_context)?;
        debug_buf!(log_buf, " {}", {
            data.serialize_routing_context(
                &mut dbg_serializer,
                &self.bolt5x0.translator,
                routing_context,
            )
            .unwrap();
            dbg_serializer.flush()
        });

        match bookmarks {
            None => {
                debug_buf!(log_buf, " {}", {
                    dbg_serializer.write_list_header(0).unwrap();
                    dbg_serializer.flush()
                });
                serializer.write_list_header(0)?;
            }
            Some(bms) => {
                debug_buf!(log_buf, " {}", {
                    data.serialize_str_slice(&mut dbg_serializer, bms).unwrap();
                    dbg_serializer.flush()
                });
                data.serialize_str_slice(&mut serializer, bms)?;
            }
        }

        match db {
            None => {
                serializer.write_null()?;
                debug_buf!(log_buf, " {}", {
                    dbg_serializer.write_null().unwrap();
                    dbg_serializer.flush()
                });
            }
            Some(db) => {
                serializer.write_string(db)?;
                debug_buf!(log_buf, " {}", {
                    dbg_serializer.write_string(db).unwrap();
                    dbg_serializer.flush()
                });
            }
        }

        data.message_buff.push_back(vec![message_buff]);
        data.push_response(BoltResponse::new(ResponseMessage::Route, callbacks));
        debug_buf_end!(data, log_buf);
        Ok(())
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
