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
use std::sync::Arc;

use usize_cast::FromUsize;

use super::super::bolt5x0::Bolt5x0;
use super::super::bolt_common::{
    check_no_notification_filter, write_notification_filter_entry, BOLT_AGENT_LANGUAGE,
    BOLT_AGENT_LANGUAGE_DETAILS, BOLT_AGENT_PLATFORM, BOLT_AGENT_PRODUCT,
};
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
    bolt_debug, debug_buf, debug_buf_end, debug_buf_start, BoltData, BoltProtocol, BoltResponse,
    BoltStructTranslator, ResponseCallbacks, ResponseMessage,
};
use crate::error::Result;
use crate::value::ValueReceive;

/// Bolt 5.1 splits authentication out of HELLO: LOGON carries the auth
/// token, LOGOFF revokes it, which makes re-authentication possible without
/// tearing the connection down.
#[derive(Debug, Default)]
pub(crate) struct Bolt5x1<T: BoltStructTranslator> {
    translator: T,
    pub(in super::super) bolt5x0: Bolt5x0<T>,
}

impl<T: BoltStructTranslator> Bolt5x1<T> {
    /// HELLO builder for 5.1 and newer: no auth entries; notification
    /// filters (5.2) and the bolt agent (5.3) slot in on demand.
    pub(in super::super) fn hello_inner<RW: Read + Write>(
        &mut self,
        data: &mut BoltData<RW>,
        parameters: HelloParameters,
        emit_notifications: bool,
        emit_bolt_agent: bool,
    ) -> Result<()> {
        let HelloParameters {
            user_agent,
            auth: _,
            routing_context,
            notification_filter,
        } = parameters;
        if !emit_notifications {
            check_no_notification_filter(data.protocol_version, notification_filter)?;
        }

        debug_buf_start!(log_buf);
        debug_buf!(log_buf, "C: HELLO");
        let mut dbg_serializer = PackStreamSerializerDebugImpl::new();
        let mut message_buff = Vec::new();
        let mut serializer = PackStreamSerializerImpl::new(&mut message_buff);
        serializer.write_struct_header(0x01, 1)?;

        let emit_filter = emit_notifications
            && notification_filter.map(|f| !f.is_default()).unwrap_or(false);
        let extra_size = 1
            + <bool as Into<u64>>::into(emit_bolt_agent)
            + <bool as Into<u64>>::into(routing_context.is_some())
            + <bool as Into<u64>>::into(emit_filter);
        serializer.write_dict_header(extra_size)?;
        serializer.write_string("user_agent")?;
        serializer.write_string(user_agent)?;
        debug_buf!(log_buf, " {}", {
            dbg_serializer.write_dict_header(extra_size).unwrap();
            dbg_serializer.write_string("user_agent").unwrap();
            dbg_serializer.write_string(user_agent).unwrap();
            dbg_serializer.flush()
        });

        if emit_bolt_agent {
            let entries = [
                ("product", BOLT_AGENT_PRODUCT),
                ("platform", BOLT_AGENT_PLATFORM),
                ("language", BOLT_AGENT_LANGUAGE),
                ("language_details", BOLT_AGENT_LANGUAGE_DETAILS),
            ];
            serializer.write_string("bolt_agent")?;
            serializer.write_dict_header(entries.len() as u64)?;
            for (key, value) in entries {
                serializer.write_string(key)?;
                serializer.write_string(value)?;
            }
            debug_buf!(log_buf, "{}", {
                dbg_serializer.write_string("bolt_agent").unwrap();
                dbg_serializer.write_dict_header(entries.len() as u64).unwrap();
                for (key, value) in entries {
                    dbg_serializer.write_string(key).unwrap();
                    dbg_serializer.write_string(value).unwrap();
                }
                dbg_serializer.flush()
            });
        }

        if let Some(routing_context) = routing_context {
            serializer.write_string("routing")?;
            data.serialize_routing_context(&mut serializer, &self.translator, routing_context)?;
            debug_buf!(log_buf, "{}", {
                dbg_serializer.write_string("routing").unwrap();
                data.serialize_routing_context(
                    &mut dbg_serializer,
                    &self.translator,
                    routing_context,
                )
                .unwrap();
                dbg_serializer.flush()
            });
        }

        if emit_filter {
            let filter = notification_filter.expect("checked in emit_filter");
            write_notification_filter_entry(
                log_buf.as_mut(),
                &mut serializer,
                &mut dbg_serializer,
                filter,
            )?;
        }

        data.message_buff.push_back(vec![message_buff]);
        debug_buf_end!(data, log_buf);

        Bolt5x0::<T>::enqueue_hello_response(data);
        Ok(())
    }
}

impl<T: BoltStructTranslator> BoltProtocol for Bolt5x1<T> {
    #[inline]
    fn hello<RW: Read + Write>(
        &mut self,
        data: &mut BoltData<RW>,
        parameters: HelloParameters,
    ) -> Result<()> {
        self.hello_inner(data, parameters, false, false)
    }

    fn logon<RW: Read + Write>(
        &mut self,
        data: &mut BoltData<RW>,
        parameters: LogonParameters,
        callbacks: ResponseCallbacks,
    ) -> Result<()> {
        let LogonParameters { auth } = parameters;
        data.auth = Some(Arc::clone(auth));
        let auth = data.auth.as_ref().expect("is some because of previous line");

        debug_buf_start!(log_buf);
        debug_buf!(log_buf, "C: LOGON");
        let mut dbg_serializer = PackStreamSerializerDebugImpl::new();
        let mut message_buff = Vec::new();
        let mut serializer = PackStreamSerializerImpl::new(&mut message_buff);
        serializer.write_struct_header(0x6A, 1)?;

        let auth_size = u64::from_usize(auth.data.len());
        serializer.write_dict_header(auth_size)?;
        debug_buf!(log_buf, " {}", {
            dbg_serializer.write_dict_header(auth_size).unwrap();
            dbg_serializer.flush()
        });

        for (k, v) in &auth.data {
            serializer.write_string(k)?;
            data.serialize_value(&mut serializer, &self.translator, v)?;
            debug_buf!(log_buf, "{}", {
                dbg_serializer.write_string(k).unwrap();
                if k == "credentials" {
                    dbg_serializer.write_string("**********").unwrap();
                } else {
                    data.serialize_value(&mut dbg_serializer, &self.translator, v)
                        .unwrap();
                }
                dbg_serializer.flush()
            });
        }

        data.message_buff.push_back(vec![message_buff]);
        data.push_response(BoltResponse::new(ResponseMessage::Logon, callbacks));
        debug_buf_end!(data, log_buf);
        Ok(())
    }

    fn logoff<RW: Read + Write>(
        &mut self,
        data: &mut BoltData<RW>,
        _parameters: LogoffParameters,
        callbacks: ResponseCallbacks,
    ) -> Result<()> {
        let mut message_buff = Vec::new();
        let mut serializer = PackStreamSerializerImpl::new(&mut message_buff);
        serializer.write_struct_header(0x6B, 0)?;
        data.message_buff.push_back(vec![message_buff]);
        data.auth = None;
        data.push_response(BoltResponse::new(ResponseMessage::Logoff, callbacks));
        bolt_debug!(data, "C: LOGOFF");
        Ok(())
    }

    #[inline]
    fn supports_reauth(&self) -> bool {
        true
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

    #[inline]
    fn run<RW: Read + Write, KP: Borrow<str> + Debug, KM: Borrow<str> + Debug>(
        &mut self,
        data: &mut BoltData<RW>,
        parameters: RunParameters<KP, KM>,
        callbacks: ResponseCallbacks,
    ) -> Result<()> {
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

    #[inline]
    fn begin<RW: Read + Write, K: Borrow<str> + Debug>(
        &mut self,
        data: &mut BoltData<RW>,
        parameters: BeginParameters<K>,
        callbacks: ResponseCallbacks,
    ) -> Result<()> {
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

    #[inline]
    fn route<RW: Read + Write>(
        &mut self,
        data: &mut BoltData<RW>,
        parameters: RouteParameters,
        callbacks: ResponseCallbacks,
    ) -> Result<()> {
        self.bolt5x0.route(data, parameters, callbacks)
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
