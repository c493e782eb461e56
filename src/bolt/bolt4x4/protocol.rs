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

use atomic_refcell::AtomicRefCell;
use log::warn;
use usize_cast::FromUsize;

use super::super::bolt5x0::Bolt5x0;
use super::super::bolt_common::check_no_notification_filter;
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
    debug_buf, debug_buf_end, debug_buf_start, BoltData, BoltProtocol,
    BoltStructTranslatorWithUtcPatch, ResponseCallbacks,
};
use crate::error::Result;
use crate::value::ValueReceive;

const PATCH_BOLT_KEY: &str = "patch_bolt";

#[derive(Debug)]
pub(crate) struct Bolt4x4<T: BoltStructTranslatorWithUtcPatch + Sync + Send + 'static> {
    translator: Arc<AtomicRefCell<T>>,
    pub(in super::super) bolt5x0: Bolt5x0<Arc<AtomicRefCell<T>>>,
}

impl<T: BoltStructTranslatorWithUtcPatch + Sync + Send + 'static> Bolt4x4<T> {
    pub(crate) fn new() -> Self {
        let translator: Arc<AtomicRefCell<T>> = Default::default();
        let bolt5x0 = Bolt5x0::new(Arc::clone(&translator));
        Bolt4x4 {
            translator,
            bolt5x0,
        }
    }
}

impl<T: BoltStructTranslatorWithUtcPatch + Sync + Send + 'static> Default for Bolt4x4<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: BoltStructTranslatorWithUtcPatch + Sync + Send + 'static> BoltProtocol for Bolt4x4<T> {
    fn hello<RW: Read + Write>(
        &mut self,
        data: &mut BoltData<RW>,
        parameters: HelloParameters,
    ) -> Result<()> {
        let HelloParameters {
            user_agent,
            auth,
            routing_context,
            notification_filter,
        } = parameters;
        check_no_notification_filter(data.protocol_version, notification_filter)?;

        debug_buf_start!(log_buf);
        debug_buf!(log_buf, "C: HELLO");
        let mut dbg_serializer = PackStreamSerializerDebugImpl::new();
        let mut message_buff = Vec::new();
        let mut serializer = PackStreamSerializerImpl::new(&mut message_buff);
        serializer.write_struct_header(0x01, 1)?;

        let extra_size = 2
            + <bool as Into<u64>>::into(routing_context.is_some())
            + u64::from_usize(auth.data.len());
        serializer.write_dict_header(extra_size)?;
        serializer.write_string("user_agent")?;
        serializer.write_string(user_agent)?;
        debug_buf!(log_buf, " {}", {
            dbg_serializer.write_dict_header(extra_size).unwrap();
            dbg_serializer.write_string("user_agent").unwrap();
            dbg_serializer.write_string(user_agent).unwrap();
            dbg_serializer.flush()
        });

        // offer the UTC date-time re-encoding to the server
        serializer.write_string(PATCH_BOLT_KEY)?;
        data.serialize_str_slice(&mut serializer, &["utc"])?;
        debug_buf!(log_buf, "{}", {
            dbg_serializer.write_string(PATCH_BOLT_KEY).unwrap();
            data.serialize_str_slice(&mut dbg_serializer, &["utc"])
                .unwrap();
            dbg_serializer.flush()
        });

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

        self.bolt5x0.write_auth_entries(
            log_buf.as_mut(),
            &mut serializer,
            &mut dbg_serializer,
            data,
            auth,
        )?;
        data.auth = Some(Arc::clone(auth));

        data.message_buff.push_back(vec![message_buff]);
        debug_buf_end!(data, log_buf);

        let bolt_meta = Arc::clone(&data.meta);
        let translator = Arc::clone(&self.translator);
        let bolt_server_agent = Arc::clone(&data.server_agent);
        data.push_response(super::super::BoltResponse::new(
            super::super::ResponseMessage::Hello,
            ResponseCallbacks::new().with_on_success(move |mut meta| {
                if let Some((key, value)) = meta.remove_entry("server") {
                    match value {
                        ValueReceive::String(value) => {
                            std::mem::swap(
                                &mut *bolt_server_agent.borrow_mut(),
                                &mut Arc::new(value),
                            );
                        }
                        _ => {
                            warn!("server sent unexpected server type {:?}", &value);
                            meta.insert(key, value);
                        }
                    }
                }
                if let Some(value) = meta.get(PATCH_BOLT_KEY) {
                    match value {
                        ValueReceive::List(value) => {
                            for entry in value {
                                match entry {
                                    ValueReceive::String(s) if s == "utc" => {
                                        translator.borrow_mut().enable_utc_patch();
                                    }
                                    _ => {}
                                }
                            }
                        }
                        _ => {
                            warn!("server sent unexpected {PATCH_BOLT_KEY} type {value:?}");
                        }
                    }
                }
                std::mem::swap(&mut *bolt_meta.borrow_mut(), &mut meta);
                Ok(())
            }),
        ));
        Ok(())
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
