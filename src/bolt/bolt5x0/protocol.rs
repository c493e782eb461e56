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
use std::mem;
use std::sync::Arc;

use log::warn;
use usize_cast::FromUsize;

use super::super::bolt_common::{
    check_no_notification_filter, invalid_record_error, rewrite_timing_meta,
    unsupported_protocol_feature_error, write_notification_filter_entry, ServerAwareBoltVersion,
};
use super::super::message::BoltMessage;
use super::super::message_parameters::{
    BeginParameters, CommitParameters, DiscardParameters, GoodbyeParameters, HelloParameters,
    LogoffParameters, LogonParameters, PullParameters, ResetParameters, RollbackParameters,
    RouteParameters, RunParameters, TelemetryParameters,
};
use super::super::packstream::{
    IntegerPolicy, PackStreamDeserializer, PackStreamDeserializerImpl, PackStreamSerializer,
    PackStreamSerializerDebugImpl, PackStreamSerializerImpl,
};
use super::super::{
    assert_response_field_count, bolt_debug, debug_buf, debug_buf_end, debug_buf_start, BoltData,
    BoltProtocol, BoltResponse, BoltStructTranslator, ResponseCallbacks, ResponseMessage,
};
use crate::config::AuthToken;
use crate::error::{BoltError, Result, ServerError};
use crate::value::ValueReceive;

const SERVER_AGENT_KEY: &str = "server";

/// Base protocol implementation; later versions hold one and override the
/// messages that changed.
#[derive(Debug, Default)]
pub(crate) struct Bolt5x0<T: BoltStructTranslator> {
    pub(in super::super) translator: T,
}

impl<T: BoltStructTranslator> Bolt5x0<T> {
    pub(in super::super) fn new(translator: T) -> Self {
        Self { translator }
    }

    pub(in super::super) fn write_auth_entries<RW: Read + Write>(
        &self,
        mut log_buf: Option<&mut String>,
        serializer: &mut PackStreamSerializerImpl<impl Write>,
        dbg_serializer: &mut PackStreamSerializerDebugImpl,
        data: &BoltData<RW>,
        auth: &AuthToken,
    ) -> Result<()> {
        for (k, v) in &auth.data {
            serializer.write_string(k)?;
            data.serialize_value(serializer, &self.translator, v)?;
            debug_buf!(log_buf, "{}", {
                dbg_serializer.write_string(k).unwrap();
                if k == "credentials" {
                    dbg_serializer.write_string("**********").unwrap();
                } else {
                    data.serialize_value(dbg_serializer, &self.translator, v)
                        .unwrap();
                }
                dbg_serializer.flush()
            });
        }
        Ok(())
    }

    fn pull_or_discard<RW: Read + Write>(
        &mut self,
        data: &mut BoltData<RW>,
        n: i64,
        qid: i64,
        callbacks: ResponseCallbacks,
        name: &str,
        tag: u8,
        response: ResponseMessage,
    ) -> Result<()> {
        debug_buf_start!(log_buf);
        debug_buf!(log_buf, "C: {}", name);
        let mut dbg_serializer = PackStreamSerializerDebugImpl::new();
        let mut message_buff = Vec::new();
        let mut serializer = PackStreamSerializerImpl::new(&mut message_buff);
        serializer.write_struct_header(tag, 1)?;

        let can_omit_qid = data.can_omit_qid(qid);
        let extra_size = 1 + <bool as Into<u64>>::into(!can_omit_qid);
        debug_buf!(log_buf, " {}", {
            dbg_serializer.write_dict_header(extra_size).unwrap();
            dbg_serializer.write_string("n").unwrap();
            dbg_serializer.write_int(n).unwrap();
            dbg_serializer.flush()
        });
        serializer.write_dict_header(extra_size)?;
        serializer.write_string("n")?;
        serializer.write_int(n)?;
        if !can_omit_qid {
            serializer.write_string("qid")?;
            serializer.write_int(qid)?;
            debug_buf!(log_buf, "{}", {
                dbg_serializer.write_string("qid").unwrap();
                dbg_serializer.write_int(qid).unwrap();
                dbg_serializer.flush()
            });
        }

        data.message_buff.push_back(vec![message_buff]);
        data.push_response(BoltResponse::new(response, callbacks));
        debug_buf_end!(data, log_buf);
        Ok(())
    }

    /// RUN builder shared by 5.0 (no notification filters) and 5.2+ (filters
    /// permitted).
    pub(in super::super) fn run_with_filter_support<
        RW: Read + Write,
        KP: Borrow<str> + Debug,
        KM: Borrow<str> + Debug,
    >(
        &mut self,
        data: &mut BoltData<RW>,
        parameters: RunParameters<KP, KM>,
        mut callbacks: ResponseCallbacks,
        filter_supported: bool,
    ) -> Result<()> {
        let RunParameters {
            query,
            parameters,
            bookmarks,
            tx_timeout,
            tx_metadata,
            mode,
            db,
            imp_user,
            notification_filter,
        } = parameters;
        if !filter_supported {
            check_no_notification_filter(data.protocol_version, notification_filter)?;
        }

        debug_buf_start!(log_buf);
        debug_buf!(log_buf, "C: RUN");
        let mut dbg_serializer = PackStreamSerializerDebugImpl::new();
        let mut message_buff = Vec::new();
        let mut serializer = PackStreamSerializerImpl::new(&mut message_buff);
        serializer.write_struct_header(0x10, 3)?;

        serializer.write_string(query)?;
        debug_buf!(log_buf, " {}", {
            dbg_serializer.write_string(query).unwrap();
            dbg_serializer.flush()
        });

        match parameters {
            Some(parameters) => {
                data.serialize_dict(&mut serializer, &self.translator, parameters)?;
                debug_buf!(log_buf, " {}", {
                    data.serialize_dict(&mut dbg_serializer, &self.translator, parameters)
                        .unwrap();
                    dbg_serializer.flush()
                });
            }
            None => {
                serializer.write_dict_header(0)?;
                debug_buf!(log_buf, " {}", {
                    dbg_serializer.write_dict_header(0).unwrap();
                    dbg_serializer.flush()
                });
            }
        }

        let emit_filter = filter_supported
            && notification_filter.map(|f| !f.is_default()).unwrap_or(false);
        let extra_size = [
            bookmarks.map(|b| !b.is_empty()).unwrap_or(false),
            tx_timeout.is_some(),
            tx_metadata.map(|m| !m.is_empty()).unwrap_or(false),
            mode.map(|m| m != "w").unwrap_or(false),
            db.is_some(),
            imp_user.is_some(),
            emit_filter,
        ]
        .into_iter()
        .map(<bool as Into<u64>>::into)
        .sum();

        serializer.write_dict_header(extra_size)?;
        debug_buf!(log_buf, " {}", {
            dbg_serializer.write_dict_header(extra_size).unwrap();
            dbg_serializer.flush()
        });

        if let Some(bookmarks) = bookmarks {
            if !bookmarks.is_empty() {
                serializer.write_string("bookmarks")?;
                data.serialize_str_slice(&mut serializer, bookmarks)?;
                debug_buf!(log_buf, "{}", {
                    dbg_serializer.write_string("bookmarks").unwrap();
                    data.serialize_str_slice(&mut dbg_serializer, bookmarks)
                        .unwrap();
                    dbg_serializer.flush()
                });
            }
        }

        if let Some(tx_timeout) = tx_timeout {
            serializer.write_string("tx_timeout")?;
            serializer.write_int(tx_timeout)?;
            debug_buf!(log_buf, "{}", {
                dbg_serializer.write_string("tx_timeout").unwrap();
                dbg_serializer.write_int(tx_timeout).unwrap();
                dbg_serializer.flush()
            });
        }

        if let Some(tx_metadata) = tx_metadata {
            if !tx_metadata.is_empty() {
                serializer.write_string("tx_metadata")?;
                data.serialize_dict(&mut serializer, &self.translator, tx_metadata)?;
                debug_buf!(log_buf, "{}", {
                    dbg_serializer.write_string("tx_metadata").unwrap();
                    data.serialize_dict(&mut dbg_serializer, &self.translator, tx_metadata)
                        .unwrap();
                    dbg_serializer.flush()
                });
            }
        }

        if let Some(mode) = mode {
            if mode != "w" {
                serializer.write_string("mode")?;
                serializer.write_string(mode)?;
                debug_buf!(log_buf, "{}", {
                    dbg_serializer.write_string("mode").unwrap();
                    dbg_serializer.write_string(mode).unwrap();
                    dbg_serializer.flush()
                });
            }
        }

        if let Some(db) = db {
            serializer.write_string("db")?;
            serializer.write_string(db)?;
            debug_buf!(log_buf, "{}", {
                dbg_serializer.write_string("db").unwrap();
                dbg_serializer.write_string(db).unwrap();
                dbg_serializer.flush()
            });
        }

        if let Some(imp_user) = imp_user {
            serializer.write_string("imp_user")?;
            serializer.write_string(imp_user)?;
            debug_buf!(log_buf, "{}", {
                dbg_serializer.write_string("imp_user").unwrap();
                dbg_serializer.write_string(imp_user).unwrap();
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

        callbacks = callbacks.with_on_success_pre_hook({
            let last_qid = Arc::clone(&data.last_qid);
            move |meta| match meta.get("qid") {
                Some(ValueReceive::Integer(qid)) => {
                    *last_qid.borrow_mut() = Some(*qid);
                    Ok(())
                }
                None => {
                    *last_qid.borrow_mut() = None;
                    Ok(())
                }
                Some(v) => Err(BoltError::protocol_error(format!(
                    "server sent non-int qid: {v:?}"
                ))),
            }
        });

        data.message_buff.push_back(vec![message_buff]);
        data.push_response(BoltResponse::new(ResponseMessage::Run, callbacks));
        debug_buf_end!(data, log_buf);
        Ok(())
    }

    /// BEGIN builder shared by 5.0 and 5.2+ (notification filters).
    pub(in super::super) fn begin_with_filter_support<RW: Read + Write, K: Borrow<str> + Debug>(
        &mut self,
        data: &mut BoltData<RW>,
        parameters: BeginParameters<K>,
        callbacks: ResponseCallbacks,
        filter_supported: bool,
    ) -> Result<()> {
        let BeginParameters {
            bookmarks,
            tx_timeout,
            tx_metadata,
            mode,
            db,
            imp_user,
            notification_filter,
        } = parameters;
        if !filter_supported {
            check_no_notification_filter(data.protocol_version, notification_filter)?;
        }

        debug_buf_start!(log_buf);
        debug_buf!(log_buf, "C: BEGIN");
        let mut dbg_serializer = PackStreamSerializerDebugImpl::new();
        let mut message_buff = Vec::new();
        let mut serializer = PackStreamSerializerImpl::new(&mut message_buff);
        serializer.write_struct_header(0x11, 1)?;

        let emit_filter = filter_supported
            && notification_filter.map(|f| !f.is_default()).unwrap_or(false);
        let extra_size = [
            bookmarks.map(|b| !b.is_empty()).unwrap_or(false),
            tx_timeout.is_some(),
            tx_metadata.map(|m| !m.is_empty()).unwrap_or(false),
            mode.map(|m| m != "w").unwrap_or(false),
            db.is_some(),
            imp_user.is_some(),
            emit_filter,
        ]
        .into_iter()
        .map(<bool as Into<u64>>::into)
        .sum();

        debug_buf!(log_buf, " {}", {
            dbg_serializer.write_dict_header(extra_size).unwrap();
            dbg_serializer.flush()
        });
        serializer.write_dict_header(extra_size)?;

        if let Some(bookmarks) = bookmarks {
            if !bookmarks.is_empty() {
                debug_buf!(log_buf, "{}", {
                    dbg_serializer.write_string("bookmarks").unwrap();
                    data.serialize_str_slice(&mut dbg_serializer, bookmarks)
                        .unwrap();
                    dbg_serializer.flush()
                });
                serializer.write_string("bookmarks")?;
                data.serialize_str_slice(&mut serializer, bookmarks)?;
            }
        }

        if let Some(tx_timeout) = tx_timeout {
            debug_buf!(log_buf, "{}", {
                dbg_serializer.write_string("tx_timeout").unwrap();
                dbg_serializer.write_int(tx_timeout).unwrap();
                dbg_serializer.flush()
            });
            serializer.write_string("tx_timeout")?;
            serializer.write_int(tx_timeout)?;
        }

        if let Some(tx_metadata) = tx_metadata {
            if !tx_metadata.is_empty() {
                debug_buf!(log_buf, "{}", {
                    dbg_serializer.write_string("tx_metadata").unwrap();
                    data.serialize_dict(&mut dbg_serializer, &self.translator, tx_metadata)
                        .unwrap();
                    dbg_serializer.flush()
                });
                serializer.write_string("tx_metadata")?;
                data.serialize_dict(&mut serializer, &self.translator, tx_metadata)?;
            }
        }

        if let Some(mode) = mode {
            if mode != "w" {
                debug_buf!(log_buf, "{}", {
                    dbg_serializer.write_string("mode").unwrap();
                    dbg_serializer.write_string(mode).unwrap();
                    dbg_serializer.flush()
                });
                serializer.write_string("mode")?;
                serializer.write_string(mode)?;
            }
        }

        if let Some(db) = db {
            debug_buf!(log_buf, "{}", {
                dbg_serializer.write_string("db").unwrap();
                dbg_serializer.write_string(db).unwrap();
                dbg_serializer.flush()
            });
            serializer.write_string("db")?;
            serializer.write_string(db)?;
        }

        if let Some(imp_user) = imp_user {
            debug_buf!(log_buf, "{}", {
                dbg_serializer.write_string("imp_user").unwrap();
                dbg_serializer.write_string(imp_user).unwrap();
                dbg_serializer.flush()
            });
            serializer.write_string("imp_user")?;
            serializer.write_string(imp_user)?;
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
        data.push_response(BoltResponse::new(ResponseMessage::Begin, callbacks));
        debug_buf_end!(data, log_buf);
        Ok(())
    }

    pub(in super::super) fn enqueue_hello_response<RW: Read + Write>(data: &mut BoltData<RW>) {
        let bolt_meta = Arc::clone(&data.meta);
        let bolt_server_agent = Arc::clone(&data.server_agent);
        data.push_response(BoltResponse::new(
            ResponseMessage::Hello,
            ResponseCallbacks::new().with_on_success(move |mut meta| {
                if let Some((key, value)) = meta.remove_entry(SERVER_AGENT_KEY) {
                    match value {
                        ValueReceive::String(value) => {
                            mem::swap(&mut *bolt_server_agent.borrow_mut(), &mut Arc::new(value));
                        }
                        _ => {
                            warn!("server sent unexpected {SERVER_AGENT_KEY} type {:?}", &value);
                            meta.insert(key, value);
                        }
                    }
                }
                mem::swap(&mut *bolt_meta.borrow_mut(), &mut meta);
                Ok(())
            }),
        ));
    }
}

impl<T: BoltStructTranslator> BoltProtocol for Bolt5x0<T> {
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

        let extra_size = 1
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

        self.write_auth_entries(
            log_buf.as_mut(),
            &mut serializer,
            &mut dbg_serializer,
            data,
            auth,
        )?;
        data.auth = Some(Arc::clone(auth));

        data.message_buff.push_back(vec![message_buff]);
        debug_buf_end!(data, log_buf);

        Self::enqueue_hello_response(data);
        Ok(())
    }

    #[inline]
    fn logon<RW: Read + Write>(
        &mut self,
        data: &mut BoltData<RW>,
        _parameters: LogonParameters,
        _callbacks: ResponseCallbacks,
    ) -> Result<()> {
        Err(unsupported_protocol_feature_error(
            "session authentication",
            data.protocol_version,
            ServerAwareBoltVersion::V5x1,
        ))
    }

    #[inline]
    fn logoff<RW: Read + Write>(
        &mut self,
        data: &mut BoltData<RW>,
        _parameters: LogoffParameters,
        _callbacks: ResponseCallbacks,
    ) -> Result<()> {
        Err(unsupported_protocol_feature_error(
            "session authentication",
            data.protocol_version,
            ServerAwareBoltVersion::V5x1,
        ))
    }

    #[inline]
    fn supports_reauth(&self) -> bool {
        false
    }

    fn goodbye<RW: Read + Write>(
        &mut self,
        data: &mut BoltData<RW>,
        _parameters: GoodbyeParameters,
    ) -> Result<()> {
        let mut message_buff = Vec::new();
        let mut serializer = PackStreamSerializerImpl::new(&mut message_buff);
        serializer.write_struct_header(0x02, 0)?;
        data.message_buff.push_back(vec![message_buff]);
        data.mark_closed();
        bolt_debug!(data, "C: GOODBYE");
        Ok(())
    }

    fn reset<RW: Read + Write>(
        &mut self,
        data: &mut BoltData<RW>,
        _parameters: ResetParameters,
    ) -> Result<()> {
        let mut message_buff = Vec::new();
        let mut serializer = PackStreamSerializerImpl::new(&mut message_buff);
        serializer.write_struct_header(0x0F, 0)?;
        data.message_buff.push_back(vec![message_buff]);
        data.push_response(BoltResponse::from_message(ResponseMessage::Reset));
        bolt_debug!(data, "C: RESET");
        Ok(())
    }

    #[inline]
    fn run<RW: Read + Write, KP: Borrow<str> + Debug, KM: Borrow<str> + Debug>(
        &mut self,
        data: &mut BoltData<RW>,
        parameters: RunParameters<KP, KM>,
        callbacks: ResponseCallbacks,
    ) -> Result<()> {
        self.run_with_filter_support(data, parameters, callbacks, false)
    }

    fn discard<RW: Read + Write>(
        &mut self,
        data: &mut BoltData<RW>,
        parameters: DiscardParameters,
        callbacks: ResponseCallbacks,
    ) -> Result<()> {
        self.pull_or_discard(
            data,
            parameters.n,
            parameters.qid,
            callbacks,
            "DISCARD",
            0x2F,
            ResponseMessage::Discard,
        )
    }

    fn pull<RW: Read + Write>(
        &mut self,
        data: &mut BoltData<RW>,
        parameters: PullParameters,
        callbacks: ResponseCallbacks,
    ) -> Result<()> {
        self.pull_or_discard(
            data,
            parameters.n,
            parameters.qid,
            callbacks,
            "PULL",
            0x3F,
            ResponseMessage::Pull,
        )
    }

    #[inline]
    fn begin<RW: Read + Write, K: Borrow<str> + Debug>(
        &mut self,
        data: &mut BoltData<RW>,
        parameters: BeginParameters<K>,
        callbacks: ResponseCallbacks,
    ) -> Result<()> {
        self.begin_with_filter_support(data, parameters, callbacks, false)
    }

    fn commit<RW: Read + Write>(
        &mut self,
        data: &mut BoltData<RW>,
        _parameters: CommitParameters,
        callbacks: ResponseCallbacks,
    ) -> Result<()> {
        let mut message_buff = Vec::new();
        let mut serializer = PackStreamSerializerImpl::new(&mut message_buff);
        serializer.write_struct_header(0x12, 0)?;

        data.message_buff.push_back(vec![message_buff]);
        data.push_response(BoltResponse::new(ResponseMessage::Commit, callbacks));
        bolt_debug!(data, "C: COMMIT");
        Ok(())
    }

    fn rollback<RW: Read + Write>(
        &mut self,
        data: &mut BoltData<RW>,
        _parameters: RollbackParameters,
    ) -> Result<()> {
        let mut message_buff = Vec::new();
        let mut serializer = PackStreamSerializerImpl::new(&mut message_buff);
        serializer.write_struct_header(0x13, 0)?;

        data.message_buff.push_back(vec![message_buff]);
        data.push_response(BoltResponse::from_message(ResponseMessage::Rollback));
        bolt_debug!(data, "C: ROLLBACK");
        Ok(())
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
        debug_buf_start!(log_buf);
        debug_buf!(log_buf, "C: ROUTE");
        let mut dbg_serializer = PackStreamSerializerDebugImpl::new();
        let mut message_buff = Vec::new();
        let mut serializer = PackStreamSerializerImpl::new(&mut message_buff);
        serializer.write_struct_header(0x66, 3)?;

        data.serialize_routing_context(&mut serializer, &self.translator, routing_context)?;
        debug_buf!(log_buf, " {}", {
            data.serialize_routing_context(&mut dbg_serializer, &self.translator, routing_context)
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

        let extra_size =
            <bool as Into<u64>>::into(db.is_some()) + <bool as Into<u64>>::into(imp_user.is_some());
        serializer.write_dict_header(extra_size)?;
        debug_buf!(log_buf, " {}", {
            dbg_serializer.write_dict_header(extra_size).unwrap();
            dbg_serializer.flush()
        });

        if let Some(db) = db {
            serializer.write_string("db")?;
            serializer.write_string(db)?;
            debug_buf!(log_buf, "{}", {
                dbg_serializer.write_string("db").unwrap();
                dbg_serializer.write_string(db).unwrap();
                dbg_serializer.flush()
            });
        }

        if let Some(imp_user) = imp_user {
            debug_buf!(log_buf, "{}", {
                dbg_serializer.write_string("imp_user").unwrap();
                dbg_serializer.write_string(imp_user).unwrap();
                dbg_serializer.flush()
            });
            serializer.write_string("imp_user")?;
            serializer.write_string(imp_user)?;
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
        _parameters: TelemetryParameters,
        _callbacks: ResponseCallbacks,
    ) -> Result<()> {
        Err(unsupported_protocol_feature_error(
            "telemetry",
            data.protocol_version,
            ServerAwareBoltVersion::V5x4,
        ))
    }

    fn load_value<R: Read>(
        &mut self,
        reader: &mut R,
        integer_policy: IntegerPolicy,
    ) -> Result<ValueReceive> {
        let mut deserializer = PackStreamDeserializerImpl::new(reader, integer_policy);
        deserializer.load(&self.translator).map_err(Into::into)
    }

    fn handle_response<RW: Read + Write>(
        &mut self,
        bolt_data: &mut BoltData<RW>,
        message: BoltMessage<ValueReceive>,
    ) -> Result<()> {
        handle_response_common(bolt_data, message, ServerError::from_meta)
    }
}

/// Shared SUCCESS/RECORD/FAILURE/IGNORED dispatch; the FAILURE metadata
/// parser differs between protocol generations (GQL errors from 5.7).
pub(crate) fn handle_response_common<RW: Read + Write>(
    bolt_data: &mut BoltData<RW>,
    message: BoltMessage<ValueReceive>,
    parse_failure: fn(crate::bolt::BoltMeta) -> ServerError,
) -> Result<()> {
    match message {
        BoltMessage {
            tag: 0x70,
            mut fields,
        } => {
            // SUCCESS
            assert_response_field_count("SUCCESS", &fields, 1)?;
            let mut meta = fields.pop().unwrap();
            bolt_debug!(bolt_data, "S: SUCCESS {}", meta.dbg_print());
            let Some(mut response) = bolt_data.pop_response() else {
                return Err(BoltError::protocol_error(
                    "received SUCCESS with no outstanding request",
                ));
            };
            bolt_data.bolt_state.success(
                response.message,
                &meta,
                bolt_data.local_port,
                bolt_data.meta.try_borrow().as_deref(),
            );
            if let Some(meta) = meta.as_map_mut() {
                rewrite_timing_meta(meta);
            }
            response.callbacks.on_success(meta)
        }
        BoltMessage { tag: 0x7E, fields } => {
            // IGNORED
            assert_response_field_count("IGNORED", &fields, 0)?;
            bolt_debug!(bolt_data, "S: IGNORED");
            let Some(mut response) = bolt_data.pop_response() else {
                return Err(BoltError::protocol_error(
                    "received IGNORED with no outstanding request",
                ));
            };
            response.callbacks.on_ignored()
        }
        BoltMessage {
            tag: 0x7F,
            mut fields,
        } => {
            // FAILURE
            assert_response_field_count("FAILURE", &fields, 1)?;
            let meta = fields.pop().unwrap();
            bolt_debug!(bolt_data, "S: FAILURE {}", meta.dbg_print());
            let meta = meta
                .try_into_map()
                .map_err(|_| BoltError::protocol_error("FAILURE meta was not a Dictionary"))?;
            let error = parse_failure(meta);
            let Some(mut response) = bolt_data.pop_response() else {
                return Err(BoltError::protocol_error(
                    "received FAILURE with no outstanding request",
                ));
            };
            bolt_data.bolt_state.failure();
            response.callbacks.on_failure(error.into())
        }
        BoltMessage {
            tag: 0x71,
            mut fields,
        } => {
            // RECORD
            assert_response_field_count("RECORD", &fields, 1)?;
            let record = fields.pop().unwrap();
            bolt_debug!(bolt_data, "S: RECORD [...]");
            if let Some(reason) = record.find_invalid_struct() {
                return Err(invalid_record_error(reason));
            }
            let Some(response) = bolt_data.responses.front_mut() else {
                return Err(BoltError::protocol_error(
                    "received RECORD with no outstanding request",
                ));
            };
            response.callbacks.on_record(record)
        }
        BoltMessage { tag, .. } => Err(BoltError::protocol_error(format!(
            "unknown response message tag {tag:02X?}"
        ))),
    }
}
