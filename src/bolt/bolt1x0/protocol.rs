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
use std::collections::HashMap;
use std::fmt::Debug;
use std::io::{Read, Write};
use std::sync::Arc;

use atomic_refcell::AtomicRefCell;
use usize_cast::FromUsize;

use super::super::bolt5x0::{handle_response_common, Bolt5x0};
use super::super::bolt_common::{
    check_no_notification_filter, route_via_procedure, unsupported_protocol_feature_error,
    ServerAwareBoltVersion,
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
    bolt_debug, debug_buf, debug_buf_end, debug_buf_start, BoltData, BoltProtocol, BoltResponse,
    BoltStructTranslator, ResponseCallbacks, ResponseMessage,
};
use crate::error::{Result, ServerError};
use crate::value::{ValueReceive, ValueSend};

const ROUTING_PROCEDURE_CALL: &str = "CALL dbms.cluster.routing.getRoutingTable($context)";

/// The first Bolt generation (also spoken as version 2, which only changed
/// the value coding rules): INIT instead of HELLO, two-field RUN, whole
/// streams via PULL_ALL/DISCARD_ALL, and no transaction messages —
/// transactions are driven through `RUN "BEGIN"`/`"COMMIT"`/`"ROLLBACK"`.
#[derive(Debug, Default)]
pub(crate) struct Bolt1x0<T: BoltStructTranslator> {
    translator: T,
}

impl<T: BoltStructTranslator> Bolt1x0<T> {
    fn check_tx_parameters(
        &self,
        data: &BoltData<impl Read + Write>,
        tx_timeout: Option<i64>,
        tx_metadata_empty: bool,
        db: Option<&str>,
        imp_user: Option<&str>,
    ) -> Result<()> {
        if tx_timeout.is_some() || !tx_metadata_empty {
            return Err(unsupported_protocol_feature_error(
                "transaction configuration",
                data.protocol_version,
                ServerAwareBoltVersion::V3x0,
            ));
        }
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

    fn write_run_message<RW: Read + Write>(
        &mut self,
        data: &mut BoltData<RW>,
        query: &str,
        parameters: Option<&HashMap<impl Borrow<str> + Debug, ValueSend>>,
        callbacks: ResponseCallbacks,
    ) -> Result<()> {
        debug_buf_start!(log_buf);
        debug_buf!(log_buf, "C: RUN");
        let mut dbg_serializer = PackStreamSerializerDebugImpl::new();
        let mut message_buff = Vec::new();
        let mut serializer = PackStreamSerializerImpl::new(&mut message_buff);
        serializer.write_struct_header(0x10, 2)?;

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

        data.message_buff.push_back(vec![message_buff]);
        data.push_response(BoltResponse::new(ResponseMessage::Run, callbacks));
        debug_buf_end!(data, log_buf);
        Ok(())
    }

    fn write_discard_all<RW: Read + Write>(
        &mut self,
        data: &mut BoltData<RW>,
        callbacks: ResponseCallbacks,
    ) -> Result<()> {
        let mut message_buff = Vec::new();
        let mut serializer = PackStreamSerializerImpl::new(&mut message_buff);
        serializer.write_struct_header(0x2F, 0)?;
        data.message_buff.push_back(vec![message_buff]);
        data.push_response(BoltResponse::new(ResponseMessage::Discard, callbacks));
        bolt_debug!(data, "C: DISCARD_ALL");
        Ok(())
    }

    /// Drive a transaction control statement (`BEGIN`, `COMMIT`, `ROLLBACK`)
    /// as a RUN + DISCARD_ALL pair; the caller's observer completes with the
    /// DISCARD_ALL response.
    fn run_tx_statement<RW: Read + Write>(
        &mut self,
        data: &mut BoltData<RW>,
        query: &str,
        parameters: Option<&HashMap<String, ValueSend>>,
        callbacks: ResponseCallbacks,
    ) -> Result<()> {
        let shared_callbacks = Arc::new(AtomicRefCell::new(Some(callbacks)));

        let run_callbacks = ResponseCallbacks::new().with_on_failure({
            let shared_callbacks = Arc::clone(&shared_callbacks);
            move |error| match shared_callbacks.borrow_mut().take() {
                Some(mut callbacks) => callbacks.on_failure(error),
                None => Err(error),
            }
        });
        self.write_run_message(data, query, parameters, run_callbacks)?;

        let discard_callbacks = ResponseCallbacks::new()
            .with_on_success({
                let shared_callbacks = Arc::clone(&shared_callbacks);
                move |meta| match shared_callbacks.borrow_mut().take() {
                    Some(mut callbacks) => callbacks.on_success(ValueReceive::Map(meta)),
                    None => Ok(()),
                }
            })
            .with_on_failure(move |error| match shared_callbacks.borrow_mut().take() {
                Some(mut callbacks) => callbacks.on_failure(error),
                None => Err(error),
            });
        self.write_discard_all(data, discard_callbacks)
    }
}

impl<T: BoltStructTranslator> BoltProtocol for Bolt1x0<T> {
    fn hello<RW: Read + Write>(
        &mut self,
        data: &mut BoltData<RW>,
        parameters: HelloParameters,
    ) -> Result<()> {
        let HelloParameters {
            user_agent,
            auth,
            routing_context: _,
            notification_filter,
        } = parameters;
        check_no_notification_filter(data.protocol_version, notification_filter)?;

        debug_buf_start!(log_buf);
        debug_buf!(log_buf, "C: INIT");
        let mut dbg_serializer = PackStreamSerializerDebugImpl::new();
        let mut message_buff = Vec::new();
        let mut serializer = PackStreamSerializerImpl::new(&mut message_buff);
        serializer.write_struct_header(0x01, 2)?;

        serializer.write_string(user_agent)?;
        debug_buf!(log_buf, " {}", {
            dbg_serializer.write_string(user_agent).unwrap();
            dbg_serializer.flush()
        });

        serializer.write_dict_header(u64::from_usize(auth.data.len()))?;
        debug_buf!(log_buf, " {}", {
            dbg_serializer
                .write_dict_header(u64::from_usize(auth.data.len()))
                .unwrap();
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
        data.auth = Some(Arc::clone(auth));

        data.message_buff.push_back(vec![message_buff]);
        debug_buf_end!(data, log_buf);

        Bolt5x0::<T>::enqueue_hello_response(data);
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
        // no GOODBYE message before Bolt 3; closing the channel is the farewell
        data.mark_closed();
        bolt_debug!(data, "C: <CLOSE>");
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

    fn run<RW: Read + Write, KP: Borrow<str> + Debug, KM: Borrow<str> + Debug>(
        &mut self,
        data: &mut BoltData<RW>,
        parameters: RunParameters<KP, KM>,
        callbacks: ResponseCallbacks,
    ) -> Result<()> {
        let RunParameters {
            query,
            parameters,
            bookmarks: _,
            tx_timeout,
            tx_metadata,
            mode: _,
            db,
            imp_user,
            notification_filter,
        } = parameters;
        check_no_notification_filter(data.protocol_version, notification_filter)?;
        self.check_tx_parameters(
            data,
            tx_timeout,
            tx_metadata.map(|m| m.is_empty()).unwrap_or(true),
            db,
            imp_user,
        )?;
        self.write_run_message(data, query, parameters, callbacks)
    }

    fn discard<RW: Read + Write>(
        &mut self,
        data: &mut BoltData<RW>,
        _parameters: DiscardParameters,
        callbacks: ResponseCallbacks,
    ) -> Result<()> {
        self.write_discard_all(data, callbacks)
    }

    fn pull<RW: Read + Write>(
        &mut self,
        data: &mut BoltData<RW>,
        _parameters: PullParameters,
        callbacks: ResponseCallbacks,
    ) -> Result<()> {
        let mut message_buff = Vec::new();
        let mut serializer = PackStreamSerializerImpl::new(&mut message_buff);
        serializer.write_struct_header(0x3F, 0)?;
        data.message_buff.push_back(vec![message_buff]);
        data.push_response(BoltResponse::new(ResponseMessage::Pull, callbacks));
        bolt_debug!(data, "C: PULL_ALL");
        Ok(())
    }

    fn begin<RW: Read + Write, K: Borrow<str> + Debug>(
        &mut self,
        data: &mut BoltData<RW>,
        parameters: BeginParameters<K>,
        callbacks: ResponseCallbacks,
    ) -> Result<()> {
        let BeginParameters {
            bookmarks,
            tx_timeout,
            tx_metadata,
            mode: _,
            db,
            imp_user,
            notification_filter,
        } = parameters;
        check_no_notification_filter(data.protocol_version, notification_filter)?;
        self.check_tx_parameters(
            data,
            tx_timeout,
            tx_metadata.map(|m| m.is_empty()).unwrap_or(true),
            db,
            imp_user,
        )?;

        let mut statement_parameters = HashMap::with_capacity(2);
        if let Some(bookmarks) = bookmarks {
            if !bookmarks.is_empty() {
                if let Some(last) = bookmarks.last() {
                    statement_parameters
                        .insert(String::from("bookmark"), ValueSend::from(last.as_str()));
                }
                statement_parameters.insert(
                    String::from("bookmarks"),
                    ValueSend::List(
                        bookmarks
                            .iter()
                            .map(|b| ValueSend::from(b.as_str()))
                            .collect(),
                    ),
                );
            }
        }
        let statement_parameters = match statement_parameters.is_empty() {
            true => None,
            false => Some(&statement_parameters),
        };
        self.run_tx_statement(data, "BEGIN", statement_parameters, callbacks)
    }

    fn commit<RW: Read + Write>(
        &mut self,
        data: &mut BoltData<RW>,
        _parameters: CommitParameters,
        callbacks: ResponseCallbacks,
    ) -> Result<()> {
        self.run_tx_statement(data, "COMMIT", None, callbacks)
    }

    fn rollback<RW: Read + Write>(
        &mut self,
        data: &mut BoltData<RW>,
        _parameters: RollbackParameters,
    ) -> Result<()> {
        let callbacks = ResponseCallbacks::new().with_on_failure(Err);
        self.run_tx_statement(data, "ROLLBACK", None, callbacks)
    }

    fn route<RW: Read + Write>(
        &mut self,
        data: &mut BoltData<RW>,
        parameters: RouteParameters,
        callbacks: ResponseCallbacks,
    ) -> Result<()> {
        self.check_tx_parameters(data, None, true, parameters.db, parameters.imp_user)?;
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
        data: &mut BoltData<RW>,
        message: BoltMessage<ValueReceive>,
    ) -> Result<()> {
        handle_response_common(data, message, ServerError::from_meta)
    }
}
