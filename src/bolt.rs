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

#[macro_use]
mod bolt_common;
mod bolt1x0;
mod bolt3x0;
mod bolt4x0;
mod bolt4x3;
mod bolt4x4;
mod bolt5x0;
mod bolt5x1;
mod bolt5x2;
mod bolt5x3;
mod bolt5x4;
mod bolt5x7;
mod bolt_state;
mod chunk;
mod handshake;
mod message;
pub(crate) mod message_parameters;
pub(crate) mod packstream;
mod response;

use std::borrow::Borrow;
use std::collections::{HashMap, VecDeque};
use std::fmt::{Debug, Formatter};
use std::io::{self, Read, Write};
use std::ops::Deref;
use std::result;
use std::sync::Arc;
use std::time::{Duration, Instant};

use atomic_refcell::AtomicRefCell;
use enum_dispatch::enum_dispatch;
use usize_cast::FromUsize;

use crate::address::Address;
use crate::config::AuthToken;
use crate::error::{BoltError, Result};
use crate::value::{ValueReceive, ValueSend};
use bolt1x0::{Bolt1x0, Bolt1x0StructTranslator};
use bolt3x0::Bolt3x0;
use bolt4x0::Bolt4x0;
use bolt4x3::Bolt4x3;
use bolt4x4::{Bolt4x4, Bolt4x4StructTranslator};
use bolt5x0::Bolt5x0;
pub(crate) use bolt5x0::Bolt5x0StructTranslator;
use bolt5x1::Bolt5x1;
use bolt5x2::Bolt5x2;
use bolt5x3::Bolt5x3;
use bolt5x4::Bolt5x4;
use bolt5x7::Bolt5x7;
use bolt_common::ServerAwareBoltVersion;
use bolt_state::{BoltState, BoltStateTracker};
use chunk::{Chunker, Dechunker};
pub(crate) use handshake::DEFAULT_VERSION_OFFER;
pub use handshake::VersionOffer;
use message::BoltMessage;
use message_parameters::{
    BeginParameters, CommitParameters, DiscardParameters, GoodbyeParameters, HelloParameters,
    LogoffParameters, LogonParameters, PullParameters, ResetParameters, RollbackParameters,
    RouteParameters, RunParameters, TelemetryParameters,
};
use packstream::{IntegerPolicy, PackStreamSerializer};
pub(crate) use response::{
    BoltMeta, BoltRecordFields, BoltResponse, ResponseCallbacks, ResponseMessage,
};

macro_rules! debug_buf_start {
    ($name:ident) => {
        let mut $name = None;
        {
            #![allow(unused_imports)]
            use log::{log_enabled, Level};

            if log_enabled!(Level::Debug) {
                $name = Some(String::new());
            }
        }
    };
}
pub(crate) use debug_buf_start;

macro_rules! debug_buf {
    ($name:ident, $($args:tt)+) => {{
        #![allow(unused_imports)]
        use log::{log_enabled, Level};

        if log_enabled!(Level::Debug) {
            $name.as_mut().unwrap().push_str(&format!($($args)*))
        };
    }}
}
pub(crate) use debug_buf;

macro_rules! bolt_debug_extra {
    ($meta:expr, $local_port:expr) => {
        'a: {
            {
                #![allow(unused_imports)]
                use crate::bolt::dbg_extra;
                use crate::value::ValueReceive;

                let meta = $meta;
                let Ok(meta) = meta else {
                    break 'a dbg_extra($local_port, Some("!!!!"));
                };
                let Some(ValueReceive::String(id)) = meta.get("connection_id") else {
                    break 'a dbg_extra($local_port, None);
                };
                dbg_extra($local_port, Some(id))
            }
        }
    };
}
pub(crate) use bolt_debug_extra;

macro_rules! debug_buf_end {
    ($bolt:expr, $name:ident) => {{
        #![allow(unused_imports)]
        use log::debug;

        use crate::bolt::bolt_debug_extra;

        debug!(
            "{}{}",
            bolt_debug_extra!($bolt.meta.try_borrow(), $bolt.local_port),
            $name.as_ref().map(|s| s.as_str()).unwrap_or("")
        );
    }};
}
pub(crate) use debug_buf_end;

macro_rules! bolt_debug {
    ($bolt:expr, $($args:tt)+) => {{
        #![allow(unused_imports)]
        use log::debug;

        use crate::bolt::bolt_debug_extra;

        debug!(
            "{}{}",
            bolt_debug_extra!($bolt.meta.try_borrow(), $bolt.local_port),
            format!($($args)*)
        );
    }};
}
pub(crate) use bolt_debug;

pub(crate) fn dbg_extra(port: Option<u16>, bolt_id: Option<&str>) -> String {
    format!(
        "[#{:04X} {:<10}] ",
        port.unwrap_or(0),
        bolt_id.unwrap_or("")
    )
}

/// The byte-in/byte-out collaborator carrying Bolt traffic.
///
/// The crate makes no assumption about the underlying transport beyond
/// in-order delivery and error propagation through [`std::io`].
pub trait Channel: Read + Write + Debug + Send {}

impl<T: Read + Write + Debug + Send> Channel for T {}

pub type DynChannel = Box<dyn Channel>;
pub(crate) type DynBolt = Bolt<DynChannel>;

/// Perform the version handshake on a fresh channel and wire up the
/// negotiated protocol.
pub(crate) fn open<RW: Read + Write>(
    mut stream: RW,
    address: Arc<Address>,
    local_port: Option<u16>,
    offers: &[VersionOffer; 4],
    integer_policy: IntegerPolicy,
) -> Result<Bolt<RW>> {
    let version = handshake::handshake(&mut stream, offers)?;
    Ok(Bolt::new(
        version,
        stream,
        local_port,
        address,
        integer_policy,
    ))
}

#[derive(Debug)]
pub struct Bolt<RW: Read + Write> {
    data: BoltData<RW>,
    protocol: BoltProtocolVersion,
}

impl<RW: Read + Write> Bolt<RW> {
    pub(crate) fn new(
        version: (u8, u8),
        stream: RW,
        local_port: Option<u16>,
        address: Arc<Address>,
        integer_policy: IntegerPolicy,
    ) -> Self {
        let protocol_version = ServerAwareBoltVersion::from_negotiated(version);
        // [bolt-version-bump] search tag when changing bolt version support
        let protocol: BoltProtocolVersion = match version {
            (5, 7) => Bolt5x7::<Bolt5x0StructTranslator>::default().into(),
            (5, 4) | (5, 5) | (5, 6) => Bolt5x4::<Bolt5x0StructTranslator>::default().into(),
            (5, 3) => Bolt5x3::<Bolt5x0StructTranslator>::default().into(),
            (5, 2) => Bolt5x2::<Bolt5x0StructTranslator>::default().into(),
            (5, 1) => Bolt5x1::<Bolt5x0StructTranslator>::default().into(),
            (5, 0) => Bolt5x0::<Bolt5x0StructTranslator>::default().into(),
            (4, 4) => Bolt4x4::<Bolt4x4StructTranslator>::default().into(),
            (4, 3) => Bolt4x3::<Bolt4x4StructTranslator>::default().into(),
            (4, 0) | (4, 1) | (4, 2) => Bolt4x0::<Bolt4x4StructTranslator>::new(version).into(),
            (3, 0) => Bolt3x0::<Bolt4x4StructTranslator>::default().into(),
            (2, 0) => Bolt1x0::<Bolt4x4StructTranslator>::default().into(),
            (1, 0) => Bolt1x0::<Bolt1x0StructTranslator>::default().into(),
            _ => panic!("implement protocol for version {version:?}"),
        };
        let data = BoltData::new(
            version,
            protocol_version,
            stream,
            local_port,
            address,
            integer_policy,
        );
        Self { data, protocol }
    }

    pub(crate) fn close(&mut self) {
        if self.data.closed() {
            return;
        }
        self.data.message_buff.clear();
        self.data.clear_responses();
        if self.goodbye().is_err() {
            return;
        }
        let _ = self.data.write_all();
        let _ = self.data.flush();
    }

    pub(crate) fn closed(&self) -> bool {
        self.data.closed()
    }

    pub(crate) fn protocol_version(&self) -> (u8, u8) {
        self.data.version
    }

    pub(crate) fn address(&self) -> Arc<Address> {
        Arc::clone(&self.data.address)
    }

    pub(crate) fn server_agent(&self) -> Arc<String> {
        Arc::clone(self.data.server_agent.deref().borrow().deref())
    }

    pub(crate) fn meta(&self) -> HashMap<String, ValueReceive> {
        self.data.meta.deref().borrow().clone()
    }

    /// Install a hook that fires whenever the number of queued observers
    /// changes (used for idle-connection accounting).
    pub(crate) fn set_responses_len_listener(
        &mut self,
        listener: Option<Box<dyn Fn(usize) + Send + Sync>>,
    ) {
        self.data.responses_len_listener = listener;
    }

    pub(crate) fn hello(&mut self, parameters: HelloParameters) -> Result<()> {
        if let Some(reason) = self.data.broken_reason() {
            return Err(BoltError::disconnect(reason));
        }
        self.protocol.hello(&mut self.data, parameters)
    }

    pub(crate) fn supports_reauth(&self) -> bool {
        self.protocol.supports_reauth()
    }

    pub(crate) fn logon(
        &mut self,
        parameters: LogonParameters,
        callbacks: ResponseCallbacks,
    ) -> Result<()> {
        let callbacks = match self.data.guard_broken(callbacks)? {
            None => return Ok(()),
            Some(callbacks) => callbacks,
        };
        self.protocol.logon(&mut self.data, parameters, callbacks)
    }

    pub(crate) fn logoff(&mut self, callbacks: ResponseCallbacks) -> Result<()> {
        let callbacks = match self.data.guard_broken(callbacks)? {
            None => return Ok(()),
            Some(callbacks) => callbacks,
        };
        self.protocol
            .logoff(&mut self.data, LogoffParameters::new(), callbacks)
    }

    pub(crate) fn goodbye(&mut self) -> Result<()> {
        self.protocol
            .goodbye(&mut self.data, GoodbyeParameters::new())
    }

    pub(crate) fn reset(&mut self) -> Result<()> {
        if let Some(reason) = self.data.broken_reason() {
            return Err(BoltError::disconnect(reason));
        }
        self.protocol.reset(&mut self.data, ResetParameters::new())
    }

    pub(crate) fn run<KP: Borrow<str> + Debug, KM: Borrow<str> + Debug>(
        &mut self,
        parameters: RunParameters<KP, KM>,
        callbacks: ResponseCallbacks,
    ) -> Result<()> {
        let callbacks = match self.data.guard_broken(callbacks)? {
            None => return Ok(()),
            Some(callbacks) => callbacks,
        };
        self.protocol.run(&mut self.data, parameters, callbacks)
    }

    pub(crate) fn discard(
        &mut self,
        parameters: DiscardParameters,
        callbacks: ResponseCallbacks,
    ) -> Result<()> {
        let callbacks = match self.data.guard_broken(callbacks)? {
            None => return Ok(()),
            Some(callbacks) => callbacks,
        };
        self.protocol.discard(&mut self.data, parameters, callbacks)
    }

    pub(crate) fn pull(
        &mut self,
        parameters: PullParameters,
        callbacks: ResponseCallbacks,
    ) -> Result<()> {
        let callbacks = match self.data.guard_broken(callbacks)? {
            None => return Ok(()),
            Some(callbacks) => callbacks,
        };
        self.protocol.pull(&mut self.data, parameters, callbacks)
    }

    pub(crate) fn begin<K: Borrow<str> + Debug>(
        &mut self,
        parameters: BeginParameters<K>,
        callbacks: ResponseCallbacks,
    ) -> Result<()> {
        let callbacks = match self.data.guard_broken(callbacks)? {
            None => return Ok(()),
            Some(callbacks) => callbacks,
        };
        self.protocol.begin(&mut self.data, parameters, callbacks)
    }

    pub(crate) fn commit(&mut self, callbacks: ResponseCallbacks) -> Result<()> {
        let callbacks = match self.data.guard_broken(callbacks)? {
            None => return Ok(()),
            Some(callbacks) => callbacks,
        };
        self.protocol
            .commit(&mut self.data, CommitParameters::new(), callbacks)
    }

    pub(crate) fn rollback(&mut self) -> Result<()> {
        if let Some(reason) = self.data.broken_reason() {
            return Err(BoltError::disconnect(reason));
        }
        self.protocol
            .rollback(&mut self.data, RollbackParameters::new())
    }

    pub(crate) fn route(
        &mut self,
        parameters: RouteParameters,
        callbacks: ResponseCallbacks,
    ) -> Result<()> {
        let callbacks = match self.data.guard_broken(callbacks)? {
            None => return Ok(()),
            Some(callbacks) => callbacks,
        };
        self.protocol.route(&mut self.data, parameters, callbacks)
    }

    pub(crate) fn telemetry(
        &mut self,
        parameters: TelemetryParameters,
        callbacks: ResponseCallbacks,
    ) -> Result<()> {
        let callbacks = match self.data.guard_broken(callbacks)? {
            None => return Ok(()),
            Some(callbacks) => callbacks,
        };
        self.protocol
            .telemetry(&mut self.data, parameters, callbacks)
    }

    pub(crate) fn read_all(&mut self) -> Result<()> {
        while self.expects_reply() {
            self.read_one()?;
        }
        Ok(())
    }

    pub(crate) fn read_one(&mut self) -> Result<()> {
        let mut dechunker = Dechunker::new(&mut self.data.stream);
        let integer_policy = self.data.integer_policy;
        let message_result: Result<BoltMessage<ValueReceive>> =
            BoltMessage::load(&mut dechunker, |r| {
                self.protocol.load_value(r, integer_policy)
            })
            .and_then(|message| {
                BoltError::wrap_read(dechunker.finish_message())?;
                Ok(message)
            });
        let message = match message_result {
            Ok(message) => message,
            Err(err) => {
                // malformed framing is the server violating the protocol, not
                // a transport failure
                let err = match err {
                    BoltError::Disconnect {
                        source: Some(io_err),
                        ..
                    } if io_err.kind() == io::ErrorKind::InvalidData => {
                        BoltError::protocol_error(format!("{io_err}"))
                    }
                    err => err,
                };
                self.data.mark_broken(format!("read failed: {err}"));
                return Err(err);
            }
        };
        self.data.idle_since = Instant::now();
        match self.protocol.handle_response(&mut self.data, message) {
            Err(err) if matches!(err, BoltError::ProtocolError { .. }) => {
                self.data.mark_broken(format!("{err}"));
                Err(err)
            }
            res => res,
        }
    }

    pub(crate) fn write_all(&mut self) -> Result<()> {
        self.data.idle_since = Instant::now();
        self.data.write_all()?;
        self.data.flush()
    }

    pub(crate) fn has_buffered_message(&self) -> bool {
        self.data.has_buffered_message()
    }

    pub(crate) fn expects_reply(&self) -> bool {
        self.data.expects_reply()
    }

    pub(crate) fn expected_reply_len(&self) -> usize {
        self.data.expected_reply_len()
    }

    pub(crate) fn needs_reset(&self) -> bool {
        self.data.needs_reset()
    }

    pub(crate) fn is_older_than(&self, duration: Duration) -> bool {
        self.data.is_older_than(duration)
    }

    pub(crate) fn is_idle_for(&self, timeout: Duration) -> bool {
        self.data.is_idle_for(timeout)
    }

    #[inline(always)]
    pub(crate) fn debug_log(&self, msg: impl FnOnce() -> String) {
        bolt_debug!(self.data, "{}", msg());
    }
}

impl<RW: Read + Write> Drop for Bolt<RW> {
    fn drop(&mut self) {
        self.close();
    }
}

#[enum_dispatch]
pub(crate) trait BoltProtocol: Debug {
    fn hello<RW: Read + Write>(
        &mut self,
        data: &mut BoltData<RW>,
        parameters: HelloParameters,
    ) -> Result<()>;
    fn logon<RW: Read + Write>(
        &mut self,
        data: &mut BoltData<RW>,
        parameters: LogonParameters,
        callbacks: ResponseCallbacks,
    ) -> Result<()>;
    fn logoff<RW: Read + Write>(
        &mut self,
        data: &mut BoltData<RW>,
        parameters: LogoffParameters,
        callbacks: ResponseCallbacks,
    ) -> Result<()>;
    fn supports_reauth(&self) -> bool;
    fn goodbye<RW: Read + Write>(
        &mut self,
        data: &mut BoltData<RW>,
        parameters: GoodbyeParameters,
    ) -> Result<()>;
    fn reset<RW: Read + Write>(
        &mut self,
        data: &mut BoltData<RW>,
        parameters: ResetParameters,
    ) -> Result<()>;
    fn run<RW: Read + Write, KP: Borrow<str> + Debug, KM: Borrow<str> + Debug>(
        &mut self,
        data: &mut BoltData<RW>,
        parameters: RunParameters<KP, KM>,
        callbacks: ResponseCallbacks,
    ) -> Result<()>;
    fn discard<RW: Read + Write>(
        &mut self,
        data: &mut BoltData<RW>,
        parameters: DiscardParameters,
        callbacks: ResponseCallbacks,
    ) -> Result<()>;
    fn pull<RW: Read + Write>(
        &mut self,
        data: &mut BoltData<RW>,
        parameters: PullParameters,
        callbacks: ResponseCallbacks,
    ) -> Result<()>;
    fn begin<RW: Read + Write, K: Borrow<str> + Debug>(
        &mut self,
        data: &mut BoltData<RW>,
        parameters: BeginParameters<K>,
        callbacks: ResponseCallbacks,
    ) -> Result<()>;
    fn commit<RW: Read + Write>(
        &mut self,
        data: &mut BoltData<RW>,
        parameters: CommitParameters,
        callbacks: ResponseCallbacks,
    ) -> Result<()>;
    fn rollback<RW: Read + Write>(
        &mut self,
        data: &mut BoltData<RW>,
        parameters: RollbackParameters,
    ) -> Result<()>;
    fn route<RW: Read + Write>(
        &mut self,
        data: &mut BoltData<RW>,
        parameters: RouteParameters,
        callbacks: ResponseCallbacks,
    ) -> Result<()>;
    fn telemetry<RW: Read + Write>(
        &mut self,
        data: &mut BoltData<RW>,
        parameters: TelemetryParameters,
        callbacks: ResponseCallbacks,
    ) -> Result<()>;
    fn load_value<R: Read>(
        &mut self,
        reader: &mut R,
        integer_policy: IntegerPolicy,
    ) -> Result<ValueReceive>;
    fn handle_response<RW: Read + Write>(
        &mut self,
        data: &mut BoltData<RW>,
        message: BoltMessage<ValueReceive>,
    ) -> Result<()>;
}

// [bolt-version-bump] search tag when changing bolt version support
#[enum_dispatch(BoltProtocol)]
#[derive(Debug)]
enum BoltProtocolVersion {
    V1x0(Bolt1x0<Bolt1x0StructTranslator>),
    V2x0(Bolt1x0<Bolt4x4StructTranslator>),
    V3x0(Bolt3x0<Bolt4x4StructTranslator>),
    V4x0(Bolt4x0<Bolt4x4StructTranslator>),
    V4x3(Bolt4x3<Bolt4x4StructTranslator>),
    V4x4(Bolt4x4<Bolt4x4StructTranslator>),
    V5x0(Bolt5x0<Bolt5x0StructTranslator>),
    V5x1(Bolt5x1<Bolt5x0StructTranslator>),
    V5x2(Bolt5x2<Bolt5x0StructTranslator>),
    V5x3(Bolt5x3<Bolt5x0StructTranslator>),
    V5x4(Bolt5x4<Bolt5x0StructTranslator>),
    V5x7(Bolt5x7<Bolt5x0StructTranslator>),
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum ConnectionState {
    Healthy,
    Broken,
    Closed,
}

pub(crate) struct BoltData<RW: Read + Write> {
    message_buff: VecDeque<Vec<Vec<u8>>>,
    responses: VecDeque<BoltResponse>,
    stream: RW,
    local_port: Option<u16>,
    version: (u8, u8),
    protocol_version: ServerAwareBoltVersion,
    connection_state: ConnectionState,
    broken_reason: Option<String>,
    bolt_state: BoltStateTracker,
    meta: Arc<AtomicRefCell<HashMap<String, ValueReceive>>>,
    server_agent: Arc<AtomicRefCell<Arc<String>>>,
    address: Arc<Address>,
    last_qid: Arc<AtomicRefCell<Option<i64>>>,
    auth: Option<Arc<AuthToken>>,
    integer_policy: IntegerPolicy,
    responses_len_listener: Option<Box<dyn Fn(usize) + Send + Sync>>,
    created_at: Instant,
    idle_since: Instant,
}

impl<RW: Read + Write> BoltData<RW> {
    fn new(
        version: (u8, u8),
        protocol_version: ServerAwareBoltVersion,
        stream: RW,
        local_port: Option<u16>,
        address: Arc<Address>,
        integer_policy: IntegerPolicy,
    ) -> Self {
        let now = Instant::now();
        Self {
            message_buff: VecDeque::with_capacity(2048),
            responses: VecDeque::with_capacity(10),
            stream,
            local_port,
            version,
            protocol_version,
            connection_state: ConnectionState::Healthy,
            broken_reason: None,
            bolt_state: BoltStateTracker::new(),
            meta: Default::default(),
            server_agent: Default::default(),
            address,
            last_qid: Default::default(),
            auth: None,
            integer_policy,
            responses_len_listener: None,
            created_at: now,
            idle_since: now,
        }
    }

    fn closed(&self) -> bool {
        !matches!(self.connection_state, ConnectionState::Healthy)
    }

    fn broken_reason(&self) -> Option<String> {
        match self.connection_state {
            ConnectionState::Broken => Some(
                self.broken_reason
                    .clone()
                    .unwrap_or_else(|| String::from("connection is broken")),
            ),
            ConnectionState::Closed => Some(String::from("connection has been closed")),
            ConnectionState::Healthy => None,
        }
    }

    /// Broken connections don't touch the channel: the stored fatal error is
    /// delivered to the observer synchronously instead. Returns the callbacks
    /// untouched on a healthy connection.
    fn guard_broken(
        &mut self,
        mut callbacks: ResponseCallbacks,
    ) -> Result<Option<ResponseCallbacks>> {
        match self.broken_reason() {
            None => Ok(Some(callbacks)),
            Some(reason) => {
                callbacks.on_failure(BoltError::disconnect(reason))?;
                Ok(None)
            }
        }
    }

    /// A protocol or transport error poisons the connection: all queued
    /// observers receive the error, later requests fail synchronously.
    fn mark_broken(&mut self, reason: String) {
        if self.connection_state == ConnectionState::Healthy {
            self.connection_state = ConnectionState::Broken;
        }
        self.broken_reason = Some(reason.clone());
        let mut responses = std::mem::take(&mut self.responses);
        self.notify_responses_len();
        for response in responses.iter_mut() {
            let _ = response
                .callbacks
                .on_failure(BoltError::disconnect(reason.clone()));
        }
    }

    fn mark_closed(&mut self) {
        self.connection_state = ConnectionState::Closed;
    }

    fn can_omit_qid(&self, qid: i64) -> bool {
        qid == -1 || Some(qid) == *(self.last_qid.deref().borrow())
    }

    pub(crate) fn push_response(&mut self, response: BoltResponse) {
        self.responses.push_back(response);
        self.notify_responses_len();
    }

    fn pop_response(&mut self) -> Option<BoltResponse> {
        let response = self.responses.pop_front();
        if response.is_some() {
            self.notify_responses_len();
        }
        response
    }

    fn clear_responses(&mut self) {
        if !self.responses.is_empty() {
            self.responses.clear();
            self.notify_responses_len();
        }
    }

    fn notify_responses_len(&self) {
        if let Some(listener) = &self.responses_len_listener {
            listener(self.responses.len());
        }
    }

    fn serialize_dict<S: PackStreamSerializer>(
        &self,
        serializer: &mut S,
        translator: &impl BoltStructTranslator,
        map: &HashMap<impl Borrow<str>, ValueSend>,
    ) -> result::Result<(), S::Error> {
        serializer.write_dict_header(u64::from_usize(map.len()))?;
        for (k, v) in map {
            serializer.write_string(k.borrow())?;
            self.serialize_value(serializer, translator, v)?;
        }
        Ok(())
    }

    fn serialize_routing_context<S: PackStreamSerializer>(
        &self,
        serializer: &mut S,
        translator: &impl BoltStructTranslator,
        routing_context: &HashMap<String, ValueSend>,
    ) -> result::Result<(), S::Error> {
        self.serialize_dict(serializer, translator, routing_context)
    }

    fn serialize_str_slice<S: PackStreamSerializer>(
        &self,
        serializer: &mut S,
        slice: &[impl Borrow<str>],
    ) -> result::Result<(), S::Error> {
        serializer.write_list_header(u64::from_usize(slice.len()))?;
        for v in slice {
            serializer.write_string(v.borrow())?;
        }
        Ok(())
    }

    #[inline]
    fn serialize_value<S: PackStreamSerializer>(
        &self,
        serializer: &mut S,
        translator: &impl BoltStructTranslator,
        v: &ValueSend,
    ) -> result::Result<(), S::Error> {
        translator.serialize(serializer, v)
    }

    fn write_all(&mut self) -> Result<()> {
        while self.has_buffered_message() {
            self.write_one()?
        }
        Ok(())
    }

    fn write_one(&mut self) -> Result<()> {
        if let Some(message_buff) = self.message_buff.pop_front() {
            let chunker = Chunker::new(&message_buff);
            for chunk in chunker {
                let res = BoltError::wrap_write(self.stream.write_all(&chunk));
                if let Err(err) = res {
                    self.mark_broken(format!("write failed: {err}"));
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        let res = BoltError::wrap_write(self.stream.flush());
        if let Err(err) = res {
            self.mark_broken(format!("write failed: {err}"));
            return Err(err);
        }
        Ok(())
    }

    fn has_buffered_message(&self) -> bool {
        !self.message_buff.is_empty()
    }

    fn expects_reply(&self) -> bool {
        !self.responses.is_empty()
    }

    fn expected_reply_len(&self) -> usize {
        self.responses.len()
    }

    fn needs_reset(&self) -> bool {
        if let Some(response) = self.responses.iter().last() {
            if response.message == ResponseMessage::Reset {
                return false;
            }
        }
        if self.connection_state != ConnectionState::Healthy {
            return false;
        }
        !(self.bolt_state.state() == BoltState::Ready && self.responses.is_empty())
    }

    fn is_older_than(&self, duration: Duration) -> bool {
        self.created_at.elapsed() >= duration
    }

    fn is_idle_for(&self, timeout: Duration) -> bool {
        self.idle_since.elapsed() >= timeout
    }
}

impl<RW: Read + Write> Debug for BoltData<RW> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoltData")
            .field("version", &self.version)
            .field("connection_state", &self.connection_state)
            .field("message_buff", &self.message_buff)
            .field("responses", &self.responses)
            .finish()
    }
}

pub(crate) trait BoltStructTranslator: Debug + Default {
    fn serialize<S: PackStreamSerializer>(
        &self,
        serializer: &mut S,
        value: &ValueSend,
    ) -> result::Result<(), S::Error>;

    fn deserialize_struct(&self, tag: u8, fields: Vec<ValueReceive>) -> ValueReceive;
}

impl<T: BoltStructTranslator> BoltStructTranslator for Arc<AtomicRefCell<T>> {
    fn serialize<S: PackStreamSerializer>(
        &self,
        serializer: &mut S,
        value: &ValueSend,
    ) -> result::Result<(), S::Error> {
        AtomicRefCell::borrow(self).serialize(serializer, value)
    }

    fn deserialize_struct(&self, tag: u8, fields: Vec<ValueReceive>) -> ValueReceive {
        AtomicRefCell::borrow(self).deserialize_struct(tag, fields)
    }
}

pub(crate) trait BoltStructTranslatorWithUtcPatch: BoltStructTranslator {
    fn enable_utc_patch(&mut self);
}

fn assert_response_field_count<T>(name: &str, fields: &[T], expected_count: usize) -> Result<()> {
    if fields.len() == expected_count {
        Ok(())
    } else {
        Err(BoltError::protocol_error(format!(
            "{} response should have {} field(s) but found {:?}",
            name,
            expected_count,
            fields.len()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::message_parameters::*;
    use super::*;

    use parking_lot::Mutex;

    use crate::config::{AuthToken, NotificationFilter};
    use crate::error::ServerError;
    use crate::testing::{
        failure, handshake_response, hello_success, record, success, MockChannel,
    };
    use crate::value_map;
    use crate::value::{BrokenValue, BrokenValueInner, ValueSend};

    fn auth() -> Arc<AuthToken> {
        Arc::new(AuthToken::new_basic_auth("neo4j", "pass"))
    }

    fn address() -> Arc<Address> {
        Arc::new(Address::from("localhost:7687"))
    }

    fn new_bolt(version: (u8, u8)) -> (Bolt<MockChannel>, MockChannel) {
        let channel = MockChannel::new();
        let bolt = Bolt::new(
            version,
            channel.clone(),
            None,
            address(),
            IntegerPolicy::default(),
        );
        (bolt, channel)
    }

    fn hello_parameters(auth: &Arc<AuthToken>) -> HelloParameters {
        HelloParameters::new("test-agent", auth, None, None)
    }

    /// Run HELLO and consume its scripted SUCCESS so the connection is Ready.
    fn ready_bolt(version: (u8, u8)) -> (Bolt<MockChannel>, MockChannel) {
        let (mut bolt, channel) = new_bolt(version);
        let auth = auth();
        bolt.hello(hello_parameters(&auth)).unwrap();
        bolt.write_all().unwrap();
        channel.push_response(hello_success());
        bolt.read_all().unwrap();
        channel.clear_written();
        (bolt, channel)
    }

    #[derive(Debug, Default)]
    struct EventLog(Arc<Mutex<Vec<String>>>);

    impl EventLog {
        fn new() -> Self {
            Default::default()
        }

        fn callbacks(&self) -> ResponseCallbacks {
            let on_success = Arc::clone(&self.0);
            let on_failure = Arc::clone(&self.0);
            let on_record = Arc::clone(&self.0);
            let on_ignored = Arc::clone(&self.0);
            ResponseCallbacks::new()
                .with_on_success(move |meta| {
                    let mut keys = meta.keys().cloned().collect::<Vec<_>>();
                    keys.sort();
                    on_success.lock().push(format!("success({})", keys.join(",")));
                    Ok(())
                })
                .with_on_failure(move |error| {
                    on_failure.lock().push(format!("failure({error})"));
                    Ok(())
                })
                .with_on_record(move |values| {
                    on_record.lock().push(format!("record({values:?})"));
                    Ok(())
                })
                .with_on_ignored(move || {
                    on_ignored.lock().push(String::from("ignored"));
                    Ok(())
                })
        }

        fn events(&self) -> Vec<String> {
            self.0.lock().clone()
        }
    }

    #[test]
    fn test_open_writes_preamble_and_negotiates() {
        let channel = MockChannel::new();
        channel.push_response(handshake_response((4, 4)));
        let bolt = open(
            channel.clone(),
            address(),
            None,
            &DEFAULT_VERSION_OFFER,
            IntegerPolicy::default(),
        )
        .unwrap();
        assert_eq!(bolt.protocol_version(), (4, 4));
        assert_eq!(&channel.written()[..4], &[0x60, 0x60, 0xB0, 0x17]);
        assert_eq!(channel.written().len(), 20);
    }

    #[test]
    fn test_hello_absorbs_server_agent() {
        let (mut bolt, channel) = new_bolt((5, 0));
        let auth = auth();
        bolt.hello(hello_parameters(&auth)).unwrap();
        bolt.write_all().unwrap();
        // HELLO is a one-field struct
        assert!(channel.written_contains(&[0xB1, 0x01]));
        channel.push_response(hello_success());
        bolt.read_all().unwrap();
        assert_eq!(*bolt.server_agent(), "Neo4j/5.0.0");
        assert_eq!(
            bolt.meta().get("connection_id"),
            Some(&ValueReceive::String(String::from("bolt-1")))
        );
    }

    #[test]
    fn test_run_pull_stream_events() {
        let (mut bolt, channel) = ready_bolt((4, 4));
        let events = EventLog::new();

        bolt.run(
            RunParameters::<String, String>::new_transaction_run("RETURN 1 AS n", None),
            events.callbacks(),
        )
        .unwrap();
        bolt.pull(PullParameters::new(1000, -1), events.callbacks())
            .unwrap();
        bolt.write_all().unwrap();
        // RUN with metadata is a three-field struct, PULL a one-field struct
        assert!(channel.written_contains(&[0xB3, 0x10]));
        assert!(channel.written_contains(&[0xB1, 0x3F]));

        channel.push_response(success(value_map!({"fields": vec!["n"], "t_first": 1})));
        channel.push_response(record(vec![ValueSend::Integer(1)]));
        channel.push_response(success(value_map!({"bookmark": "bm", "t_last": 1})));
        bolt.read_all().unwrap();

        assert_eq!(
            events.events(),
            vec![
                // t_first/t_last are rewritten to the stable names
                String::from("success(fields,result_available_after)"),
                String::from("record([Integer(1)])"),
                String::from("success(bookmark,result_consumed_after)"),
            ]
        );
    }

    #[test]
    fn test_observer_dequeue_order_matches_write_order() {
        let (mut bolt, channel) = ready_bolt((5, 4));
        let order: Arc<Mutex<Vec<i64>>> = Default::default();
        for api in 0..3 {
            let order = Arc::clone(&order);
            bolt.telemetry(
                TelemetryParameters::new(api),
                ResponseCallbacks::new().with_on_success(move |meta| {
                    let Some(ValueReceive::Integer(tag)) = meta.get("tag") else {
                        panic!("scripted meta carries an int tag");
                    };
                    order.lock().push(*tag);
                    Ok(())
                }),
            )
            .unwrap();
        }
        bolt.write_all().unwrap();
        for tag in 0..3 {
            channel.push_response(success(value_map!({"tag": tag})));
        }
        bolt.read_all().unwrap();
        assert_eq!(*order.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn test_begin_commit_v3() {
        let (mut bolt, channel) = ready_bolt((3, 0));
        let events = EventLog::new();
        let bookmarks = vec![String::from("b1"), String::from("b2")];
        let tx_metadata: HashMap<String, ValueSend> =
            [(String::from("x"), ValueSend::Integer(1))].into_iter().collect();

        bolt.begin(
            BeginParameters::new(
                Some(&bookmarks),
                Some(5000),
                Some(&tx_metadata),
                None,
                None,
                None,
                None,
            ),
            events.callbacks(),
        )
        .unwrap();
        bolt.write_all().unwrap();
        assert!(channel.written_contains(&[0xB1, 0x11]));
        channel.push_response(success(value_map!({})));
        bolt.read_all().unwrap();

        bolt.commit(events.callbacks()).unwrap();
        bolt.write_all().unwrap();
        assert!(channel.written_contains(&[0xB0, 0x12]));
        channel.push_response(success(value_map!({"bookmark": "bm"})));
        bolt.read_all().unwrap();

        assert_eq!(
            events.events(),
            vec![String::from("success()"), String::from("success(bookmark)")]
        );
    }

    #[test]
    fn test_pull_all_has_no_extra_map_on_v3() {
        let (mut bolt, channel) = ready_bolt((3, 0));
        let events = EventLog::new();
        bolt.run(
            RunParameters::<String, String>::new_transaction_run("RETURN 1", None),
            events.callbacks(),
        )
        .unwrap();
        bolt.pull(PullParameters::new(1000, -1), events.callbacks())
            .unwrap();
        bolt.write_all().unwrap();
        // PULL_ALL is a zero-field struct
        assert!(channel.written_contains(&[0xB0, 0x3F]));
    }

    #[test]
    fn test_init_on_v1_carries_user_agent_and_auth() {
        let (mut bolt, channel) = new_bolt((1, 0));
        let auth = auth();
        bolt.hello(hello_parameters(&auth)).unwrap();
        bolt.write_all().unwrap();
        // INIT is a two-field struct
        assert!(channel.written_contains(&[0xB2, 0x01]));
    }

    #[test]
    fn test_legacy_error_codes_are_rewritten() {
        let (mut bolt, channel) = ready_bolt((5, 0));
        let captured: Arc<Mutex<Option<Box<ServerError>>>> = Default::default();
        let callbacks = {
            let captured = Arc::clone(&captured);
            ResponseCallbacks::new().with_on_failure(move |error| {
                let BoltError::ServerError { error } = error else {
                    panic!("expected server error, got {error:?}");
                };
                *captured.lock() = Some(error);
                Ok(())
            })
        };
        bolt.run(
            RunParameters::<String, String>::new_transaction_run("RETURN 1", None),
            callbacks,
        )
        .unwrap();
        bolt.write_all().unwrap();
        channel.push_response(failure(value_map!({
            "code": "Neo.TransientError.Transaction.Terminated",
            "message": "boom",
        })));
        bolt.read_all().unwrap();
        let error = captured.lock().take().unwrap();
        assert_eq!(error.code(), "Neo.ClientError.Transaction.Terminated");
        assert_eq!(error.message(), "boom");
    }

    #[test]
    fn test_gql_failure_enrichment_on_5x7() {
        let (mut bolt, channel) = ready_bolt((5, 7));
        let captured: Arc<Mutex<Option<Box<ServerError>>>> = Default::default();
        let callbacks = {
            let captured = Arc::clone(&captured);
            ResponseCallbacks::new().with_on_failure(move |error| {
                let BoltError::ServerError { error } = error else {
                    panic!("expected server error, got {error:?}");
                };
                *captured.lock() = Some(error);
                Ok(())
            })
        };
        bolt.run(
            RunParameters::<String, String>::new_transaction_run("RETURN 1", None),
            callbacks,
        )
        .unwrap();
        bolt.write_all().unwrap();
        channel.push_response(failure(value_map!({
            "neo4j_code": "Neo.ClientError.Statement.SyntaxError",
            "gql_status": "42001",
            "message": "bad syntax",
            "description": "error: syntax error",
            "diagnostic_record": value_map!({}),
        })));
        bolt.read_all().unwrap();
        let error = captured.lock().take().unwrap();
        assert_eq!(error.code(), "Neo.ClientError.Statement.SyntaxError");
        assert_eq!(error.gql_status, "42001");
        assert_eq!(
            error.diagnostic_record.get("OPERATION_CODE"),
            Some(&ValueReceive::String(String::from("0")))
        );
    }

    #[test]
    fn test_record_for_single_response_observer_is_fatal() {
        let (mut bolt, channel) = ready_bolt((5, 0));
        bolt.reset().unwrap();
        bolt.write_all().unwrap();
        channel.push_response(record(vec![ValueSend::Integer(1)]));
        let err = bolt.read_one().unwrap_err();
        assert!(matches!(err, BoltError::ProtocolError { .. }));
        assert!(bolt.closed());
    }

    #[test]
    fn test_zero_length_message_is_protocol_error() {
        let (mut bolt, channel) = ready_bolt((5, 0));
        bolt.reset().unwrap();
        bolt.write_all().unwrap();
        channel.push_response([0x00, 0x00]);
        let err = bolt.read_one().unwrap_err();
        assert!(matches!(err, BoltError::ProtocolError { .. }));
    }

    #[test]
    fn test_broken_connection_fails_observers_without_channel_io() {
        let (mut bolt, channel) = ready_bolt((5, 0));
        bolt.reset().unwrap();
        bolt.write_all().unwrap();
        // no scripted response: the read fails and breaks the connection
        assert!(bolt.read_all().is_err());
        assert!(bolt.closed());

        channel.clear_written();
        let events = EventLog::new();
        bolt.run(
            RunParameters::<String, String>::new_transaction_run("RETURN 1", None),
            events.callbacks(),
        )
        .unwrap();
        assert_eq!(events.events().len(), 1);
        assert!(events.events()[0].starts_with("failure(connection failed"));
        assert!(channel.written().is_empty());
    }

    #[test]
    fn test_capability_gates_fail_before_any_bytes() {
        // tx configuration needs at least Bolt 3
        let (mut bolt, channel) = new_bolt((1, 0));
        let res = bolt.run(
            RunParameters::<String, String>::new_auto_commit_run(
                "q",
                None,
                None,
                Some(5000),
                None,
                None,
                None,
                None,
                None,
            ),
            ResponseCallbacks::new(),
        );
        assert!(matches!(res, Err(BoltError::InvalidConfig { .. })));
        assert!(channel.written().is_empty());

        // multi-database needs at least Bolt 4.0
        let (mut bolt, channel) = new_bolt((3, 0));
        let res = bolt.run(
            RunParameters::<String, String>::new_auto_commit_run(
                "q",
                None,
                None,
                None,
                None,
                None,
                Some("neo4j"),
                None,
                None,
            ),
            ResponseCallbacks::new(),
        );
        assert!(matches!(res, Err(BoltError::InvalidConfig { .. })));
        assert!(channel.written().is_empty());

        // impersonation needs at least Bolt 4.4
        let (mut bolt, channel) = new_bolt((4, 3));
        let res = bolt.begin(
            BeginParameters::<String>::new(None, None, None, None, None, Some("alice"), None),
            ResponseCallbacks::new(),
        );
        assert!(matches!(res, Err(BoltError::InvalidConfig { .. })));
        assert!(channel.written().is_empty());

        // notification filters need at least Bolt 5.2
        let (mut bolt, channel) = new_bolt((5, 0));
        let auth = auth();
        let filter = NotificationFilter::new().with_minimum_severity("WARNING");
        let res = bolt.hello(HelloParameters::new("ua", &auth, None, Some(&filter)));
        assert!(matches!(res, Err(BoltError::InvalidConfig { .. })));
        assert!(channel.written().is_empty());

        // telemetry needs at least Bolt 5.4
        let (mut bolt, channel) = new_bolt((5, 3));
        let res = bolt.telemetry(TelemetryParameters::new(0), ResponseCallbacks::new());
        assert!(matches!(res, Err(BoltError::InvalidConfig { .. })));
        assert!(channel.written().is_empty());

        // LOGON/LOGOFF need at least Bolt 5.1
        let (mut bolt, channel) = new_bolt((5, 0));
        let res = bolt.logon(LogonParameters::new(&auth), ResponseCallbacks::new());
        assert!(matches!(res, Err(BoltError::InvalidConfig { .. })));
        assert!(channel.written().is_empty());
    }

    #[test]
    fn test_logon_after_hello_on_5x1() {
        let (mut bolt, channel) = new_bolt((5, 1));
        let auth = auth();
        bolt.hello(hello_parameters(&auth)).unwrap();
        bolt.logon(LogonParameters::new(&auth), ResponseCallbacks::new())
            .unwrap();
        bolt.write_all().unwrap();
        // HELLO without credentials, LOGON carrying them
        assert!(channel.written_contains(&[0xB1, 0x01]));
        assert!(channel.written_contains(&[0xB1, 0x6A]));
        channel.push_response(hello_success());
        channel.push_response(success(value_map!({})));
        bolt.read_all().unwrap();
        assert!(bolt.supports_reauth());
    }

    const BERLIN_DST_UTC_SECONDS: i64 = 1_667_093_400; // 2022-10-30 01:30 UTC
    const BERLIN_DST_NANOSECONDS: i64 = 183_000_000;

    fn utc_date_time_struct_record() -> Vec<u8> {
        // RECORD [Structure[0x69; 3](utc seconds, nanoseconds, "Europe/Berlin")]
        let mut payload = vec![0xB1, 0x71, 0x91, 0xB3, 0x69, 0xCA];
        payload.extend((BERLIN_DST_UTC_SECONDS as i32).to_be_bytes());
        payload.push(0xCA);
        payload.extend((BERLIN_DST_NANOSECONDS as i32).to_be_bytes());
        payload.push(0x8D);
        payload.extend(b"Europe/Berlin");
        crate::testing::chunked(&payload)
    }

    fn berlin_date_time() -> crate::value::time::DateTime {
        use chrono::TimeZone;

        chrono_tz::Europe::Berlin
            .timestamp_opt(BERLIN_DST_UTC_SECONDS, BERLIN_DST_NANOSECONDS as u32)
            .unwrap()
    }

    fn run_and_capture_record(
        bolt: &mut Bolt<MockChannel>,
        channel: &MockChannel,
        response: Vec<u8>,
    ) -> ValueReceive {
        let captured: Arc<Mutex<Option<ValueReceive>>> = Default::default();
        let callbacks = {
            let captured = Arc::clone(&captured);
            ResponseCallbacks::new()
                .with_on_record(move |mut values| {
                    *captured.lock() = Some(values.pop().expect("one value per record"));
                    Ok(())
                })
                .with_on_failure(Err)
        };
        bolt.run(
            RunParameters::<String, String>::new_transaction_run("RETURN 1", None),
            ResponseCallbacks::new().with_on_failure(Err),
        )
        .unwrap();
        bolt.pull(PullParameters::new(-1, -1), callbacks).unwrap();
        bolt.write_all().unwrap();
        channel.push_response(success(value_map!({"fields": vec!["dt"]})));
        channel.push_response(response);
        channel.push_response(success(value_map!({})));
        bolt.read_all().unwrap();
        let captured = captured.lock().take().unwrap();
        captured
    }

    #[test]
    fn test_utc_date_time_decoding_with_negotiated_patch() {
        let (mut bolt, channel) = new_bolt((4, 4));
        let auth = auth();
        bolt.hello(hello_parameters(&auth)).unwrap();
        bolt.write_all().unwrap();
        channel.push_response(success(value_map!({
            "server": "Neo4j/4.4.0",
            "patch_bolt": vec!["utc"],
        })));
        bolt.read_all().unwrap();
        channel.clear_written();

        let value = run_and_capture_record(&mut bolt, &channel, utc_date_time_struct_record());
        assert_eq!(value, ValueReceive::DateTime(berlin_date_time()));
    }

    #[test]
    fn test_utc_date_time_stays_opaque_without_patch() {
        let (mut bolt, channel) = ready_bolt((4, 4));
        let value = run_and_capture_record(&mut bolt, &channel, utc_date_time_struct_record());
        assert!(matches!(
            value,
            ValueReceive::BrokenValue(BrokenValue {
                inner: BrokenValueInner::UnknownStruct { tag: 0x69, .. },
            })
        ));
    }

    #[test]
    fn test_utc_date_time_encoding_with_negotiated_patch() {
        let (mut bolt, channel) = new_bolt((4, 4));
        let auth = auth();
        bolt.hello(hello_parameters(&auth)).unwrap();
        bolt.write_all().unwrap();
        channel.push_response(success(value_map!({"patch_bolt": vec!["utc"]})));
        bolt.read_all().unwrap();
        channel.clear_written();

        let parameters: HashMap<String, ValueSend> = [(
            String::from("dt"),
            ValueSend::DateTime(berlin_date_time()),
        )]
        .into_iter()
        .collect();
        bolt.run(
            RunParameters::<String, String>::new_transaction_run("RETURN $dt", Some(&parameters)),
            ResponseCallbacks::new().with_on_failure(Err),
        )
        .unwrap();
        bolt.write_all().unwrap();
        // Structure[0x69; 3](1667093400, ...)
        let mut expected = vec![0xB3, 0x69, 0xCA];
        expected.extend((BERLIN_DST_UTC_SECONDS as i32).to_be_bytes());
        assert!(channel.written_contains(&expected));
    }

    #[test]
    fn test_legacy_date_time_encoding_without_patch() {
        let (mut bolt, channel) = ready_bolt((4, 4));
        let parameters: HashMap<String, ValueSend> = [(
            String::from("dt"),
            ValueSend::DateTime(berlin_date_time()),
        )]
        .into_iter()
        .collect();
        bolt.run(
            RunParameters::<String, String>::new_transaction_run("RETURN $dt", Some(&parameters)),
            ResponseCallbacks::new().with_on_failure(Err),
        )
        .unwrap();
        bolt.write_all().unwrap();
        // legacy tag 0x66 with epochSecond = utc + offset (+2h during CEST)
        let mut expected = vec![0xB3, 0x66, 0xCA];
        expected.extend(((BERLIN_DST_UTC_SECONDS + 2 * 3600) as i32).to_be_bytes());
        assert!(channel.written_contains(&expected));
    }

    #[test]
    fn test_responses_len_listener_sees_queue_changes() {
        let (mut bolt, channel) = ready_bolt((5, 0));
        let counts: Arc<Mutex<Vec<usize>>> = Default::default();
        {
            let counts = Arc::clone(&counts);
            bolt.set_responses_len_listener(Some(Box::new(move |len| {
                counts.lock().push(len);
            })));
        }
        bolt.reset().unwrap();
        bolt.write_all().unwrap();
        channel.push_response(success(value_map!({})));
        bolt.read_all().unwrap();
        assert_eq!(*counts.lock(), vec![1, 0]);
    }
}
