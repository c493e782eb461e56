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

//! Shared test plumbing: an in-memory channel fed from a byte script, plus
//! builders for server-side message bytes.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::address::Address;
use crate::bolt::packstream::{PackStreamSerializer, PackStreamSerializerImpl};
use crate::bolt::{BoltStructTranslator, DynChannel};
use crate::pool::Connector;
use crate::value::ValueSend;

/// A channel whose reads are served from a pre-recorded byte script and
/// whose writes are captured for inspection.
#[derive(Debug, Clone)]
pub(crate) struct MockChannel {
    written: Arc<Mutex<Vec<u8>>>,
    response: Arc<Mutex<VecDeque<u8>>>,
}

impl MockChannel {
    pub(crate) fn new() -> Self {
        Self {
            written: Arc::new(Mutex::new(Vec::new())),
            response: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    pub(crate) fn push_response(&self, bytes: impl AsRef<[u8]>) {
        self.response.lock().extend(bytes.as_ref());
    }

    pub(crate) fn written(&self) -> Vec<u8> {
        self.written.lock().clone()
    }

    pub(crate) fn clear_written(&self) {
        self.written.lock().clear();
    }

    pub(crate) fn written_contains(&self, needle: &[u8]) -> bool {
        let written = self.written.lock();
        written.windows(needle.len()).any(|window| window == needle)
    }
}

impl Read for MockChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut response = self.response.lock();
        if response.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "mock channel script exhausted",
            ));
        }
        response.read(buf)
    }
}

impl Write for MockChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.written.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Hands a scripted [`MockChannel`] to the pool per opened connection and
/// keeps a handle on every channel it spawned.
pub(crate) struct ScriptedConnector {
    scripts: Arc<Mutex<VecDeque<Vec<u8>>>>,
    channels: Arc<Mutex<Vec<MockChannel>>>,
}

impl ScriptedConnector {
    pub(crate) fn new() -> Self {
        Self {
            scripts: Arc::new(Mutex::new(VecDeque::new())),
            channels: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub(crate) fn push_script(&self, script: Vec<u8>) {
        self.scripts.lock().push_back(script);
    }

    pub(crate) fn connections_opened(&self) -> usize {
        self.channels.lock().len()
    }

    pub(crate) fn channel(&self, index: usize) -> MockChannel {
        self.channels.lock()[index].clone()
    }

    pub(crate) fn connector(&self) -> Connector {
        let scripts = Arc::clone(&self.scripts);
        let channels = Arc::clone(&self.channels);
        Box::new(move |_: &Address| {
            let script = scripts.lock().pop_front().ok_or_else(|| {
                io::Error::new(io::ErrorKind::ConnectionRefused, "no scripted connection left")
            })?;
            let channel = MockChannel::new();
            channel.push_response(script);
            channels.lock().push(channel.clone());
            Ok(Box::new(channel) as DynChannel)
        })
    }
}

pub(crate) fn handshake_response(version: (u8, u8)) -> Vec<u8> {
    vec![0, 0, version.1, version.0]
}

/// Frame a full message payload as a single chunk plus the message boundary.
pub(crate) fn chunked(payload: &[u8]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(payload.len() + 4);
    bytes.extend((payload.len() as u16).to_be_bytes());
    bytes.extend_from_slice(payload);
    bytes.extend([0x00, 0x00]);
    bytes
}

/// Encode a server message with the 5.0 value coding rules.
pub(crate) fn message(tag: u8, fields: &[ValueSend]) -> Vec<u8> {
    let translator = crate::bolt::Bolt5x0StructTranslator::default();
    let mut payload = Vec::new();
    let mut serializer = PackStreamSerializerImpl::new(&mut payload);
    serializer
        .write_struct_header(tag, fields.len() as u8)
        .unwrap();
    for field in fields {
        translator.serialize(&mut serializer, field).unwrap();
    }
    chunked(&payload)
}

pub(crate) fn success(meta: ValueSend) -> Vec<u8> {
    message(0x70, &[meta])
}

pub(crate) fn record(values: Vec<ValueSend>) -> Vec<u8> {
    message(0x71, &[ValueSend::List(values)])
}

pub(crate) fn failure(meta: ValueSend) -> Vec<u8> {
    message(0x7F, &[meta])
}

pub(crate) fn ignored() -> Vec<u8> {
    message(0x7E, &[])
}

pub(crate) fn hello_success() -> Vec<u8> {
    success(crate::value_map!({
        "server": "Neo4j/5.0.0",
        "connection_id": "bolt-1",
    }))
}
