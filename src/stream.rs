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

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::iter::FusedIterator;
use std::mem;
use std::rc::Rc;
use std::sync::Arc;

use atomic_refcell::AtomicRefCell;
use duplicate::duplicate_item;

use crate::bolt::message_parameters::{DiscardParameters, PullParameters, RunParameters};
use crate::bolt::{BoltMeta, BoltRecordFields, ResponseCallbacks};
use crate::config::TransactionConfig;
use crate::error::{BoltError, Result};
use crate::pool::PooledBolt;
use crate::record::Record;
use crate::value::{ValueReceive, ValueSend};

const LOW_WATERMARK_FACTOR: f64 = 0.3;
const HIGH_WATERMARK_FACTOR: f64 = 0.7;

/// Drives a RUN + PULL/DISCARD response stream on a borrowed connection.
///
/// Records are buffered between the wire and the consumer; while the buffer
/// sits above the high watermark, completed batches do not trigger further
/// PULLs until consumption drains it below the low watermark again.
#[derive(Debug)]
pub struct RecordStream {
    connection: Rc<RefCell<PooledBolt>>,
    fetch_size: i64,
    listener: Arc<AtomicRefCell<StreamListener>>,
}

impl RecordStream {
    pub fn new(connection: Rc<RefCell<PooledBolt>>, fetch_size: i64) -> Self {
        // PULL_ALL consumes whole streams; there is no batching before 4.0
        let fetch_size = match connection.borrow().protocol_version().0 < 4 {
            true => -1,
            false => fetch_size,
        };
        let listener = Arc::new(AtomicRefCell::new(StreamListener::new(fetch_size)));
        Self {
            connection,
            fetch_size,
            listener,
        }
    }

    /// Issue RUN (with a pipelined first PULL) and consume responses until
    /// the RUN outcome is known.
    pub fn run(
        &mut self,
        query: &str,
        parameters: Option<&HashMap<String, ValueSend>>,
        config: &TransactionConfig,
    ) -> Result<()> {
        let run_parameters = RunParameters::new_auto_commit_run(
            query,
            parameters,
            (!config.bookmarks.is_empty()).then_some(config.bookmarks.as_slice()),
            config.tx_timeout,
            (!config.tx_metadata.is_empty()).then_some(&config.tx_metadata),
            config.mode.as_protocol_str(),
            config.db.as_deref(),
            config.imp_user.as_deref(),
            config.notification_filter.as_ref(),
        );

        let mut callbacks = self.failure_callbacks();
        let listener = Arc::downgrade(&self.listener);
        callbacks = callbacks.with_on_success(move |meta| {
            if let Some(listener) = listener.upgrade() {
                return listener.borrow_mut().run_success_cb(meta);
            }
            Ok(())
        });

        self.connection.borrow_mut().run(run_parameters, callbacks)?;
        self.pull(false)?;
        self.connection.borrow_mut().write_all()?;

        // surface the RUN outcome; the PULL response is consumed on demand
        {
            let mut connection = self.connection.borrow_mut();
            while connection.expected_reply_len() > 1 {
                if let Err(err) = connection.read_one() {
                    self.listener.borrow_mut().set_error(err);
                    break;
                }
            }
        }

        let mut listener = self.listener.borrow_mut();
        match &listener.state {
            StreamState::Failed(_) | StreamState::Ignored => {
                let mut state = StreamState::Done;
                mem::swap(&mut listener.state, &mut state);
                match state {
                    StreamState::Failed(err) => Err(err),
                    StreamState::Ignored => {
                        Err(BoltError::protocol_error("result stream was ignored"))
                    }
                    _ => unreachable!("checked state above"),
                }
            }
            _ => Ok(()),
        }
    }

    /// Keys announced by the server for this stream.
    ///
    /// Only available once [`RecordStream::run`] returned successfully.
    pub fn keys(&self) -> Vec<Arc<String>> {
        (*self.listener)
            .borrow()
            .keys
            .as_ref()
            .expect("keys are available after RUN's SUCCESS")
            .iter()
            .map(Arc::clone)
            .collect()
    }

    /// Stop requesting further batches until [`RecordStream::resume`].
    /// Batches already requested keep arriving.
    pub fn pause(&mut self) {
        self.listener.borrow_mut().paused = true;
    }

    pub fn resume(&mut self) {
        self.listener.borrow_mut().paused = false;
    }

    /// Mark the stream so the next continuation discards the remainder
    /// instead of pulling it.
    pub fn cancel(&mut self) {
        self.listener.borrow_mut().cancelled = true;
    }

    /// Discard the rest of the stream and hand out its summary.
    ///
    /// Returns [`None`] when the summary was already taken or the stream
    /// failed earlier.
    pub fn consume(&mut self) -> Result<Option<StreamSummary>> {
        {
            let mut listener = self.listener.borrow_mut();
            if matches!(
                listener.state,
                StreamState::ReadyStreaming | StreamState::Ready | StreamState::Streaming
            ) {
                listener.cancelled = true;
                listener.buffer.clear();
            }
        }
        self.try_for_each(|record| record.map(drop))?;
        Ok(self.listener.borrow_mut().summary.take())
    }

    fn pull(&mut self, flush: bool) -> Result<()> {
        let callbacks = self.pull_callbacks();
        {
            let mut listener = self.listener.borrow_mut();
            listener.state = StreamState::Streaming;
        }
        self.connection
            .borrow_mut()
            .pull(PullParameters::new(self.fetch_size, self.qid()), callbacks)?;
        if flush {
            self.connection.borrow_mut().write_all()?;
        }
        Ok(())
    }

    fn discard(&mut self, flush: bool) -> Result<()> {
        let callbacks = self.discard_callbacks();
        {
            let mut listener = self.listener.borrow_mut();
            listener.state = StreamState::Discarding;
            listener.pulled = false;
        }
        self.connection
            .borrow_mut()
            .discard(DiscardParameters::new(-1, self.qid()), callbacks)?;
        if flush {
            self.connection.borrow_mut().write_all()?;
        }
        Ok(())
    }

    fn pull_callbacks(&self) -> ResponseCallbacks {
        let callbacks = self.discard_callbacks();
        let listener = Arc::downgrade(&self.listener);
        callbacks.with_on_record(move |data| {
            if let Some(listener) = listener.upgrade() {
                return listener.borrow_mut().record_cb(data);
            }
            Ok(())
        })
    }

    fn discard_callbacks(&self) -> ResponseCallbacks {
        let callbacks = self.failure_callbacks();
        let listener = Arc::downgrade(&self.listener);
        callbacks.with_on_success(move |meta| {
            if let Some(listener) = listener.upgrade() {
                return listener.borrow_mut().batch_success_cb(meta);
            }
            Ok(())
        })
    }

    fn failure_callbacks(&self) -> ResponseCallbacks {
        let mut callbacks = ResponseCallbacks::new();
        let listener = Arc::downgrade(&self.listener);
        callbacks = callbacks.with_on_failure(move |error| {
            if let Some(listener) = listener.upgrade() {
                return listener.borrow_mut().failure_cb(error);
            }
            Ok(())
        });
        let listener = Arc::downgrade(&self.listener);
        callbacks.with_on_ignored(move || {
            if let Some(listener) = listener.upgrade() {
                return listener.borrow_mut().ignored_cb();
            }
            Ok(())
        })
    }

    fn qid(&self) -> i64 {
        (*self.listener).borrow().qid.unwrap_or(-1)
    }
}

impl Iterator for RecordStream {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if (*self.listener).borrow().state.is_done() {
            return None;
        }

        loop {
            let (is_ready, cancelled, paused, auto_pull, buffer_empty) = {
                let listener = (*self.listener).borrow();
                (
                    listener.state.is_ready(),
                    listener.cancelled,
                    listener.paused,
                    listener.auto_pull,
                    listener.buffer.is_empty(),
                )
            };
            if is_ready {
                let res = if cancelled {
                    self.discard(true)
                } else if (!paused && auto_pull) || buffer_empty {
                    // either the watermark asks to keep the stream flowing or
                    // the consumer ran dry and demands the next batch
                    self.pull(true)
                } else {
                    Ok(())
                };
                if let Err(err) = res {
                    self.listener.borrow_mut().set_error(err);
                }
            }

            if let Some(record) = self.listener.borrow_mut().pop_buffer() {
                return Some(Ok(record));
            }

            let reading = {
                let listener = (*self.listener).borrow();
                matches!(
                    listener.state,
                    StreamState::ReadyStreaming
                        | StreamState::Streaming
                        | StreamState::Discarding
                )
            };
            if reading {
                if RefCell::borrow(&self.connection).expects_reply() {
                    if let Err(err) = self.connection.borrow_mut().read_one() {
                        self.listener.borrow_mut().set_error(err);
                    }
                } else {
                    // a batch is supposedly in flight but nothing is
                    // outstanding on the connection; the stream cannot
                    // progress anymore
                    self.listener.borrow_mut().set_error(BoltError::protocol_error(
                        "result stream expected further responses but none are outstanding",
                    ));
                }
                continue;
            }

            let mut listener = self.listener.borrow_mut();
            match listener.state {
                StreamState::Failed(_) => {
                    let mut state = StreamState::Done;
                    mem::swap(&mut listener.state, &mut state);
                    match state {
                        StreamState::Failed(err) => return Some(Err(err)),
                        _ => unreachable!("checked state to be failed above"),
                    }
                }
                StreamState::Ignored => {
                    listener.state = StreamState::Done;
                    return Some(Err(BoltError::protocol_error("result stream was ignored")));
                }
                StreamState::Succeeded => {
                    listener.state = StreamState::Done;
                    return None;
                }
                StreamState::Done => return None,
                _ => {}
            }
        }
    }
}

impl FusedIterator for RecordStream {}

/// What the stream observed, reported alongside the server's SUCCESS
/// metadata once the stream completed.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamSummary {
    /// The RUN response announced a non-empty key list.
    pub has_keys: bool,
    /// At least one record was streamed to the consumer.
    pub had_records: bool,
    /// The stream was consumed with PULL all the way (no DISCARD issued).
    pub pulled: bool,
    pub bookmark: Option<String>,
    /// Remaining SUCCESS metadata of the final batch.
    pub metadata: BoltMeta,
}

#[derive(Debug)]
enum StreamState {
    /// RUN issued with the first PULL pipelined; keys not yet known.
    ReadyStreaming,
    /// Between batches: the server awaits another PULL or DISCARD.
    Ready,
    /// A PULL is in flight.
    Streaming,
    /// A DISCARD is in flight.
    Discarding,
    Succeeded,
    Failed(BoltError),
    Ignored,
    Done,
}

impl StreamState {
    #[allow(dead_code)] // cover all states
    #[duplicate_item(
        fn_name                variant;
        [ is_ready_streaming ] [ ReadyStreaming ];
        [ is_ready ]           [ Ready ];
        [ is_streaming ]       [ Streaming ];
        [ is_discarding ]      [ Discarding ];
        [ is_succeeded ]       [ Succeeded ];
        [ is_failed ]          [ Failed(_) ];
        [ is_ignored ]         [ Ignored ];
        [ is_done ]            [ Done ];
    )]
    fn fn_name(&self) -> bool {
        matches!(self, StreamState::variant)
    }
}

#[derive(Debug)]
struct StreamListener {
    buffer: VecDeque<Record>,
    keys: Option<Vec<Arc<String>>>,
    qid: Option<i64>,
    state: StreamState,
    summary: Option<StreamSummary>,
    paused: bool,
    cancelled: bool,
    auto_pull: bool,
    pulled: bool,
    had_record: bool,
    low_watermark: usize,
    high_watermark: usize,
}

impl StreamListener {
    fn new(fetch_size: i64) -> Self {
        let (low_watermark, high_watermark) = match fetch_size {
            // fetch-all: a single batch, flow control cannot apply
            ..=-1 => (usize::MAX, usize::MAX),
            _ => (
                (fetch_size as f64 * LOW_WATERMARK_FACTOR) as usize,
                (fetch_size as f64 * HIGH_WATERMARK_FACTOR) as usize,
            ),
        };
        Self {
            buffer: VecDeque::new(),
            keys: None,
            qid: None,
            state: StreamState::ReadyStreaming,
            summary: None,
            paused: false,
            cancelled: false,
            auto_pull: true,
            pulled: true,
            had_record: false,
            low_watermark,
            high_watermark,
        }
    }

    fn run_success_cb(&mut self, mut meta: BoltMeta) -> Result<()> {
        if self.keys.is_some() {
            return Ok(());
        }
        if let Some(qid) = meta.remove("qid") {
            let ValueReceive::Integer(qid) = qid else {
                return Err(BoltError::protocol_error(
                    "SUCCESS after RUN 'qid' was not an integer",
                ));
            };
            self.qid = Some(qid);
        }
        let Some(fields) = meta.remove("fields") else {
            return Err(BoltError::protocol_error(
                "SUCCESS after RUN did not contain 'fields'",
            ));
        };
        let ValueReceive::List(fields) = fields else {
            return Err(BoltError::protocol_error(
                "SUCCESS after RUN 'fields' was not a list",
            ));
        };
        let fields = fields
            .into_iter()
            .map(|field| match field {
                ValueReceive::String(field) => Ok(Arc::new(field)),
                _ => Err(BoltError::protocol_error(
                    "SUCCESS after RUN 'fields' was not a list of strings",
                )),
            })
            .collect::<Result<Vec<_>>>()?;
        self.keys = Some(fields);
        // the pipelined PULL is already on the wire
        if self.state.is_ready_streaming() {
            self.state = StreamState::Streaming;
        }
        Ok(())
    }

    fn record_cb(&mut self, fields: BoltRecordFields) -> Result<()> {
        let keys = self
            .keys
            .as_ref()
            .ok_or_else(|| BoltError::protocol_error("RECORD received before RUN SUCCESS"))?;
        if keys.len() != fields.len() {
            return Err(BoltError::protocol_error(format!(
                "RECORD contained {} entries but {} keys were announced",
                fields.len(),
                keys.len()
            )));
        }
        self.buffer.push_back(Record::new(keys, fields));
        self.had_record = true;
        if self.buffer.len() > self.high_watermark {
            self.auto_pull = false;
        }
        Ok(())
    }

    fn batch_success_cb(&mut self, mut meta: BoltMeta) -> Result<()> {
        let Some(ValueReceive::Boolean(true)) = meta.remove("has_more") else {
            let bookmark = match meta.remove("bookmark") {
                Some(ValueReceive::String(bookmark)) => Some(bookmark),
                _ => None,
            };
            self.state = StreamState::Succeeded;
            self.summary = Some(StreamSummary {
                has_keys: self
                    .keys
                    .as_ref()
                    .map(|keys| !keys.is_empty())
                    .unwrap_or(false),
                had_records: self.had_record,
                pulled: self.pulled,
                bookmark,
                metadata: meta,
            });
            return Ok(());
        };
        self.state = StreamState::Ready;
        Ok(())
    }

    fn failure_cb(&mut self, error: BoltError) -> Result<()> {
        self.state = StreamState::Failed(error);
        self.summary = None;
        Ok(())
    }

    fn ignored_cb(&mut self) -> Result<()> {
        if !self.state.is_failed() {
            self.state = StreamState::Ignored;
        }
        self.summary = None;
        Ok(())
    }

    fn pop_buffer(&mut self) -> Option<Record> {
        let record = self.buffer.pop_front();
        if record.is_some() && self.buffer.len() < self.low_watermark {
            self.auto_pull = true;
        }
        record
    }

    fn set_error(&mut self, error: BoltError) {
        self.state = StreamState::Failed(error);
        self.summary = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::config::AuthToken;
    use crate::error::ServerError;
    use crate::pool::{AcquireConfig, Pool, PoolConfig};
    use crate::testing::{
        failure, handshake_response, hello_success, record, success, MockChannel,
        ScriptedConnector,
    };
    use crate::value_map;

    fn ready_connection(
        version: (u8, u8),
        stream_script: Vec<u8>,
    ) -> (Rc<RefCell<PooledBolt>>, MockChannel, Pool) {
        let scripted = ScriptedConnector::new();
        let mut script = handshake_response(version);
        script.extend(hello_success());
        script.extend(stream_script);
        scripted.push_script(script);
        let pool = Pool::new(PoolConfig::new(
            scripted.connector(),
            AuthToken::new_none_auth(),
        ));
        let connection = pool
            .acquire(&crate::Address::from("localhost:7687"), AcquireConfig::default())
            .unwrap();
        let channel = scripted.channel(0);
        channel.clear_written();
        (Rc::new(RefCell::new(connection)), channel, pool)
    }

    fn count_messages(channel: &MockChannel, needle: &[u8]) -> usize {
        let written = channel.written();
        written.windows(needle.len()).filter(|w| *w == needle).count()
    }

    #[test]
    fn test_stream_records_keys_and_summary() {
        let mut script = success(value_map!({"fields": vec!["n"], "t_first": 7}));
        script.extend(record(vec![ValueSend::Integer(1)]));
        script.extend(success(value_map!({"bookmark": "bm", "t_last": 3})));
        let (connection, channel, _pool) = ready_connection((4, 4), script);

        let mut stream = RecordStream::new(Rc::clone(&connection), 1000);
        stream
            .run("RETURN 1 AS n", None, &TransactionConfig::new())
            .unwrap();
        assert_eq!(
            stream.keys().iter().map(|k| k.as_str()).collect::<Vec<_>>(),
            vec!["n"]
        );

        let records = (&mut stream)
            .map(|record| record.unwrap())
            .collect::<Vec<_>>();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].value("n"), Some(&ValueReceive::Integer(1)));

        let summary = stream.consume().unwrap().unwrap();
        assert!(summary.has_keys);
        assert!(summary.had_records);
        assert!(summary.pulled);
        assert_eq!(summary.bookmark.as_deref(), Some("bm"));
        assert_eq!(
            summary.metadata.get("result_consumed_after"),
            Some(&ValueReceive::Integer(3))
        );

        // RUN and exactly one PULL hit the wire
        assert_eq!(count_messages(&channel, &[0xB3, 0x10]), 1);
        assert_eq!(count_messages(&channel, &[0xB1, 0x3F]), 1);
    }

    #[test]
    fn test_stream_continues_across_batches() {
        let mut script = success(value_map!({"fields": vec!["n"]}));
        script.extend(record(vec![ValueSend::Integer(1)]));
        script.extend(record(vec![ValueSend::Integer(2)]));
        script.extend(success(value_map!({"has_more": true})));
        script.extend(record(vec![ValueSend::Integer(3)]));
        script.extend(success(value_map!({})));
        let (connection, channel, _pool) = ready_connection((4, 4), script);

        let mut stream = RecordStream::new(Rc::clone(&connection), 2);
        stream
            .run("UNWIND [1, 2, 3] AS n RETURN n", None, &TransactionConfig::new())
            .unwrap();

        let values = (&mut stream)
            .map(|record| {
                record
                    .unwrap()
                    .take_value("n")
                    .unwrap()
                    .try_into_int()
                    .unwrap()
            })
            .collect::<Vec<_>>();
        assert_eq!(values, vec![1, 2, 3]);
        // the has_more completion triggered a second PULL
        assert_eq!(count_messages(&channel, &[0xB1, 0x3F]), 2);
    }

    #[test]
    fn test_cancel_turns_continuation_into_discard() {
        let mut script = success(value_map!({"fields": vec!["n"]}));
        script.extend(record(vec![ValueSend::Integer(1)]));
        script.extend(success(value_map!({"has_more": true})));
        script.extend(success(value_map!({"bookmark": "bm"})));
        let (connection, channel, _pool) = ready_connection((4, 4), script);

        let mut stream = RecordStream::new(Rc::clone(&connection), 1);
        stream
            .run("UNWIND [1, 2] AS n RETURN n", None, &TransactionConfig::new())
            .unwrap();
        assert_eq!(
            stream.next().unwrap().unwrap().value("n"),
            Some(&ValueReceive::Integer(1))
        );

        stream.cancel();
        let summary = stream.consume().unwrap().unwrap();
        assert!(!summary.pulled);
        assert!(summary.had_records);
        assert_eq!(count_messages(&channel, &[0xB1, 0x2F]), 1);
    }

    #[test]
    fn test_pause_blocks_auto_pull_but_not_demand() {
        let mut script = success(value_map!({"fields": vec!["n"]}));
        script.extend(record(vec![ValueSend::Integer(1)]));
        script.extend(success(value_map!({"has_more": true})));
        script.extend(record(vec![ValueSend::Integer(2)]));
        script.extend(success(value_map!({})));
        let (connection, _channel, _pool) = ready_connection((4, 4), script);

        let mut stream = RecordStream::new(Rc::clone(&connection), 1);
        stream
            .run("UNWIND [1, 2] AS n RETURN n", None, &TransactionConfig::new())
            .unwrap();
        stream.pause();
        // explicit consumption still pulls batch by batch
        let values = (&mut stream)
            .map(|record| {
                record
                    .unwrap()
                    .take_value("n")
                    .unwrap()
                    .try_into_int()
                    .unwrap()
            })
            .collect::<Vec<_>>();
        assert_eq!(values, vec![1, 2]);
        stream.resume();
    }

    #[test]
    fn test_server_failure_terminates_stream() {
        let mut script = success(value_map!({"fields": vec!["n"]}));
        script.extend(failure(value_map!({
            "code": "Neo.ClientError.Statement.SyntaxError",
            "message": "boom",
        })));
        let (connection, _channel, _pool) = ready_connection((4, 4), script);

        let mut stream = RecordStream::new(Rc::clone(&connection), 1000);
        stream
            .run("RETURN syntax error", None, &TransactionConfig::new())
            .unwrap();
        let err = stream.next().unwrap().unwrap_err();
        let BoltError::ServerError { error } = err else {
            panic!("expected server error, got {err:?}");
        };
        let error: Box<ServerError> = error;
        assert_eq!(error.code(), "Neo.ClientError.Statement.SyntaxError");
        assert!(stream.next().is_none());
        assert!(stream.consume().unwrap().is_none());
    }

    #[test]
    fn test_failed_run_surfaces_error_immediately() {
        let script = failure(value_map!({
            "code": "Neo.ClientError.Security.Unauthorized",
            "message": "no",
        }));
        let (connection, _channel, _pool) = ready_connection((4, 4), script);

        let mut stream = RecordStream::new(Rc::clone(&connection), 1000);
        let err = stream
            .run("RETURN 1", None, &TransactionConfig::new())
            .unwrap_err();
        assert!(matches!(err, BoltError::ServerError { .. }));
    }
}
