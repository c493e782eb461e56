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

use core::fmt::{Debug, Formatter};
use std::collections::HashMap;

use crate::error::{BoltError, Result};
use crate::value::ValueReceive;

#[derive(Debug, Copy, Clone, Ord, PartialOrd, Eq, PartialEq)]
pub(crate) enum ResponseMessage {
    Hello,
    Logon,
    Logoff,
    Reset,
    Run,
    Discard,
    Pull,
    Begin,
    Commit,
    Rollback,
    Route,
    Telemetry,
}

/// One entry of the connection's observer FIFO: which request the response
/// belongs to plus the callbacks to deliver it to.
#[derive(Debug)]
pub(crate) struct BoltResponse {
    pub(crate) message: ResponseMessage,
    pub(crate) callbacks: ResponseCallbacks,
}

impl BoltResponse {
    pub(crate) fn new(message: ResponseMessage, callbacks: ResponseCallbacks) -> Self {
        Self { message, callbacks }
    }

    pub(crate) fn from_message(message: ResponseMessage) -> Self {
        Self::new(message, ResponseCallbacks::new().with_on_failure(Err))
    }
}

type OptBox<T> = Option<Box<T>>;
pub(crate) type BoltMeta = HashMap<String, ValueReceive>;
pub(crate) type BoltRecordFields = Vec<ValueReceive>;

pub(crate) struct ResponseCallbacks {
    on_success_cb: OptBox<dyn FnMut(BoltMeta) -> Result<()> + Send + Sync>,
    on_failure_cb: OptBox<dyn FnMut(BoltError) -> Result<()> + Send + Sync>,
    on_ignored_cb: OptBox<dyn FnMut() -> Result<()> + Send + Sync>,
    on_record_cb: OptBox<dyn FnMut(BoltRecordFields) -> Result<()> + Send + Sync>,
    on_summary_cb: OptBox<dyn FnMut() + Send + Sync>,
}

impl ResponseCallbacks {
    pub(crate) fn new() -> Self {
        Self {
            on_success_cb: None,
            on_failure_cb: None,
            on_ignored_cb: None,
            on_record_cb: None,
            on_summary_cb: None,
        }
    }

    pub(crate) fn with_on_success<F: FnMut(BoltMeta) -> Result<()> + Send + Sync + 'static>(
        mut self,
        cb: F,
    ) -> Self {
        self.on_success_cb = Some(Box::new(cb));
        self
    }

    pub(crate) fn with_on_success_pre_hook<
        F: FnMut(&BoltMeta) -> Result<()> + Send + Sync + 'static,
    >(
        mut self,
        mut pre_hook: F,
    ) -> Self {
        match self.on_success_cb {
            None => self.on_success_cb = Some(Box::new(move |meta| pre_hook(&meta))),
            Some(mut cb) => {
                self.on_success_cb = Some(Box::new(move |meta| {
                    pre_hook(&meta)?;
                    cb(meta)
                }))
            }
        };
        self
    }

    pub(crate) fn with_on_failure<F: FnMut(BoltError) -> Result<()> + Send + Sync + 'static>(
        mut self,
        cb: F,
    ) -> Self {
        self.on_failure_cb = Some(Box::new(cb));
        self
    }

    pub(crate) fn with_on_ignored<F: FnMut() -> Result<()> + Send + Sync + 'static>(
        mut self,
        cb: F,
    ) -> Self {
        self.on_ignored_cb = Some(Box::new(cb));
        self
    }

    pub(crate) fn with_on_record<
        F: FnMut(BoltRecordFields) -> Result<()> + Send + Sync + 'static,
    >(
        mut self,
        cb: F,
    ) -> Self {
        self.on_record_cb = Some(Box::new(cb));
        self
    }

    pub(crate) fn with_on_summary<F: FnMut() + Send + Sync + 'static>(mut self, cb: F) -> Self {
        self.on_summary_cb = Some(Box::new(cb));
        self
    }

    pub(crate) fn on_success(&mut self, meta: ValueReceive) -> Result<()> {
        let res = match meta {
            ValueReceive::Map(meta) => match self.on_success_cb.as_mut() {
                None => Ok(()),
                Some(cb) => cb(meta),
            },
            _ => Err(BoltError::protocol_error(
                "SUCCESS meta was not a Dictionary",
            )),
        };
        self.on_summary();
        res
    }

    pub(crate) fn on_failure(&mut self, error: BoltError) -> Result<()> {
        let res = match self.on_failure_cb.as_mut() {
            None => Ok(()),
            Some(cb) => cb(error),
        };
        self.on_summary();
        res
    }

    pub(crate) fn on_ignored(&mut self) -> Result<()> {
        let res = self.on_ignored_cb.as_mut().map(|cb| cb()).unwrap_or(Ok(()));
        self.on_summary();
        res
    }

    pub(crate) fn on_record(&mut self, data: ValueReceive) -> Result<()> {
        match data {
            ValueReceive::List(values) => match self.on_record_cb.as_mut() {
                // only result-stream observers subscribe to records; anything
                // else being sent a RECORD is a server-side violation
                None => Err(BoltError::protocol_error(
                    "RECORD received for a request that cannot produce records",
                )),
                Some(cb) => cb(values),
            },
            _ => Err(BoltError::protocol_error("RECORD data was not a List")),
        }
    }

    fn on_summary(&mut self) {
        if let Some(cb) = self.on_summary_cb.as_mut() {
            cb()
        }
    }
}

impl Debug for ResponseCallbacks {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ResponseCallbacks")
            .field("on_success", &self.on_success_cb.as_ref().map(|_| "..."))
            .field("on_failure", &self.on_failure_cb.as_ref().map(|_| "..."))
            .field("on_ignored", &self.on_ignored_cb.as_ref().map(|_| "..."))
            .field("on_record", &self.on_record_cb.as_ref().map(|_| "..."))
            .field("on_summary", &self.on_summary_cb.as_ref().map(|_| "..."))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_without_record_handler_is_protocol_error() {
        let mut callbacks = ResponseCallbacks::new();
        let res = callbacks.on_record(ValueReceive::List(vec![ValueReceive::Integer(1)]));
        assert!(matches!(res, Err(BoltError::ProtocolError { .. })));
    }

    #[test]
    fn test_success_pre_hook_runs_before_callback() {
        let mut order = Vec::new();
        let order_ptr = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let order_hook = std::sync::Arc::clone(&order_ptr);
        let order_cb = std::sync::Arc::clone(&order_ptr);
        let mut callbacks = ResponseCallbacks::new()
            .with_on_success(move |_| {
                order_cb.lock().unwrap().push("cb");
                Ok(())
            })
            .with_on_success_pre_hook(move |_| {
                order_hook.lock().unwrap().push("hook");
                Ok(())
            });
        callbacks
            .on_success(ValueReceive::Map(HashMap::new()))
            .unwrap();
        order.extend(order_ptr.lock().unwrap().iter().copied());
        assert_eq!(order, vec!["hook", "cb"]);
    }

    #[test]
    fn test_summary_fires_on_all_terminal_events() {
        let count = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let make = |count: &std::sync::Arc<std::sync::atomic::AtomicUsize>| {
            let count = std::sync::Arc::clone(count);
            ResponseCallbacks::new().with_on_summary(move || {
                count.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            })
        };
        make(&count)
            .on_success(ValueReceive::Map(HashMap::new()))
            .unwrap();
        make(&count)
            .on_failure(BoltError::disconnect("gone"))
            .unwrap();
        make(&count).on_ignored().unwrap();
        assert_eq!(count.load(std::sync::atomic::Ordering::SeqCst), 3);
    }
}
