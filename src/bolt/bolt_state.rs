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

use std::collections::HashMap;

use log::debug;

use super::bolt_debug_extra;
use super::response::ResponseMessage;
use crate::value::ValueReceive;

/// Client-side mirror of the server's connection state, advanced on every
/// SUCCESS/FAILURE. It backs `needs_reset`: a connection is only handed back
/// to the pool untouched when it sits in `Ready` with nothing in flight.
#[derive(Debug, Copy, Clone, Ord, PartialOrd, Eq, PartialEq)]
pub(crate) enum BoltState {
    /// Channel open, not (or no longer) authenticated.
    Connected,
    Ready,
    Streaming,
    TxReady,
    /// Inside an explicit transaction with possibly-unconsumed streams.
    /// The server only leaves its TX_STREAMING state once *every* open
    /// stream is exhausted; collapsing that into one state spares the
    /// client from counting streams without changing any decision it makes.
    TxMaybeStreaming,
    Failed,
}

#[derive(Debug)]
pub(crate) struct BoltStateTracker {
    state: BoltState,
}

impl BoltStateTracker {
    pub(crate) fn new() -> Self {
        Self {
            state: BoltState::Connected,
        }
    }

    pub(crate) fn state(&self) -> BoltState {
        self.state
    }

    pub(crate) fn success<E>(
        &mut self,
        message: ResponseMessage,
        meta: &ValueReceive,
        bolt_local_port: Option<u16>,
        bolt_meta: Result<&HashMap<String, ValueReceive>, E>,
    ) {
        if let ValueReceive::Map(meta) = meta {
            if let Some(ValueReceive::Boolean(true)) = meta.get("has_more") {
                // the stream continues, the server state stays put
                return;
            }
        }

        let Some(next) = Self::transition(self.state, message) else {
            panic!(
                "server confirmed {message:?} while the connection was {:?}; \
                 the request should never have been sent",
                self.state
            );
        };
        if next != self.state {
            debug!(
                "{}{:?}: {:?} > {:?}",
                bolt_debug_extra!(bolt_meta, bolt_local_port),
                message,
                self.state,
                next
            );
            self.state = next;
        }
    }

    pub(crate) fn failure(&mut self) {
        self.state = BoltState::Failed;
    }

    /// The full transition table: which state a SUCCESS for `message` moves
    /// the connection to. `None` marks pairings the protocol rules out; the
    /// request builders never put such a message on the wire, so hitting one
    /// is a crate bug.
    fn transition(state: BoltState, message: ResponseMessage) -> Option<BoltState> {
        use BoltState::*;
        use ResponseMessage::*;

        match (message, state) {
            // on 5.1+ the connection only becomes usable after LOGON;
            // treating HELLO as authenticating either way keeps the table
            // version-independent
            (Hello, Connected) => Some(Ready),
            (Hello, Failed) => Some(Failed),
            (Logon, Connected | Ready) => Some(Ready),
            (Logoff, Ready) => Some(Connected),
            (Reset, Connected) => None,
            (Reset, _) => Some(Ready),
            (Run, Ready) => Some(Streaming),
            (Run, TxReady | TxMaybeStreaming) => Some(TxMaybeStreaming),
            (Pull | Discard, Streaming) => Some(Ready),
            (Pull | Discard, TxMaybeStreaming) => Some(TxMaybeStreaming),
            (Begin, Ready) => Some(TxReady),
            (Commit | Rollback, TxReady | TxMaybeStreaming) => Some(Ready),
            (Route | Telemetry, Ready) => Some(Ready),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_meta() -> ValueReceive {
        ValueReceive::Map(HashMap::new())
    }

    fn succeed(tracker: &mut BoltStateTracker, message: ResponseMessage) {
        tracker.success(message, &empty_meta(), None, Ok::<_, ()>(&HashMap::new()));
    }

    #[test]
    fn test_auto_commit_round_trip() {
        let mut tracker = BoltStateTracker::new();
        succeed(&mut tracker, ResponseMessage::Hello);
        assert_eq!(tracker.state(), BoltState::Ready);
        succeed(&mut tracker, ResponseMessage::Run);
        assert_eq!(tracker.state(), BoltState::Streaming);
        succeed(&mut tracker, ResponseMessage::Pull);
        assert_eq!(tracker.state(), BoltState::Ready);
    }

    #[test]
    fn test_transaction_round_trip() {
        let mut tracker = BoltStateTracker::new();
        succeed(&mut tracker, ResponseMessage::Hello);
        succeed(&mut tracker, ResponseMessage::Begin);
        assert_eq!(tracker.state(), BoltState::TxReady);
        succeed(&mut tracker, ResponseMessage::Run);
        succeed(&mut tracker, ResponseMessage::Pull);
        assert_eq!(tracker.state(), BoltState::TxMaybeStreaming);
        succeed(&mut tracker, ResponseMessage::Commit);
        assert_eq!(tracker.state(), BoltState::Ready);
    }

    #[test]
    fn test_has_more_keeps_streaming() {
        let mut tracker = BoltStateTracker::new();
        succeed(&mut tracker, ResponseMessage::Hello);
        succeed(&mut tracker, ResponseMessage::Run);
        let has_more = ValueReceive::Map(
            [(String::from("has_more"), ValueReceive::Boolean(true))]
                .into_iter()
                .collect(),
        );
        tracker.success(
            ResponseMessage::Pull,
            &has_more,
            None,
            Ok::<_, ()>(&HashMap::new()),
        );
        assert_eq!(tracker.state(), BoltState::Streaming);
    }

    #[test]
    fn test_reset_recovers_from_failure() {
        let mut tracker = BoltStateTracker::new();
        succeed(&mut tracker, ResponseMessage::Hello);
        tracker.failure();
        assert_eq!(tracker.state(), BoltState::Failed);
        succeed(&mut tracker, ResponseMessage::Reset);
        assert_eq!(tracker.state(), BoltState::Ready);
    }

    #[test]
    fn test_logoff_returns_to_unauthenticated() {
        let mut tracker = BoltStateTracker::new();
        succeed(&mut tracker, ResponseMessage::Hello);
        succeed(&mut tracker, ResponseMessage::Logoff);
        assert_eq!(tracker.state(), BoltState::Connected);
        succeed(&mut tracker, ResponseMessage::Logon);
        assert_eq!(tracker.state(), BoltState::Ready);
    }

    #[test]
    #[should_panic(expected = "should never have been sent")]
    fn test_impossible_pairing_is_a_bug() {
        let mut tracker = BoltStateTracker::new();
        succeed(&mut tracker, ResponseMessage::Commit);
    }
}
