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

#![allow(clippy::option_map_unit_fn)]

//! # Bolt protocol engine
//!
//! The wire-level core of a Neo4j Bolt driver: version negotiation,
//! PackStream encoding, chunked message framing, per-version protocol state
//! machines (Bolt 1 through 5.7), result-stream handling and a bounded
//! connection pool.
//!
//! Socket handling deliberately stays outside this crate: the pool opens
//! channels through a caller-supplied [`Connector`](pool::Connector), and
//! anything implementing [`Read`](std::io::Read) +
//! [`Write`](std::io::Write) can carry a connection.
//!
//! ## Basic example
//!
//! ```no_run
//! use std::cell::RefCell;
//! use std::net::TcpStream;
//! use std::rc::Rc;
//!
//! use bolt_core::{
//!     AcquireConfig, Address, AuthToken, Pool, PoolConfig, RecordStream, TransactionConfig,
//! };
//!
//! let connector = Box::new(|address: &Address| {
//!     TcpStream::connect((address.host(), address.port()))
//!         .map(|stream| Box::new(stream) as bolt_core::DynChannel)
//! });
//! let pool = Pool::new(PoolConfig::new(
//!     connector,
//!     AuthToken::new_basic_auth("neo4j", "pass"),
//! ));
//!
//! let address = Address::from("localhost:7687");
//! let connection = pool.acquire(&address, AcquireConfig::default()).unwrap();
//! let connection = Rc::new(RefCell::new(connection));
//!
//! let mut stream = RecordStream::new(Rc::clone(&connection), pool.config().fetch_size());
//! stream
//!     .run("RETURN 1 AS n", None, &TransactionConfig::new())
//!     .unwrap();
//! for record in &mut stream {
//!     println!("{:?}", record.unwrap().value("n"));
//! }
//! ```

mod address;
mod bolt;
mod config;
mod error;
mod pool;
mod record;
mod routing;
mod stream;
#[cfg(test)]
pub(crate) mod testing;
mod value;

pub use address::Address;
pub use bolt::{Channel, DynChannel, VersionOffer};
pub use config::{
    AuthToken, IntegerPolicy, NotificationFilter, RoutingControl, TransactionConfig,
};
pub use error::{BoltError, GqlErrorCause, GqlErrorClassification, Result, ServerError};
pub use pool::{AcquireConfig, Connector, Pool, PoolConfig, PooledBolt};
pub use record::Record;
pub use routing::{RoutingTable, ServerRole};
pub use stream::{RecordStream, StreamSummary};
pub use value::{BrokenValue, ValueReceive, ValueSend};

pub mod graph {
    //! Graph values received from the server.
    pub use crate::value::graph::{Node, Path, PathSegment, Relationship, UnboundRelationship};
}

pub mod spatial {
    //! Spatial values.
    pub use crate::value::spatial::{Cartesian2D, Cartesian3D, WGS84_2D, WGS84_3D};
}

pub mod time {
    //! Temporal values, built on [`chrono`] and [`chrono_tz`].
    pub use crate::value::time::{
        resolve_local_date_time, Date, DateTime, DateTimeFixed, Duration, FixedOffset,
        LocalDateTime, LocalTime, Time, Tz,
    };
}
