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

mod single_pool;

use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use itertools::Itertools;
use parking_lot::Mutex;

use crate::address::Address;
use crate::bolt::{DynChannel, VersionOffer, DEFAULT_VERSION_OFFER};
use crate::config::{AuthToken, IntegerPolicy, NotificationFilter};
use crate::error::{BoltError, Result};
use crate::value::ValueSend;
pub use single_pool::PooledBolt;
use single_pool::SimplePool;

const DEFAULT_USER_AGENT: &str = env!("BOLT_DEFAULT_USER_AGENT");
const DEFAULT_MAX_CONNECTION_POOL_SIZE: usize = 100;
const DEFAULT_CONNECTION_ACQUISITION_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_FETCH_SIZE: i64 = 1000;

/// Opens the byte channel to a server; TCP, TLS, or anything else speaking
/// [`Read`](std::io::Read)/[`Write`](std::io::Write) lives behind this
/// callback.
pub type Connector = Box<dyn Fn(&Address) -> io::Result<DynChannel> + Send + Sync>;

pub struct PoolConfig {
    pub(crate) connector: Connector,
    pub(crate) user_agent: String,
    pub(crate) auth: Arc<AuthToken>,
    /// Routing context for server-side routing; `None` disables the HELLO
    /// `routing` entry.
    pub(crate) routing_context: Option<HashMap<String, ValueSend>>,
    pub(crate) max_connection_pool_size: usize,
    pub(crate) connection_acquisition_timeout: Option<Duration>,
    pub(crate) max_connection_lifetime: Option<Duration>,
    pub(crate) idle_time_before_connection_test: Option<Duration>,
    pub(crate) notification_filter: Option<NotificationFilter>,
    pub(crate) fetch_size: i64,
    pub(crate) integer_policy: IntegerPolicy,
    pub(crate) version_offer: [VersionOffer; 4],
}

impl PoolConfig {
    pub fn new(connector: Connector, auth: AuthToken) -> Self {
        Self {
            connector,
            user_agent: String::from(DEFAULT_USER_AGENT),
            auth: Arc::new(auth),
            routing_context: None,
            max_connection_pool_size: DEFAULT_MAX_CONNECTION_POOL_SIZE,
            connection_acquisition_timeout: Some(DEFAULT_CONNECTION_ACQUISITION_TIMEOUT),
            max_connection_lifetime: None,
            idle_time_before_connection_test: None,
            notification_filter: None,
            fetch_size: DEFAULT_FETCH_SIZE,
            integer_policy: IntegerPolicy::default(),
            version_offer: DEFAULT_VERSION_OFFER,
        }
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_routing_context(mut self, routing_context: HashMap<String, ValueSend>) -> Self {
        self.routing_context = Some(routing_context);
        self
    }

    pub fn with_max_connection_pool_size(mut self, max_connection_pool_size: usize) -> Self {
        self.max_connection_pool_size = max_connection_pool_size;
        self
    }

    pub fn with_connection_acquisition_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connection_acquisition_timeout = timeout;
        self
    }

    pub fn with_max_connection_lifetime(mut self, lifetime: Option<Duration>) -> Self {
        self.max_connection_lifetime = lifetime;
        self
    }

    pub fn with_idle_time_before_connection_test(mut self, timeout: Option<Duration>) -> Self {
        self.idle_time_before_connection_test = timeout;
        self
    }

    pub fn with_notification_filter(mut self, filter: NotificationFilter) -> Self {
        self.notification_filter = Some(filter);
        self
    }

    /// Records per PULL batch; `-1` requests the whole stream at once.
    pub fn with_fetch_size(mut self, fetch_size: i64) -> Self {
        self.fetch_size = fetch_size;
        self
    }

    pub fn fetch_size(&self) -> i64 {
        self.fetch_size
    }

    pub fn with_integer_policy(mut self, integer_policy: IntegerPolicy) -> Self {
        self.integer_policy = integer_policy;
        self
    }

    pub fn with_version_offer(mut self, version_offer: [VersionOffer; 4]) -> Self {
        self.version_offer = version_offer;
        self
    }

    fn connection_acquisition_deadline(&self) -> Option<Instant> {
        self.connection_acquisition_timeout
            .map(|timeout| Instant::now() + timeout)
    }
}

impl Debug for PoolConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolConfig")
            .field("connector", &"...")
            .field("user_agent", &self.user_agent)
            .field("max_connection_pool_size", &self.max_connection_pool_size)
            .field(
                "connection_acquisition_timeout",
                &self.connection_acquisition_timeout,
            )
            .field("fetch_size", &self.fetch_size)
            .field("integer_policy", &self.integer_policy)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AcquireConfig {
    /// Skip idle connections and open a fresh one.
    pub require_new: bool,
}

/// Bounded per-address connection pools behind a single facade.
#[derive(Debug)]
pub struct Pool {
    config: Arc<PoolConfig>,
    pools: Mutex<PoolsState>,
}

#[derive(Debug)]
struct PoolsState {
    pools: HashMap<Arc<Address>, SimplePool>,
    closed: bool,
}

impl Pool {
    pub fn new(config: PoolConfig) -> Self {
        Self {
            config: Arc::new(config),
            pools: Mutex::new(PoolsState {
                pools: HashMap::new(),
                closed: false,
            }),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Borrow a connection to `address`, opening one if the pool has room,
    /// waiting (bounded by the acquisition timeout) otherwise.
    pub fn acquire(&self, address: &Address, acquire_config: AcquireConfig) -> Result<PooledBolt> {
        let pool = self.get_or_create_pool(address)?;
        let deadline = self.config.connection_acquisition_deadline();
        pool.acquire(deadline, acquire_config.require_new)
    }

    fn get_or_create_pool(&self, address: &Address) -> Result<SimplePool> {
        let mut synced = self.pools.lock();
        if synced.closed {
            return Err(BoltError::invalid_config("connection pool is closed"));
        }
        match synced.pools.get(address) {
            Some(pool) => Ok(pool.clone()),
            None => {
                let address = Arc::new(address.clone());
                let pool = SimplePool::new(Arc::clone(&address), Arc::clone(&self.config));
                synced.pools.insert(address, pool.clone());
                Ok(pool)
            }
        }
    }

    /// Number of connections of `address` currently borrowed or being
    /// created.
    pub fn in_use(&self, address: &Address) -> usize {
        let synced = self.pools.lock();
        synced
            .pools
            .get(address)
            .map(|pool| pool.in_use())
            .unwrap_or_default()
    }

    pub fn idle(&self, address: &Address) -> usize {
        let synced = self.pools.lock();
        synced
            .pools
            .get(address)
            .map(|pool| pool.idle())
            .unwrap_or_default()
    }

    /// Destroy all idle connections to `address`; borrowed connections are
    /// destroyed on release.
    pub fn purge(&self, address: &Address) {
        let pool = {
            let mut synced = self.pools.lock();
            synced.pools.remove(address)
        };
        if let Some(pool) = pool {
            pool.purge();
        }
    }

    /// Purge every address. Idempotent; later acquisitions fail.
    pub fn close(&self) {
        let pools = {
            let mut synced = self.pools.lock();
            synced.closed = true;
            synced.pools.drain().map(|(_, pool)| pool).collect_vec()
        };
        for pool in pools {
            pool.purge();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::thread;

    use crate::config::AuthToken;
    use crate::testing::{handshake_response, hello_success, ScriptedConnector};

    fn connection_script() -> Vec<u8> {
        let mut script = handshake_response((5, 0));
        script.extend(hello_success());
        script
    }

    fn new_pool(
        scripted_connections: usize,
        max_size: usize,
        acquisition_timeout: Option<Duration>,
    ) -> (Pool, ScriptedConnector) {
        let scripted = ScriptedConnector::new();
        for _ in 0..scripted_connections {
            scripted.push_script(connection_script());
        }
        let config = PoolConfig::new(scripted.connector(), AuthToken::new_none_auth())
            .with_max_connection_pool_size(max_size)
            .with_connection_acquisition_timeout(acquisition_timeout);
        (Pool::new(config), scripted)
    }

    fn test_address() -> Address {
        Address::from("localhost:7687")
    }

    #[test]
    fn test_acquire_opens_and_reuses_connections() {
        let (pool, scripted) = new_pool(2, 10, None);
        let address = test_address();

        let connection = pool.acquire(&address, AcquireConfig::default()).unwrap();
        assert_eq!(connection.protocol_version(), (5, 0));
        assert_eq!(pool.in_use(&address), 1);
        drop(connection);
        assert_eq!(pool.in_use(&address), 0);
        assert_eq!(pool.idle(&address), 1);

        let _connection = pool.acquire(&address, AcquireConfig::default()).unwrap();
        assert_eq!(scripted.connections_opened(), 1);
    }

    #[test]
    fn test_acquisition_timeout_reports_pool_usage() {
        let (pool, _scripted) = new_pool(1, 1, Some(Duration::from_millis(10)));
        let address = test_address();

        let _held = pool.acquire(&address, AcquireConfig::default()).unwrap();
        let err = pool
            .acquire(&address, AcquireConfig::default())
            .unwrap_err();
        let BoltError::Timeout { message } = err else {
            panic!("expected timeout error, got {err:?}");
        };
        assert!(message.contains("Active conn count = 1, Idle conn count = 0"));
    }

    #[test]
    fn test_pool_never_exceeds_max_size() {
        let (pool, scripted) = new_pool(3, 2, Some(Duration::from_millis(10)));
        let address = test_address();

        let _c1 = pool.acquire(&address, AcquireConfig::default()).unwrap();
        let _c2 = pool.acquire(&address, AcquireConfig::default()).unwrap();
        assert_eq!(pool.in_use(&address), 2);
        let res = pool.acquire(&address, AcquireConfig::default());
        assert!(matches!(res, Err(BoltError::Timeout { .. })));
        assert_eq!(scripted.connections_opened(), 2);
    }

    #[test]
    fn test_require_new_skips_idle_connections() {
        let (pool, scripted) = new_pool(2, 10, None);
        let address = test_address();

        drop(pool.acquire(&address, AcquireConfig::default()).unwrap());
        assert_eq!(pool.idle(&address), 1);
        let _fresh = pool
            .acquire(&address, AcquireConfig { require_new: true })
            .unwrap();
        assert_eq!(scripted.connections_opened(), 2);
    }

    #[test]
    fn test_require_new_makes_room_in_a_full_pool() {
        let (pool, scripted) = new_pool(2, 1, Some(Duration::from_millis(100)));
        let address = test_address();

        drop(pool.acquire(&address, AcquireConfig::default()).unwrap());
        assert_eq!(pool.idle(&address), 1);
        // the idle connection occupies the only slot; it gets sacrificed
        let _fresh = pool
            .acquire(&address, AcquireConfig { require_new: true })
            .unwrap();
        assert_eq!(scripted.connections_opened(), 2);
        assert_eq!(pool.idle(&address), 0);
    }

    #[test]
    fn test_acquisition_queue_is_fair() {
        let (pool, _scripted) = new_pool(1, 1, Some(Duration::from_secs(10)));
        let address = test_address();
        let order: Arc<parking_lot::Mutex<Vec<&'static str>>> = Default::default();

        let held = pool.acquire(&address, AcquireConfig::default()).unwrap();
        thread::scope(|scope| {
            let first_waiter = {
                let pool = &pool;
                let address = &address;
                let order = Arc::clone(&order);
                scope.spawn(move || {
                    let connection = pool.acquire(address, AcquireConfig::default()).unwrap();
                    order.lock().push("first");
                    drop(connection);
                })
            };
            thread::sleep(Duration::from_millis(50));
            let second_waiter = {
                let pool = &pool;
                let address = &address;
                let order = Arc::clone(&order);
                scope.spawn(move || {
                    let connection = pool.acquire(address, AcquireConfig::default()).unwrap();
                    order.lock().push("second");
                    drop(connection);
                })
            };
            thread::sleep(Duration::from_millis(50));
            drop(held);
            first_waiter.join().unwrap();
            second_waiter.join().unwrap();
        });
        assert_eq!(*order.lock(), vec!["first", "second"]);
    }

    #[test]
    fn test_purge_destroys_idle_connections() {
        let (pool, _scripted) = new_pool(1, 10, None);
        let address = test_address();

        drop(pool.acquire(&address, AcquireConfig::default()).unwrap());
        assert_eq!(pool.idle(&address), 1);
        pool.purge(&address);
        assert_eq!(pool.idle(&address), 0);
    }

    #[test]
    fn test_close_is_idempotent_and_blocks_acquisition() {
        let (pool, _scripted) = new_pool(1, 10, None);
        let address = test_address();

        drop(pool.acquire(&address, AcquireConfig::default()).unwrap());
        pool.close();
        pool.close();
        let res = pool.acquire(&address, AcquireConfig::default());
        assert!(matches!(res, Err(BoltError::InvalidConfig { .. })));
    }
}
