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

use std::collections::{HashMap, VecDeque};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Instant;

use atomic_refcell::AtomicRefCell;
use log::info;
use parking_lot::{Condvar, Mutex, MutexGuard};

use super::PoolConfig;
use crate::address::Address;
use crate::bolt::message_parameters::{
    BeginParameters, HelloParameters, LogonParameters, RouteParameters, TelemetryParameters,
};
use crate::bolt::{self, DynBolt, ResponseCallbacks};
use crate::config::{AuthToken, TransactionConfig};
use crate::error::{BoltError, Result};
use crate::routing::RoutingTable;
use crate::value::{ValueReceive, ValueSend};

type PoolElement = DynBolt;

#[derive(Debug)]
pub(crate) struct InnerPool {
    address: Arc<Address>,
    config: Arc<PoolConfig>,
    synced: Mutex<InnerPoolSyncedData>,
    made_room_condition: Condvar,
}

#[derive(Debug)]
struct InnerPoolSyncedData {
    raw_pool: VecDeque<PoolElement>,
    reservations: usize,
    borrowed: usize,
    /// FIFO ticket queue: the longest-waiting acquisition gets the next
    /// free slot.
    wait_queue: VecDeque<u64>,
    next_ticket: u64,
    /// purged pools destroy released connections instead of keeping them
    active: bool,
}

impl InnerPool {
    fn new(address: Arc<Address>, config: Arc<PoolConfig>) -> Self {
        let raw_pool = VecDeque::with_capacity(config.max_connection_pool_size);
        let synced = Mutex::new(InnerPoolSyncedData {
            raw_pool,
            reservations: 0,
            borrowed: 0,
            wait_queue: VecDeque::new(),
            next_ticket: 0,
            active: true,
        });
        Self {
            address,
            config,
            synced,
            made_room_condition: Condvar::new(),
        }
    }

    fn has_room(&self, synced: &InnerPoolSyncedData) -> bool {
        synced.raw_pool.len() + synced.borrowed + synced.reservations
            < self.config.max_connection_pool_size
    }
}

enum Slot {
    Existing(PoolElement),
    Reservation,
}

#[derive(Debug, Clone)]
pub(crate) struct SimplePool(Arc<InnerPool>);

impl SimplePool {
    pub(crate) fn new(address: Arc<Address>, config: Arc<PoolConfig>) -> Self {
        Self(Arc::new(InnerPool::new(address, config)))
    }

    pub(crate) fn acquire(
        &self,
        deadline: Option<Instant>,
        require_new: bool,
    ) -> Result<PooledBolt> {
        loop {
            match self.acquire_slot(deadline, require_new)? {
                Slot::Existing(connection) => {
                    match self.validate_on_acquire(connection) {
                        Some(connection) => {
                            return Ok(PooledBolt::new(connection, Arc::clone(&self.0)))
                        }
                        None => {
                            // the idle connection was destroyed; its slot is
                            // free again
                            let mut synced = self.synced.lock();
                            synced.borrowed -= 1;
                            self.made_room_condition.notify_all();
                        }
                    }
                }
                Slot::Reservation => return self.acquire_new(deadline),
            }
        }
    }

    /// Fairly obtain either an idle connection or the right to create a new
    /// one, waiting (bounded by `deadline`) when the pool is exhausted.
    fn acquire_slot(&self, deadline: Option<Instant>, require_new: bool) -> Result<Slot> {
        let mut synced = self.synced.lock();
        let ticket = synced.next_ticket;
        synced.next_ticket = synced.next_ticket.wrapping_add(1);
        synced.wait_queue.push_back(ticket);
        loop {
            if synced.wait_queue.front() == Some(&ticket) {
                if !require_new {
                    if let Some(connection) = synced.raw_pool.pop_front() {
                        synced.borrowed += 1;
                        Self::pop_ticket(&mut synced, ticket);
                        self.made_room_condition.notify_all();
                        return Ok(Slot::Existing(connection));
                    }
                } else if !self.has_room(&synced) {
                    // idle connections count against the cap; sacrifice one
                    // to make room for the demanded fresh connection
                    if let Some(mut idle) = synced.raw_pool.pop_front() {
                        idle.close();
                    }
                }
                if self.has_room(&synced) {
                    synced.reservations += 1;
                    Self::pop_ticket(&mut synced, ticket);
                    self.made_room_condition.notify_all();
                    return Ok(Slot::Reservation);
                }
            }
            if let Err(err) = self.wait_for_room(deadline, &mut synced) {
                Self::remove_ticket(&mut synced, ticket);
                return Err(err);
            }
        }
    }

    fn pop_ticket(synced: &mut InnerPoolSyncedData, ticket: u64) {
        let popped = synced.wait_queue.pop_front();
        debug_assert_eq!(popped, Some(ticket));
    }

    fn remove_ticket(synced: &mut InnerPoolSyncedData, ticket: u64) {
        if let Some(position) = synced.wait_queue.iter().position(|t| *t == ticket) {
            synced.wait_queue.remove(position);
        }
    }

    fn wait_for_room(
        &self,
        deadline: Option<Instant>,
        synced: &mut MutexGuard<InnerPoolSyncedData>,
    ) -> Result<()> {
        match deadline {
            None => {
                self.made_room_condition.wait(synced);
                Ok(())
            }
            Some(deadline) => {
                if self
                    .made_room_condition
                    .wait_until(synced, deadline)
                    .timed_out()
                {
                    return Err(self.acquisition_timeout_error(synced));
                }
                Ok(())
            }
        }
    }

    fn acquisition_timeout_error(&self, synced: &InnerPoolSyncedData) -> BoltError {
        BoltError::Timeout {
            message: format!(
                "acquisition of a connection to {} from the pool timed out. \
                 Active conn count = {}, Idle conn count = {}",
                self.address,
                synced.borrowed + synced.reservations,
                synced.raw_pool.len(),
            ),
        }
    }

    /// Validation on acquire: closed, over-age, and optionally
    /// liveness-checked connections are destroyed. This is also where broken
    /// idle connections get evicted, since an idle channel is never read.
    fn validate_on_acquire(&self, mut connection: PoolElement) -> Option<PoolElement> {
        if connection.closed() {
            connection.debug_log(|| String::from("dropping closed idle connection"));
            return None;
        }
        if let Some(max_lifetime) = self.config.max_connection_lifetime {
            if connection.is_older_than(max_lifetime) {
                connection.debug_log(|| String::from("connection reached max lifetime"));
                connection.close();
                return None;
            }
        }
        if let Some(timeout) = self.config.idle_time_before_connection_test {
            if connection.is_idle_for(timeout) {
                connection.debug_log(|| String::from("liveness check"));
                let res = connection
                    .reset()
                    .and_then(|_| connection.write_all())
                    .and_then(|_| connection.read_all());
                if let Err(err) = res {
                    info!("liveness check failed, dropping connection: {err}");
                    return None;
                }
            }
        }
        Some(connection)
    }

    fn acquire_new(&self, deadline: Option<Instant>) -> Result<PooledBolt> {
        let connection = self.open_new();
        let mut synced = self.synced.lock();
        synced.reservations -= 1;
        let connection = match connection {
            Ok(connection) => connection,
            Err(err) => {
                self.made_room_condition.notify_all();
                return Err(err);
            }
        };
        // the creation raced the acquisition timer; keep the resource
        if let Some(deadline) = deadline {
            if Instant::now() > deadline {
                if synced.active {
                    synced.raw_pool.push_back(connection);
                }
                let err = self.acquisition_timeout_error(&synced);
                self.made_room_condition.notify_all();
                return Err(err);
            }
        }
        synced.borrowed += 1;
        Ok(PooledBolt::new(connection, Arc::clone(&self.0)))
    }

    fn open_new(&self) -> Result<PoolElement> {
        let stream = BoltError::wrap_connect((self.config.connector)(&self.address))?;
        let mut connection = bolt::open(
            stream,
            Arc::clone(&self.address),
            None,
            &self.config.version_offer,
            self.config.integer_policy,
        )?;
        connection.hello(HelloParameters::new(
            &self.config.user_agent,
            &self.config.auth,
            self.config.routing_context.as_ref(),
            self.config.notification_filter.as_ref(),
        ))?;
        if connection.supports_reauth() {
            connection.logon(
                LogonParameters::new(&self.config.auth),
                ResponseCallbacks::new().with_on_failure(Err),
            )?;
        }
        connection.write_all()?;
        connection.read_all()?;
        Ok(connection)
    }

    pub(crate) fn in_use(&self) -> usize {
        let synced = self.synced.lock();
        synced.borrowed + synced.reservations
    }

    pub(crate) fn idle(&self) -> usize {
        let synced = self.synced.lock();
        synced.raw_pool.len()
    }

    /// Destroy all idle connections and mark the pool inactive: later
    /// releases destroy their connection instead of pooling it.
    pub(crate) fn purge(&self) {
        let mut purged = {
            let mut synced = self.synced.lock();
            synced.active = false;
            std::mem::take(&mut synced.raw_pool)
        };
        for connection in purged.iter_mut() {
            connection.close();
        }
        self.made_room_condition.notify_all();
    }

    fn release(inner_pool: &Arc<InnerPool>, mut connection: PoolElement) {
        let mut synced = inner_pool.synced.lock();
        synced.borrowed -= 1;
        if connection.needs_reset() {
            let res = connection
                .reset()
                .and_then(|_| connection.write_all())
                .and_then(|_| connection.read_all());
            if res.is_err() {
                info!("ignoring failure during reset, dropping connection");
            }
        }
        if synced.active && !connection.closed() {
            synced.raw_pool.push_back(connection);
        }
        inner_pool.made_room_condition.notify_all();
    }
}

impl Deref for SimplePool {
    type Target = InnerPool;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// A connection borrowed from the pool. Exclusively owned while held;
/// dropping it returns the connection (validated) to the pool.
#[derive(Debug)]
pub struct PooledBolt {
    pool: Arc<InnerPool>,
    bolt: Option<PoolElement>,
}

impl PooledBolt {
    fn new(bolt: PoolElement, pool: Arc<InnerPool>) -> Self {
        Self {
            pool,
            bolt: Some(bolt),
        }
    }
}

impl PooledBolt {
    /// The Bolt version negotiated for this connection.
    pub fn protocol_version(&self) -> (u8, u8) {
        self.deref().protocol_version()
    }

    pub fn server_agent(&self) -> Arc<String> {
        self.deref().server_agent()
    }

    pub fn address(&self) -> Arc<Address> {
        self.deref().address()
    }

    /// Open an explicit transaction. Completes once the server confirmed
    /// BEGIN.
    pub fn begin(&mut self, config: &TransactionConfig) -> Result<()> {
        let parameters = BeginParameters::new(
            (!config.bookmarks.is_empty()).then_some(config.bookmarks.as_slice()),
            config.tx_timeout,
            (!config.tx_metadata.is_empty()).then_some(&config.tx_metadata),
            config.mode.as_protocol_str(),
            config.db.as_deref(),
            config.imp_user.as_deref(),
            config.notification_filter.as_ref(),
        );
        self.deref_mut()
            .begin(parameters, ResponseCallbacks::new().with_on_failure(Err))?;
        self.deref_mut().write_all()?;
        self.deref_mut().read_all()
    }

    /// Commit the open transaction; yields the bookmark the server handed
    /// out, if any.
    pub fn commit(&mut self) -> Result<Option<String>> {
        let bookmark: Arc<AtomicRefCell<Option<String>>> = Default::default();
        let callbacks = {
            let bookmark = Arc::clone(&bookmark);
            ResponseCallbacks::new()
                .with_on_failure(Err)
                .with_on_success(move |mut meta| {
                    if let Some(ValueReceive::String(bm)) = meta.remove("bookmark") {
                        *bookmark.borrow_mut() = Some(bm);
                    }
                    Ok(())
                })
        };
        self.deref_mut().commit(callbacks)?;
        self.deref_mut().write_all()?;
        self.deref_mut().read_all()?;
        let bookmark = bookmark.borrow_mut().take();
        Ok(bookmark)
    }

    pub fn rollback(&mut self) -> Result<()> {
        self.deref_mut().rollback()?;
        self.deref_mut().write_all()?;
        self.deref_mut().read_all()
    }

    /// Abort all in-progress work on the connection (protocol-level RESET).
    pub fn reset(&mut self) -> Result<()> {
        self.deref_mut().reset()?;
        self.deref_mut().write_all()?;
        self.deref_mut().read_all()
    }

    /// Fetch the raw routing table.
    pub fn route(
        &mut self,
        routing_context: &HashMap<String, ValueSend>,
        bookmarks: Option<&[String]>,
        db: Option<&str>,
        imp_user: Option<&str>,
    ) -> Result<RoutingTable> {
        let captured: Arc<AtomicRefCell<Option<crate::bolt::BoltMeta>>> = Default::default();
        let callbacks = {
            let captured = Arc::clone(&captured);
            ResponseCallbacks::new()
                .with_on_failure(Err)
                .with_on_success(move |meta| {
                    *captured.borrow_mut() = Some(meta);
                    Ok(())
                })
        };
        let parameters = RouteParameters::new(routing_context, bookmarks, db, imp_user);
        self.deref_mut().route(parameters, callbacks)?;
        self.deref_mut().write_all()?;
        self.deref_mut().read_all()?;
        let meta = captured.borrow_mut().take().ok_or_else(|| {
            BoltError::protocol_error("ROUTE completed without SUCCESS metadata")
        })?;
        RoutingTable::try_parse(meta)
    }

    /// Report which driver API drove this connection (Bolt >= 5.4).
    pub fn telemetry(&mut self, api: i64) -> Result<()> {
        self.deref_mut().telemetry(
            TelemetryParameters::new(api),
            ResponseCallbacks::new().with_on_failure(Err),
        )?;
        self.deref_mut().write_all()?;
        self.deref_mut().read_all()
    }

    /// Switch the connection to different credentials (Bolt >= 5.1).
    pub fn reauth(&mut self, auth: AuthToken) -> Result<()> {
        let auth = Arc::new(auth);
        self.deref_mut()
            .logoff(ResponseCallbacks::new().with_on_failure(Err))?;
        self.deref_mut().logon(
            LogonParameters::new(&auth),
            ResponseCallbacks::new().with_on_failure(Err),
        )?;
        self.deref_mut().write_all()?;
        self.deref_mut().read_all()
    }
}

impl Drop for PooledBolt {
    fn drop(&mut self) {
        let bolt = self
            .bolt
            .take()
            .expect("bolt option should be Some from init to drop");
        SimplePool::release(&self.pool, bolt);
    }
}

impl Deref for PooledBolt {
    type Target = DynBolt;

    fn deref(&self) -> &Self::Target {
        self.bolt
            .as_ref()
            .expect("bolt option should be Some from init to drop")
    }
}

impl DerefMut for PooledBolt {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.bolt
            .as_mut()
            .expect("bolt option should be Some from init to drop")
    }
}
