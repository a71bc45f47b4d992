//! Keyed connection pool.
//!
//! Connections are keyed by (scheme, host, port). Each key tracks an idle
//! stack, a count of active connections, and a queue of waiters. The lock is
//! a plain mutex held only for map surgery; no I/O or awaiting happens under
//! it. Capacity moves between tasks as a [`Grant`]: releasing a reusable
//! connection hands it straight to the oldest waiter, and releasing a dead
//! one hands the waiter a permit to dial a replacement, so a saturated key
//! never strands its queue.

use std::collections::{HashMap, VecDeque};
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tokio::sync::oneshot;
use url::Url;

use crate::client::stats::PoolStats;
use crate::config::HttpConfig;
use crate::error::{HttpError, Result};
use crate::protocols::H1Connection;

/// Identity of a pooled connection's target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct PoolKey {
    scheme: String,
    host: String,
    port: u16,
}

impl PoolKey {
    pub(crate) fn from_url(url: &Url) -> Result<Self> {
        let host = url
            .host_str()
            .ok_or_else(|| HttpError::invalid_request("url has no host"))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| HttpError::invalid_request("url has no port"))?;
        Ok(Self {
            scheme: url.scheme().to_string(),
            host: host.to_ascii_lowercase(),
            port,
        })
    }
}

/// Outcome of a checkout: either a live connection or the right to dial one.
pub(crate) enum Checkout {
    Reused(PooledConn),
    Permit(Permit),
}

impl std::fmt::Debug for Checkout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Checkout::Reused(_) => f.write_str("Checkout::Reused"),
            Checkout::Permit(_) => f.write_str("Checkout::Permit"),
        }
    }
}

/// What a released slot hands to a waiter: a live connection or a permit to
/// dial a replacement. The grant owns the slot it carries; if the waiter is
/// gone before claiming it (cancelled between the send and its next poll),
/// dropping the grant puts the slot back instead of leaking it.
struct Grant {
    kind: Option<GrantKind>,
    key: PoolKey,
    pool: Arc<ConnectionPool>,
}

enum GrantKind {
    Conn(H1Connection),
    Permit,
}

impl Grant {
    fn claim(mut self) -> GrantKind {
        match self.kind.take() {
            Some(kind) => kind,
            None => unreachable!("grant claimed twice"),
        }
    }
}

impl Drop for Grant {
    fn drop(&mut self) {
        match self.kind.take() {
            Some(GrantKind::Conn(conn)) => self.pool.park(&self.key, conn),
            Some(GrantKind::Permit) => self.pool.slot_freed(&self.key, false),
            None => {}
        }
    }
}

/// What one pass over the key state yields while the lock is held. A popped
/// idle connection is probed only after the guard drops.
enum Acquired {
    Probe(H1Connection),
    Dial,
    Wait(oneshot::Receiver<Grant>),
}

/// The right to dial one new connection for a key. Counts against the key's
/// active cap from the moment it is issued; dropping it unfulfilled returns
/// the slot.
pub(crate) struct Permit {
    key: Option<PoolKey>,
    pool: Arc<ConnectionPool>,
}

impl Permit {
    /// Turn a freshly dialed connection into a pooled one.
    pub(crate) fn fulfill(mut self, conn: H1Connection) -> PooledConn {
        let key = match self.key.take() {
            Some(key) => key,
            None => unreachable!("permit fulfilled twice"),
        };
        self.pool.counters.created.fetch_add(1, Ordering::Relaxed);
        PooledConn {
            conn: Some(conn),
            key,
            pool: Arc::clone(&self.pool),
        }
    }
}

impl Drop for Permit {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.pool.slot_freed(&key, false);
        }
    }
}

/// A checked-out connection. Counts as active until released or dropped;
/// dropping without an explicit release closes the connection, so a timed-out
/// or cancelled exchange can never leak a pool slot.
pub(crate) struct PooledConn {
    conn: Option<H1Connection>,
    key: PoolKey,
    pool: Arc<ConnectionPool>,
}

impl PooledConn {
    /// Hand the connection back. Reusable connections go to a waiter or the
    /// idle stack; poisoned ones are closed and their slot freed.
    pub(crate) fn release(mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(&self.key, conn);
        }
    }
}

impl Deref for PooledConn {
    type Target = H1Connection;

    fn deref(&self) -> &H1Connection {
        match &self.conn {
            Some(conn) => conn,
            None => unreachable!("connection accessed after release"),
        }
    }
}

impl DerefMut for PooledConn {
    fn deref_mut(&mut self) -> &mut H1Connection {
        match &mut self.conn {
            Some(conn) => conn,
            None => unreachable!("connection accessed after release"),
        }
    }
}

impl Drop for PooledConn {
    fn drop(&mut self) {
        if self.conn.take().is_some() {
            self.pool.slot_freed(&self.key, true);
        }
    }
}

#[derive(Default)]
struct KeyState {
    /// LIFO: the most recently parked connection is the warmest.
    idle: Vec<H1Connection>,
    active: usize,
    waiters: VecDeque<oneshot::Sender<Grant>>,
}

#[derive(Default)]
pub(crate) struct PoolCounters {
    pub checkouts: AtomicU64,
    pub created: AtomicU64,
    pub reused: AtomicU64,
    pub releases: AtomicU64,
    pub closes: AtomicU64,
    pub evicted_idle: AtomicU64,
}

pub(crate) struct ConnectionPool {
    keys: Mutex<HashMap<PoolKey, KeyState>>,
    max_per_host: usize,
    max_idle_per_host: usize,
    idle_timeout: Duration,
    acquire_timeout: Option<Duration>,
    counters: PoolCounters,
}

impl ConnectionPool {
    /// Build the pool and start its background idle sweep. The sweep task
    /// holds only a `Weak`, so dropping the last client tears it down.
    pub(crate) fn new(config: &HttpConfig) -> Arc<Self> {
        let pool = Arc::new(Self {
            keys: Mutex::new(HashMap::new()),
            max_per_host: config.pool_max_per_host,
            max_idle_per_host: config.pool_max_idle_per_host,
            idle_timeout: config.pool_idle_timeout,
            acquire_timeout: config.pool_acquire_timeout,
            counters: PoolCounters::default(),
        });

        let weak = Arc::downgrade(&pool);
        let sweep_every = (config.pool_idle_timeout / 4)
            .clamp(Duration::from_secs(1), Duration::from_secs(30));
        tokio::spawn(sweep_loop(weak, sweep_every));

        pool
    }

    /// Acquire capacity for the key: a healthy idle connection, a permit to
    /// dial, or a place in the wait queue.
    pub(crate) async fn checkout(self: &Arc<Self>, key: PoolKey) -> Result<Checkout> {
        self.counters.checkouts.fetch_add(1, Ordering::Relaxed);

        let rx = loop {
            let acquired = {
                let mut keys = lock(&self.keys);
                let state = keys.entry(key.clone()).or_default();
                if let Some(conn) = state.idle.pop() {
                    // The slot is reserved here; the health probe runs after
                    // the guard drops so no I/O happens under the lock.
                    state.active += 1;
                    Acquired::Probe(conn)
                } else if state.active < self.max_per_host {
                    state.active += 1;
                    Acquired::Dial
                } else {
                    let (tx, rx) = oneshot::channel();
                    state.waiters.push_back(tx);
                    Acquired::Wait(rx)
                }
            };

            match acquired {
                Acquired::Probe(conn) => {
                    if conn.is_pooled_healthy() {
                        self.counters.reused.fetch_add(1, Ordering::Relaxed);
                        return Ok(Checkout::Reused(PooledConn {
                            conn: Some(conn),
                            key,
                            pool: Arc::clone(self),
                        }));
                    }
                    // Died while parked; close it silently and try the next.
                    drop(conn);
                    self.slot_freed(&key, true);
                }
                Acquired::Dial => {
                    return Ok(Checkout::Permit(Permit {
                        key: Some(key),
                        pool: Arc::clone(self),
                    }));
                }
                Acquired::Wait(rx) => break rx,
            }
        };

        let grant = match self.acquire_timeout {
            Some(timeout) => match tokio::time::timeout(timeout, rx).await {
                Ok(result) => result.map_err(|_| HttpError::Cancelled)?,
                Err(_) => return Err(HttpError::QueueTimeout),
            },
            None => rx.await.map_err(|_| HttpError::Cancelled)?,
        };

        match grant.claim() {
            GrantKind::Conn(conn) => {
                self.counters.reused.fetch_add(1, Ordering::Relaxed);
                Ok(Checkout::Reused(PooledConn {
                    conn: Some(conn),
                    key,
                    pool: Arc::clone(self),
                }))
            }
            GrantKind::Permit => Ok(Checkout::Permit(Permit {
                key: Some(key),
                pool: Arc::clone(self),
            })),
        }
    }

    /// Return a connection after a completed exchange.
    fn release(self: &Arc<Self>, key: &PoolKey, conn: H1Connection) {
        self.counters.releases.fetch_add(1, Ordering::Relaxed);

        if !conn.is_reusable() {
            drop(conn);
            self.slot_freed(key, true);
            return;
        }
        self.park(key, conn);
    }

    /// Hand a live connection to the oldest waiter still listening, else park
    /// it on the idle stack. The active slot travels with the connection.
    fn park(self: &Arc<Self>, key: &PoolKey, mut conn: H1Connection) {
        let mut keys = lock(&self.keys);
        let Some(state) = keys.get_mut(key) else {
            self.counters.closes.fetch_add(1, Ordering::Relaxed);
            return;
        };

        // A send failure returns the grant, so an abandoned waiter costs
        // nothing. The grant is defused before it drops here, since its own
        // cleanup would retake the lock.
        while let Some(waiter) = state.waiters.pop_front() {
            let grant = Grant {
                kind: Some(GrantKind::Conn(conn)),
                key: key.clone(),
                pool: Arc::clone(self),
            };
            match waiter.send(grant) {
                Ok(()) => return,
                Err(returned) => {
                    conn = match returned.claim() {
                        GrantKind::Conn(conn) => conn,
                        GrantKind::Permit => unreachable!("parking never grants permits"),
                    };
                }
            }
        }

        state.active = state.active.saturating_sub(1);
        if state.idle.len() < self.max_idle_per_host {
            conn.touch();
            state.idle.push(conn);
        } else {
            self.counters.closes.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Free one active slot for the key, waking a waiter with a dial permit
    /// if any are queued. `closed` distinguishes a closed connection from a
    /// dial that never produced one.
    fn slot_freed(self: &Arc<Self>, key: &PoolKey, closed: bool) {
        if closed {
            self.counters.closes.fetch_add(1, Ordering::Relaxed);
        }

        let mut keys = lock(&self.keys);
        let Some(state) = keys.get_mut(key) else {
            return;
        };

        while let Some(waiter) = state.waiters.pop_front() {
            let grant = Grant {
                kind: Some(GrantKind::Permit),
                key: key.clone(),
                pool: Arc::clone(self),
            };
            if let Err(returned) = waiter.send(grant) {
                let _ = returned.claim();
                continue;
            }
            return;
        }
        state.active = state.active.saturating_sub(1);
        if state.active == 0 && state.idle.is_empty() {
            keys.remove(key);
        }
    }

    /// Evict idle connections older than the idle timeout.
    fn sweep(&self) {
        let now = std::time::Instant::now();
        let mut evicted = 0u64;
        let mut keys = lock(&self.keys);
        keys.retain(|_, state| {
            state.idle.retain(|conn| {
                let keep = now.duration_since(conn.idle_since()) < self.idle_timeout;
                if !keep {
                    evicted += 1;
                }
                keep
            });
            state.active > 0 || !state.idle.is_empty() || !state.waiters.is_empty()
        });
        drop(keys);
        if evicted > 0 {
            self.counters.evicted_idle.fetch_add(evicted, Ordering::Relaxed);
            self.counters.closes.fetch_add(evicted, Ordering::Relaxed);
            tracing::debug!(evicted, "swept idle connections");
        }
    }

    /// Point-in-time counters plus live idle/active totals.
    pub(crate) fn stats(&self) -> PoolStats {
        let (idle, active) = {
            let keys = lock(&self.keys);
            keys.values()
                .fold((0, 0), |(i, a), s| (i + s.idle.len(), a + s.active))
        };
        PoolStats {
            checkouts: self.counters.checkouts.load(Ordering::Relaxed),
            connections_created: self.counters.created.load(Ordering::Relaxed),
            connections_reused: self.counters.reused.load(Ordering::Relaxed),
            releases: self.counters.releases.load(Ordering::Relaxed),
            closes: self.counters.closes.load(Ordering::Relaxed),
            evicted_idle: self.counters.evicted_idle.load(Ordering::Relaxed),
            idle,
            active,
        }
    }
}

async fn sweep_loop(pool: Weak<ConnectionPool>, every: Duration) {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        let Some(pool) = pool.upgrade() else {
            return;
        };
        pool.sweep();
    }
}

/// Mutex poisoning only happens if a panic escaped while holding the lock;
/// the map is still structurally sound, so keep going with it.
fn lock(mutex: &Mutex<HashMap<PoolKey, KeyState>>) -> std::sync::MutexGuard<'_, HashMap<PoolKey, KeyState>> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
