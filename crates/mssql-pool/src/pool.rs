//! Connection pool implementation.
//!
//! Checkout prefers the most-recently-idle connection (LIFO, for cache
//! locality). A request that finds the pool at capacity waits on a
//! [`tokio::sync::Notify`] until a slot frees up or `connection_timeout`
//! elapses. A background reaper closes idle connections that outlive
//! `idle_timeout` and keeps at least `min_connections` warm.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use mssql_client::{Client, Config, Ready};
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::config::PoolConfig;
use crate::error::PoolError;
use crate::lifecycle::ConnectionMetadata;

/// A connection pool for SQL Server.
///
/// The pool manages a bounded set of [`Client<Ready>`] connections,
/// reusing idle ones, warming a minimum idle count in the background,
/// and evicting connections that fail validation or outlive
/// `idle_timeout`.
pub struct Pool {
    client_config: Config,
    pool_config: PoolConfig,
    inner: Arc<PoolInner>,
    reaper: Option<JoinHandle<()>>,
}

struct PoolInner {
    state: Mutex<PoolState>,
    notify: Notify,
    next_id: AtomicU64,
    metrics: PoolMetricsInner,
}

struct PoolState {
    idle: Vec<IdleConn>,
    active: u32,
    closed: bool,
}

struct IdleConn {
    client: Client<Ready>,
    metadata: ConnectionMetadata,
    idle_since: Instant,
}

#[derive(Default)]
struct PoolMetricsInner {
    connections_created: AtomicU64,
    connections_closed: AtomicU64,
    checkouts_successful: AtomicU64,
    checkouts_failed: AtomicU64,
}

impl Pool {
    /// Start building a pool from a [`PoolBuilder`].
    #[must_use]
    pub fn builder() -> PoolBuilder {
        PoolBuilder::new()
    }

    /// Create a pool with an explicit [`PoolConfig`] and connection
    /// [`Config`], warming `min_connections` connections in the
    /// background before returning.
    pub async fn new(pool_config: PoolConfig, client_config: Config) -> Result<Self, PoolError> {
        pool_config.validate()?;

        let inner = Arc::new(PoolInner {
            state: Mutex::new(PoolState {
                idle: Vec::new(),
                active: 0,
                closed: false,
            }),
            notify: Notify::new(),
            next_id: AtomicU64::new(1),
            metrics: PoolMetricsInner::default(),
        });

        let reaper = spawn_reaper(inner.clone(), client_config.clone(), pool_config.clone());

        let pool = Self {
            client_config,
            pool_config,
            inner,
            reaper: Some(reaper),
        };

        pool.ensure_minimum_idle().await;
        Ok(pool)
    }

    /// Acquire a connection, waiting up to `connection_timeout` if the
    /// pool is at capacity.
    ///
    /// Checkout order: pop the most-recently-idle connection if one
    /// exists; otherwise, if `active < max_connections`, reserve a slot
    /// and create a new connection; otherwise wait for a release.
    pub async fn get(&self) -> Result<PooledConnection<'_>, PoolError> {
        let deadline = Instant::now() + self.pool_config.connection_timeout;
        loop {
            if self.inner.is_closed() {
                self.inner.metrics.checkouts_failed.fetch_add(1, Ordering::Relaxed);
                return Err(PoolError::PoolClosed);
            }

            if let Some(reserved) = self.inner.try_checkout(self.pool_config.max_connections) {
                match self.materialize(reserved).await {
                    Ok(conn) => {
                        self.inner.metrics.checkouts_successful.fetch_add(1, Ordering::Relaxed);
                        return Ok(conn);
                    }
                    Err(PoolError::ValidationFailed(reason)) => {
                        // The slot and broken connection were already freed by
                        // `materialize`; retry the checkout against the same
                        // deadline instead of failing the caller for a
                        // connection-local problem.
                        tracing::warn!(reason = %reason, "pool validation failed on checkout, retrying");
                        if Instant::now() >= deadline {
                            self.inner.metrics.checkouts_failed.fetch_add(1, Ordering::Relaxed);
                            return Err(PoolError::Timeout);
                        }
                        continue;
                    }
                    Err(e) => {
                        self.inner.metrics.checkouts_failed.fetch_add(1, Ordering::Relaxed);
                        return Err(e);
                    }
                }
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                self.inner.metrics.checkouts_failed.fetch_add(1, Ordering::Relaxed);
                return Err(PoolError::Timeout);
            }

            let notified = self.inner.notify.notified();
            tokio::select! {
                () = notified => {}
                () = tokio::time::sleep(remaining) => {
                    self.inner.metrics.checkouts_failed.fetch_add(1, Ordering::Relaxed);
                    return Err(PoolError::Timeout);
                }
            }
        }
    }

    /// Acquire a connection without waiting.
    ///
    /// Returns `Ok(None)` immediately if no idle connection is available,
    /// without blocking to create a new one.
    pub fn try_get(&self) -> Result<Option<PooledConnection<'_>>, PoolError> {
        if self.inner.is_closed() {
            self.inner.metrics.checkouts_failed.fetch_add(1, Ordering::Relaxed);
            return Err(PoolError::PoolClosed);
        }

        let mut state = self.inner.state.lock();
        let Some(idle) = state.idle.pop() else {
            return Ok(None);
        };
        state.active += 1;
        drop(state);

        let mut metadata = idle.metadata;
        metadata.mark_checkout();
        self.inner.metrics.checkouts_successful.fetch_add(1, Ordering::Relaxed);
        Ok(Some(PooledConnection {
            pool: &self.inner,
            client: Some(idle.client),
            metadata,
            broken: false,
        }))
    }

    /// Run `op` with a checked-out connection, returning it to the pool
    /// afterwards regardless of `op`'s outcome.
    pub async fn with_connection<F, Fut, T>(&self, op: F) -> Result<T, PoolError>
    where
        F: FnOnce(&mut Client<Ready>) -> Fut,
        Fut: std::future::Future<Output = Result<T, PoolError>>,
    {
        let mut conn = self.get().await?;
        op(&mut conn).await
    }

    /// Current pool occupancy.
    #[must_use]
    pub fn status(&self) -> PoolStatus {
        let state = self.inner.state.lock();
        PoolStatus {
            available: state.idle.len() as u32,
            in_use: state.active,
            total: state.active + state.idle.len() as u32,
            max: self.pool_config.max_connections,
        }
    }

    /// Lifetime checkout/creation counters.
    #[must_use]
    pub fn metrics(&self) -> PoolMetrics {
        PoolMetrics {
            connections_created: self.inner.metrics.connections_created.load(Ordering::Relaxed),
            connections_closed: self.inner.metrics.connections_closed.load(Ordering::Relaxed),
            checkouts_successful: self.inner.metrics.checkouts_successful.load(Ordering::Relaxed),
            checkouts_failed: self.inner.metrics.checkouts_failed.load(Ordering::Relaxed),
        }
    }

    /// Flip the shutdown flag and close every idle connection. Connections
    /// currently checked out are closed as they are released (see
    /// [`PoolInner::release`]) rather than being forcibly interrupted.
    pub async fn close(&self) {
        let idle = {
            let mut state = self.inner.state.lock();
            state.closed = true;
            std::mem::take(&mut state.idle)
        };
        self.inner.notify.notify_waiters();

        for conn in idle {
            self.inner.metrics.connections_closed.fetch_add(1, Ordering::Relaxed);
            let _ = conn.client.close().await;
        }
    }

    /// Alias for [`Pool::close`] matching the core's "graceful shutdown"
    /// terminology.
    pub async fn shutdown_gracefully(&self) {
        self.close().await;
    }

    /// Whether [`Pool::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// The connection configuration this pool dials with.
    #[must_use]
    pub fn client_config(&self) -> &Config {
        &self.client_config
    }

    /// The pool's sizing/timeout configuration.
    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.pool_config
    }

    async fn materialize(&self, reserved: Reserved) -> Result<PooledConnection<'_>, PoolError> {
        let (mut client, mut metadata) = match reserved {
            Reserved::Idle(idle) => (idle.client, idle.metadata),
            Reserved::NewSlot => {
                let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
                let client = match Client::connect(self.client_config.clone()).await {
                    Ok(client) => client,
                    Err(e) => {
                        self.inner.release_slot();
                        return Err(PoolError::ConnectionCreation(e.to_string()));
                    }
                };
                self.inner.metrics.connections_created.fetch_add(1, Ordering::Relaxed);
                (client, ConnectionMetadata::new(id))
            }
        };

        if self.pool_config.test_on_checkout {
            if let Err(e) = validate(&mut client, &self.pool_config).await {
                self.inner.release_slot();
                let _ = client.close().await;
                self.inner.metrics.connections_closed.fetch_add(1, Ordering::Relaxed);
                return Err(e);
            }
        }

        metadata.mark_checkout();
        Ok(PooledConnection {
            pool: &self.inner,
            client: Some(client),
            metadata,
            broken: false,
        })
    }

    async fn ensure_minimum_idle(&self) {
        ensure_minimum_idle(&self.inner, &self.client_config, &self.pool_config).await;
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        if let Some(handle) = self.reaper.take() {
            handle.abort();
        }
    }
}

enum Reserved {
    Idle(IdleConn),
    NewSlot,
}

impl PoolInner {
    fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Pop an idle connection, or reserve a slot for a new one if under
    /// capacity. Returns `None` if the pool is at capacity with no idle
    /// connections (the caller should wait).
    fn try_checkout(&self, max: u32) -> Option<Reserved> {
        let mut state = self.state.lock();
        if let Some(idle) = state.idle.pop() {
            state.active += 1;
            return Some(Reserved::Idle(idle));
        }
        if state.active + state.idle.len() as u32 < max {
            state.active += 1;
            return Some(Reserved::NewSlot);
        }
        None
    }

    /// Undo a reservation that failed before a connection was produced.
    fn release_slot(&self) {
        let mut state = self.state.lock();
        state.active = state.active.saturating_sub(1);
        drop(state);
        self.notify.notify_one();
    }

    /// Called by [`PooledConnection`]'s `Drop`/`detach`.
    fn release(&self, client: Client<Ready>, mut metadata: ConnectionMetadata, healthy: bool) {
        let mut state = self.state.lock();
        state.active = state.active.saturating_sub(1);

        if state.closed || !healthy {
            drop(state);
            self.metrics.connections_closed.fetch_add(1, Ordering::Relaxed);
            tokio::spawn(async move {
                let _ = client.close().await;
            });
        } else {
            metadata.mark_checkin();
            state.idle.push(IdleConn {
                client,
                metadata,
                idle_since: Instant::now(),
            });
        }
        self.notify.notify_one();
    }
}

async fn validate(client: &mut Client<Ready>, pool_config: &PoolConfig) -> Result<(), PoolError> {
    client
        .query(pool_config.health_check_query.as_ref(), &[])
        .await
        .map_err(|e| PoolError::ValidationFailed(e.to_string()))?;
    Ok(())
}

async fn ensure_minimum_idle(
    inner: &Arc<PoolInner>,
    client_config: &Config,
    pool_config: &PoolConfig,
) {
    loop {
        let should_create = {
            let mut state = inner.state.lock();
            if state.closed {
                return;
            }
            let total = state.active + state.idle.len() as u32;
            if state.idle.len() as u32 >= pool_config.min_connections
                || total >= pool_config.max_connections
            {
                false
            } else {
                state.active += 1;
                true
            }
        };

        if !should_create {
            return;
        }

        let id = inner.next_id.fetch_add(1, Ordering::Relaxed);
        match Client::connect(client_config.clone()).await {
            Ok(client) => {
                inner.metrics.connections_created.fetch_add(1, Ordering::Relaxed);
                let mut state = inner.state.lock();
                state.active = state.active.saturating_sub(1);
                if state.closed {
                    drop(state);
                    tokio::spawn(async move {
                        let _ = client.close().await;
                    });
                    return;
                }
                state.idle.push(IdleConn {
                    client,
                    metadata: ConnectionMetadata::new(id),
                    idle_since: Instant::now(),
                });
                drop(state);
                inner.notify.notify_one();
            }
            Err(_) => {
                inner.release_slot();
                return;
            }
        }
    }
}

fn spawn_reaper(
    inner: Arc<PoolInner>,
    client_config: Config,
    pool_config: PoolConfig,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let tick = pool_config
            .idle_timeout
            .min(pool_config.health_check_interval)
            .max(Duration::from_millis(50));
        let mut interval = tokio::time::interval(tick);
        loop {
            interval.tick().await;

            let expired: Vec<IdleConn> = {
                let mut state = inner.state.lock();
                if state.closed {
                    return;
                }
                let idle_timeout = pool_config.idle_timeout;
                let (keep, expired): (Vec<_>, Vec<_>) = state
                    .idle
                    .drain(..)
                    .partition(|c| c.idle_since.elapsed() < idle_timeout);
                state.idle = keep;
                expired
            };

            for conn in expired {
                inner.metrics.connections_closed.fetch_add(1, Ordering::Relaxed);
                let _ = conn.client.close().await;
            }

            ensure_minimum_idle(&inner, &client_config, &pool_config).await;
        }
    })
}

/// Builder for [`Pool`].
#[derive(Default)]
pub struct PoolBuilder {
    client_config: Option<Config>,
    pool_config: PoolConfig,
}

impl PoolBuilder {
    /// Start from default [`PoolConfig`] values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            client_config: None,
            pool_config: PoolConfig::default(),
        }
    }

    /// Set the connection configuration used to dial new connections.
    #[must_use]
    pub fn client_config(mut self, config: Config) -> Self {
        self.client_config = Some(config);
        self
    }

    /// Set the minimum number of idle connections to keep warm.
    #[must_use]
    pub fn min_connections(mut self, count: u32) -> Self {
        self.pool_config = self.pool_config.min_connections(count);
        self
    }

    /// Set the maximum number of connections allowed.
    #[must_use]
    pub fn max_connections(mut self, count: u32) -> Self {
        self.pool_config = self.pool_config.max_connections(count);
        self
    }

    /// Set the checkout wait timeout.
    #[must_use]
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.pool_config = self.pool_config.connection_timeout(timeout);
        self
    }

    /// Set how long a connection may sit idle before it is closed.
    #[must_use]
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.pool_config = self.pool_config.idle_timeout(timeout);
        self
    }

    /// Set a custom validation query run on checkout (empty/disabled via
    /// [`PoolBuilder::test_on_checkout`]).
    #[must_use]
    pub fn validation_query(mut self, query: impl Into<Arc<str>>) -> Self {
        self.pool_config = self.pool_config.health_check_query(query);
        self
    }

    /// Enable or disable running the validation query on checkout.
    #[must_use]
    pub fn test_on_checkout(mut self, enabled: bool) -> Self {
        self.pool_config = self.pool_config.test_on_checkout(enabled);
        self
    }

    /// Finish building, returning a ready-to-use pool with
    /// `min_connections` warmed in the background.
    pub async fn build(self) -> Result<Pool, PoolError> {
        let client_config = self
            .client_config
            .ok_or_else(|| PoolError::Configuration("client_config is required".into()))?;
        Pool::new(self.pool_config, client_config).await
    }
}

/// Current occupancy snapshot.
#[derive(Debug, Clone, Copy)]
pub struct PoolStatus {
    /// Number of idle connections available.
    pub available: u32,
    /// Number of connections currently checked out.
    pub in_use: u32,
    /// Total number of connections (idle + in use).
    pub total: u32,
    /// Maximum allowed connections.
    pub max: u32,
}

impl PoolStatus {
    /// Percentage of `max` currently in use, in `[0.0, 100.0]`.
    #[must_use]
    pub fn utilization(&self) -> f64 {
        if self.max == 0 {
            0.0
        } else {
            (f64::from(self.in_use) / f64::from(self.max)) * 100.0
        }
    }
}

/// Lifetime pool counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct PoolMetrics {
    /// Total connections created since the pool started.
    pub connections_created: u64,
    /// Total connections closed (broken, idle-expired, or on shutdown).
    pub connections_closed: u64,
    /// Total successful checkouts.
    pub checkouts_successful: u64,
    /// Total failed checkouts (timeout or pool closed).
    pub checkouts_failed: u64,
}

impl PoolMetrics {
    /// Fraction of checkouts that succeeded, in `[0.0, 1.0]`.
    ///
    /// Returns `1.0` when no checkouts have been attempted yet.
    #[must_use]
    pub fn checkout_success_rate(&self) -> f64 {
        let total = self.checkouts_successful + self.checkouts_failed;
        if total == 0 {
            1.0
        } else {
            self.checkouts_successful as f64 / total as f64
        }
    }
}

/// A connection checked out of the pool.
///
/// Returned to the pool's idle list on `Drop` unless [`PooledConnection::detach`]
/// was called or the connection was flagged broken via
/// [`PooledConnection::mark_broken`], in which case it is closed instead.
pub struct PooledConnection<'a> {
    pool: &'a PoolInner,
    client: Option<Client<Ready>>,
    metadata: ConnectionMetadata,
    broken: bool,
}

impl PooledConnection<'_> {
    /// Metadata the pool tracks for this connection (id, checkout count,
    /// timestamps).
    #[must_use]
    pub fn metadata(&self) -> &ConnectionMetadata {
        &self.metadata
    }

    /// Detach the connection from the pool: it is not returned on
    /// `Drop` and no longer counts against the pool's active total.
    pub fn detach(mut self) -> Option<Client<Ready>> {
        let client = self.client.take();
        if client.is_some() {
            self.pool.release_slot();
        }
        client
    }

    /// Flag this connection as broken so it is closed instead of
    /// returned to the idle list when dropped.
    pub fn mark_broken(&mut self) {
        self.broken = true;
    }
}

impl std::ops::Deref for PooledConnection<'_> {
    type Target = Client<Ready>;
    fn deref(&self) -> &Self::Target {
        self.client.as_ref().expect("connection taken by detach()")
    }
}

impl std::ops::DerefMut for PooledConnection<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.client.as_mut().expect("connection taken by detach()")
    }
}

impl Drop for PooledConnection<'_> {
    fn drop(&mut self) {
        if let Some(client) = self.client.take() {
            self.pool.release(client, self.metadata.clone(), !self.broken);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn pool_status_utilization() {
        let status = PoolStatus {
            available: 2,
            in_use: 3,
            total: 5,
            max: 10,
        };
        assert!((status.utilization() - 30.0).abs() < f64::EPSILON);
    }

    #[test]
    fn pool_metrics_success_rate_empty() {
        let metrics = PoolMetrics::default();
        assert!((metrics.checkout_success_rate() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn pool_metrics_success_rate() {
        let metrics = PoolMetrics {
            connections_created: 1,
            connections_closed: 0,
            checkouts_successful: 9,
            checkouts_failed: 1,
        };
        assert!((metrics.checkout_success_rate() - 0.9).abs() < 1e-9);
    }

    #[tokio::test]
    async fn builder_requires_client_config() {
        let result = Pool::builder().max_connections(5).build().await;
        assert!(matches!(result, Err(PoolError::Configuration(_))));
    }
}
