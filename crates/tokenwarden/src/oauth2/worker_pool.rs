//! Bounded pool for token exchanges
//!
//! At most `max_workers` exchanges run at a time, with at most `queue_capacity` further
//! submissions waiting for a slot. Anything beyond that is rejected immediately.
//! Blocking exchanges run on tokio's blocking threads; async exchanges run on the
//! calling task under the same limits.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use super::token_client::{GrantRequest, TokenResponse, TokenResponseClient};
use crate::error::{AuthError, AuthResult};

/// Default number of concurrent blocking exchanges
pub const DEFAULT_MAX_WORKERS: usize = 8;

/// Default number of submissions allowed to wait for a worker
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Synchronous token exchange
///
/// Closures `Fn(GrantRequest) -> AuthResult<TokenResponse>` implement it.
pub trait BlockingTokenResponseClient: Send + Sync + 'static {
    /// Exchange `request`, blocking the calling thread
    fn get_token_response(&self, request: GrantRequest) -> AuthResult<TokenResponse>;
}

impl<F> BlockingTokenResponseClient for F
where
    F: Fn(GrantRequest) -> AuthResult<TokenResponse> + Send + Sync + 'static,
{
    fn get_token_response(&self, request: GrantRequest) -> AuthResult<TokenResponse> {
        self(request)
    }
}

/// Semaphore-gated access to the blocking thread pool
#[derive(Debug, Clone)]
pub struct WorkerPool {
    workers: Arc<Semaphore>,
    submitted: Arc<AtomicUsize>,
    max_workers: usize,
    queue_capacity: usize,
}

struct Submission(Arc<AtomicUsize>);

impl Drop for Submission {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl WorkerPool {
    /// Create a pool
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Configuration`] if `max_workers` is zero.
    pub fn new(max_workers: usize, queue_capacity: usize) -> AuthResult<Self> {
        if max_workers == 0 {
            return Err(AuthError::configuration(
                "worker pool needs at least one worker",
            ));
        }
        Ok(Self {
            workers: Arc::new(Semaphore::new(max_workers)),
            submitted: Arc::new(AtomicUsize::new(0)),
            max_workers,
            queue_capacity,
        })
    }

    /// Maximum concurrent exchanges
    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Maximum waiting submissions
    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    /// Submissions currently running or waiting
    pub fn in_flight(&self) -> usize {
        self.submitted.load(Ordering::Acquire)
    }

    fn admit(&self, registration_id: &str) -> AuthResult<Submission> {
        let limit = self.max_workers + self.queue_capacity;
        let admitted = self
            .submitted
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < limit).then_some(n + 1)
            });
        if admitted.is_err() {
            warn!(registration_id, limit, "token exchange rejected, worker pool saturated");
            return Err(AuthError::token_exchange(
                registration_id,
                format!("worker pool saturated ({limit} submissions in flight)"),
            ));
        }
        Ok(Submission(Arc::clone(&self.submitted)))
    }

    /// Await `task` on the calling task once a worker is free
    ///
    /// Dropping the returned future gives the slot back.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::TokenExchange`] when the pool is saturated, and whatever
    /// `task` itself returns.
    pub async fn run_async<Fut, T>(&self, registration_id: &str, task: Fut) -> AuthResult<T>
    where
        Fut: Future<Output = AuthResult<T>>,
    {
        let _submission = self.admit(registration_id)?;
        let _permit = self
            .workers
            .acquire()
            .await
            .map_err(|_| AuthError::token_exchange(registration_id, "worker pool closed"))?;

        debug!(registration_id, "running token exchange");
        task.await
    }

    /// Run `task` on a blocking thread once a worker is free
    ///
    /// The worker slot belongs to the blocking task, so dropping the returned future
    /// while the task runs does not release the slot before the task finishes.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::TokenExchange`] when the pool is saturated or the task
    /// panicked, and whatever `task` itself returns.
    pub async fn run<F, T>(&self, registration_id: &str, task: F) -> AuthResult<T>
    where
        F: FnOnce() -> AuthResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let submission = self.admit(registration_id)?;

        let permit = Arc::clone(&self.workers)
            .acquire_owned()
            .await
            .map_err(|_| AuthError::token_exchange(registration_id, "worker pool closed"))?;

        debug!(registration_id, "running blocking token exchange");
        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            let _submission = submission;
            task()
        })
        .await
        .map_err(|e| AuthError::token_exchange(registration_id, format!("worker failed: {e}")))?
    }
}

/// Adapts a [`BlockingTokenResponseClient`] into an async [`TokenResponseClient`]
pub struct PooledTokenResponseClient<C> {
    inner: Arc<C>,
    pool: WorkerPool,
}

impl<C> PooledTokenResponseClient<C>
where
    C: BlockingTokenResponseClient,
{
    /// Run `inner` on `pool`
    pub fn new(inner: C, pool: WorkerPool) -> Self {
        Self {
            inner: Arc::new(inner),
            pool,
        }
    }

    /// The pool exchanges run on
    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }
}

impl<C> fmt::Debug for PooledTokenResponseClient<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledTokenResponseClient")
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<C> TokenResponseClient for PooledTokenResponseClient<C>
where
    C: BlockingTokenResponseClient,
{
    async fn get_token_response(&self, request: GrantRequest) -> AuthResult<TokenResponse> {
        let registration_id = request.registration().registration_id().to_string();
        let inner = Arc::clone(&self.inner);
        self.pool
            .run(&registration_id, move || inner.get_token_response(request))
            .await
    }
}

/// Bounds an async [`TokenResponseClient`] by a [`WorkerPool`]
pub struct BoundedTokenResponseClient<C> {
    inner: C,
    pool: WorkerPool,
}

impl<C> BoundedTokenResponseClient<C>
where
    C: TokenResponseClient,
{
    /// Admit `inner`'s exchanges through `pool`
    pub fn new(inner: C, pool: WorkerPool) -> Self {
        Self { inner, pool }
    }

    /// The pool gating exchanges
    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }
}

impl<C> fmt::Debug for BoundedTokenResponseClient<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedTokenResponseClient")
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<C> TokenResponseClient for BoundedTokenResponseClient<C>
where
    C: TokenResponseClient,
{
    async fn get_token_response(&self, request: GrantRequest) -> AuthResult<TokenResponse> {
        let registration_id = request.registration().registration_id().to_string();
        self.pool
            .run_async(&registration_id, self.inner.get_token_response(request))
            .await
    }
}
