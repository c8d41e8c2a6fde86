//! Supervised long-lived remote client handles
//!
//! A [`ConnectionSupervisor`] owns exactly one handle at a time (a REST
//! session, a storage client, a mail client) and runs idempotent operations
//! against it. Before each attempt the handle is rebuilt if it is missing,
//! older than the stale timeout, or was force-refreshed. When an operation
//! fails with a transient connection error the handle is discarded, the
//! supervisor sleeps on a linear schedule, and the operation is retried
//! against a fresh handle, up to `max_retries` attempts in total. Any other
//! error is returned on first occurrence.
//!
//! Handle construction is single-flight: concurrent callers that find the
//! handle stale wait on one build instead of each building their own.
//! Operations themselves run outside the lock and share the handle through
//! an `Arc`, so a replacement never disturbs a caller mid-operation.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::backoff::BackoffStrategy;
use super::clock::{Clock, SystemClock};
use super::transient::VocabularyClassifier;

/// Builds fresh handles for a supervisor.
///
/// `on_discard` runs while the supervisor still holds its handle lock, so a
/// factory can clear state the next `build` depends on (for example a cached
/// token) before anyone can rebuild.
#[async_trait]
pub trait HandleFactory<H, E>: Send + Sync
where
    H: Send + Sync + 'static,
    E: Send + 'static,
{
    /// Construct a new handle.
    async fn build(&self) -> Result<H, E>;

    /// Called once for every handle the supervisor throws away.
    async fn on_discard(&self, _handle: &H) {}
}

/// Outcome of a cancellable supervised call that did not succeed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SupervisorError<E> {
    /// The operation (or a handle build) failed; retries were exhausted or
    /// the error was not transient.
    #[error("{0}")]
    Operation(E),

    /// The cancellation token fired between attempts.
    #[error("operation cancelled")]
    Cancelled,
}

type Classifier<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;

struct HandleSlot<H> {
    handle: Arc<H>,
    created_at: Instant,
    generation: u64,
}

enum Step<T, E> {
    Done(Result<T, E>),
    Retry(Duration),
}

/// Retry-and-rebuild wrapper around one remote client handle.
pub struct ConnectionSupervisor<H, E> {
    name: String,
    factory: Arc<dyn HandleFactory<H, E>>,
    classifier: Classifier<E>,
    max_retries: u32,
    backoff: BackoffStrategy,
    stale_timeout: Duration,
    clock: Arc<dyn Clock>,
    slot: Mutex<Option<HandleSlot<H>>>,
    force_stale: AtomicBool,
    generation: AtomicU64,
}

impl<H, E> fmt::Debug for ConnectionSupervisor<H, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionSupervisor")
            .field("name", &self.name)
            .field("max_retries", &self.max_retries)
            .field("backoff", &self.backoff)
            .field("stale_timeout", &self.stale_timeout)
            .field("generation", &self.generation.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl<H, E> ConnectionSupervisor<H, E>
where
    H: Send + Sync + 'static,
    E: fmt::Display + Send + 'static,
{
    /// Start building a supervisor named `name` (used in log fields).
    pub fn builder(
        name: impl Into<String>,
        factory: Arc<dyn HandleFactory<H, E>>,
    ) -> SupervisorBuilder<H, E> {
        SupervisorBuilder {
            name: name.into(),
            factory,
            classifier: None,
            max_retries: 3,
            backoff: BackoffStrategy::default(),
            stale_timeout: Duration::from_secs(300),
            clock: Arc::new(SystemClock),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Number of handles built so far.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Mark the current handle stale; the next attempt rebuilds it.
    pub fn force_refresh(&self) {
        self.force_stale.store(true, Ordering::Release);
        debug!(supervisor = %self.name, "handle marked stale");
    }

    /// Run `op` against the supervised handle with rebuild and retry.
    ///
    /// # Errors
    /// Returns the first non-transient error, or the last transient error
    /// once `max_retries` attempts have been made.
    pub async fn execute<T, F, Fut>(&self, mut op: F) -> Result<T, E>
    where
        F: FnMut(Arc<H>) -> Fut + Send,
        Fut: Future<Output = Result<T, E>> + Send,
        T: Send,
    {
        let mut attempt = 0;
        loop {
            match self.attempt(attempt, &mut op).await {
                Step::Done(result) => return result,
                Step::Retry(delay) => tokio::time::sleep(delay).await,
            }
            attempt += 1;
        }
    }

    /// Like [`execute`](Self::execute), but stops between attempts once
    /// `cancel` fires.
    ///
    /// The token is checked before every attempt and raced against every
    /// backoff sleep. An attempt already in flight is allowed to finish, so
    /// handle state is never left half-replaced.
    ///
    /// # Errors
    /// [`SupervisorError::Cancelled`] on cancellation, otherwise
    /// [`SupervisorError::Operation`] as for `execute`.
    pub async fn execute_cancellable<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        mut op: F,
    ) -> Result<T, SupervisorError<E>>
    where
        F: FnMut(Arc<H>) -> Fut + Send,
        Fut: Future<Output = Result<T, E>> + Send,
        T: Send,
    {
        let mut attempt = 0;
        loop {
            if cancel.is_cancelled() {
                info!(supervisor = %self.name, attempt, "supervised call cancelled");
                return Err(SupervisorError::Cancelled);
            }
            match self.attempt(attempt, &mut op).await {
                Step::Done(result) => return result.map_err(SupervisorError::Operation),
                Step::Retry(delay) => {
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            info!(supervisor = %self.name, attempt, "supervised call cancelled during backoff");
                            return Err(SupervisorError::Cancelled);
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
            attempt += 1;
        }
    }

    async fn attempt<T, F, Fut>(&self, attempt: u32, op: &mut F) -> Step<T, E>
    where
        F: FnMut(Arc<H>) -> Fut + Send,
        Fut: Future<Output = Result<T, E>> + Send,
        T: Send,
    {
        let (handle, generation) = match self.acquire().await {
            Ok(acquired) => acquired,
            Err(err) => return self.after_failure(attempt, err, None).await,
        };

        match op(handle).await {
            Ok(value) => Step::Done(Ok(value)),
            Err(err) => self.after_failure(attempt, err, Some(generation)).await,
        }
    }

    async fn after_failure<T>(&self, attempt: u32, err: E, generation: Option<u64>) -> Step<T, E> {
        let transient = (self.classifier)(&err);
        let attempts_left = attempt + 1 < self.max_retries;

        if !transient {
            debug!(supervisor = %self.name, attempt, error = %err, "non-transient error, not retrying");
            return Step::Done(Err(err));
        }
        if let Some(generation) = generation {
            self.discard(generation).await;
        }
        if !attempts_left {
            warn!(
                supervisor = %self.name,
                attempts = attempt + 1,
                error = %err,
                "transient error, retries exhausted"
            );
            return Step::Done(Err(err));
        }

        let delay = self.backoff.calculate_delay(attempt);
        warn!(
            supervisor = %self.name,
            attempt,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            error = %err,
            "transient error, rebuilding handle and retrying"
        );
        Step::Retry(delay)
    }

    async fn acquire(&self) -> Result<(Arc<H>, u64), E> {
        let mut slot = self.slot.lock().await;
        let forced = self.force_stale.swap(false, Ordering::AcqRel);

        if let Some(current) = slot.as_ref() {
            let age = self.clock.now().saturating_duration_since(current.created_at);
            if !forced && age <= self.stale_timeout {
                return Ok((Arc::clone(&current.handle), current.generation));
            }
            debug!(
                supervisor = %self.name,
                generation = current.generation,
                age_secs = age.as_secs(),
                forced,
                "discarding stale handle"
            );
            if let Some(stale) = slot.take() {
                self.factory.on_discard(&stale.handle).await;
            }
        }

        let handle = Arc::new(self.factory.build().await?);
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        info!(supervisor = %self.name, generation, "built new handle");
        *slot = Some(HandleSlot {
            handle: Arc::clone(&handle),
            created_at: self.clock.now(),
            generation,
        });
        Ok((handle, generation))
    }

    /// Drop the handle of `generation` if it is still current.
    async fn discard(&self, generation: u64) {
        let mut slot = self.slot.lock().await;
        if slot.as_ref().is_some_and(|current| current.generation == generation) {
            if let Some(failed) = slot.take() {
                debug!(supervisor = %self.name, generation, "discarding failed handle");
                self.factory.on_discard(&failed.handle).await;
            }
        }
    }
}

/// Builder for [`ConnectionSupervisor`].
pub struct SupervisorBuilder<H, E> {
    name: String,
    factory: Arc<dyn HandleFactory<H, E>>,
    classifier: Option<Classifier<E>>,
    max_retries: u32,
    backoff: BackoffStrategy,
    stale_timeout: Duration,
    clock: Arc<dyn Clock>,
}

impl<H, E> SupervisorBuilder<H, E>
where
    H: Send + Sync + 'static,
    E: fmt::Display + Send + 'static,
{
    /// Total attempts per call, initial try included. Zero is treated as one.
    #[must_use]
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    /// Linear backoff: attempt `n` (0-based) sleeps `delay * (n + 1)`.
    #[must_use]
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.backoff = BackoffStrategy::linear(delay);
        self
    }

    #[must_use]
    pub fn backoff(mut self, backoff: BackoffStrategy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Handles older than this are rebuilt before use.
    #[must_use]
    pub fn stale_timeout(mut self, stale_timeout: Duration) -> Self {
        self.stale_timeout = stale_timeout;
        self
    }

    /// Replace the default vocabulary match on the error's `Display`.
    #[must_use]
    pub fn classifier<C>(mut self, classifier: C) -> Self
    where
        C: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.classifier = Some(Arc::new(classifier));
        self
    }

    #[must_use]
    pub fn clock<C: Clock>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn build(self) -> ConnectionSupervisor<H, E> {
        let classifier = self.classifier.unwrap_or_else(|| {
            let vocabulary = VocabularyClassifier::new();
            Arc::new(move |err: &E| vocabulary.is_transient(err))
        });
        ConnectionSupervisor {
            name: self.name,
            factory: self.factory,
            classifier,
            max_retries: self.max_retries,
            backoff: self.backoff,
            stale_timeout: self.stale_timeout,
            clock: self.clock,
            slot: Mutex::new(None),
            force_stale: AtomicBool::new(false),
            generation: AtomicU64::new(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU32;

    use super::*;
    use crate::resilience::MockClock;

    #[derive(Debug)]
    struct Conn {
        id: u32,
    }

    #[derive(Default)]
    struct CountingFactory {
        built: AtomicU32,
        discarded: AtomicU32,
    }

    #[async_trait]
    impl HandleFactory<Conn, String> for CountingFactory {
        async fn build(&self) -> Result<Conn, String> {
            let id = self.built.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(Conn { id })
        }

        async fn on_discard(&self, _handle: &Conn) {
            self.discarded.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn as_factory(factory: &Arc<CountingFactory>) -> Arc<dyn HandleFactory<Conn, String>> {
        Arc::clone(factory) as Arc<dyn HandleFactory<Conn, String>>
    }

    fn supervisor(
        factory: &Arc<CountingFactory>,
        max_retries: u32,
    ) -> ConnectionSupervisor<Conn, String> {
        ConnectionSupervisor::builder("test", as_factory(factory))
            .max_retries(max_retries)
            .retry_delay(Duration::from_millis(1))
            .build()
    }

    #[tokio::test]
    async fn reuses_handle_across_calls() {
        let factory = Arc::new(CountingFactory::default());
        let sup = supervisor(&factory, 3);

        for _ in 0..3 {
            let id = sup.execute(|conn| async move { Ok::<_, String>(conn.id) }).await.unwrap();
            assert_eq!(id, 1);
        }
        assert_eq!(factory.built.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn transient_error_rebuilds_and_retries() {
        let factory = Arc::new(CountingFactory::default());
        let sup = supervisor(&factory, 3);

        let seen = sup
            .execute(|conn| async move {
                if conn.id == 1 {
                    Err("connection reset by peer".to_string())
                } else {
                    Ok(conn.id)
                }
            })
            .await
            .unwrap();

        assert_eq!(seen, 2);
        assert_eq!(factory.built.load(Ordering::SeqCst), 2);
        assert_eq!(factory.discarded.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn always_transient_runs_exactly_max_retries() {
        let factory = Arc::new(CountingFactory::default());
        let sup = supervisor(&factory, 4);
        let calls = AtomicU32::new(0);

        let err = sup
            .execute(|_conn| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>("broken pipe".to_string()) }
            })
            .await
            .unwrap_err();

        assert_eq!(err, "broken pipe");
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn non_transient_error_is_not_retried() {
        let factory = Arc::new(CountingFactory::default());
        let sup = supervisor(&factory, 5);
        let calls = AtomicU32::new(0);

        let err = sup
            .execute(|_conn| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>("HTTP 400: bad account".to_string()) }
            })
            .await
            .unwrap_err();

        assert_eq!(err, "HTTP 400: bad account");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(factory.discarded.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn stale_handle_is_rebuilt() {
        let factory = Arc::new(CountingFactory::default());
        let clock = MockClock::new();
        let sup = ConnectionSupervisor::builder("stale", as_factory(&factory))
            .stale_timeout(Duration::from_secs(300))
            .clock(clock.clone())
            .build();

        let op = |conn: Arc<Conn>| async move { Ok::<_, String>(conn.id) };
        assert_eq!(sup.execute(op).await.unwrap(), 1);

        clock.advance_secs(300);
        assert_eq!(sup.execute(op).await.unwrap(), 1);

        clock.advance_secs(1);
        assert_eq!(sup.execute(op).await.unwrap(), 2);
        assert_eq!(factory.discarded.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn force_refresh_rebuilds_once() {
        let factory = Arc::new(CountingFactory::default());
        let sup = supervisor(&factory, 3);
        let op = |conn: Arc<Conn>| async move { Ok::<_, String>(conn.id) };

        sup.execute(op).await.unwrap();
        sup.force_refresh();
        assert_eq!(sup.execute(op).await.unwrap(), 2);
        assert_eq!(sup.execute(op).await.unwrap(), 2);
        assert_eq!(sup.generation(), 2);
    }

    #[tokio::test]
    async fn custom_classifier_overrides_vocabulary() {
        let factory = Arc::new(CountingFactory::default());
        let sup = ConnectionSupervisor::builder("custom", as_factory(&factory))
            .max_retries(2)
            .retry_delay(Duration::from_millis(1))
            .classifier(|err: &String| err.starts_with("retry"))
            .build();
        let calls = AtomicU32::new(0);

        let _ = sup
            .execute(|_conn| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>("broken pipe".to_string()) }
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let _ = sup
            .execute(|_conn| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>("retry later".to_string()) }
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn cancelled_token_stops_before_first_attempt() {
        let factory = Arc::new(CountingFactory::default());
        let sup = supervisor(&factory, 3);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = sup
            .execute_cancellable(&cancel, |conn| async move { Ok::<_, String>(conn.id) })
            .await;

        assert_eq!(result, Err(SupervisorError::Cancelled));
        assert_eq!(factory.built.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cancellation_interrupts_backoff() {
        let factory = Arc::new(CountingFactory::default());
        let sup = ConnectionSupervisor::builder("slow", as_factory(&factory))
            .max_retries(5)
            .retry_delay(Duration::from_secs(60))
            .build();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let calls = AtomicU32::new(0);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            sup.execute_cancellable(&cancel, |_conn| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>("timed out".to_string()) }
            }),
        )
        .await
        .expect("cancellation should end the backoff sleep");

        assert_eq!(result, Err(SupervisorError::Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
