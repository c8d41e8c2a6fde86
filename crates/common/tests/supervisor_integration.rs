//! Integration tests for the connection supervisor
//!
//! Exercises single-flight handle construction under concurrent load and the
//! interaction between build failures, discards and retries.

#![cfg(feature = "runtime")]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use brokerlink_common::resilience::{
    ConnectionSupervisor, HandleFactory, MockClock, SupervisorError,
};
use tokio_util::sync::CancellationToken;

#[derive(Debug)]
struct Session {
    generation: u32,
}

/// Factory whose builds are slow, so concurrent callers overlap.
struct SlowFactory {
    builds: AtomicU32,
    discards: AtomicU32,
    build_delay: Duration,
    fail_first_builds: u32,
}

impl SlowFactory {
    fn new(build_delay: Duration) -> Self {
        Self {
            builds: AtomicU32::new(0),
            discards: AtomicU32::new(0),
            build_delay,
            fail_first_builds: 0,
        }
    }
}

#[async_trait]
impl HandleFactory<Session, String> for SlowFactory {
    async fn build(&self) -> Result<Session, String> {
        tokio::time::sleep(self.build_delay).await;
        let attempt = self.builds.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.fail_first_builds {
            return Err(format!("tls handshake timed out (build {attempt})"));
        }
        Ok(Session { generation: attempt })
    }

    async fn on_discard(&self, _handle: &Session) {
        self.discards.fetch_add(1, Ordering::SeqCst);
    }
}

fn supervise(
    factory: &Arc<SlowFactory>,
    max_retries: u32,
) -> Arc<ConnectionSupervisor<Session, String>> {
    let factory: Arc<dyn HandleFactory<Session, String>> = Arc::clone(factory) as _;
    Arc::new(
        ConnectionSupervisor::builder("integration", factory)
            .max_retries(max_retries)
            .retry_delay(Duration::from_millis(5))
            .build(),
    )
}

async fn current_generation(
    supervisor: &ConnectionSupervisor<Session, String>,
) -> Result<u32, String> {
    supervisor.execute(|session| async move { Ok::<_, String>(session.generation) }).await
}

/// Validates that concurrent callers finding no handle share one build.
///
/// # Test Steps
/// 1. Create a supervisor whose factory takes 50ms per build
/// 2. Launch 16 concurrent operations against the empty supervisor
/// 3. Verify every operation succeeded on the same handle
/// 4. Confirm the factory ran exactly once
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_callers_share_single_build() {
    let factory = Arc::new(SlowFactory::new(Duration::from_millis(50)));
    let supervisor = supervise(&factory, 3);

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let supervisor = Arc::clone(&supervisor);
            tokio::spawn(async move {
                supervisor
                    .execute(|session| async move { Ok::<_, String>(session.generation) })
                    .await
            })
        })
        .collect();

    for result in futures::future::join_all(tasks).await {
        assert_eq!(result.expect("task panicked"), Ok(1));
    }
    assert_eq!(factory.builds.load(Ordering::SeqCst), 1);
}

/// Validates that a handle failing transiently is replaced exactly once and
/// the replacement is reused afterwards.
#[tokio::test]
async fn test_failed_handle_is_replaced_once() {
    let factory = Arc::new(SlowFactory::new(Duration::ZERO));
    let supervisor = supervise(&factory, 3);

    let first = supervisor
        .execute(|session| async move {
            if session.generation == 1 {
                Err("connection reset".to_string())
            } else {
                Ok(session.generation)
            }
        })
        .await;
    assert_eq!(first, Ok(2));
    assert_eq!(factory.discards.load(Ordering::SeqCst), 1);

    assert_eq!(current_generation(&supervisor).await, Ok(2));
    assert_eq!(factory.builds.load(Ordering::SeqCst), 2);
}

/// Validates that transient build failures consume attempts like operation
/// failures do.
///
/// # Test Steps
/// 1. Factory fails its first two builds with a TLS timeout
/// 2. Supervisor allows three attempts
/// 3. Verify the third attempt succeeds on the third build
#[tokio::test]
async fn test_transient_build_failure_is_retried() {
    let mut factory = SlowFactory::new(Duration::ZERO);
    factory.fail_first_builds = 2;
    let factory = Arc::new(factory);
    let supervisor = supervise(&factory, 3);
    let calls = AtomicU32::new(0);

    let result = supervisor
        .execute(|session| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { Ok::<_, String>(session.generation) }
        })
        .await;

    assert_eq!(result, Ok(3));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

/// Validates that exhausted build retries surface the last build error.
#[tokio::test]
async fn test_build_failures_exhaust_budget() {
    let mut factory = SlowFactory::new(Duration::ZERO);
    factory.fail_first_builds = 10;
    let factory = Arc::new(factory);
    let supervisor = supervise(&factory, 2);

    let err = supervisor
        .execute(|session| async move { Ok::<_, String>(session.generation) })
        .await
        .unwrap_err();

    assert!(err.contains("build 2"), "unexpected error: {err}");
    assert_eq!(factory.builds.load(Ordering::SeqCst), 2);
}

/// Validates that staleness is measured on the supervisor's clock.
#[tokio::test]
async fn test_mock_clock_controls_staleness() {
    let factory = Arc::new(SlowFactory::new(Duration::ZERO));
    let clock = MockClock::new();
    let dyn_factory: Arc<dyn HandleFactory<Session, String>> = Arc::clone(&factory) as _;
    let supervisor = ConnectionSupervisor::builder("clocked", dyn_factory)
        .stale_timeout(Duration::from_secs(60))
        .clock(clock.clone())
        .build();

    assert_eq!(current_generation(&supervisor).await, Ok(1));
    clock.advance_secs(61);
    assert_eq!(current_generation(&supervisor).await, Ok(2));
    assert_eq!(factory.discards.load(Ordering::SeqCst), 1);
}

/// Validates that cancellation leaves the handle reusable.
#[tokio::test]
async fn test_cancellation_keeps_handle_intact() {
    let factory = Arc::new(SlowFactory::new(Duration::ZERO));
    let supervisor = supervise(&factory, 3);

    assert_eq!(current_generation(&supervisor).await, Ok(1));

    let cancel = CancellationToken::new();
    cancel.cancel();
    let cancelled = supervisor
        .execute_cancellable(&cancel, |session| async move { Ok::<_, String>(session.generation) })
        .await;
    assert_eq!(cancelled, Err(SupervisorError::Cancelled));

    assert_eq!(current_generation(&supervisor).await, Ok(1));
    assert_eq!(factory.builds.load(Ordering::SeqCst), 1);
}
