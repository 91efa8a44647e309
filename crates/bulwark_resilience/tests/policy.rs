// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! End-to-end behavior of the resilience policy.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bulwark_resilience::{CircuitState, PolicyError, ResilienceOptions, ResiliencePolicy};
use recoverable::{Recovery, RecoveryInfo};
use testing_aids::LogCapture;
use tick::{Clock, ClockControl};
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
enum TestError {
    #[error("connection reset")]
    Transient,
    #[error("throttled")]
    Throttled(Duration),
    #[error("bad request")]
    Permanent,
}

impl Recovery for TestError {
    fn recovery(&self) -> RecoveryInfo {
        match self {
            Self::Transient => RecoveryInfo::retry(),
            Self::Throttled(delay) => RecoveryInfo::retry().delay(*delay),
            Self::Permanent => RecoveryInfo::never(),
        }
    }
}

fn auto_clock() -> (ClockControl, Clock) {
    let control = ClockControl::new().auto_advance_timers(true);
    let clock = control.to_clock();
    (control, clock)
}

/// Options that open the circuit after ten uncounted failures out of ten calls.
fn breaker_options() -> ResilienceOptions {
    ResilienceOptions {
        retry_count: 0,
        failure_threshold: 0.5,
        minimum_throughput: 10,
        break_duration: Duration::from_secs(30),
        ..ResilienceOptions::default()
    }
}

async fn fail_transiently(policy: &ResiliencePolicy) -> Result<u32, PolicyError<TestError>> {
    policy.execute(|| async { Err(TestError::Transient) }).await
}

async fn succeed(policy: &ResiliencePolicy) -> Result<u32, PolicyError<TestError>> {
    policy.execute(|| async { Ok(1) }).await
}

#[tokio::test]
async fn transient_failures_are_retried_until_success() {
    let (_control, clock) = auto_clock();
    let policy = ResiliencePolicy::new(&ResilienceOptions::default(), clock).unwrap();
    let attempts = AtomicU32::new(0);

    let value = policy
        .execute(|| {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            async move { if attempt < 4 { Err(TestError::Transient) } else { Ok(attempt) } }
        })
        .await
        .unwrap();

    assert_eq!(value, 4);
    assert_eq!(attempts.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn retries_are_exhausted_after_retry_count_plus_one_attempts() {
    let (_control, clock) = auto_clock();
    let policy = ResiliencePolicy::new(&ResilienceOptions::default(), clock).unwrap();
    let attempts = AtomicU32::new(0);

    let error = policy
        .execute(|| {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(TestError::Transient) }
        })
        .await
        .unwrap_err();

    assert!(matches!(error, PolicyError::Exhausted { attempts: 4, source: TestError::Transient }));
    assert_eq!(attempts.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn backoff_doubles_from_base_delay() {
    let (_control, clock) = auto_clock();
    let delays = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&delays);
    let policy = ResiliencePolicy::builder(clock.clone())
        .on_retry(move |args| seen.lock().unwrap().push(args.retry_delay()))
        .build()
        .unwrap();

    let start = clock.instant();
    let _ = policy.execute(|| async { Err::<(), _>(TestError::Transient) }).await;

    assert_eq!(
        *delays.lock().unwrap(),
        [Duration::from_secs(2), Duration::from_secs(4), Duration::from_secs(8)]
    );
    assert_eq!(clock.instant() - start, Duration::from_secs(14));
}

#[tokio::test]
async fn recovery_delay_overrides_backoff() {
    let (_control, clock) = auto_clock();
    let delays = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&delays);
    let policy = ResiliencePolicy::builder(clock)
        .options(&ResilienceOptions {
            retry_count: 2,
            ..ResilienceOptions::default()
        })
        .on_retry(move |args| seen.lock().unwrap().push((args.attempt(), args.retry_delay())))
        .build()
        .unwrap();

    let _ = policy
        .execute(|| async { Err::<(), _>(TestError::Throttled(Duration::from_millis(250))) })
        .await;

    assert_eq!(
        *delays.lock().unwrap(),
        [(1, Duration::from_millis(250)), (2, Duration::from_millis(250))]
    );
}

#[tokio::test]
async fn permanent_failures_are_not_retried_or_counted() {
    let (_control, clock) = auto_clock();
    let policy = ResiliencePolicy::new(&breaker_options(), clock).unwrap();
    let attempts = AtomicU32::new(0);

    for _ in 0..20 {
        let error = policy
            .execute(|| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(TestError::Permanent) }
            })
            .await
            .unwrap_err();
        assert!(matches!(error, PolicyError::Failed(TestError::Permanent)));
    }

    assert_eq!(attempts.load(Ordering::SeqCst), 20);
    let snapshot = policy.snapshot();
    assert_eq!(snapshot.state, CircuitState::Closed);
    assert_eq!(snapshot.throughput, 0);
}

#[tokio::test]
async fn zero_retry_count_makes_a_single_attempt() {
    let (_control, clock) = auto_clock();
    let policy = ResiliencePolicy::new(&breaker_options(), clock).unwrap();

    let error = fail_transiently(&policy).await.unwrap_err();

    assert!(matches!(error, PolicyError::Exhausted { attempts: 1, .. }));
}

#[tokio::test]
async fn circuit_opens_at_failure_threshold_and_rejects_calls() {
    let control = ClockControl::new();
    let policy = ResiliencePolicy::new(&breaker_options(), control.to_clock()).unwrap();

    for _ in 0..5 {
        succeed(&policy).await.unwrap();
    }
    for _ in 0..4 {
        let _ = fail_transiently(&policy).await;
    }
    assert_eq!(policy.circuit_state(), CircuitState::Closed);

    let _ = fail_transiently(&policy).await;
    assert_eq!(policy.circuit_state(), CircuitState::Open);

    let invoked = AtomicU32::new(0);
    let error = policy
        .execute(|| {
            invoked.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, TestError>(1) }
        })
        .await
        .unwrap_err();

    assert!(error.is_circuit_open());
    assert!(matches!(error, PolicyError::CircuitOpen { retry_after } if retry_after == Duration::from_secs(30)));
    assert_eq!(invoked.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn circuit_stays_closed_below_minimum_throughput() {
    let control = ClockControl::new();
    let policy = ResiliencePolicy::new(&breaker_options(), control.to_clock()).unwrap();

    for _ in 0..9 {
        let _ = fail_transiently(&policy).await;
    }

    assert_eq!(policy.circuit_state(), CircuitState::Closed);
    assert_eq!(policy.snapshot().throughput, 9);
}

#[tokio::test]
async fn successful_probe_closes_circuit() {
    let control = ClockControl::new();
    let policy = ResiliencePolicy::new(&breaker_options(), control.to_clock()).unwrap();
    for _ in 0..10 {
        let _ = fail_transiently(&policy).await;
    }
    assert_eq!(policy.circuit_state(), CircuitState::Open);

    control.advance(Duration::from_secs(30));
    assert_eq!(policy.circuit_state(), CircuitState::HalfOpen);

    assert_eq!(succeed(&policy).await.unwrap(), 1);
    assert_eq!(policy.circuit_state(), CircuitState::Closed);
    assert_eq!(policy.snapshot().throughput, 0, "health is reset when the circuit closes");
}

#[tokio::test]
async fn failed_probe_reopens_circuit() {
    let control = ClockControl::new();
    let policy = ResiliencePolicy::new(&breaker_options(), control.to_clock()).unwrap();
    for _ in 0..10 {
        let _ = fail_transiently(&policy).await;
    }

    control.advance(Duration::from_secs(30));
    assert!(matches!(fail_transiently(&policy).await, Err(PolicyError::Exhausted { .. })));

    assert_eq!(policy.circuit_state(), CircuitState::Open);
    assert!(succeed(&policy).await.unwrap_err().is_circuit_open());
}

#[tokio::test]
async fn half_open_admits_one_probe_at_a_time() {
    let control = ClockControl::new();
    let policy = ResiliencePolicy::new(&breaker_options(), control.to_clock()).unwrap();
    for _ in 0..10 {
        let _ = fail_transiently(&policy).await;
    }
    control.advance(Duration::from_secs(30));

    let (started_tx, started_rx) = tokio::sync::oneshot::channel::<()>();
    let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
    let probe_policy = policy.clone();
    let probe = tokio::spawn(async move {
        let mut signals = Some((started_tx, release_rx));
        probe_policy
            .execute(move || {
                let signals = signals.take();
                async move {
                    if let Some((started, release)) = signals {
                        let _ = started.send(());
                        let _ = release.await;
                    }
                    Ok::<_, TestError>(7)
                }
            })
            .await
    });

    started_rx.await.unwrap();
    assert!(succeed(&policy).await.unwrap_err().is_circuit_open());

    release_tx.send(()).unwrap();
    assert_eq!(probe.await.unwrap().unwrap(), 7);
    assert_eq!(policy.circuit_state(), CircuitState::Closed);
}

#[tokio::test]
async fn callbacks_observe_every_transition() {
    let control = ClockControl::new();
    let events = Arc::new(Mutex::new(Vec::new()));

    let (opened, half_open, closed) = (Arc::clone(&events), Arc::clone(&events), Arc::clone(&events));
    let policy = ResiliencePolicy::builder(control.to_clock())
        .options(&breaker_options())
        .on_opened(move |args| {
            opened
                .lock()
                .unwrap()
                .push(format!("opened reopened={} throughput={}", args.is_reopened(), args.throughput()));
        })
        .on_half_open(move |args| half_open.lock().unwrap().push(format!("half_open after {:?}", args.open_duration())))
        .on_closed(move |args| closed.lock().unwrap().push(format!("closed after {:?}", args.open_duration())))
        .build()
        .unwrap();

    for _ in 0..10 {
        let _ = fail_transiently(&policy).await;
    }
    control.advance(Duration::from_secs(30));
    let _ = fail_transiently(&policy).await;
    control.advance(Duration::from_secs(30));
    succeed(&policy).await.unwrap();

    assert_eq!(
        *events.lock().unwrap(),
        [
            "opened reopened=false throughput=10",
            "half_open after 30s",
            "opened reopened=true throughput=10",
            "half_open after 60s",
            "closed after 60s",
        ]
    );
}

#[tokio::test]
async fn transitions_are_logged() {
    let capture = LogCapture::new();
    let _guard = capture.subscriber().set_default();

    let control = ClockControl::new().auto_advance_timers(true);
    let policy = ResiliencePolicy::builder(control.to_clock())
        .name("orders")
        .options(&ResilienceOptions {
            retry_count: 1,
            retry_base_delay: Duration::from_millis(10),
            ..breaker_options()
        })
        .build()
        .unwrap();

    for _ in 0..10 {
        let _ = fail_transiently(&policy).await;
    }
    let _ = succeed(&policy).await;

    capture.assert_contains("retry attempt 1");
    capture.assert_contains("policy.name=\"orders\"");
    capture.assert_contains("error=connection reset");
    capture.assert_contains("circuit broken");
    capture.assert_contains("call rejected by open circuit");
    assert_eq!(capture.count("retry attempt"), 10);
}
