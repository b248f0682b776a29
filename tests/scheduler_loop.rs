//! Scheduler loop behaviour under paused tokio time.

mod common;

use chrono::Utc;
use common::{FakeReceiver, engine_env, rule};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use autorec::config::{EngineConfig, SchedulerConfig};
use autorec::scheduler::{Scheduler, TokioClock};

fn fast_config() -> SchedulerConfig {
    SchedulerConfig {
        base_interval: "10s".into(),
        max_interval: "40s".into(),
        jitter: "0s".into(),
        startup_delay: "1s".into(),
    }
}

#[tokio::test(start_paused = true)]
async fn backoff_doubles_on_unreachable_receiver_and_resets_on_success() {
    let receiver = FakeReceiver::new();
    receiver.fail_timers.store(true, Ordering::SeqCst);
    // One rule, so the failing pass produces a receiver_unreachable report.
    let env = engine_env(receiver, vec![rule("r1")], EngineConfig::default(), Utc::now());

    let scheduler = Arc::new(Scheduler::new(
        env.engine.clone(),
        &fast_config(),
        Arc::new(TokioClock),
    ));
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(scheduler.clone().run(cancel.clone()));

    // Past the 1s startup delay: first tick fails, interval doubles.
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(scheduler.current_interval(), Duration::from_secs(20));
    assert_eq!(env.receiver.timers_calls.load(Ordering::SeqCst), 1);

    // Second failing tick at t=21.
    tokio::time::sleep(Duration::from_secs(20)).await;
    assert_eq!(scheduler.current_interval(), Duration::from_secs(40));

    // Third failing tick at t=61: capped at max_interval.
    tokio::time::sleep(Duration::from_secs(40)).await;
    assert_eq!(scheduler.current_interval(), Duration::from_secs(40));

    // Receiver recovers; the next tick resets to base.
    env.receiver.fail_timers.store(false, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_secs(41)).await;
    assert_eq!(scheduler.current_interval(), Duration::from_secs(10));

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("scheduler did not stop on cancellation")
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn cancellation_before_first_tick_invokes_nothing() {
    let env = engine_env(
        FakeReceiver::new(),
        vec![],
        EngineConfig::default(),
        Utc::now(),
    );
    let scheduler = Arc::new(Scheduler::new(
        env.engine.clone(),
        &fast_config(),
        Arc::new(TokioClock),
    ));

    let cancel = CancellationToken::new();
    let handle = tokio::spawn(scheduler.run(cancel.clone()));
    cancel.cancel();

    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("scheduler did not stop")
        .unwrap();
    assert_eq!(env.receiver.timers_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn successful_ticks_keep_the_base_interval() {
    let env = engine_env(
        FakeReceiver::new(),
        vec![],
        EngineConfig::default(),
        Utc::now(),
    );
    let scheduler = Arc::new(Scheduler::new(
        env.engine.clone(),
        &fast_config(),
        Arc::new(TokioClock),
    ));
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(scheduler.clone().run(cancel.clone()));

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(scheduler.current_interval(), Duration::from_secs(10));

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(scheduler.current_interval(), Duration::from_secs(10));
    assert!(env.receiver.timers_calls.load(Ordering::SeqCst) >= 3);

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("scheduler did not stop")
        .unwrap();
}
