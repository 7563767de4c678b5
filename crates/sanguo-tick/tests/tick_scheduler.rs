use std::time::Duration;

use sanguo_tick::{MIN_INTERVAL, TickConfig, TickScheduler};
use tokio::time::{self, Instant};

#[tokio::test(start_paused = true)]
async fn test_ticks_follow_the_interval() {
    let mut ticker = TickScheduler::every(Duration::from_secs(2));
    let start = Instant::now();

    assert_eq!(ticker.wait_for_tick().await, 1);
    assert_eq!(start.elapsed(), Duration::from_secs(2));

    ticker.record_tick_end();
    assert_eq!(ticker.wait_for_tick().await, 2);
    assert_eq!(start.elapsed(), Duration::from_secs(4));
    assert_eq!(ticker.stats().ticks, 2);
}

#[tokio::test(start_paused = true)]
async fn test_slow_work_is_counted() {
    let mut ticker = TickScheduler::every(Duration::from_millis(100));
    ticker.wait_for_tick().await;
    time::advance(Duration::from_millis(90)).await;
    ticker.record_tick_end();

    ticker.wait_for_tick().await;
    time::advance(Duration::from_millis(10)).await;
    ticker.record_tick_end();

    let stats = ticker.stats();
    assert_eq!(stats.slow_ticks, 1);
    assert_eq!(stats.longest_work, Duration::from_millis(90));
}

#[tokio::test(start_paused = true)]
async fn test_late_tick_restarts_the_cadence() {
    let mut ticker = TickScheduler::every(Duration::from_millis(100));
    let start = Instant::now();
    ticker.wait_for_tick().await;
    time::advance(Duration::from_millis(250)).await;

    ticker.wait_for_tick().await;
    assert_eq!(start.elapsed(), Duration::from_millis(350));
    ticker.wait_for_tick().await;
    assert_eq!(start.elapsed(), Duration::from_millis(450));
}

#[tokio::test(start_paused = true)]
async fn test_jitter_only_delays_the_first_tick() {
    let mut ticker = TickScheduler::new(TickConfig {
        jitter: Duration::from_millis(50),
        ..TickConfig::every(Duration::from_millis(100))
    });
    let start = Instant::now();
    ticker.wait_for_tick().await;
    let first = start.elapsed();
    assert!(first >= Duration::from_millis(100) && first < Duration::from_millis(150));

    ticker.wait_for_tick().await;
    assert_eq!(start.elapsed() - first, Duration::from_millis(100));
}

#[tokio::test(start_paused = true)]
async fn test_tiny_interval_is_raised() {
    let mut ticker = TickScheduler::every(Duration::from_millis(1));
    let start = Instant::now();
    ticker.wait_for_tick().await;
    assert_eq!(start.elapsed(), MIN_INTERVAL);
}

#[tokio::test]
async fn test_end_without_tick_is_ignored() {
    let mut ticker = TickScheduler::every(Duration::from_secs(1));
    ticker.record_tick_end();
    assert_eq!(ticker.stats(), Default::default());
}
