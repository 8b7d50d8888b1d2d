//! Concurrency Tests
//!
//! Many threads hammering one monitor. Check-and-record must never admit
//! more than the configured limit.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use chrono::{DateTime, Duration, TimeZone, Utc};
use zentinel_security_monitor::{
    EventType, MonitorConfig, SecurityMonitor, SlidingWindowCounter, WindowedKey,
};

const THREADS: usize = 8;
const CALLS_PER_THREAD: usize = 200;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
}

#[test]
fn test_rate_limit_admits_exactly_limit() {
    let mut config = MonitorConfig::default();
    config.rate_limit_per_minute = 50;
    let monitor = Arc::new(SecurityMonitor::new(config).unwrap());
    let admitted = Arc::new(AtomicUsize::new(0));
    let now = t0();

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let monitor = monitor.clone();
            let admitted = admitted.clone();
            thread::spawn(move || {
                for _ in 0..CALLS_PER_THREAD {
                    if monitor.allow_request("shared", "/api", now) {
                        admitted.fetch_add(1, Ordering::SeqCst);
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(admitted.load(Ordering::SeqCst), 50);

    let rejections = monitor
        .recent_events(usize::MAX)
        .iter()
        .filter(|e| e.event_type == EventType::RateLimitExceeded)
        .count();
    assert_eq!(rejections, THREADS * CALLS_PER_THREAD - 50);
}

#[test]
fn test_independent_keys_under_contention() {
    let counter = Arc::new(SlidingWindowCounter::with_shards(Duration::seconds(60), 4));
    let now = t0();

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let counter = counter.clone();
            thread::spawn(move || {
                let key = WindowedKey::new(format!("user-{}", t), "/api");
                for i in 0..CALLS_PER_THREAD {
                    counter.record(&key, now + Duration::milliseconds(i as i64));
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let later = now + Duration::seconds(1);
    for t in 0..THREADS {
        let key = WindowedKey::new(format!("user-{}", t), "/api");
        assert_eq!(counter.count(&key, later), CALLS_PER_THREAD);
    }
    assert_eq!(counter.tracked_keys(), THREADS);
}

#[test]
fn test_concurrent_logins_and_reports() {
    let monitor = Arc::new(SecurityMonitor::new(MonitorConfig::default()).unwrap());
    let now = t0();

    let writers: Vec<_> = (0..THREADS)
        .map(|t| {
            let monitor = monitor.clone();
            thread::spawn(move || {
                let origin = format!("10.0.0.{}", t);
                for _ in 0..5 {
                    monitor.record_login_failure("alice", &origin, now);
                }
                assert!(!monitor.login_allowed("alice", &origin, now));
            })
        })
        .collect();

    let reader = {
        let monitor = monitor.clone();
        thread::spawn(move || {
            for _ in 0..100 {
                let report = monitor.report(now);
                assert!(report.total_events_24h <= THREADS);
                assert!(report.security_score <= 100);
            }
        })
    };

    for handle in writers {
        handle.join().unwrap();
    }
    reader.join().unwrap();

    let report = monitor.report(now);
    assert_eq!(report.total_events_24h, THREADS);
    assert_eq!(report.security_score, 20);
}
