//! Tests for the dispatch queue: ordering, retries, admission and failures.

use creditgate_error::{
    CreditgateError, CreditgateErrorKind, DispatchErrorKind, RetryableError, RpcError,
    RpcErrorKind,
};
use creditgate_rate_limit::{
    CostConfig, CreditLimiter, CreditLimits, LimiterConfig, LimiterEvent, MethodCost,
    MonitoringConfig,
};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::{Instant, sleep};

type Log = Arc<Mutex<Vec<&'static str>>>;

fn config_with(safe_per_second: u64, costs: Vec<MethodCost>) -> LimiterConfig {
    LimiterConfig::default()
        .with_limits(
            CreditLimits::default()
                .with_max_per_second(safe_per_second + 100)
                .with_safe_per_second(safe_per_second),
        )
        .with_costs(CostConfig::default().with_methods(costs))
}

fn too_many_requests() -> CreditgateError {
    RpcError::new(RpcErrorKind::TooManyRequests).into()
}

fn reverted() -> CreditgateError {
    RpcError::new(RpcErrorKind::JsonRpc {
        code: 3,
        message: "execution reverted".to_string(),
    })
    .into()
}

#[tokio::test(start_paused = true)]
async fn test_successful_call_returns_value() {
    let limiter = CreditLimiter::new(LimiterConfig::default()).unwrap();

    let block = limiter
        .submit("eth_blockNumber", || async { Ok::<_, CreditgateError>(19_000_000u64) })
        .await
        .unwrap();

    assert_eq!(block, 19_000_000);
    let stats = limiter.stats().await;
    assert_eq!(stats.total_requests, 1);
    assert_eq!(stats.current_second_credits, 10);
    assert_eq!(stats.daily_credits_used, 10);
    assert_eq!(stats.queue_length, 0);
}

#[tokio::test(start_paused = true)]
async fn test_fifo_with_retry_precedence() {
    let limiter = CreditLimiter::new(LimiterConfig::default()).unwrap();
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let attempts = Arc::new(AtomicU32::new(0));

    let a = limiter.submit("A", {
        let log = Arc::clone(&log);
        let attempts = Arc::clone(&attempts);
        move || {
            let log = Arc::clone(&log);
            let attempts = Arc::clone(&attempts);
            async move {
                log.lock().unwrap().push("A");
                if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(too_many_requests())
                } else {
                    Ok("a")
                }
            }
        }
    });
    let b = limiter.submit("B", {
        let log = Arc::clone(&log);
        move || {
            let log = Arc::clone(&log);
            async move {
                log.lock().unwrap().push("B");
                Ok::<_, CreditgateError>("b")
            }
        }
    });
    let c = limiter.submit("C", {
        let log = Arc::clone(&log);
        move || {
            let log = Arc::clone(&log);
            async move {
                log.lock().unwrap().push("C");
                Ok::<_, CreditgateError>("c")
            }
        }
    });

    let (a, b, c) = tokio::join!(a, b, c);
    assert_eq!(a.unwrap(), "a");
    assert_eq!(b.unwrap(), "b");
    assert_eq!(c.unwrap(), "c");
    assert_eq!(*log.lock().unwrap(), vec!["A", "A", "B", "C"]);
}

#[tokio::test(start_paused = true)]
async fn test_retries_are_bounded() {
    let limiter = CreditLimiter::new(LimiterConfig::default()).unwrap();
    let mut events = limiter.subscribe();
    let attempts = Arc::new(AtomicU32::new(0));
    let start = Instant::now();

    let result: Result<(), CreditgateError> = limiter
        .submit("eth_call", {
            let attempts = Arc::clone(&attempts);
            move || {
                let attempts = Arc::clone(&attempts);
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Err(too_many_requests())
                }
            }
        })
        .await;

    assert_eq!(attempts.load(Ordering::SeqCst), 4);
    let err = result.unwrap_err();
    assert!(err.is_retryable());
    assert!(start.elapsed() >= Duration::from_millis(2000 + 4000 + 8000));

    let mut backoffs = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let LimiterEvent::Retry {
            method,
            retry,
            backoff_ms,
        } = event
        {
            assert_eq!(method, "eth_call");
            backoffs.push((retry, backoff_ms));
        }
    }
    assert_eq!(backoffs, vec![(1, 2000), (2, 4000), (3, 8000)]);

    let stats = limiter.stats().await;
    assert_eq!(stats.total_requests, 4);
    assert_eq!(stats.failed_requests, 1);
}

#[tokio::test(start_paused = true)]
async fn test_permanent_failure_is_immediate() {
    let limiter = CreditLimiter::new(LimiterConfig::default()).unwrap();
    let attempts = Arc::new(AtomicU32::new(0));
    let start = Instant::now();

    let result: Result<(), CreditgateError> = limiter
        .submit("eth_estimateGas", {
            let attempts = Arc::clone(&attempts);
            move || {
                let attempts = Arc::clone(&attempts);
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Err(reverted())
                }
            }
        })
        .await;

    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    assert_eq!(start.elapsed(), Duration::ZERO);

    let err = result.unwrap_err();
    match err.kind() {
        CreditgateErrorKind::Rpc(rpc) => assert_eq!(
            rpc.kind,
            RpcErrorKind::JsonRpc {
                code: 3,
                message: "execution reverted".to_string(),
            }
        ),
        other => panic!("Expected the operation's own error, got {other}"),
    }
    assert_eq!(limiter.stats().await.failed_requests, 1);
}

#[tokio::test(start_paused = true)]
async fn test_per_second_budget_holds_queue() {
    let limiter =
        CreditLimiter::new(config_with(400, vec![MethodCost::new("eth_getLogs", 60)])).unwrap();
    let start = Instant::now();
    let times: Arc<Mutex<Vec<Duration>>> = Arc::new(Mutex::new(Vec::new()));

    let calls = (0..10).map(|_| {
        let times = Arc::clone(&times);
        limiter.submit("eth_getLogs", move || {
            let times = Arc::clone(&times);
            async move {
                times.lock().unwrap().push(start.elapsed());
                Ok::<_, CreditgateError>(())
            }
        })
    });
    for result in futures::future::join_all(calls).await {
        result.unwrap();
    }

    let times = times.lock().unwrap().clone();
    assert_eq!(times.len(), 10);
    assert!(times[..6].iter().all(|t| *t < Duration::from_secs(1)));
    assert!(times[6..].iter().all(|t| *t >= Duration::from_secs(1)));

    // No one-second window ever carries more than 400 credits.
    for window in 0..5u64 {
        let in_window = times
            .iter()
            .filter(|t| t.as_secs() == window)
            .count() as u64;
        assert!(in_window * 60 <= 400, "window {window} ran {in_window} calls");
    }

    assert!(limiter.stats().await.throttled_requests >= 1);
}

#[tokio::test(start_paused = true)]
async fn test_head_of_line_blocking() {
    let limiter = CreditLimiter::new(config_with(
        100,
        vec![
            MethodCost::new("eth_getLogs", 75),
            MethodCost::new("eth_chainId", 1),
        ],
    ))
    .unwrap();
    let log: Log = Arc::new(Mutex::new(Vec::new()));

    let call = |name: &'static str| {
        let log = Arc::clone(&log);
        move || {
            let log = Arc::clone(&log);
            async move {
                log.lock().unwrap().push(name);
                Ok::<_, CreditgateError>(())
            }
        }
    };

    // The second getLogs does not fit this second; chainId behind it would,
    // but must not overtake it.
    let (first, second, cheap) = tokio::join!(
        limiter.submit("eth_getLogs", call("logs-1")),
        limiter.submit("eth_getLogs", call("logs-2")),
        limiter.submit("eth_chainId", call("chain-id")),
    );
    first.unwrap();
    second.unwrap();
    cheap.unwrap();

    assert_eq!(*log.lock().unwrap(), vec!["logs-1", "logs-2", "chain-id"]);
}

#[tokio::test(start_paused = true)]
async fn test_one_call_in_flight() {
    let limiter = CreditLimiter::new(LimiterConfig::default()).unwrap();
    let in_flight = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let limiter = limiter.clone();
        let in_flight = Arc::clone(&in_flight);
        let peak = Arc::clone(&peak);
        handles.push(tokio::spawn(async move {
            limiter
                .submit("eth_getBalance", move || {
                    let in_flight = Arc::clone(&in_flight);
                    let peak = Arc::clone(&peak);
                    async move {
                        let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        sleep(Duration::from_millis(50)).await;
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                        Ok::<_, CreditgateError>(())
                    }
                })
                .await
        }));
    }

    for handle in handles {
        handle.await.unwrap().unwrap();
    }
    assert_eq!(peak.load(Ordering::SeqCst), 1);
    assert_eq!(limiter.stats().await.total_requests, 8);
    assert!(!limiter.queue().is_draining().await);
}

#[tokio::test(start_paused = true)]
async fn test_panicking_operation_is_contained() {
    let limiter = CreditLimiter::new(LimiterConfig::default()).unwrap();

    let panicked: Result<(), CreditgateError> = limiter
        .submit("eth_call", || async {
            let explode = true;
            if explode {
                panic!("decoder bug");
            }
            Ok::<(), CreditgateError>(())
        })
        .await;
    let err = panicked.unwrap_err();
    match err.kind() {
        CreditgateErrorKind::Dispatch(dispatch) => assert_eq!(
            dispatch.kind(),
            &DispatchErrorKind::OperationPanicked {
                method: "eth_call".to_string()
            }
        ),
        other => panic!("Expected a dispatch error, got {other}"),
    }

    // The queue keeps serving later calls.
    let value = limiter
        .submit("eth_chainId", || async { Ok::<_, CreditgateError>(1u64) })
        .await
        .unwrap();
    assert_eq!(value, 1);
    assert_eq!(limiter.stats().await.failed_requests, 1);
}

#[tokio::test(start_paused = true)]
async fn test_stats_counters_never_decrease() {
    let limiter = CreditLimiter::new(LimiterConfig::default()).unwrap();
    let mut previous = limiter.stats().await;

    for round in 0..6u32 {
        let _: Result<(), CreditgateError> = limiter
            .submit("eth_call", move || async move {
                if round % 2 == 0 { Ok(()) } else { Err(reverted()) }
            })
            .await;

        let current = limiter.stats().await;
        assert!(current.total_requests >= previous.total_requests);
        assert!(current.throttled_requests >= previous.throttled_requests);
        assert!(current.failed_requests >= previous.failed_requests);
        previous = current;
    }

    assert_eq!(previous.total_requests, 6);
    assert_eq!(previous.failed_requests, 3);
}

#[tokio::test(start_paused = true)]
async fn test_unaffordable_method_refused_without_stalling() {
    // Keeps the built-in table, where debug_traceTransaction costs 309.
    let limiter = CreditLimiter::new(
        LimiterConfig::default().with_limits(CreditLimits::default().with_safe_per_second(250)),
    )
    .unwrap();
    let ran = Arc::new(AtomicBool::new(false));
    let start = Instant::now();

    let refused: Result<(), CreditgateError> = limiter
        .submit("debug_traceTransaction", {
            let ran = Arc::clone(&ran);
            move || {
                let ran = Arc::clone(&ran);
                async move {
                    ran.store(true, Ordering::SeqCst);
                    Ok(())
                }
            }
        })
        .await;

    assert!(!ran.load(Ordering::SeqCst));
    assert_eq!(start.elapsed(), Duration::ZERO);
    match refused.unwrap_err().kind() {
        CreditgateErrorKind::Dispatch(dispatch) => assert_eq!(
            dispatch.kind(),
            &DispatchErrorKind::CostExceedsBudget {
                method: "debug_traceTransaction".to_string(),
                cost: 309,
                ceiling: 250,
            }
        ),
        other => panic!("Expected a dispatch error, got {other}"),
    }

    // Affordable calls behind it still run.
    let value = limiter
        .submit("eth_sendRawTransaction", || async { Ok::<_, CreditgateError>(7u8) })
        .await
        .unwrap();
    assert_eq!(value, 7);

    let stats = limiter.stats().await;
    assert_eq!(stats.failed_requests, 1);
    assert_eq!(stats.total_requests, 1);
    assert_eq!(stats.queue_length, 0);
}

#[test]
fn test_runtime_shutdown_abandons_call_in_flight() {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .unwrap();
    let limiter = {
        let _guard = runtime.enter();
        CreditLimiter::new(LimiterConfig::default()).unwrap()
    };
    let started = Arc::new(AtomicBool::new(false));

    // The caller waits on its own thread, outside the runtime that drains.
    let caller = std::thread::spawn({
        let handle = runtime.handle().clone();
        let limiter = limiter.clone();
        let started = Arc::clone(&started);
        move || {
            let _guard = handle.enter();
            futures::executor::block_on(limiter.submit("eth_getLogs", move || {
                started.store(true, Ordering::SeqCst);
                std::future::pending::<Result<(), CreditgateError>>()
            }))
        }
    });

    while !started.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(5));
    }
    drop(runtime);

    let err = caller.join().unwrap().unwrap_err();
    match err.kind() {
        CreditgateErrorKind::Dispatch(dispatch) => assert_eq!(
            dispatch.kind(),
            &DispatchErrorKind::Abandoned {
                method: "eth_getLogs".to_string()
            }
        ),
        other => panic!("Expected a dispatch error, got {other}"),
    }
}

#[test]
fn test_requires_runtime() {
    let err = CreditLimiter::new(LimiterConfig::default()).unwrap_err();
    match err.kind() {
        CreditgateErrorKind::Dispatch(dispatch) => {
            assert_eq!(dispatch.kind(), &DispatchErrorKind::NoRuntime)
        }
        other => panic!("Expected a dispatch error, got {other}"),
    }
}

#[tokio::test]
async fn test_rejects_invalid_config() {
    let config = LimiterConfig::default()
        .with_limits(CreditLimits::default().with_safe_per_second(600));
    let err = CreditLimiter::new(config).unwrap_err();
    assert!(matches!(err.kind(), CreditgateErrorKind::Config(_)));
}

#[tokio::test]
async fn test_oversized_event_buffer_is_an_error() {
    let config = LimiterConfig::default()
        .with_monitoring(MonitoringConfig::default().with_event_capacity(usize::MAX));
    let err = CreditLimiter::new(config).unwrap_err();
    assert!(matches!(err.kind(), CreditgateErrorKind::Config(_)));
}
