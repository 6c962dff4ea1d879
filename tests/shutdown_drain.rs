// Coordinated shutdown: intake closes, the grace window lets fast work
// finish, stragglers are cancelled, and the process reaches Stopped.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{sleep, timeout};

use embednet::{
    BrokerConfig, EmbedError, EmbedService, EmbeddingStrategy, Lifecycle, StrategyError,
};

/// "fast" payloads answer in ~10ms; everything else never answers.
struct FastOrStuck;

#[async_trait]
impl EmbeddingStrategy for FastOrStuck {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, StrategyError> {
        if text == "fast" {
            sleep(Duration::from_millis(10)).await;
            Ok(vec![1.0])
        } else {
            std::future::pending().await
        }
    }
}

fn draining_service(grace: Duration) -> EmbedService {
    EmbedService::open(
        BrokerConfig::new()
            .with_pool_size(2)
            .with_grace_timeout(grace),
        Arc::new(FastOrStuck),
    )
}

#[tokio::test]
async fn drain_completes_fast_work_and_cancels_the_straggler() {
    let service = draining_service(Duration::from_millis(50));
    let mut control = service.server_control();

    let mut fast = service.submit("fast", Duration::from_secs(2)).await.unwrap();
    let mut slow = service.submit("slow", Duration::from_secs(2)).await.unwrap();

    // Both dispatched before the signal arrives.
    sleep(Duration::from_millis(5)).await;
    service.shutdown().await;

    assert_eq!(fast.result().await, Ok(vec![1.0]));
    assert_eq!(slow.result().await, Err(EmbedError::Cancelled));

    timeout(Duration::from_millis(500), control.stopped())
        .await
        .expect("process must reach Stopped");
    assert!(control.should_exit());

    service.close().await;
}

#[tokio::test]
async fn submit_fails_with_broker_closed_once_draining() {
    let service = Arc::new(draining_service(Duration::from_millis(100)));

    let mut held = service.submit("held", Duration::from_secs(2)).await.unwrap();
    sleep(Duration::from_millis(5)).await;

    let shutdown = tokio::spawn({
        let service = service.clone();
        async move { service.shutdown().await }
    });

    // The drain is inside its grace window: intake must already be closed.
    sleep(Duration::from_millis(20)).await;
    assert_eq!(service.state(), Lifecycle::Draining);
    assert_eq!(
        service.submit("late", Duration::from_secs(2)).await.err(),
        Some(EmbedError::BrokerClosed)
    );

    shutdown.await.unwrap();
    assert_eq!(held.result().await, Err(EmbedError::Cancelled));
    assert_eq!(service.state(), Lifecycle::Stopped);

    service.close().await;
}

#[tokio::test]
async fn repeated_shutdown_signals_are_ignored() {
    let service = draining_service(Duration::from_millis(20));

    service.shutdown().await;
    service.shutdown().await;
    service.shutdown().await;

    assert_eq!(service.state(), Lifecycle::Stopped);
    service.close().await;
}

#[tokio::test]
async fn drain_with_nothing_pending_stops_promptly() {
    let service = draining_service(Duration::from_secs(5));
    let started = tokio::time::Instant::now();

    service.shutdown().await;

    assert!(started.elapsed() < Duration::from_millis(100));
    assert_eq!(service.state(), Lifecycle::Stopped);
    service.close().await;
}

#[tokio::test]
async fn run_until_drains_when_the_signal_fires() {
    let service = draining_service(Duration::from_millis(20));
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();

    let mut slow = service.submit("slow", Duration::from_secs(2)).await.unwrap();
    sleep(Duration::from_millis(5)).await;

    tx.send(()).unwrap();
    service
        .run_until(async {
            let _ = rx.await;
        })
        .await;

    assert_eq!(slow.result().await, Err(EmbedError::Cancelled));
    assert_eq!(service.state(), Lifecycle::Stopped);
    service.close().await;
}
