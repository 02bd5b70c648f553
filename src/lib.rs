// chronowheel: scheduler coordinator (§4.6).
//
// Owns every component's lifecycle: wires the durable queue, the timing
// wheel, the dispatcher worker pool, the recovery loader, and the HTTP
// shell together, in the startup order spec.md prescribes, and tears them
// down in the matching order on shutdown.

use chronowheel_api::AppState;
use chronowheel_config::SchedulerConfig;
use chronowheel_dispatch::{DispatchMetrics, Dispatcher, RetryConfig};
use chronowheel_queue::{DurableQueue, KafkaConfig, KafkaQueue};
use chronowheel_wheel::WheelConfig;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// A fully wired, running scheduler. Consuming this via [`shutdown`] or
/// [`run_until_shutdown`] tears every component down in the order spec.md
/// §4.6 prescribes.
pub struct Coordinator {
    dispatcher: Dispatcher,
    recovery: chronowheel_recovery::RecoveryHandle,
    wheel: chronowheel_wheel::WheelHandle,
    wheel_join: JoinHandle<()>,
    http_shutdown_tx: oneshot::Sender<()>,
    http_join: JoinHandle<std::io::Result<()>>,
    accepting: Arc<AtomicBool>,
    shutdown_timeout: Duration,
    // Held only to keep the queue client (and its background connections)
    // alive until shutdown; never read directly.
    _queue: Arc<dyn DurableQueue>,
}

impl Coordinator {
    /// Start every component in dependency order: durable queue client,
    /// timing wheel, dispatcher workers, recovery loader subscription,
    /// then the HTTP shell that begins accepting ingress traffic.
    pub async fn start(config: SchedulerConfig) -> anyhow::Result<Self> {
        let queue: Arc<dyn DurableQueue> = Arc::new(KafkaQueue::connect(KafkaConfig {
            bootstrap_servers: config.queue.bootstrap_servers.clone(),
            stream_name: config.queue.stream_name.clone(),
            publish_timeout: Duration::from_secs(config.queue.publish_timeout_secs),
        })?);

        let wheel_config = WheelConfig {
            tick_duration: Duration::from_millis(config.wheel.tick_duration_ms),
            slot_counts: config.wheel.slot_counts,
        };
        let (emit_tx, emit_rx) = mpsc::channel(4096);
        let (wheel, wheel_join) = chronowheel_wheel::spawn(wheel_config, emit_tx);

        let metrics = Arc::new(DispatchMetrics::new());
        let retry_config = RetryConfig {
            base_delay: Duration::from_millis(config.dispatch.base_delay_ms),
            max_delay: Duration::from_secs(config.dispatch.max_delay_secs),
            jitter_fraction: config.dispatch.jitter_fraction,
            max_attempts: config.dispatch.max_attempts,
            per_attempt_timeout: Duration::from_secs(config.dispatch.per_attempt_timeout_secs),
        };
        let dispatcher = Dispatcher::spawn(
            config.dispatch.worker_count,
            emit_rx,
            Arc::clone(&queue),
            wheel.clone(),
            retry_config,
            Arc::clone(&metrics),
        );

        let recovery = chronowheel_recovery::spawn(
            Arc::clone(&queue),
            wheel.clone(),
            config.queue.consumer_name.clone(),
        )
        .await?;

        let accepting = Arc::new(AtomicBool::new(true));
        let app_state = AppState {
            queue: Arc::clone(&queue),
            wheel: wheel.clone(),
            metrics: Arc::clone(&metrics),
            max_attempts: config.dispatch.max_attempts,
            max_payload_bytes: config.http.max_payload_bytes,
            accepting: Arc::clone(&accepting),
        };
        let app = chronowheel_api::router(app_state);

        let listener = TcpListener::bind(&config.http.bind_addr).await?;
        info!(addr = %config.http.bind_addr, "chronowheel listening");

        let (http_shutdown_tx, http_shutdown_rx) = oneshot::channel();
        let http_join = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = http_shutdown_rx.await;
                })
                .await
        });

        Ok(Self {
            dispatcher,
            recovery,
            wheel,
            wheel_join,
            http_shutdown_tx,
            http_join,
            accepting,
            shutdown_timeout: Duration::from_secs(config.dispatch.shutdown_timeout_secs),
            _queue: queue,
        })
    }

    /// Block until SIGTERM or Ctrl-C, then run the shutdown sequence.
    pub async fn run_until_shutdown(self) -> anyhow::Result<()> {
        wait_for_shutdown_signal().await;
        self.shutdown().await
    }

    /// The shutdown sequence from spec.md §4.6, in order:
    /// stop accepting ingress, stop the tick driver, wait for in-flight
    /// dispatcher workers, unsubscribe the recovery loader, exit. Any task
    /// still in the wheel or awaiting ack is replayed on next startup —
    /// that is the intended recovery contract, not a bug to work around
    /// here.
    pub async fn shutdown(self) -> anyhow::Result<()> {
        info!("shutdown signal received, draining in-flight work");
        self.accepting.store(false, Ordering::Relaxed);

        self.wheel.shutdown().await;
        if let Err(e) = self.wheel_join.await {
            warn!(error = %e, "wheel tick driver task panicked");
        }
        self.dispatcher.join(self.shutdown_timeout).await;
        self.recovery.shutdown().await;

        let _ = self.http_shutdown_tx.send(());
        match self.http_join.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "http server exited with an error"),
            Err(e) => warn!(error = %e, "http server task panicked"),
        }

        info!("chronowheel shutdown complete");
        Ok(())
    }
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl-C"),
        _ = terminate => info!("received SIGTERM"),
    }
}
