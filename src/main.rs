// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use amd_gpu_operator::{
    config::{Cli, OperatorConfig},
    constants::{
        CONFLICT_REQUEUE_DURATION_SECS, CONTROLLER_NAME, ERROR_REQUEUE_DURATION_SECS,
        FINALIZE_REQUEUE_DURATION_SECS, HEALTHZ_PATH, KIND_DEVICE_CONFIG, METRICS_SERVER_PATH,
        NON_RETRYABLE_REQUEUE_DURATION_SECS, READYZ_PATH, SUCCESS_REQUEUE_DURATION_SECS, TOKIO_WORKER_THREADS,
    },
    context::Context,
    crd::DeviceConfig,
    errors::ReconcileError,
    kmm::Module,
    metrics,
    reconcilers::{reconcile_deviceconfig, FinalizeStep, KubeStore, ReconcileOutcome},
};
use anyhow::{Context as _, Result};
use axum::{
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use clap::Parser;
use futures::StreamExt;
use k8s_openapi::api::{apps::v1::DaemonSet, core::v1::ConfigMap};
use kube::{
    runtime::{controller::Action, watcher::Config, Controller},
    Api, Client, ResourceExt,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

fn main() -> Result<()> {
    // Build Tokio runtime with custom thread names
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(TOKIO_WORKER_THREADS)
        .thread_name(CONTROLLER_NAME)
        .enable_all()
        .build()?;

    runtime.block_on(async_main())
}

/// Initialize logging.
///
/// Respects `RUST_LOG` (default `info`) and `RUST_LOG_FORMAT` (`json` or text).
fn init_logging() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let log_format = std::env::var("RUST_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    match log_format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .with_ansi(true)
                .compact()
                .init();
        }
    }
}

async fn async_main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    info!("Starting AMD GPU operator");
    let config = OperatorConfig::load(&cli).await?;
    debug!(
        metrics_bind_address = %config.metrics_bind_address,
        health_probe_bind_address = %config.health_probe_bind_address,
        api_timeout_secs = config.api_timeout_secs,
        enable_node_labeller = config.reconciler.enable_node_labeller,
        "Configuration loaded"
    );

    debug!("Initializing Kubernetes client");
    let client = Client::try_default().await?;
    debug!("Kubernetes client initialized successfully");

    let shutdown = CancellationToken::new();
    tokio::spawn(wait_for_shutdown_signal(shutdown.clone()));

    let store = KubeStore::new(
        client.clone(),
        shutdown.clone(),
        config.api_timeout(),
        CONTROLLER_NAME,
    );
    let ctx = Arc::new(Context::new(store, config.reconciler.clone()));

    tokio::try_join!(
        run_deviceconfig_controller(client, ctx, shutdown.clone()),
        serve(&config.metrics_bind_address, metrics_router(), shutdown.clone()),
        serve(&config.health_probe_bind_address, health_router(), shutdown.clone()),
    )
    .inspect_err(|_| shutdown.cancel())?;

    info!("Graceful shutdown completed successfully");
    Ok(())
}

/// Cancel `shutdown` on SIGINT or SIGTERM.
async fn wait_for_shutdown_signal(shutdown: CancellationToken) {
    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received SIGINT, initiating graceful shutdown...");
        }
        () = terminate => {
            info!("Received SIGTERM (pod termination), initiating graceful shutdown...");
        }
        () = shutdown.cancelled() => {}
    }
    shutdown.cancel();
}

/// Run the `DeviceConfig` controller until `shutdown` fires.
async fn run_deviceconfig_controller(
    client: Client,
    ctx: Arc<Context>,
    shutdown: CancellationToken,
) -> Result<()> {
    info!("Starting DeviceConfig controller");

    let api = Api::<DeviceConfig>::all(client.clone());

    // The controller wants a Sync trigger future; bridge the token through a oneshot.
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let token = shutdown.clone();
    tokio::spawn(async move {
        token.cancelled().await;
        let _ = stop_tx.send(());
    });

    Controller::new(api, Config::default())
        .owns(Api::<Module>::all(client.clone()), Config::default())
        .owns(Api::<DaemonSet>::all(client.clone()), Config::default())
        .owns(Api::<ConfigMap>::all(client), Config::default())
        .graceful_shutdown_on(async move {
            let _ = stop_rx.await;
        })
        .run(reconcile_deviceconfig_wrapper, error_policy, ctx)
        .for_each(|res| async move {
            match res {
                Ok((obj_ref, action)) => debug!("Reconciled {}: {:?}", obj_ref, action),
                Err(e) => warn!("Reconcile failed: {}", e),
            }
        })
        .await;

    info!("DeviceConfig controller stopped");
    shutdown.cancel();
    Ok(())
}

/// Reconcile wrapper for `DeviceConfig`
async fn reconcile_deviceconfig_wrapper(
    device_config: Arc<DeviceConfig>,
    ctx: Arc<Context>,
) -> Result<Action, ReconcileError> {
    let start = Instant::now();
    let namespace = device_config.namespace().unwrap_or_default();
    let name = device_config.name_any();

    debug!(
        namespace = %namespace,
        name = %name,
        "Reconcile wrapper called for DeviceConfig"
    );

    match reconcile_deviceconfig(&ctx, &namespace, &name).await {
        Ok(outcome) => {
            metrics::record_reconciliation_success(KIND_DEVICE_CONFIG, start.elapsed());
            info!(
                "Successfully reconciled DeviceConfig {}/{}: {:?}",
                namespace, name, outcome
            );
            Ok(requeue_after_success(&outcome))
        }
        Err(e) => {
            error!("Failed to reconcile DeviceConfig {}/{}: {}", namespace, name, e);
            metrics::record_reconciliation_error(KIND_DEVICE_CONFIG, start.elapsed());
            metrics::record_error(KIND_DEVICE_CONFIG, e.metric_label());
            Err(e)
        }
    }
}

/// Next action after a successful pass.
fn requeue_after_success(outcome: &ReconcileOutcome) -> Action {
    match outcome {
        ReconcileOutcome::Synced(_) => {
            Action::requeue(Duration::from_secs(SUCCESS_REQUEUE_DURATION_SECS))
        }
        ReconcileOutcome::Finalizing(FinalizeStep::DeletedChild(_)) => {
            Action::requeue(Duration::from_secs(FINALIZE_REQUEUE_DURATION_SECS))
        }
        ReconcileOutcome::NotFound
        | ReconcileOutcome::Finalizing(FinalizeStep::FinalizerRemoved) => {
            Action::await_change()
        }
    }
}

/// Requeue reason and delay for a failed pass.
fn requeue_for_error(err: &ReconcileError) -> (&'static str, Duration) {
    if err.is_conflict() {
        ("conflict", Duration::from_secs(CONFLICT_REQUEUE_DURATION_SECS))
    } else if !err.is_retryable() {
        (
            "non_retryable",
            Duration::from_secs(NON_RETRYABLE_REQUEUE_DURATION_SECS),
        )
    } else {
        ("error", Duration::from_secs(ERROR_REQUEUE_DURATION_SECS))
    }
}

/// Error policy for controller
fn error_policy(
    _resource: Arc<DeviceConfig>,
    err: &ReconcileError,
    _ctx: Arc<Context>,
) -> Action {
    let (reason, delay) = requeue_for_error(err);
    metrics::record_reconciliation_requeue(KIND_DEVICE_CONFIG, reason);
    Action::requeue(delay)
}

fn metrics_router() -> Router {
    Router::new().route(METRICS_SERVER_PATH, get(metrics_handler))
}

fn health_router() -> Router {
    Router::new()
        .route(HEALTHZ_PATH, get(|| async { "ok" }))
        .route(READYZ_PATH, get(|| async { "ok" }))
}

async fn metrics_handler() -> impl IntoResponse {
    match metrics::gather_metrics() {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

/// Serve `router` on `addr` until `shutdown` fires.
async fn serve(addr: &str, router: Router, shutdown: CancellationToken) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("HTTP server listening on {}", addr);
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}
