// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! rrd — the rulerunner orchestrator daemon.
//!
//! Boots the store, selects the container engine backend, spawns one
//! worker per configured queue plus the monitor scheduler, and serves
//! the rulebook worker websocket until SIGINT.

use rr_core::SystemClock;
use rr_daemon::ws::MessageContext;
use rr_daemon::{DeploymentType, MonitorScheduler, Settings, Worker};
use rr_engine::{ContainerEngine, KubernetesEngine, PodmanEngine};
use rr_storage::Store;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let env_filter =
        || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // With RRD_LOG_DIR set, logs go to a daily-rolled file; otherwise stderr.
    let _appender_guard = match std::env::var("RRD_LOG_DIR") {
        Ok(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "rrd.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(env_filter())
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Some(guard)
        }
        Err(_) => {
            tracing_subscriber::fmt().with_env_filter(env_filter()).init();
            None
        }
    };

    let settings = Settings::from_env()?;
    tracing::info!(
        deployment_type = %settings.deployment_type,
        queues = ?settings.worker_queues,
        "starting rulerunner daemon"
    );

    let engine: Arc<dyn ContainerEngine> = match settings.deployment_type {
        DeploymentType::Podman => {
            Arc::new(PodmanEngine::connect(settings.podman_socket_url.clone()).await?)
        }
        DeploymentType::K8s => Arc::new(
            KubernetesEngine::connect(&settings.k8s_resource_prefix, &settings.k8s_namespace_file)
                .await?,
        ),
    };

    let store = Store::new();
    let clock = SystemClock;
    let shutdown = CancellationToken::new();
    let mut tasks = Vec::new();

    for queue_name in &settings.worker_queues {
        let worker = Worker::new(
            store.clone(),
            Arc::clone(&engine),
            settings.clone(),
            queue_name,
            clock.clone(),
        );
        tasks.push(tokio::spawn(worker.run(shutdown.clone())));
    }

    let scheduler = MonitorScheduler::new(store.clone(), settings.clone(), clock.clone());
    tasks.push(tokio::spawn(scheduler.run(shutdown.clone())));

    let context = Arc::new(MessageContext::new(store.clone(), settings.clone(), clock));
    let ws_task = {
        let shutdown = shutdown.clone();
        let listen_addr = settings.ws_listen_addr.clone();
        tokio::spawn(async move { rr_daemon::ws::serve(&listen_addr, context, shutdown).await })
    };

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown requested");
    shutdown.cancel();

    for task in tasks {
        let _ = task.await;
    }
    let _ = ws_task.await;
    tracing::info!("daemon stopped");
    Ok(())
}
