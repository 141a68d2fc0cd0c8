//! Health check endpoint for the Security Keys Service
//!
//! Reports the scheduler tasks and turns `503` once a task degraded.
// Copyright 2025 Francisco F. Pinochet
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use serde_json::json;
use sks_keys::{SchedulerMonitor, SecurityGroupRegistry};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};

#[derive(Clone)]
struct HealthState {
    monitor: SchedulerMonitor,
    registry: Arc<SecurityGroupRegistry>,
}

/// Health check server state
pub struct HealthServer {
    port: u16,
    state: HealthState,
}

impl HealthServer {
    /// Create a new health check server
    pub fn new(port: u16, monitor: SchedulerMonitor, registry: Arc<SecurityGroupRegistry>) -> Self {
        Self {
            port,
            state: HealthState { monitor, registry },
        }
    }

    /// Start the health check server and run it until `shutdown` completes
    pub async fn start<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = Router::new()
            .route("/health", get(health_check))
            .route("/api/health", get(health_check))
            .with_state(self.state);

        let addr = format!("0.0.0.0:{}", self.port);
        let listener = TcpListener::bind(&addr).await
            .map_err(|e| anyhow::anyhow!("Failed to bind health check server to {}: {}", addr, e))?;

        info!(
            port = self.port,
            "Health check server started"
        );

        // Run server with graceful shutdown
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| anyhow::anyhow!("Health check server error: {}", e))?;

        info!("Health check server stopped");
        Ok(())
    }
}

/// Build the health report and its HTTP status
pub fn health_report(
    monitor: &SchedulerMonitor,
    registry: &SecurityGroupRegistry,
) -> (StatusCode, serde_json::Value) {
    let degraded = monitor.is_degraded();
    let tasks: Vec<serde_json::Value> = monitor
        .task_snapshots()
        .into_iter()
        .map(|task| {
            json!({
                "security_group_id": task.security_group_id,
                "state": task.state.as_str(),
                "period_ms": task.period_ms,
                "runs": task.runs,
                "failures": task.failures,
                "last_error": task.last_error,
            })
        })
        .collect();

    let (status, label) = if degraded {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    } else {
        (StatusCode::OK, "ok")
    };
    let body = json!({
        "status": label,
        "service": "sks-server",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
        "security_groups": registry.security_group_ids(),
        "tasks": tasks,
    });
    (status, body)
}

/// Health check handler
async fn health_check(State(state): State<HealthState>) -> (StatusCode, Json<serde_json::Value>) {
    let (status, body) = health_report(&state.monitor, &state.registry);
    (status, Json(body))
}

/// Graceful shutdown signal handler
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Unable to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Unable to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Shutdown signal (Ctrl+C) received");
        },
        _ = terminate => {
            info!("Shutdown signal (SIGTERM) received");
        },
    }
}
