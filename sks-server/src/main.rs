//! Security Keys Service
//!
//! Maintains rotating PubSub keys for the configured security groups and
//! serves them through `GetSecurityKeys` / `SetSecurityKeys`.
//!
//! The method transport is provided by the embedding OPC UA server. When
//! running standalone in the `pull` or `push` role, the peer key service is
//! started in process.

use anyhow::Result;
use sks_config::{SksConfig, SksRole};
use sks_keys::SecurityKeyServiceClient;
use sks_logging::LogFormat;
use sks_server::{shutdown_signal, HealthServer, LocalSksClient, SksNode};
use sks_types::{CallContext, MessageSecurityMode, UserIdentity};
use std::sync::Arc;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = SksConfig::from_env()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

    // Initialize logging
    let log_format: LogFormat = config.log_format.parse().map_err(anyhow::Error::msg)?;
    sks_logging::init(log_format, "sks-server", config.log_level());

    info!(
        role = ?config.role,
        security_groups = ?config.security_groups,
        key_lifetime_ms = config.key_lifetime_ms,
        "Configuration loaded"
    );

    // Peer key service for the pull and push roles
    let mut peer = match config.role {
        SksRole::Master => None,
        SksRole::Pull => {
            let mut master_config = config.clone();
            master_config.role = SksRole::Master;
            let mut master = SksNode::build(&master_config, None)?;
            master.start()?;
            Some(master)
        }
        SksRole::Push => Some(SksNode::receiver(&config)?),
    };
    let upstream = peer.as_ref().map(|node| {
        warn!(role = ?config.role, "No remote transport configured, using an in-process peer");
        let context = CallContext::new(
            MessageSecurityMode::SignAndEncrypt,
            UserIdentity::Username(config.admin_user.clone()),
        );
        Arc::new(LocalSksClient::new(node.service(), context)) as Arc<dyn SecurityKeyServiceClient>
    });

    let mut node = SksNode::build(&config, upstream)?;
    node.start()?;
    info!("Key scheduler running");

    // Start health check server
    let health_handle = config.health_port.map(|port| {
        let server = HealthServer::new(port, node.monitor(), node.registry());
        tokio::spawn(async move {
            if let Err(e) = server.start(shutdown_signal()).await {
                error!(error = %e, "Health check server error");
            }
        })
    });

    info!("Security Keys Service running. Press Ctrl+C to stop.");
    shutdown_signal().await;

    node.shutdown();
    if let Some(peer) = peer.as_mut() {
        peer.shutdown();
    }
    if let Some(handle) = health_handle {
        handle.abort();
    }

    info!("Security Keys Service stopped");
    Ok(())
}
