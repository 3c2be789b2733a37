use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use utils::process::SystemRunner;

use crate::{AppState, config::DashboardConfig, routes};

pub struct Server;

impl Server {
    pub async fn run(config: DashboardConfig) -> anyhow::Result<()> {
        let addr: SocketAddr = config
            .listen_addr
            .parse()
            .context("listen address is invalid")?;
        let cluster_name = config.cluster_name.clone();

        let state = AppState::new(config, Arc::new(SystemRunner))
            .context("failed to initialise application state")?;
        if state.chat().is_none() {
            tracing::info!("chat credentials not configured, chat endpoints disabled");
        }

        let router = routes::router(state);
        let tcp_listener = tokio::net::TcpListener::bind(addr)
            .await
            .context("failed to bind tcp listener")?;

        tracing::info!(%addr, cluster = %cluster_name, "dashboard server listening");

        axum::serve(tcp_listener, router.into_make_service())
            .await
            .context("dashboard server failure")?;

        Ok(())
    }
}
