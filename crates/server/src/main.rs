use server::{Server, config::DashboardConfig, init_tracing};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = DashboardConfig::from_env()?;
    Server::run(config).await
}
