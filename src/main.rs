use tracing_subscriber::{fmt, EnvFilter};

use cas_server::common::config::Config;
use cas_server::server::CasServer;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_env("RUST_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_timer(fmt::time::uptime())
        .init();

    let config = Config::load().await?;
    let server = CasServer::new(config).await?;
    server.run().await?;

    Ok(())
}
