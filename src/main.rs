use solominer::{config::Config, daemon::Daemon};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    solominer::tracing::init(config.debug);
    Daemon::new(config).run().await
}
