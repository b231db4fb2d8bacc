use std::path::PathBuf;

use pointdash::{logging, server, settings::Settings};

// Usage: pointdash [config.toml]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_logging()?;

    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    let settings = Settings::load(config_path.as_deref())?;

    server::run_server(settings).await
}
