//! recordlens server binary.
//!
//! Points the engine at a storage path, builds or reopens the indexes, and
//! serves the search API.
//!
//! Usage:
//! ```bash
//! recordlens-server --storage ./data --index ./index --port 8123
//! recordlens-server --storage https://s3.amazonaws.com/mybucket/records
//! ```

use anyhow::Result;
use recordlens::{api, Config, Engine};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

fn config_from_args() -> Config {
    let mut storage_path = "./data".to_string();
    let mut index_path = PathBuf::from("./index");
    let mut port: u16 = 8123;

    let args: Vec<String> = std::env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--storage" => {
                i += 1;
                if let Some(v) = args.get(i) {
                    storage_path = v.clone();
                }
            }
            "--index" => {
                i += 1;
                if let Some(v) = args.get(i) {
                    index_path = PathBuf::from(v);
                }
            }
            "--port" => {
                i += 1;
                port = args.get(i).and_then(|s| s.parse().ok()).unwrap_or(port);
            }
            _ => {}
        }
        i += 1;
    }

    Config {
        storage_path,
        index_path,
        port,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = config_from_args();
    tracing::info!(
        storage = %config.storage_path,
        index = %config.index_path.display(),
        "starting recordlens"
    );

    let engine = Engine::start(&config).await?;
    api::serve(Arc::new(engine), config.port).await?;
    Ok(())
}
