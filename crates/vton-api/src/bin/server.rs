//! Try-on API server binary.
//!
//! Configuration comes from `vton.toml` (or the file named by
//! `VTON_CONFIG`) overlaid with `VTON_`-prefixed environment variables;
//! with neither present the demo defaults apply.

use vton_api::config::ApiConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config_path =
        std::env::var("VTON_CONFIG").unwrap_or_else(|_| "vton.toml".to_string());
    let config = if std::path::Path::new(&config_path).exists() {
        ApiConfig::from_file(&config_path)?
    } else {
        ApiConfig::from_env().unwrap_or_default()
    };

    vton_api::server::serve(config).await
}
