//! Server entry point.

use tracing::info;

use crate::config::ApiConfig;
use crate::routes::router;
use crate::state::AppState;

/// Bind and serve until the process is stopped.
pub async fn serve(config: ApiConfig) -> anyhow::Result<()> {
    let bind_addr = config.http.bind_addr;
    let state = AppState::new(config);
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!(addr = %bind_addr, "try-on server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
