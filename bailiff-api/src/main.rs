//! bailiff-receiver: accepts sealed case documents and serves the key
//! registry. Configuration comes from `BAILIFF_*` environment variables; see
//! `bailiff_api::config`.

use anyhow::Context;
use bailiff_api::telemetry::init_tracing;
use bailiff_api::{bootstrap, build_router, ServerConfig};
use bailiff_envelope::Identity;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::from_env();
    init_tracing(config.log_format);

    let identity = Identity::load_or_generate(&config.keys_dir, &config.identity_name)
        .with_context(|| format!("loading identity from {}", config.keys_dir.display()))?;
    tracing::info!(key_id = %identity.key_id(), "receiver identity ready");

    let state = bootstrap(&config, identity)
        .await
        .context("opening receiver state")?;
    let app = build_router(state);

    tracing::info!(
        port = config.port,
        max_upload_bytes = config.max_upload_bytes,
        "starting bailiff receiver v{}",
        env!("CARGO_PKG_VERSION")
    );

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    axum::serve(listener, app).await.context("server exited")?;
    Ok(())
}
