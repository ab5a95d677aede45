// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

use cmr_core::env::env_bool;
use cmr_server::{build_router, AppState, ServerConfig, SmartCache};
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => {}
                    _ = sigint.recv() => {}
                }
            }
            _ => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if env_bool("CMR_LOG_JSON", true) {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

fn build_cache(config: &ServerConfig) -> Result<SmartCache, String> {
    let core = &config.core;
    match &config.redis_url {
        Some(url) => SmartCache::redis(
            url,
            &config.redis_prefix,
            core.cache_ttl,
            core.redis_mem_threshold,
            core.redis_mem_cap_bytes,
        )
        .map_err(|e| e.to_string()),
        None => Ok(SmartCache::in_memory(
            core.cache_ttl,
            core.redis_mem_threshold,
            core.redis_mem_cap_bytes,
        )),
    }
}

#[tokio::main]
async fn main() -> Result<(), String> {
    init_tracing();
    let config = ServerConfig::from_env();
    config.validate().map_err(|e| format!("invalid configuration: {}", e.0))?;
    let cache = build_cache(&config)?;
    let bind = config.bind.clone();
    info!(
        bind = %bind,
        db = %config.db_path.display(),
        redis = config.redis_url.is_some(),
        "starting cmr-server"
    );
    let app = build_router(AppState::new(config, cache));
    let listener = TcpListener::bind(&bind)
        .await
        .map_err(|e| format!("bind {bind} failed: {e}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown_signal())
        .await
        .map_err(|e| {
            error!(error = %e, "server stopped with error");
            e.to_string()
        })?;
    info!("cmr-server stopped");
    Ok(())
}
