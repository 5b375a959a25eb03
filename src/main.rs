use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

mod api;
mod auth;
mod config;
mod errors;
mod health;
mod ledger;
mod logging;
mod payments;
mod pdf;
mod pricing;
mod ratelimit;
mod summarize;

use crate::api::AppState;
use crate::auth::AuthState;
use crate::config::AppConfig;
use crate::health::PaymentsProbe;
use crate::ledger::{build_store, StoreKind};
use crate::payments::{build_payments, ProviderKind, StripeSettings};
use crate::ratelimit::RateLimiter;
use crate::summarize::build_summarizer;

const RATE_LIMIT_PURGE_EVERY: Duration = Duration::from_secs(60 * 60);
const PAYMENTS_PROBE_EVERY: Duration = Duration::from_secs(5 * 60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_logging();

    let cfg = AppConfig::from_env_and_args();
    let auth = Arc::new(AuthState::new(
        cfg.jwt_secret.clone(),
        cfg.allow_anonymous,
        cfg.token_ttl_hours,
    ));

    if let Err(e) = cfg.validate() {
        tracing::error!(config_error=%e, "invalid config");
        anyhow::bail!("invalid config: {e}");
    }

    if let Some(user_id) = cfg.issue_token.as_deref() {
        let token = auth.issue_token(user_id)?;
        println!("{token}");
        return Ok(());
    }

    let pricing = Arc::new(cfg.pricing());
    let store = build_store(cfg.store, cfg.data_dir.clone(), cfg.free_tier_credits)?;
    let payments = match build_payments(
        cfg.payment_provider,
        cfg.stripe_secret_key.clone().map(|secret_key| StripeSettings {
            secret_key,
            api_base: cfg.stripe_api_base.clone(),
            public_url: cfg.public_url.clone(),
        }),
    ) {
        Ok(p) => p,
        Err(e) => {
            tracing::error!(error=%e, "payment provider unavailable");
            anyhow::bail!("payment provider unavailable: {e}");
        }
    };
    let limiter = Arc::new(RateLimiter::new(
        cfg.rate_limit_max,
        Duration::from_secs(cfg.rate_limit_window_secs),
    ));
    let purger = limiter.spawn_purger(RATE_LIMIT_PURGE_EVERY);

    let data_dir = (cfg.store == StoreKind::File).then(|| cfg.data_dir.clone());
    let data_dir_ok = data_dir.as_deref().map_or(true, health::check_data_dir);
    let (payments_probe, probe_task) = if cfg.payment_provider == ProviderKind::Stripe {
        let probe = Arc::new(PaymentsProbe::new(
            health::check_stripe(&cfg.stripe_api_base).await,
        ));
        let task = probe.spawn_refresh(cfg.stripe_api_base.clone(), PAYMENTS_PROBE_EVERY);
        (Some(probe), Some(task))
    } else {
        (None, None)
    };
    let stripe_ok = payments_probe.as_ref().map_or(true, |p| p.is_ok());

    let state = AppState {
        store,
        summarizer: build_summarizer(),
        payments,
        pricing,
        auth,
        limiter,
        max_upload_bytes: cfg.max_upload_bytes,
        data_dir,
        payments_probe,
    };
    let app = api::build_router(state.clone());

    let listener = tokio::net::TcpListener::bind(cfg.bind).await?;
    let local_addr = listener.local_addr()?;
    // Startup health checks (best-effort, logged only)
    tracing::info!(
        addr = %local_addr,
        store = state.store.backend(),
        store_ok = data_dir_ok,
        payments = state.payments.name(),
        payments_ok = stripe_ok,
        anonymous = cfg.allow_anonymous,
        free_tier_credits = cfg.free_tier_credits,
        "server listening"
    );

    let served = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("Received shutdown signal, draining connections...");
    })
    .await;

    purger.abort();
    if let Some(task) = probe_task {
        task.abort();
    }
    if let Err(e) = served {
        tracing::error!(error=?e, "server terminated with error");
        return Err(e.into());
    }
    Ok(())
}
