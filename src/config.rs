use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::ledger::StoreKind;
use crate::payments::ProviderKind;
use crate::pricing::{CreditCosts, Pricing};

const MAX_TOKEN_TTL_HOURS: u64 = 24 * 365;

#[derive(Debug, Clone, Parser)]
#[command(name = "pdf-summary")]
#[command(about = "PDF summarization service with a per-user credit ledger", long_about = None)]
pub struct AppConfig {
    #[arg(long, env = "BIND_ADDR", default_value = "127.0.0.1:3000")]
    pub bind: SocketAddr,

    #[arg(long, env = "CREDIT_STORE", value_enum, default_value = "memory")]
    pub store: StoreKind,

    #[arg(long, env = "DATA_DIR", default_value = "./data")]
    pub data_dir: PathBuf,

    #[arg(long, env = "FREE_TIER_CREDITS", default_value_t = 10)]
    pub free_tier_credits: u64,

    #[arg(long, env = "CREDIT_COST_BRIEF", default_value_t = 1)]
    pub credit_cost_brief: u64,

    #[arg(long, env = "CREDIT_COST_DETAILED", default_value_t = 2)]
    pub credit_cost_detailed: u64,

    #[arg(long, env = "RATE_LIMIT_MAX", default_value_t = 100)]
    pub rate_limit_max: usize,

    #[arg(long, env = "RATE_LIMIT_WINDOW_SECS", default_value_t = 15 * 60)]
    pub rate_limit_window_secs: u64,

    #[arg(long, env = "MAX_UPLOAD_BYTES", default_value_t = 10 * 1024 * 1024)]
    pub max_upload_bytes: usize,

    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: Option<String>,

    #[arg(long, env = "TOKEN_TTL_HOURS", default_value_t = 24)]
    pub token_ttl_hours: u64,

    /// Resolve requests without an Authorization header to a shared demo user.
    #[arg(long, env = "ALLOW_ANONYMOUS")]
    pub allow_anonymous: bool,

    /// Print a signed token for this user id and exit.
    #[arg(long, value_name = "USER_ID")]
    pub issue_token: Option<String>,

    #[arg(long, env = "PAYMENT_PROVIDER", value_enum, default_value = "simulated")]
    pub payment_provider: ProviderKind,

    #[arg(long, env = "STRIPE_SECRET_KEY", hide_env_values = true)]
    pub stripe_secret_key: Option<String>,

    #[arg(long, env = "STRIPE_API_BASE", default_value = "https://api.stripe.com")]
    pub stripe_api_base: String,

    #[arg(long, env = "PUBLIC_URL", default_value = "http://localhost:3000")]
    pub public_url: String,
}

impl AppConfig {
    pub fn from_env_and_args() -> Self {
        Self::parse()
    }

    pub fn pricing(&self) -> Pricing {
        Pricing::new(
            CreditCosts {
                brief: self.credit_cost_brief,
                detailed: self.credit_cost_detailed,
            },
            self.free_tier_credits,
        )
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.rate_limit_max == 0 || self.rate_limit_window_secs == 0 {
            return Err("rate limit max and window must be > 0".into());
        }
        if self.max_upload_bytes == 0 {
            return Err("max_upload_bytes must be > 0".into());
        }
        if self.max_upload_bytes > 100 * 1024 * 1024 {
            return Err("max_upload_bytes too large (max 100MB)".into());
        }
        if self.credit_cost_brief == 0 || self.credit_cost_detailed == 0 {
            return Err("credit costs must be > 0".into());
        }
        if self.token_ttl_hours == 0 || self.token_ttl_hours > MAX_TOKEN_TTL_HOURS {
            return Err(format!("token_ttl_hours must be between 1 and {MAX_TOKEN_TTL_HOURS}"));
        }
        url::Url::parse(&self.public_url).map_err(|_| "Invalid PUBLIC_URL format".to_string())?;
        match self.jwt_secret.as_deref() {
            Some(s) if s.len() < 16 => return Err("JWT_SECRET must be at least 16 bytes".into()),
            None if !self.allow_anonymous => {
                return Err("JWT_SECRET is required unless --allow-anonymous is set".into())
            }
            _ => {}
        }
        if self.payment_provider == ProviderKind::Stripe && !cfg!(feature = "payments-stripe") {
            return Err("stripe provider requires a build with the payments-stripe feature".into());
        }
        if self.payment_provider == ProviderKind::Stripe {
            if self.stripe_secret_key.as_deref().map_or(true, str::is_empty) {
                return Err("STRIPE_SECRET_KEY is required for the stripe provider".into());
            }
            url::Url::parse(&self.stripe_api_base)
                .map_err(|_| "Invalid STRIPE_API_BASE URL format".to_string())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> AppConfig {
        let mut argv = vec!["pdf-summary"];
        argv.extend_from_slice(args);
        AppConfig::try_parse_from(argv).expect("parse")
    }

    #[test]
    fn anonymous_mode_needs_no_secret() {
        let cfg = parse(&["--allow-anonymous"]);
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.store, StoreKind::Memory);
        assert_eq!(cfg.pricing().costs.detailed, 2);
    }

    #[test]
    fn secret_is_required_and_must_be_long_enough() {
        assert!(parse(&[]).validate().is_err());
        assert!(parse(&["--jwt-secret", "short"]).validate().is_err());
        assert!(parse(&["--jwt-secret", "0123456789abcdef"]).validate().is_ok());
    }

    #[test]
    fn stripe_provider_requires_key() {
        let cfg = parse(&["--allow-anonymous", "--payment-provider", "stripe"]);
        assert!(cfg.validate().is_err());
        let cfg = parse(&[
            "--allow-anonymous",
            "--payment-provider",
            "stripe",
            "--stripe-secret-key",
            "sk_test_1",
        ]);
        assert_eq!(cfg.validate().is_ok(), cfg!(feature = "payments-stripe"));
    }

    #[test]
    fn token_ttl_is_bounded() {
        assert!(parse(&["--allow-anonymous", "--token-ttl-hours", "0"]).validate().is_err());
        let huge = u64::MAX.to_string();
        assert!(parse(&["--allow-anonymous", "--token-ttl-hours", &huge]).validate().is_err());
        assert!(parse(&["--allow-anonymous", "--token-ttl-hours", "72"]).validate().is_ok());
    }

    #[test]
    fn oversized_upload_limit_is_rejected() {
        let cfg = parse(&["--allow-anonymous", "--max-upload-bytes", "200000000"]);
        assert!(cfg.validate().is_err());
    }
}
