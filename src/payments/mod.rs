use async_trait::async_trait;
use std::sync::Arc;

use crate::errors::PaymentError;
use crate::pricing::CreditPackage;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Checkout {
    /// Payment already settled; credit immediately.
    Completed,
    /// Customer must finish checkout; credit on confirmation.
    Pending {
        session_id: String,
        checkout_url: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStatus {
    pub paid: bool,
    pub user_id: Option<String>,
    pub package_id: Option<String>,
}

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn checkout(&self, user_id: &str, package: &CreditPackage) -> Result<Checkout, PaymentError>;

    async fn session_status(&self, session_id: &str) -> Result<SessionStatus, PaymentError>;
}

mod simulated;
#[cfg(feature = "payments-stripe")]
mod stripe;

pub use simulated::SimulatedPayments;
#[cfg(feature = "payments-stripe")]
pub use stripe::StripePayments;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ProviderKind {
    Simulated,
    Stripe,
}

pub struct StripeSettings {
    pub secret_key: String,
    pub api_base: String,
    pub public_url: String,
}

pub fn build_payments(
    kind: ProviderKind,
    stripe: Option<StripeSettings>,
) -> Result<Arc<dyn PaymentProvider>, String> {
    match (kind, stripe) {
        (ProviderKind::Simulated, _) => Ok(Arc::new(SimulatedPayments)),
        #[cfg(feature = "payments-stripe")]
        (ProviderKind::Stripe, Some(s)) => Ok(Arc::new(StripePayments::new(
            s.api_base,
            s.secret_key,
            s.public_url,
        ))),
        #[cfg(feature = "payments-stripe")]
        (ProviderKind::Stripe, None) => Err("stripe provider requires STRIPE_SECRET_KEY".into()),
        #[cfg(not(feature = "payments-stripe"))]
        (ProviderKind::Stripe, _) => {
            Err("stripe provider not compiled in (enable the payments-stripe feature)".into())
        }
    }
}
