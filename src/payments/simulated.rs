use async_trait::async_trait;

use crate::errors::PaymentError;
use crate::payments::{Checkout, PaymentProvider, SessionStatus};
use crate::pricing::CreditPackage;

/// Accepts every purchase immediately. For development and tests.
#[derive(Default)]
pub struct SimulatedPayments;

#[async_trait]
impl PaymentProvider for SimulatedPayments {
    fn name(&self) -> &'static str {
        "simulated"
    }

    async fn checkout(&self, user_id: &str, package: &CreditPackage) -> Result<Checkout, PaymentError> {
        tracing::info!(user_id, package = package.id.as_str(), "simulated payment accepted");
        Ok(Checkout::Completed)
    }

    async fn session_status(&self, _session_id: &str) -> Result<SessionStatus, PaymentError> {
        Err(PaymentError::Unavailable)
    }
}
