use serde::Serialize;

use crate::ledger::model::SubscriptionTier;
use crate::summarize::SummaryMode;

#[derive(Debug, Clone, Copy, Serialize)]
pub struct CreditCosts {
    pub brief: u64,
    pub detailed: u64,
}

impl Default for CreditCosts {
    fn default() -> Self {
        Self {
            brief: 1,
            detailed: 2,
        }
    }
}

impl CreditCosts {
    pub fn for_mode(&self, mode: SummaryMode) -> u64 {
        match mode {
            SummaryMode::Brief => self.brief,
            SummaryMode::Detailed => self.detailed,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditPackage {
    pub id: SubscriptionTier,
    pub credits: u64,
    pub price_cents: u64,
}

/// Cost table and purchasable packages, fixed at startup.
#[derive(Debug, Clone)]
pub struct Pricing {
    pub costs: CreditCosts,
    pub free_tier_credits: u64,
    packages: Vec<CreditPackage>,
}

impl Pricing {
    pub fn new(costs: CreditCosts, free_tier_credits: u64) -> Self {
        let packages = vec![
            CreditPackage {
                id: SubscriptionTier::Free,
                credits: free_tier_credits,
                price_cents: 0,
            },
            CreditPackage {
                id: SubscriptionTier::Basic,
                credits: 100,
                price_cents: 999,
            },
            CreditPackage {
                id: SubscriptionTier::Pro,
                credits: 500,
                price_cents: 2999,
            },
            CreditPackage {
                id: SubscriptionTier::Enterprise,
                credits: 2000,
                price_cents: 9999,
            },
        ];
        Self {
            costs,
            free_tier_credits,
            packages,
        }
    }

    pub fn packages(&self) -> &[CreditPackage] {
        &self.packages
    }

    pub fn package(&self, id: &str) -> Option<&CreditPackage> {
        let tier = SubscriptionTier::parse(id)?;
        self.packages.iter().find(|p| p.id == tier)
    }
}

impl Default for Pricing {
    fn default() -> Self {
        Self::new(CreditCosts::default(), 10)
    }
}
