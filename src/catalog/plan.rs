//! Plan definitions and billing cycles.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::module::derive_slug;
use crate::ids::{ModuleId, PlanId};

/// Billing cycle for a plan subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingCycle {
    Monthly,
    Yearly,
}

impl BillingCycle {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Monthly => "monthly",
            Self::Yearly => "yearly",
        }
    }

    /// Subscription period granted by one paid invoice of this cycle.
    #[must_use]
    pub fn duration_days(&self) -> i64 {
        match self {
            Self::Monthly => 30,
            Self::Yearly => 365,
        }
    }
}

impl std::fmt::Display for BillingCycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A subscription tier. Prices are set by an administrator and are
/// independent of the bundled modules' aggregates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub id: PlanId,
    pub name: String,
    pub slug: String,
    /// Price in minor units.
    pub price_monthly: i64,
    /// Yearly price; basic plans have none.
    pub price_yearly: Option<i64>,
    pub is_active: bool,
    pub is_basic: bool,
    /// Modules bundled into this plan.
    pub module_ids: Vec<ModuleId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Plan {
    #[must_use]
    pub fn new(params: NewPlan, now: DateTime<Utc>) -> Self {
        let slug = derive_slug(&params.name);
        Self {
            id: PlanId::new(),
            name: params.name,
            slug,
            price_monthly: params.price_monthly,
            price_yearly: params.price_yearly,
            is_active: true,
            is_basic: params.is_basic,
            module_ids: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// The price for one invoice of the given cycle, if the plan offers it.
    #[must_use]
    pub fn price_for(&self, cycle: BillingCycle) -> Option<i64> {
        match cycle {
            BillingCycle::Monthly => Some(self.price_monthly),
            BillingCycle::Yearly => self.price_yearly,
        }
    }

    /// Whether the plan can be subscribed on the given cycle.
    #[must_use]
    pub fn supports_cycle(&self, cycle: BillingCycle) -> bool {
        self.price_for(cycle).is_some()
    }
}

/// Parameters for creating a plan.
#[derive(Debug, Clone)]
pub struct NewPlan {
    pub name: String,
    pub price_monthly: i64,
    pub price_yearly: Option<i64>,
    pub is_basic: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_durations() {
        assert_eq!(BillingCycle::Monthly.duration_days(), 30);
        assert_eq!(BillingCycle::Yearly.duration_days(), 365);
    }

    #[test]
    fn test_price_for_cycle() {
        let now = Utc::now();
        let plan = Plan::new(
            NewPlan {
                name: "Team".to_string(),
                price_monthly: 150_000,
                price_yearly: Some(1_500_000),
                is_basic: false,
            },
            now,
        );
        assert_eq!(plan.price_for(BillingCycle::Monthly), Some(150_000));
        assert_eq!(plan.price_for(BillingCycle::Yearly), Some(1_500_000));
        assert_eq!(plan.slug, "team");
    }

    #[test]
    fn test_basic_plan_has_no_yearly_cycle() {
        let now = Utc::now();
        let plan = Plan::new(
            NewPlan {
                name: "Free".to_string(),
                price_monthly: 0,
                price_yearly: None,
                is_basic: true,
            },
            now,
        );
        assert!(plan.supports_cycle(BillingCycle::Monthly));
        assert!(!plan.supports_cycle(BillingCycle::Yearly));
    }
}
