//! Strongly-typed identifiers (avoid mixing raw UUIDs arbitrarily).

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(UserId);
id_type!(CompanyId);
id_type!(WorkspaceId);
id_type!(CategoryId);
id_type!(PlanId);
id_type!(ModuleId);
id_type!(PermissionId);
id_type!(InvoiceId);
id_type!(InvoiceAddOnId);
id_type!(SubscriptionId);
id_type!(CompanyAddOnId);
id_type!(TicketId);
id_type!(ProposalId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_distinct_types() {
        let company = CompanyId::new();
        let plan = PlanId::new();
        assert_ne!(company.0, plan.0);
    }

    #[test]
    fn test_serde_transparent() {
        let id = InvoiceId::new();
        let json = serde_json::to_string(&id).unwrap();
        let back: InvoiceId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }
}
