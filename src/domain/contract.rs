use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::labels::impl_labels;
use crate::domain::Entity;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractStatus {
    Draft,
    Active,
    Expired,
    Terminated,
}

impl ContractStatus {
    pub const ALL: [ContractStatus; 4] = [
        ContractStatus::Draft,
        ContractStatus::Active,
        ContractStatus::Expired,
        ContractStatus::Terminated,
    ];
}

impl_labels!(ContractStatus {
    Draft => ("Draft", "Brouillon"),
    Active => ("Active", "En cours"),
    Expired => ("Expired", "Expiré"),
    Terminated => ("Terminated", "Résilié"),
});

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureStatus {
    Unsigned,
    PartiallySigned,
    Signed,
}

impl SignatureStatus {
    pub const ALL: [SignatureStatus; 3] = [
        SignatureStatus::Unsigned,
        SignatureStatus::PartiallySigned,
        SignatureStatus::Signed,
    ];
}

impl_labels!(SignatureStatus {
    Unsigned => ("Not signed", "Non signé"),
    PartiallySigned => ("Partially signed", "Partiellement signé"),
    Signed => ("Signed", "Signé"),
});

/// Lease binding a tenant and an owner on one property.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contract {
    pub id: String,
    pub tenant_id: String,
    pub owner_id: String,
    pub property_id: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub monthly_rent: f64,
    pub status: ContractStatus,
    pub signature_status: SignatureStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Contract {
    pub fn duration_months(&self) -> i64 {
        (self.end_date - self.start_date).num_days() / 30
    }

    pub fn is_current(&self, now: DateTime<Utc>) -> bool {
        self.status == ContractStatus::Active && self.start_date <= now && now < self.end_date
    }
}

impl Entity for Contract {
    const COLLECTION: &'static str = "contracts";

    fn id(&self) -> &str {
        &self.id
    }
}
