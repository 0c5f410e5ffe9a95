use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::labels::impl_labels;
use crate::domain::Entity;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartnerType {
    Bank,
    Insurance,
    Notary,
    Agency,
    Maintenance,
}

impl PartnerType {
    pub const ALL: [PartnerType; 5] = [
        PartnerType::Bank,
        PartnerType::Insurance,
        PartnerType::Notary,
        PartnerType::Agency,
        PartnerType::Maintenance,
    ];
}

impl_labels!(PartnerType {
    Bank => ("Bank", "Banque"),
    Insurance => ("Insurance", "Assurance"),
    Notary => ("Notary", "Notaire"),
    Agency => ("Agency", "Agence"),
    Maintenance => ("Maintenance", "Maintenance"),
});

/// External company working with the agency.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Partner {
    pub id: String,
    pub name: String,
    pub partner_type: PartnerType,
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub services: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Entity for Partner {
    const COLLECTION: &'static str = "partners";

    fn id(&self) -> &str {
        &self.id
    }
}
