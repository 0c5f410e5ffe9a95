use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::labels::impl_labels;
use crate::domain::Entity;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyType {
    House,
    Apartment,
    Villa,
    Land,
    Office,
    Commercial,
}

impl PropertyType {
    pub const ALL: [PropertyType; 6] = [
        PropertyType::House,
        PropertyType::Apartment,
        PropertyType::Villa,
        PropertyType::Land,
        PropertyType::Office,
        PropertyType::Commercial,
    ];
}

impl_labels!(PropertyType {
    House => ("House", "Maison"),
    Apartment => ("Apartment", "Appartement"),
    Villa => ("Villa", "Villa"),
    Land => ("Land", "Terrain"),
    Office => ("Office", "Bureau"),
    Commercial => ("Commercial space", "Local commercial"),
});

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyStatus {
    Available,
    Rented,
    Sold,
    Pending,
}

impl PropertyStatus {
    pub const ALL: [PropertyStatus; 4] = [
        PropertyStatus::Available,
        PropertyStatus::Rented,
        PropertyStatus::Sold,
        PropertyStatus::Pending,
    ];
}

impl_labels!(PropertyStatus {
    Available => ("Available", "Disponible"),
    Rented => ("Rented", "Loué"),
    Sold => ("Sold", "Vendu"),
    Pending => ("Pending", "En attente"),
});

/// Moderation state of a listing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Pending,
    Approved,
    Rejected,
}

impl ValidationStatus {
    pub const ALL: [ValidationStatus; 3] = [
        ValidationStatus::Pending,
        ValidationStatus::Approved,
        ValidationStatus::Rejected,
    ];
}

impl_labels!(ValidationStatus {
    Pending => ("Awaiting validation", "En cours de validation"),
    Approved => ("Approved", "Validé"),
    Rejected => ("Rejected", "Rejeté"),
});

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Property {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub city: String,
    pub property_type: PropertyType,
    pub status: PropertyStatus,
    pub validation: ValidationStatus,
    pub price: f64,
    #[serde(default)]
    pub surface: f64,
    #[serde(default)]
    pub rooms: u32,
    #[serde(default)]
    pub bedrooms: u32,
    #[serde(default)]
    pub bathrooms: u32,
    #[serde(default)]
    pub latitude: f64,
    #[serde(default)]
    pub longitude: f64,
    #[serde(default)]
    pub images: Vec<String>,
    pub owner_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Property {
    pub fn price_per_square_meter(&self) -> Option<f64> {
        (self.surface > 0.0).then(|| self.price / self.surface)
    }
}

impl Entity for Property {
    const COLLECTION: &'static str = "properties";

    fn id(&self) -> &str {
        &self.id
    }
}
