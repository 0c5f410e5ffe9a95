use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::labels::impl_labels;
use crate::domain::Entity;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Rent,
    Sale,
    Deposit,
    Commission,
    Refund,
}

impl TransactionType {
    pub const ALL: [TransactionType; 5] = [
        TransactionType::Rent,
        TransactionType::Sale,
        TransactionType::Deposit,
        TransactionType::Commission,
        TransactionType::Refund,
    ];
}

impl_labels!(TransactionType {
    Rent => ("Rent", "Loyer"),
    Sale => ("Sale", "Vente"),
    Deposit => ("Deposit", "Caution"),
    Commission => ("Commission", "Commission"),
    Refund => ("Refund", "Remboursement"),
});

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
}

impl TransactionStatus {
    pub const ALL: [TransactionStatus; 4] = [
        TransactionStatus::Pending,
        TransactionStatus::Completed,
        TransactionStatus::Failed,
        TransactionStatus::Cancelled,
    ];
}

impl_labels!(TransactionStatus {
    Pending => ("Pending", "En attente"),
    Completed => ("Completed", "Effectuée"),
    Failed => ("Failed", "Échouée"),
    Cancelled => ("Cancelled", "Annulée"),
});

/// A payment recorded against a user and, optionally, a property.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: String,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property_id: Option<String>,
    pub amount: f64,
    pub transaction_type: TransactionType,
    pub status: TransactionStatus,
    pub date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

impl Transaction {
    /// Whether the amount counts towards revenue.
    pub fn is_revenue(&self) -> bool {
        self.status == TransactionStatus::Completed
            && self.transaction_type != TransactionType::Refund
    }
}

impl Entity for Transaction {
    const COLLECTION: &'static str = "transactions";

    fn id(&self) -> &str {
        &self.id
    }
}
