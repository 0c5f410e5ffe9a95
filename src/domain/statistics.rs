use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{
    Contract, ContractStatus, Message, MessageStatus, Property, PropertyStatus, PropertyType,
    Transaction, TransactionStatus, User, UserRole, UserStatus, ValidationStatus,
};

/// Revenue booked during one calendar month.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyRevenue {
    /// `YYYY-MM`.
    pub month: String,
    pub amount: f64,
}

/// Dashboard aggregates derived from the raw collections.
///
/// Breakdown keys are the wire names of the matching enums (`"2"` for owners,
/// `"apartment"`, `"completed"`, ...), so the structure serializes the same
/// way whichever backend produced the records.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    pub total_users: usize,
    pub active_users: usize,
    pub pending_users: usize,
    pub total_properties: usize,
    pub available_properties: usize,
    pub properties_awaiting_validation: usize,
    pub total_transactions: usize,
    pub total_revenue: f64,
    pub active_contracts: usize,
    pub unread_messages: usize,
    pub flagged_messages: usize,
    pub users_by_role: BTreeMap<String, usize>,
    pub users_by_status: BTreeMap<String, usize>,
    pub properties_by_type: BTreeMap<String, usize>,
    pub properties_by_status: BTreeMap<String, usize>,
    pub transactions_by_status: BTreeMap<String, usize>,
    pub monthly_revenue: Vec<MonthlyRevenue>,
}

impl Statistics {
    pub fn compute(
        users: &[User],
        properties: &[Property],
        transactions: &[Transaction],
        contracts: &[Contract],
        messages: &[Message],
    ) -> Self {
        let mut stats = Statistics {
            total_users: users.len(),
            total_properties: properties.len(),
            total_transactions: transactions.len(),
            ..Default::default()
        };

        for user in users {
            match user.statut {
                UserStatus::Active => stats.active_users += 1,
                UserStatus::Pending => stats.pending_users += 1,
                UserStatus::Suspended => {}
            }
            bump(&mut stats.users_by_role, user.type_users_id.code().to_string());
            bump(&mut stats.users_by_status, user.statut.code().to_string());
        }

        for property in properties {
            if property.status == PropertyStatus::Available {
                stats.available_properties += 1;
            }
            if property.validation == ValidationStatus::Pending {
                stats.properties_awaiting_validation += 1;
            }
            bump(&mut stats.properties_by_type, wire_name(&property.property_type));
            bump(&mut stats.properties_by_status, wire_name(&property.status));
        }

        let mut revenue_by_month: BTreeMap<String, f64> = BTreeMap::new();
        for transaction in transactions {
            bump(&mut stats.transactions_by_status, wire_name(&transaction.status));
            if transaction.is_revenue() {
                stats.total_revenue += transaction.amount;
                *revenue_by_month.entry(month_key(transaction.date)).or_default() +=
                    transaction.amount;
            }
        }
        stats.monthly_revenue = revenue_by_month
            .into_iter()
            .map(|(month, amount)| MonthlyRevenue { month, amount })
            .collect();

        stats.active_contracts = contracts
            .iter()
            .filter(|contract| contract.status == ContractStatus::Active)
            .count();
        stats.unread_messages = messages
            .iter()
            .filter(|message| message.status == MessageStatus::Unread)
            .count();
        stats.flagged_messages = messages.iter().filter(|message| message.is_flagged()).count();

        stats
    }

    pub fn users_with_role(&self, role: UserRole) -> usize {
        self.users_by_role
            .get(&role.code().to_string())
            .copied()
            .unwrap_or_default()
    }

    pub fn properties_of_type(&self, property_type: PropertyType) -> usize {
        self.properties_by_type
            .get(&wire_name(&property_type))
            .copied()
            .unwrap_or_default()
    }

    pub fn transactions_with_status(&self, status: TransactionStatus) -> usize {
        self.transactions_by_status
            .get(&wire_name(&status))
            .copied()
            .unwrap_or_default()
    }
}

fn bump(map: &mut BTreeMap<String, usize>, key: String) {
    *map.entry(key).or_default() += 1;
}

fn wire_name<T: Serialize>(value: &T) -> String {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::String(name)) => name,
        Ok(other) => other.to_string(),
        Err(_) => String::new(),
    }
}

fn month_key(date: DateTime<Utc>) -> String {
    format!("{:04}-{:02}", date.year(), date.month())
}
