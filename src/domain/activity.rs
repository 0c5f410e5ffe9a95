use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::Entity;

/// Audit trail entry written when an administrator changes data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityLog {
    pub id: String,
    pub admin_id: String,
    pub action: String,
    pub target: String,
    #[serde(default)]
    pub details: String,
    pub timestamp: DateTime<Utc>,
}

impl Entity for ActivityLog {
    const COLLECTION: &'static str = "activityLogs";

    fn id(&self) -> &str {
        &self.id
    }
}
