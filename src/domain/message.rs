use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::labels::impl_labels;
use crate::domain::Entity;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Unread,
    Read,
}

impl_labels!(MessageStatus {
    Unread => ("Unread", "Non lu"),
    Read => ("Read", "Lu"),
});

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Inquiry,
    Complaint,
    Support,
    Notification,
}

impl MessageType {
    pub const ALL: [MessageType; 4] = [
        MessageType::Inquiry,
        MessageType::Complaint,
        MessageType::Support,
        MessageType::Notification,
    ];
}

impl_labels!(MessageType {
    Inquiry => ("Inquiry", "Demande d'information"),
    Complaint => ("Complaint", "Réclamation"),
    Support => ("Support", "Assistance"),
    Notification => ("Notification", "Notification"),
});

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub content: String,
    pub status: MessageStatus,
    pub message_type: MessageType,
    /// Set by moderators on abusive messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flagged: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Message {
    pub fn is_flagged(&self) -> bool {
        self.flagged.unwrap_or(false)
    }
}

impl Entity for Message {
    const COLLECTION: &'static str = "messages";

    fn id(&self) -> &str {
        &self.id
    }
}
