use chrono::{DateTime, Utc};
use serde::de::{Deserializer, Error as DeError};
use serde::{Deserialize, Serialize, Serializer};

use crate::domain::labels::impl_labels;
use crate::domain::Entity;

/// Account status, stored as the integer `statut`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum UserStatus {
    Pending,
    Active,
    Suspended,
}

impl UserStatus {
    pub const ALL: [UserStatus; 3] = [UserStatus::Pending, UserStatus::Active, UserStatus::Suspended];

    pub fn code(self) -> i64 {
        match self {
            UserStatus::Pending => 0,
            UserStatus::Active => 1,
            UserStatus::Suspended => 2,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.code() == code)
    }
}

impl_labels!(UserStatus {
    Pending => ("Pending", "En attente"),
    Active => ("Active", "Actif"),
    Suspended => ("Suspended", "Suspendu"),
});

/// Account role, stored as the integer `typeUsersId`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum UserRole {
    Admin,
    Owner,
    Tenant,
}

impl UserRole {
    pub const ALL: [UserRole; 3] = [UserRole::Admin, UserRole::Owner, UserRole::Tenant];

    pub fn code(self) -> i64 {
        match self {
            UserRole::Admin => 1,
            UserRole::Owner => 2,
            UserRole::Tenant => 3,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|role| role.code() == code)
    }
}

impl_labels!(UserRole {
    Admin => ("Administrator", "Administrateur"),
    Owner => ("Owner", "Propriétaire"),
    Tenant => ("Tenant", "Locataire"),
});

macro_rules! integer_serde {
    ($ty:ty, $what:expr) => {
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_i64(self.code())
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let code = i64::deserialize(deserializer)?;
                <$ty>::from_code(code)
                    .ok_or_else(|| D::Error::custom(format!("unknown {} code {code}", $what)))
            }
        }
    };
}

integer_serde!(UserStatus, "user status");
integer_serde!(UserRole, "user role");

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdType {
    NationalId,
    Passport,
    DriverLicense,
    ResidencePermit,
}

impl_labels!(IdType {
    NationalId => ("National ID card", "Carte d'identité nationale"),
    Passport => ("Passport", "Passeport"),
    DriverLicense => ("Driver's license", "Permis de conduire"),
    ResidencePermit => ("Residence permit", "Titre de séjour"),
});

/// Per-channel notification opt-ins.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPreferences {
    #[serde(default)]
    pub email: bool,
    #[serde(default)]
    pub sms: bool,
    #[serde(default)]
    pub push: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub city: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_type: Option<IdType>,
    #[serde(default)]
    pub id_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_document_url: Option<String>,
    pub statut: UserStatus,
    pub type_users_id: UserRole,
    #[serde(default)]
    pub notifications: NotificationPreferences,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    pub fn is_admin(&self) -> bool {
        self.type_users_id == UserRole::Admin
    }

    /// Case-insensitive match against name, email, phone and city.
    pub fn matches_search(&self, term: &str) -> bool {
        let term = term.trim().to_lowercase();
        if term.is_empty() {
            return true;
        }
        [
            self.first_name.as_str(),
            self.last_name.as_str(),
            self.email.as_str(),
            self.phone.as_str(),
            self.city.as_str(),
        ]
        .iter()
        .any(|field| field.to_lowercase().contains(&term))
            || self.full_name().to_lowercase().contains(&term)
    }
}

impl Entity for User {
    const COLLECTION: &'static str = "users";

    fn id(&self) -> &str {
        &self.id
    }
}
