use std::ops::RangeInclusive;

use chrono::{DateTime, Duration, Utc};
use rand::Rng;

use crate::domain::{
    ActivityLog, Contract, ContractStatus, IdType, Message, MessageStatus, MessageType,
    NotificationPreferences, Partner, PartnerType, Property, PropertyStatus, PropertyType,
    SignatureStatus, Transaction, TransactionStatus, TransactionType, User, UserRole, UserStatus,
    ValidationStatus,
};
use crate::mock::pools::{
    phone_number, pick, pick_enum, slug, street_address, ADMIN_ACTIONS, CITIES, FIRST_NAMES,
    LAST_NAMES, MESSAGE_BODIES, PARTNER_NAMES, PROPERTY_ADJECTIVES, SERVICES,
};

/// Id of the fixed super administrator prepended by [`crate::mock::mock_users`].
pub const SUPER_ADMIN_ID: &str = "1";

/// Upper bound of the user ids that other generators reference.
pub const REFERENCED_USER_IDS: RangeInclusive<u32> = 1..=40;

/// The account every seeded back office starts with.
pub fn super_admin() -> User {
    User {
        id: SUPER_ADMIN_ID.to_string(),
        first_name: "Super".to_string(),
        last_name: "Admin".to_string(),
        email: "admin@estate-admin.example".to_string(),
        phone: "+221 77 000 00 00".to_string(),
        address: "1 Avenue Cheikh Anta Diop".to_string(),
        city: "Dakar".to_string(),
        id_type: Some(IdType::NationalId),
        id_number: "1000000000001".to_string(),
        id_document_url: None,
        statut: UserStatus::Active,
        type_users_id: UserRole::Admin,
        notifications: NotificationPreferences {
            email: true,
            sms: true,
            push: true,
        },
        avatar_url: None,
        created_at: None,
    }
}

/// One user per index of `ids`, with the index as document id.
pub fn generate_users<R: Rng + ?Sized>(rng: &mut R, ids: RangeInclusive<u32>) -> Vec<User> {
    let now = Utc::now();
    ids.map(|index| {
        let first_name = pick(rng, FIRST_NAMES);
        let last_name = pick(rng, LAST_NAMES);
        let id_type = pick_enum(
            rng,
            &[
                IdType::NationalId,
                IdType::Passport,
                IdType::DriverLicense,
                IdType::ResidencePermit,
            ],
        );
        User {
            id: index.to_string(),
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            email: format!("{}.{}{index}@example.com", slug(first_name), slug(last_name)),
            phone: phone_number(rng),
            address: street_address(rng),
            city: pick(rng, CITIES).to_string(),
            id_type: Some(id_type),
            id_number: format!("{:013}", rng.gen_range(1_000_000_000_000u64..10_000_000_000_000)),
            id_document_url: rng
                .gen_bool(0.6)
                .then(|| format!("https://storage.example.com/identity/{index}.jpg")),
            statut: pick_enum(rng, &UserStatus::ALL),
            type_users_id: pick_enum(rng, &UserRole::ALL),
            notifications: NotificationPreferences {
                email: rng.gen_bool(0.8),
                sms: rng.gen_bool(0.5),
                push: rng.gen_bool(0.5),
            },
            avatar_url: rng
                .gen_bool(0.5)
                .then(|| format!("https://i.pravatar.cc/150?u={index}")),
            created_at: Some(days_ago(rng, now, 365)),
        }
    })
    .collect()
}

pub fn generate_properties<R: Rng + ?Sized>(rng: &mut R, count: usize) -> Vec<Property> {
    let now = Utc::now();
    (1..=count)
        .map(|index| {
            let property_type = pick_enum(rng, &PropertyType::ALL);
            let kind = format!("{property_type:?}").to_lowercase();
            let city = pick(rng, CITIES);
            let rooms = match property_type {
                PropertyType::Land => 0,
                _ => rng.gen_range(1..=8),
            };
            let surface = match property_type {
                PropertyType::Land => rng.gen_range(150.0..2_000.0),
                _ => rng.gen_range(25.0..450.0),
            };
            let status = pick_enum(rng, &PropertyStatus::ALL);
            let price = match status {
                PropertyStatus::Rented => rng.gen_range(150_000.0..2_500_000.0),
                _ => rng.gen_range(15_000_000.0..450_000_000.0),
            };
            Property {
                id: index.to_string(),
                title: format!("{} {kind} in {city}", pick(rng, PROPERTY_ADJECTIVES)),
                description: format!("{property_type:?} located in {city}, {surface:.0} m²."),
                address: street_address(rng),
                city: city.to_string(),
                property_type,
                status,
                validation: pick_enum(rng, &ValidationStatus::ALL),
                price: round_to(price, 1_000.0),
                surface: round_to(surface, 1.0),
                rooms,
                bedrooms: rooms.saturating_sub(1),
                bathrooms: if rooms == 0 { 0 } else { rng.gen_range(1..=rooms.min(4)) },
                latitude: rng.gen_range(12.3..16.7),
                longitude: rng.gen_range(-17.5..-11.4),
                images: (0..rng.gen_range(1..=4))
                    .map(|n| format!("https://storage.example.com/properties/{index}/{n}.jpg"))
                    .collect(),
                owner_id: referenced_user(rng),
                created_at: Some(days_ago(rng, now, 365)),
            }
        })
        .collect()
}

pub fn generate_transactions<R: Rng + ?Sized>(rng: &mut R, count: usize) -> Vec<Transaction> {
    let now = Utc::now();
    (1..=count)
        .map(|index| {
            let transaction_type = pick_enum(rng, &TransactionType::ALL);
            let amount = match transaction_type {
                TransactionType::Sale => rng.gen_range(15_000_000.0..300_000_000.0),
                TransactionType::Commission => rng.gen_range(100_000.0..5_000_000.0),
                _ => rng.gen_range(75_000.0..2_000_000.0),
            };
            Transaction {
                id: index.to_string(),
                user_id: referenced_user(rng),
                property_id: rng
                    .gen_bool(0.8)
                    .then(|| rng.gen_range(1..=60u32).to_string()),
                amount: round_to(amount, 500.0),
                transaction_type,
                status: pick_enum(rng, &TransactionStatus::ALL),
                date: days_ago(rng, now, 365),
                reference: Some(format!("TX-{:08}", rng.gen_range(0..100_000_000u32))),
            }
        })
        .collect()
}

pub fn generate_contracts<R: Rng + ?Sized>(rng: &mut R, count: usize) -> Vec<Contract> {
    let now = Utc::now();
    (1..=count)
        .map(|index| {
            let start_date = days_ago(rng, now, 730);
            let months = pick_enum(rng, &[6i64, 12, 24, 36]);
            let status = pick_enum(rng, &ContractStatus::ALL);
            let signature_status = match status {
                ContractStatus::Draft => {
                    pick_enum(rng, &[SignatureStatus::Unsigned, SignatureStatus::PartiallySigned])
                }
                _ => SignatureStatus::Signed,
            };
            Contract {
                id: index.to_string(),
                tenant_id: referenced_user(rng),
                owner_id: referenced_user(rng),
                property_id: rng.gen_range(1..=60u32).to_string(),
                start_date,
                end_date: start_date + Duration::days(months * 30),
                monthly_rent: round_to(rng.gen_range(100_000.0..2_000_000.0), 5_000.0),
                status,
                signature_status,
                created_at: Some(start_date - Duration::days(rng.gen_range(1..30))),
            }
        })
        .collect()
}

pub fn generate_messages<R: Rng + ?Sized>(rng: &mut R, count: usize) -> Vec<Message> {
    let now = Utc::now();
    (1..=count)
        .map(|index| Message {
            id: index.to_string(),
            sender_id: referenced_user(rng),
            receiver_id: referenced_user(rng),
            content: pick(rng, MESSAGE_BODIES).to_string(),
            status: if rng.gen_bool(0.4) {
                MessageStatus::Unread
            } else {
                MessageStatus::Read
            },
            message_type: pick_enum(rng, &MessageType::ALL),
            flagged: rng.gen_bool(0.1).then_some(true),
            created_at: Some(days_ago(rng, now, 90)),
        })
        .collect()
}

pub fn generate_partners<R: Rng + ?Sized>(rng: &mut R, count: usize) -> Vec<Partner> {
    let now = Utc::now();
    (1..=count)
        .map(|index| {
            let name = PARTNER_NAMES[(index - 1) % PARTNER_NAMES.len()];
            let services = (0..rng.gen_range(1..=3))
                .map(|_| pick(rng, SERVICES).to_string())
                .fold(Vec::new(), |mut acc: Vec<String>, service| {
                    if !acc.contains(&service) {
                        acc.push(service);
                    }
                    acc
                });
            Partner {
                id: index.to_string(),
                name: name.to_string(),
                partner_type: pick_enum(rng, &PartnerType::ALL),
                email: format!("contact@{}.example.com", slug(name).replace('.', "")),
                phone: phone_number(rng),
                services,
                created_at: Some(days_ago(rng, now, 730)),
            }
        })
        .collect()
}

pub fn generate_activity_logs<R: Rng + ?Sized>(rng: &mut R, count: usize) -> Vec<ActivityLog> {
    let now = Utc::now();
    let mut logs: Vec<ActivityLog> = (1..=count)
        .map(|index| {
            let action = pick(rng, ADMIN_ACTIONS);
            let (kind, _) = action.split_once('.').unwrap_or((action, ""));
            let target = format!("{kind}s/{}", rng.gen_range(1..=40u32));
            ActivityLog {
                id: index.to_string(),
                admin_id: SUPER_ADMIN_ID.to_string(),
                action: action.to_string(),
                details: format!("{action} on {target}"),
                target,
                timestamp: days_ago(rng, now, 30),
            }
        })
        .collect();
    logs.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    logs
}

fn referenced_user<R: Rng + ?Sized>(rng: &mut R) -> String {
    rng.gen_range(REFERENCED_USER_IDS).to_string()
}

fn days_ago<R: Rng + ?Sized>(rng: &mut R, now: DateTime<Utc>, max_days: i64) -> DateTime<Utc> {
    now - Duration::seconds(rng.gen_range(0..max_days * 24 * 3_600))
}

fn round_to(value: f64, step: f64) -> f64 {
    (value / step).round() * step
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn users_cover_every_index_once() {
        let mut rng = StdRng::seed_from_u64(7);
        let users = generate_users(&mut rng, 2..=40);
        assert_eq!(users.len(), 39);
        assert_eq!(users.first().map(|u| u.id.as_str()), Some("2"));
        assert_eq!(users.last().map(|u| u.id.as_str()), Some("40"));
        for user in &users {
            assert!((1..=3).contains(&user.type_users_id.code()));
            assert!((0..=2).contains(&user.statut.code()));
            assert!(user.email.ends_with("@example.com"));
        }
    }

    #[test]
    fn same_seed_same_records() {
        let first = generate_properties(&mut StdRng::seed_from_u64(3), 5);
        let second = generate_properties(&mut StdRng::seed_from_u64(3), 5);
        let titles = |items: &[Property]| items.iter().map(|p| p.title.clone()).collect::<Vec<_>>();
        assert_eq!(titles(&first), titles(&second));
    }

    #[test]
    fn contracts_end_after_they_start() {
        let mut rng = StdRng::seed_from_u64(11);
        for contract in generate_contracts(&mut rng, 20) {
            assert!(contract.end_date > contract.start_date);
            if contract.status != ContractStatus::Draft {
                assert_eq!(contract.signature_status, SignatureStatus::Signed);
            }
        }
    }

    #[test]
    fn activity_logs_are_newest_first() {
        let mut rng = StdRng::seed_from_u64(5);
        let logs = generate_activity_logs(&mut rng, 15);
        assert!(logs.windows(2).all(|w| w[0].timestamp >= w[1].timestamp));
        assert!(logs.iter().all(|log| log.admin_id == SUPER_ADMIN_ID));
    }

    #[test]
    fn partner_services_are_distinct() {
        let mut rng = StdRng::seed_from_u64(9);
        for partner in generate_partners(&mut rng, 10) {
            let mut services = partner.services.clone();
            services.sort();
            services.dedup();
            assert_eq!(services.len(), partner.services.len());
        }
    }
}
