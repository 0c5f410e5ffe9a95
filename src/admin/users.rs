use std::cmp::Ordering;
use std::error::Error;
use std::fmt;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde_json::{json, Value as JsonValue};

use crate::domain::{generic_error, ActivityLog, Entity, Labelled, Locale, User, UserRole, UserStatus};
use crate::store::{
    generate_auto_id, Collection, DocumentStore, ListenerRegistration, OrderDirection,
    QueryOptions, StoreError, StoreResult,
};
use crate::util::PartialObserver;

/// Upper bound on users delivered to a live user list.
pub const MAX_LISTENED_USERS: i64 = 1_000;

/// Failure shown on the screen: a translated generic message plus the
/// underlying store error.
#[derive(Debug, Clone)]
pub struct AdminError {
    message: &'static str,
    source: StoreError,
}

impl AdminError {
    fn new(locale: Locale, source: StoreError) -> Self {
        Self {
            message: generic_error(locale),
            source,
        }
    }

    /// Translated text for the screen.
    pub fn message(&self) -> &'static str {
        self.message
    }

    pub fn store_error(&self) -> &StoreError {
        &self.source
    }
}

impl fmt::Display for AdminError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message)
    }
}

impl Error for AdminError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.source)
    }
}

pub type AdminResult<T> = Result<T, AdminError>;

/// Client-side filter of the user table.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UserFilter {
    pub search: String,
    pub role: Option<UserRole>,
    pub status: Option<UserStatus>,
}

impl UserFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = search.into();
        self
    }

    pub fn with_role(mut self, role: UserRole) -> Self {
        self.role = Some(role);
        self
    }

    pub fn with_status(mut self, status: UserStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn matches(&self, user: &User) -> bool {
        self.role.map_or(true, |role| user.type_users_id == role)
            && self.status.map_or(true, |status| user.statut == status)
            && user.matches_search(&self.search)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum UserSortField {
    #[default]
    Name,
    Email,
    City,
    Role,
    Status,
    CreatedAt,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UserSort {
    pub field: UserSortField,
    pub direction: OrderDirection,
}

impl UserSort {
    pub fn new(field: UserSortField, direction: OrderDirection) -> Self {
        Self { field, direction }
    }

    fn compare(&self, a: &User, b: &User) -> Ordering {
        let ordering = match self.field {
            UserSortField::Name => compare_text(&a.last_name, &b.last_name)
                .then_with(|| compare_text(&a.first_name, &b.first_name)),
            UserSortField::Email => compare_text(&a.email, &b.email),
            UserSortField::City => compare_text(&a.city, &b.city),
            UserSortField::Role => a.type_users_id.cmp(&b.type_users_id),
            UserSortField::Status => a.statut.cmp(&b.statut),
            UserSortField::CreatedAt => a.created_at.cmp(&b.created_at),
        };
        let ordering = match self.direction {
            OrderDirection::Ascending => ordering,
            OrderDirection::Descending => ordering.reverse(),
        };
        ordering.then_with(|| a.id.cmp(&b.id))
    }
}

fn compare_text(a: &str, b: &str) -> Ordering {
    a.to_lowercase().cmp(&b.to_lowercase())
}

/// Users matching `filter`, ordered by `sort` with the id as tie breaker.
pub fn filter_and_sort_users(users: &[User], filter: &UserFilter, sort: UserSort) -> Vec<User> {
    let mut visible: Vec<User> = users.iter().filter(|user| filter.matches(user)).cloned().collect();
    visible.sort_by(|a, b| sort.compare(a, b));
    visible
}

#[derive(Default)]
struct ScreenState {
    users: Vec<User>,
    error: Option<AdminError>,
}

/// Controller of the user management screen.
///
/// Holds the last successfully loaded users. A failed load or update keeps
/// that list and records a translated error; successful point updates are
/// applied to the list and written to the activity log.
#[derive(Clone)]
pub struct UserManager {
    users: Collection<User>,
    activity: Collection<ActivityLog>,
    admin_id: String,
    locale: Locale,
    state: Arc<Mutex<ScreenState>>,
}

impl UserManager {
    pub fn new(store: &DocumentStore, admin_id: impl Into<String>, locale: Locale) -> Self {
        Self {
            users: store.collection::<User>(),
            activity: store.collection::<ActivityLog>(),
            admin_id: admin_id.into(),
            locale,
            state: Arc::new(Mutex::new(ScreenState::default())),
        }
    }

    pub fn locale(&self) -> Locale {
        self.locale
    }

    /// Last loaded users, unfiltered.
    pub fn users(&self) -> Vec<User> {
        self.state.lock().unwrap().users.clone()
    }

    pub fn last_error(&self) -> Option<AdminError> {
        self.state.lock().unwrap().error.clone()
    }

    pub fn visible_users(&self, filter: &UserFilter, sort: UserSort) -> Vec<User> {
        let state = self.state.lock().unwrap();
        filter_and_sort_users(&state.users, filter, sort)
    }

    /// Number of loaded users per role, in role order.
    pub fn role_counts(&self) -> Vec<(UserRole, usize)> {
        let state = self.state.lock().unwrap();
        UserRole::ALL
            .into_iter()
            .map(|role| {
                let count = state.users.iter().filter(|user| user.type_users_id == role).count();
                (role, count)
            })
            .collect()
    }

    /// Reloads every user from the store.
    pub async fn refresh(&self) -> AdminResult<usize> {
        let result = self.users.list().await;
        let users = self.settle(result)?;
        let count = users.len();
        let mut state = self.state.lock().unwrap();
        state.users = users;
        state.error = None;
        Ok(count)
    }

    /// Keeps the user list in sync with the store until the registration is
    /// dropped.
    pub fn subscribe(&self) -> AdminResult<ListenerRegistration> {
        let options = QueryOptions::new().limit(MAX_LISTENED_USERS);
        let on_users = Arc::clone(&self.state);
        let on_error = Arc::clone(&self.state);
        let locale = self.locale;
        let observer = PartialObserver::new()
            .with_next(move |users: &Vec<User>| {
                let mut state = on_users.lock().unwrap();
                state.users = users.clone();
                state.error = None;
            })
            .with_error(move |err| {
                log::warn!("user list subscription failed: {err}");
                let source = crate::store::error::internal_error(err.to_string());
                on_error.lock().unwrap().error = Some(AdminError::new(locale, source));
            });
        let result = self.users.listen(&options, observer);
        self.settle(result)
    }

    pub async fn set_user_status(&self, id: &str, status: UserStatus) -> AdminResult<()> {
        self.point_update(
            id,
            json!({ "statut": status.code() }),
            "update_user_status",
            format!("statut -> {}", status.label(Locale::En)),
            |user| user.statut = status,
        )
        .await
    }

    pub async fn set_user_role(&self, id: &str, role: UserRole) -> AdminResult<()> {
        self.point_update(
            id,
            json!({ "typeUsersId": role.code() }),
            "update_user_role",
            format!("typeUsersId -> {}", role.label(Locale::En)),
            |user| user.type_users_id = role,
        )
        .await
    }

    pub async fn delete_user(&self, id: &str) -> AdminResult<()> {
        let result = self.users.delete(id).await;
        self.settle(result)?;
        self.state.lock().unwrap().users.retain(|user| user.id != id);
        self.record("delete_user", id, String::new()).await;
        Ok(())
    }

    async fn point_update<F>(
        &self,
        id: &str,
        patch: JsonValue,
        action: &str,
        details: String,
        apply: F,
    ) -> AdminResult<()>
    where
        F: FnOnce(&mut User),
    {
        let result = self.users.update(id, &patch).await;
        self.settle(result)?;
        {
            let mut state = self.state.lock().unwrap();
            if let Some(user) = state.users.iter_mut().find(|user| user.id == id) {
                apply(user);
            }
        }
        self.record(action, id, details).await;
        Ok(())
    }

    /// Audit entries are best effort: a failed write is logged, not returned.
    async fn record(&self, action: &str, user_id: &str, details: String) {
        let entry = ActivityLog {
            id: generate_auto_id(),
            admin_id: self.admin_id.clone(),
            action: action.to_string(),
            target: format!("{}/{user_id}", User::COLLECTION),
            details,
            timestamp: Utc::now(),
        };
        if let Err(err) = self.activity.save(&entry).await {
            log::warn!("failed to record activity {action} on {user_id}: {err}");
        }
    }

    fn settle<T>(&self, result: StoreResult<T>) -> AdminResult<T> {
        result.map_err(|err| {
            let error = AdminError::new(self.locale, err);
            self.state.lock().unwrap().error = Some(error.clone());
            error
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{generate_users, MockDataset};
    use crate::store::StoreErrorCode;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn sample_users() -> Vec<User> {
        let mut rng = StdRng::seed_from_u64(7);
        generate_users(&mut rng, 1..=12)
    }

    #[test]
    fn filter_combines_role_status_and_search() {
        let users = sample_users();
        let target = users[3].clone();
        let filter = UserFilter::new()
            .with_role(target.type_users_id)
            .with_status(target.statut)
            .with_search(target.email.to_uppercase());
        let visible = filter_and_sort_users(&users, &filter, UserSort::default());
        assert!(visible.iter().any(|user| user.id == target.id));
        assert!(visible.iter().all(|user| filter.matches(user)));
    }

    #[test]
    fn sort_descending_by_email_breaks_ties_by_id() {
        let mut users = sample_users();
        users[1].email = users[0].email.clone();
        let sorted = filter_and_sort_users(
            &users,
            &UserFilter::new(),
            UserSort::new(UserSortField::Email, OrderDirection::Descending),
        );
        assert_eq!(sorted.len(), users.len());
        for pair in sorted.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            let by_email = b.email.to_lowercase().cmp(&a.email.to_lowercase());
            assert_ne!(by_email, Ordering::Greater);
            if by_email == Ordering::Equal {
                assert!(a.id < b.id);
            }
        }
    }

    #[tokio::test]
    async fn point_updates_patch_cache_and_log_activity() {
        let store = DocumentStore::in_memory();
        let mut rng = StdRng::seed_from_u64(11);
        let dataset = MockDataset::generate(&mut rng);
        let user_id = dataset.users[1].id.clone();
        store.collection::<User>().save(&dataset.users[1]).await.expect("seed");

        let manager = UserManager::new(&store, "1", Locale::Fr);
        assert_eq!(manager.refresh().await.expect("refresh"), 1);
        manager
            .set_user_status(&user_id, UserStatus::Suspended)
            .await
            .expect("status");
        manager.set_user_role(&user_id, UserRole::Owner).await.expect("role");

        let cached = manager.users();
        assert_eq!(cached[0].statut, UserStatus::Suspended);
        assert_eq!(cached[0].type_users_id, UserRole::Owner);

        let stored = store.collection::<User>().get(&user_id).await.expect("get").expect("present");
        assert_eq!(stored.statut, UserStatus::Suspended);

        let logs = store.collection::<ActivityLog>().list().await.expect("logs");
        assert_eq!(logs.len(), 2);
        assert!(logs.iter().all(|log| log.admin_id == "1" && log.target == format!("users/{user_id}")));
    }

    #[tokio::test]
    async fn failed_update_keeps_users_and_reports_translated_error() {
        let store = DocumentStore::in_memory();
        let mut rng = StdRng::seed_from_u64(3);
        for user in generate_users(&mut rng, 2..=4) {
            store.collection::<User>().save(&user).await.expect("seed");
        }
        let manager = UserManager::new(&store, "1", Locale::Fr);
        manager.refresh().await.expect("refresh");

        let err = manager
            .set_user_status("missing", UserStatus::Active)
            .await
            .unwrap_err();
        assert_eq!(err.message(), "Une erreur est survenue. Veuillez réessayer.");
        assert_eq!(err.store_error().code, StoreErrorCode::Backend);
        assert_eq!(manager.users().len(), 3);
        assert!(manager.last_error().is_some());
    }

    #[tokio::test]
    async fn subscription_tracks_inserts_until_dropped() {
        let store = DocumentStore::in_memory();
        let manager = UserManager::new(&store, "1", Locale::En);
        let registration = manager.subscribe().expect("subscribe");
        assert!(manager.users().is_empty());

        let mut rng = StdRng::seed_from_u64(5);
        let users = generate_users(&mut rng, 2..=3);
        store.collection::<User>().save(&users[0]).await.expect("save");
        assert_eq!(manager.users().len(), 1);

        drop(registration);
        store.collection::<User>().save(&users[1]).await.expect("save");
        assert_eq!(manager.users().len(), 1);
    }
}
