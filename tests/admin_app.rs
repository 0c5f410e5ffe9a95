use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use estate_admin::admin::{UserFilter, UserSort, UserSortField};
use estate_admin::app::{AdminApp, AdminOptions};
use estate_admin::auth::{
    AuthErrorCode, AuthResult, InMemoryAuthBackend, OAuthCredential, OAuthPopupHandler,
    OAuthRequest, ProfileUpdate, UserInfo,
};
use estate_admin::domain::{ActivityLog, Locale, User, UserRole, UserStatus};
use estate_admin::mock::{seed_store, MockDataset, SUPER_ADMIN_ID};
use estate_admin::store::OrderDirection;
use estate_admin::util::token::encode_unsigned;
use estate_admin::util::PartialObserver;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::json;

struct FakeGooglePopup;

#[async_trait]
impl OAuthPopupHandler for FakeGooglePopup {
    async fn open_popup(&self, request: OAuthRequest) -> AuthResult<OAuthCredential> {
        Ok(OAuthCredential {
            provider_id: request.provider_id,
            id_token: Some(encode_unsigned(&json!({
                "sub": "google-42",
                "email": "fatou.ndiaye@example.com",
                "name": "Fatou Ndiaye"
            }))),
            access_token: None,
        })
    }
}

#[tokio::test]
async fn seeded_app_supports_the_user_screen() {
    let app = AdminApp::in_memory();
    let dataset = MockDataset::generate(&mut StdRng::seed_from_u64(2024));
    let written = seed_store(app.store(), &dataset).await.expect("seed");
    assert_eq!(written, dataset.document_count());

    app.auth()
        .sign_up("admin@estate.sn", "correct-horse")
        .await
        .expect("sign up");
    let manager = app.user_manager(Locale::En);
    assert_eq!(manager.refresh().await.expect("refresh"), dataset.users.len());

    let tenants = manager.visible_users(
        &UserFilter::new().with_role(UserRole::Tenant),
        UserSort::new(UserSortField::Name, OrderDirection::Ascending),
    );
    assert!(tenants.iter().all(|user| user.type_users_id == UserRole::Tenant));

    let target = dataset
        .users
        .iter()
        .find(|user| user.id != SUPER_ADMIN_ID)
        .expect("non admin user");
    manager
        .set_user_status(&target.id, UserStatus::Suspended)
        .await
        .expect("suspend");

    let stored: User = app
        .store()
        .collection::<User>()
        .get(&target.id)
        .await
        .expect("get")
        .expect("present");
    assert_eq!(stored.statut, UserStatus::Suspended);

    let admin_uid = app.auth().current_user().expect("signed in").uid;
    let logs = app.store().collection::<ActivityLog>().list().await.expect("logs");
    assert_eq!(logs.len(), dataset.activity_logs.len() + 1);
    assert!(logs
        .iter()
        .any(|log| log.admin_id == admin_uid && log.target == format!("users/{}", target.id)));
}

#[tokio::test]
async fn builder_injects_auth_backend_and_popup_handler() {
    let backend = InMemoryAuthBackend::new();
    let app = AdminApp::builder(AdminOptions::default().with_project_id("estate-demo"))
        .with_auth_backend(Arc::new(backend.clone()))
        .with_popup_handler(Arc::new(FakeGooglePopup))
        .build()
        .expect("app");

    let states: Arc<Mutex<Vec<Option<String>>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&states);
    let unsubscribe = app.auth().on_auth_state_changed(PartialObserver::new().with_next(
        move |user: &Option<UserInfo>| {
            sink.lock().unwrap().push(user.as_ref().and_then(|u| u.email.clone()));
        },
    ));

    let user = app
        .auth()
        .sign_in_with_popup(OAuthRequest::google())
        .await
        .expect("popup sign in");
    assert_eq!(user.display_name.as_deref(), Some("Fatou Ndiaye"));
    assert_eq!(backend.account_count(), 1);

    let updated = app
        .auth()
        .update_profile(ProfileUpdate::new().display_name("Fatou N."))
        .await
        .expect("profile");
    assert_eq!(updated.display_name.as_deref(), Some("Fatou N."));
    assert!(app.auth().get_token(false).await.expect("token").is_some());

    app.auth().sign_out().await.expect("sign out");
    unsubscribe();
    app.auth()
        .sign_in_with_popup(OAuthRequest::google())
        .await
        .expect("second sign in");

    let states = states.lock().unwrap();
    assert_eq!(states.first(), Some(&None));
    assert!(states.contains(&Some("fatou.ndiaye@example.com".to_string())));
    assert_eq!(states.last(), Some(&None));
    assert_eq!(backend.account_count(), 1);
}

#[tokio::test]
async fn auth_rejects_bad_input_and_wraps_backend_failures() {
    let backend = InMemoryAuthBackend::new();
    let app = AdminApp::builder(AdminOptions::default())
        .with_auth_backend(Arc::new(backend.clone()))
        .build()
        .expect("app");

    let err = app.auth().sign_in("not-an-email", "pw").await.unwrap_err();
    assert_eq!(err.code, AuthErrorCode::InvalidEmail);

    let err = app.auth().sign_in("ghost@estate.sn", "pw").await.unwrap_err();
    assert_eq!(err.code, AuthErrorCode::Backend);

    assert!(app
        .auth()
        .send_password_reset_email("ghost@estate.sn")
        .await
        .is_err());
    app.auth().sign_up("owner@estate.sn", "long-password").await.expect("sign up");
    app.auth()
        .send_password_reset_email("owner@estate.sn")
        .await
        .expect("reset");
    assert!(backend
        .password_reset_requests()
        .contains(&"owner@estate.sn".to_string()));
}
