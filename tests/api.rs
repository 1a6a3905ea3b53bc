use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
};
use lodge_portal::{
    AppState, app,
    auth::MemoryAuth,
    backend::MemoryTables,
    config::Config,
    result::error_codes,
    services::Services,
    storage::LocalObjectStore,
};
use serde_json::{Value, json};
use tower::ServiceExt;

const PASSWORD: &str = "acacia-123";

struct TestApp {
    router: Router,
    _dir: tempfile::TempDir,
}

fn test_app() -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let services = Services::new(
        Arc::new(MemoryTables::with_portal_schema()),
        Arc::new(MemoryAuth::new()),
        Arc::new(LocalObjectStore::new(
            dir.path(),
            "http://127.0.0.1:3000/api/public",
        )),
    );
    let state = AppState::new(Config::local("http://127.0.0.1:54321"), services, None);
    TestApp {
        router: app(state),
        _dir: dir,
    }
}

impl TestApp {
    async fn call(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    /// Registers an account and returns its access token and user id.
    async fn register(&self, email: &str, name: &str) -> (String, String) {
        let (status, body) = self
            .call(
                Method::POST,
                "/api/auth/sign-up",
                None,
                Some(json!({ "email": email, "password": PASSWORD, "display_name": name })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        let data = &body["resp_data"];
        (
            data["session"]["access_token"].as_str().unwrap().to_string(),
            data["user"]["id"].as_str().unwrap().to_string(),
        )
    }

    /// Founds a lodge as `token` and returns its id.
    async fn found_lodge(&self, token: &str, name: &str) -> String {
        let (status, body) = self
            .call(
                Method::POST,
                "/api/lodges",
                Some(token),
                Some(json!({ "name": name, "rite": "REAA", "city": "Lyon" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        assert_eq!(body["resp_data"]["membership"]["role"], "admin");
        body["resp_data"]["lodge"]["id"].as_str().unwrap().to_string()
    }
}

#[tokio::test]
async fn protected_routes_need_a_bearer_token() {
    let app = test_app();

    let (status, body) = app.call(Method::GET, "/api/profile", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], error_codes::AUTH_FAILED);

    let (status, _) = app
        .call(Method::GET, "/api/profile", Some("not-a-token"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn sign_in_reports_bad_credentials() {
    let app = test_app();
    app.register("hiram@example.org", "Hiram").await;

    let (status, body) = app
        .call(
            Method::POST,
            "/api/auth/sign-in",
            None,
            Some(json!({ "email": "hiram@example.org", "password": "wrong-one" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], error_codes::AUTH_FAILED);

    let (status, body) = app
        .call(
            Method::POST,
            "/api/auth/sign-in",
            None,
            Some(json!({ "email": "hiram@example.org", "password": PASSWORD })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["resp_data"]["access_token"].is_string());
}

#[tokio::test]
async fn duplicate_sign_up_is_a_conflict() {
    let app = test_app();
    app.register("hiram@example.org", "Hiram").await;

    let (status, body) = app
        .call(
            Method::POST,
            "/api/auth/sign-up",
            None,
            Some(json!({ "email": "hiram@example.org", "password": PASSWORD })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], error_codes::USER_EXISTS);
}

#[tokio::test]
async fn profile_is_created_on_first_read() {
    let app = test_app();
    let (token, user_id) = app.register("hiram@example.org", "Hiram").await;

    let (status, body) = app.call(Method::GET, "/api/profile", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["resp_data"]["profile"]["id"], user_id.as_str());

    let (status, body) = app
        .call(
            Method::PUT,
            "/api/profile",
            Some(&token),
            Some(json!({ "first_name": "Hiram", "last_name": "Abif" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["resp_data"]["first_name"], "Hiram");
}

#[tokio::test]
async fn founder_schedules_and_members_answer() {
    let app = test_app();
    let (admin, _) = app.register("hiram@example.org", "Hiram").await;
    let lodge_id = app.found_lodge(&admin, "Les Amis Réunis").await;

    let (status, body) = app
        .call(
            Method::POST,
            &format!("/api/lodges/{}/tenues", lodge_id),
            Some(&admin),
            Some(json!({
                "lodge_id": lodge_id,
                "title": "Tenue d'installation",
                "date": "2099-03-14",
                "degree": 1,
                "agenda": [{ "title": "Ouverture des travaux" }],
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    let tenue_id = body["resp_data"]["id"].as_str().unwrap().to_string();
    assert_eq!(body["resp_data"]["status"], "scheduled");

    let (status, body) = app
        .call(
            Method::PUT,
            &format!("/api/tenues/{}/attendance", tenue_id),
            Some(&admin),
            Some(json!({ "status": "present" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);

    let (status, body) = app
        .call(
            Method::GET,
            &format!("/api/lodges/{}/tenues/upcoming", lodge_id),
            Some(&admin),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["resp_data"].as_array().unwrap().len(), 1);

    let (status, body) = app
        .call(
            Method::GET,
            &format!("/api/lodges/{}/counts", lodge_id),
            Some(&admin),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["resp_data"]["members"], 1);
    assert_eq!(body["resp_data"]["upcoming_tenues"], 1);
}

#[tokio::test]
async fn outsiders_cannot_read_a_lodge() {
    let app = test_app();
    let (admin, _) = app.register("hiram@example.org", "Hiram").await;
    let (outsider, _) = app.register("profane@example.org", "Profane").await;
    let lodge_id = app.found_lodge(&admin, "La Parfaite Union").await;

    let (status, body) = app
        .call(
            Method::GET,
            &format!("/api/lodges/{}/members", lodge_id),
            Some(&outsider),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], error_codes::PERMISSION_DENIED);

    let (status, _) = app
        .call(
            Method::POST,
            &format!("/api/lodges/{}/tenues", lodge_id),
            Some(&outsider),
            Some(json!({
                "lodge_id": lodge_id,
                "title": "Tenue blanche",
                "date": "2099-01-01",
                "degree": 1,
            })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn invitation_code_admits_a_new_member_once() {
    let app = test_app();
    let (admin, _) = app.register("hiram@example.org", "Hiram").await;
    let (guest, guest_id) = app.register("apprenti@example.org", "Apprenti").await;
    let lodge_id = app.found_lodge(&admin, "Saint-Jean d'Écosse").await;

    let (status, body) = app
        .call(
            Method::POST,
            &format!("/api/lodges/{}/invitations", lodge_id),
            Some(&admin),
            Some(json!({ "email": "apprenti@example.org" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    let code = body["resp_data"]["code"].as_str().unwrap().to_string();

    let (status, body) = app
        .call(
            Method::GET,
            &format!("/api/invitations/{}", code.to_lowercase()),
            Some(&guest),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["resp_data"]["lodge_id"], lodge_id.as_str());

    let (status, body) = app
        .call(
            Method::POST,
            &format!("/api/invitations/{}/redeem", code),
            Some(&guest),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["resp_data"]["user_id"], guest_id.as_str());
    assert_eq!(body["resp_data"]["role"], "member");

    let (status, _) = app
        .call(
            Method::POST,
            &format!("/api/invitations/{}/redeem", code),
            Some(&guest),
            None,
        )
        .await;
    assert!(status.is_client_error());

    let (status, body) = app
        .call(
            Method::GET,
            &format!("/api/lodges/{}/members", lodge_id),
            Some(&guest),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
}

#[tokio::test]
async fn public_bucket_serves_uploads_without_a_session() {
    let app = test_app();
    let (token, _) = app.register("hiram@example.org", "Hiram").await;

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/files/avatars?name=portrait.png&folder=hiram")
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .header(header::CONTENT_TYPE, "image/png")
        .body(Body::from(vec![0x89, b'P', b'N', b'G']))
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    let path = body["resp_data"]["path"].as_str().unwrap().to_string();
    assert!(path.starts_with("hiram/"));
    assert!(path.ends_with("_portrait.png"));

    let request = Request::builder()
        .uri(format!("/api/public/avatars/{}", path))
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], &[0x89, b'P', b'N', b'G']);

    let (status, _) = app
        .call(Method::GET, &format!("/api/public/documents/{}", path), None, None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn direct_conversation_carries_messages() {
    let app = test_app();
    let (hiram, _) = app.register("hiram@example.org", "Hiram").await;
    let (anna, anna_id) = app.register("anna@example.org", "Anna").await;

    let (status, body) = app
        .call(
            Method::POST,
            "/api/conversations/direct",
            Some(&hiram),
            Some(json!({ "user_id": anna_id })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    let conversation_id = body["resp_data"]["id"].as_str().unwrap().to_string();

    let (status, body) = app
        .call(
            Method::POST,
            &format!("/api/conversations/{}/messages", conversation_id),
            Some(&hiram),
            Some(json!({ "text": "Salut et fraternité" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);

    let (status, body) = app
        .call(
            Method::GET,
            &format!("/api/conversations/{}/messages", conversation_id),
            Some(&anna),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    let messages = body["resp_data"].as_array().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["text"], "Salut et fraternité");
}
