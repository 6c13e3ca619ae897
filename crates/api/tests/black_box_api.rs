use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use nimbus_core::{TenantId, UserId};
use nimbus_infra::{Crm, CrmSettings};
use nimbus_security::{JwtClaims, Role};
use reqwest::StatusCode;
use serde_json::json;

const SECRET: &str = "test-secret";

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        // Same router as prod over a fresh in-memory back end, on an ephemeral port.
        let crm = Arc::new(Crm::in_memory(CrmSettings::default()));
        let app = nimbus_api::app::build_app(crm, SECRET);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, handle }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn mint_jwt(tenant_id: TenantId, roles: Vec<Role>) -> String {
    let now = Utc::now();
    let claims = JwtClaims {
        sub: UserId::new(),
        tenant_id,
        roles,
        issued_at: now,
        expires_at: now + ChronoDuration::minutes(10),
    };

    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .expect("failed to encode jwt")
}

async fn create_lead(
    client: &reqwest::Client,
    srv: &TestServer,
    token: &str,
    body: serde_json::Value,
) -> serde_json::Value {
    let res = client
        .post(srv.url("/leads"))
        .bearer_auth(token)
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    res.json().await.unwrap()
}

#[tokio::test]
async fn auth_required_for_protected_endpoints() {
    let srv = TestServer::spawn().await;

    let client = reqwest::Client::new();
    let res = client.get(srv.url("/whoami")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = client
        .get(srv.url("/whoami"))
        .bearer_auth("not-a-jwt")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = client.get(srv.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn tenant_context_is_derived_from_token() {
    let srv = TestServer::spawn().await;

    let tenant_id = TenantId::new();
    let token = mint_jwt(tenant_id, vec![Role::SALES]);

    let client = reqwest::Client::new();
    let res = client
        .get(srv.url("/whoami"))
        .bearer_auth(token)
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["tenant_id"].as_str().unwrap(), tenant_id.to_string());
    assert!(body["roles"].as_array().unwrap().iter().any(|r| r == "sales"));
}

#[tokio::test]
async fn second_matching_lead_is_flagged_as_duplicate() {
    let srv = TestServer::spawn().await;
    let token = mint_jwt(TenantId::new(), vec![Role::SALES]);
    let client = reqwest::Client::new();

    let lead = json!({
        "first_name": "Ann",
        "last_name": "Lee",
        "company_name": "Acme",
        "email": "ann@acme.io"
    });
    let first = create_lead(&client, &srv, &token, lead.clone()).await;
    assert_eq!(first["duplicates"].as_array().unwrap().len(), 0);
    assert_eq!(first["status"], "new");

    let second = create_lead(&client, &srv, &token, lead).await;
    let flagged = second["duplicates"].as_array().unwrap();
    assert_eq!(flagged.len(), 1);
    assert_eq!(flagged[0]["lead_id"], first["id"]);

    // Live search agrees with what was recorded at create time.
    let res = client
        .get(srv.url(&format!("/leads/{}/duplicates", second["id"].as_str().unwrap())))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["items"][0]["lead_id"], first["id"]);

    // A threshold above any possible score finds nothing.
    let res = client
        .get(srv.url(&format!(
            "/leads/{}/duplicates?threshold=101",
            second["id"].as_str().unwrap()
        )))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = res.json().await.unwrap();
    assert!(body["items"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn qualified_lead_converts_into_pipeline_records() {
    let srv = TestServer::spawn().await;
    let token = mint_jwt(TenantId::new(), vec![Role::SALES]);
    let client = reqwest::Client::new();

    let lead = create_lead(
        &client,
        &srv,
        &token,
        json!({ "first_name": "Sam", "last_name": "Ortiz", "company_name": "Globex" }),
    )
    .await;
    let id = lead["id"].as_str().unwrap();

    let res = client
        .post(srv.url(&format!("/leads/{id}/status")))
        .bearer_auth(&token)
        .json(&json!({ "status": "qualified" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client
        .post(srv.url(&format!("/leads/{id}/convert")))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let converted: serde_json::Value = res.json().await.unwrap();
    assert_eq!(converted["lead"]["status"], "converted");
    assert_eq!(converted["company_created"], true);
    assert_eq!(converted["opportunity"]["name"], "Globex - Sam Ortiz");

    // Converting twice breaks a lead invariant.
    let res = client
        .post(srv.url(&format!("/leads/{id}/convert")))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn viewer_can_read_but_not_write() {
    let srv = TestServer::spawn().await;
    let tenant_id = TenantId::new();
    let token = mint_jwt(tenant_id, vec![Role::VIEWER]);
    let client = reqwest::Client::new();

    let res = client
        .post(srv.url("/leads"))
        .bearer_auth(&token)
        .json(&json!({ "first_name": "Ann", "last_name": "Lee" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "forbidden");

    let res = client
        .get(srv.url("/leads"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = client
        .post(srv.url("/admin/replay"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn tenant_isolation_blocks_cross_tenant_reads_and_writes() {
    let srv = TestServer::spawn().await;
    let token1 = mint_jwt(TenantId::new(), vec![Role::ADMIN]);
    let token2 = mint_jwt(TenantId::new(), vec![Role::ADMIN]);
    let client = reqwest::Client::new();

    let res = client
        .post(srv.url("/companies"))
        .bearer_auth(&token1)
        .json(&json!({ "kind": "customer", "name": "Initech" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let created: serde_json::Value = res.json().await.unwrap();
    let id = created["id"].as_str().unwrap();

    let res = client
        .get(srv.url(&format!("/companies/{id}")))
        .bearer_auth(&token2)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = client
        .delete(srv.url(&format!("/companies/{id}")))
        .bearer_auth(&token2)
        .send()
        .await
        .unwrap();
    assert!(res.status().is_client_error());

    let res = client
        .get(srv.url("/companies"))
        .bearer_auth(&token2)
        .send()
        .await
        .unwrap();
    let body: serde_json::Value = res.json().await.unwrap();
    assert!(body["items"].as_array().unwrap().is_empty());

    // Still intact for the owner.
    let res = client
        .get(srv.url(&format!("/companies/{id}")))
        .bearer_auth(&token1)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn malformed_input_is_a_validation_error() {
    let srv = TestServer::spawn().await;
    let token = mint_jwt(TenantId::new(), vec![Role::ADMIN]);
    let client = reqwest::Client::new();

    let res = client
        .post(srv.url("/leads"))
        .bearer_auth(&token)
        .json(&json!({ "first_name": " ", "last_name": "" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "validation_error");

    let res = client
        .get(srv.url("/leads/not-a-uuid"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn csv_round_trip_through_exchange_endpoints() {
    let srv = TestServer::spawn().await;
    let token = mint_jwt(TenantId::new(), vec![Role::SALES]);
    let client = reqwest::Client::new();

    let csv = "First_Name,Last_Name,Email,Ignored\nAnn,Lee,ann@acme.io,x\n,,,\nBo,Chen,,y\n";
    let res = client
        .post(srv.url("/exchange/leads/import"))
        .bearer_auth(&token)
        .body(csv)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let report: serde_json::Value = res.json().await.unwrap();
    assert_eq!(report["created"], 2);
    assert_eq!(report["failed"].as_array().unwrap().len(), 1);
    assert_eq!(report["failed"][0]["row"], 2);

    let res = client
        .get(srv.url("/exchange/leads/export"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(
        res.headers()[reqwest::header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/csv")
    );
    let body = res.text().await.unwrap();
    let mut lines = body.lines();
    assert_eq!(
        lines.next(),
        Some("first_name,last_name,company_name,email,phone,source,status")
    );
    assert_eq!(lines.count(), 2);

    let res = client
        .post(srv.url("/exchange/leads/import"))
        .bearer_auth(&token)
        .body("email\nann@acme.io\n")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = client
        .get(srv.url("/exchange/invoices/export"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}
