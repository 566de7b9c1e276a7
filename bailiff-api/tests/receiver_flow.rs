use std::sync::{Arc, OnceLock};

use axum::body::Body;
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::Router;
use bailiff_api::cases::CaseSummary;
use bailiff_api::routes::{DIGEST_HEADER, DIGEST_MISMATCH_WARNING, VERIFIED_HEADER};
use bailiff_api::*;
use bailiff_envelope::{
    hasher, Bailiff, CaseSubmission, Envelope, Identity, KeyId, KeyPair, PublicKey, Recipient,
    RecipientKey, WrappedKeys,
};
use bailiff_registry::{
    read_log, verify_chain, ActiveKey, InMemoryAuditSink, InMemoryBackend, KeySummary, Registry,
};
use serde_json::{json, Value};
use tower::ServiceExt;

fn receiver() -> &'static Identity {
    static ID: OnceLock<Identity> = OnceLock::new();
    ID.get_or_init(|| Identity::from_key_pair(KeyPair::generate_with_bits(1024).unwrap()).unwrap())
}

fn other_court() -> &'static Identity {
    static ID: OnceLock<Identity> = OnceLock::new();
    ID.get_or_init(|| Identity::from_key_pair(KeyPair::generate_with_bits(1024).unwrap()).unwrap())
}

fn state_with_limit(max_upload_bytes: usize) -> AppState {
    AppState {
        registry: Arc::new(Registry::new(
            Arc::new(InMemoryBackend::new()),
            Arc::new(InMemoryAuditSink::new()),
        )),
        identity: Arc::new(receiver().clone()),
        cases: Arc::new(InMemoryCaseStore::new()),
        max_upload_bytes,
    }
}

fn app() -> Router {
    build_router(state_with_limit(config::DEFAULT_MAX_UPLOAD_BYTES))
}

struct Reply {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl Reply {
    fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap()
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(|v| v.to_str().unwrap())
    }
}

async fn call(app: &Router, method: Method, uri: &str, body: Option<Vec<u8>>) -> Reply {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(bytes) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(bytes)
        }
        None => Body::empty(),
    };
    let resp = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = resp.status();
    let headers = resp.headers().clone();
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec();
    Reply { status, headers, body }
}

async fn get(app: &Router, uri: &str) -> Reply {
    call(app, Method::GET, uri, None).await
}

async fn post_json(app: &Router, uri: &str, body: &Value) -> Reply {
    call(app, Method::POST, uri, Some(serde_json::to_vec(body).unwrap())).await
}

async fn register(app: &Router, who: &Identity, device: &str) -> Reply {
    post_json(
        app,
        "/keys",
        &json!({"publicKey": who.public_pem(), "deviceName": device}),
    )
    .await
}

async fn submit(app: &Router, case_name: &str, envelope: Envelope) -> Reply {
    let submission = CaseSubmission {
        case_name: case_name.into(),
        file_name: "order.pdf".into(),
        envelope,
    };
    post_json(app, "/cases/receive", &serde_json::to_value(&submission).unwrap()).await
}

fn sealed_for(who: &Identity, data: &[u8]) -> Envelope {
    let r = Recipient::from_pem(who.public_pem()).unwrap();
    Bailiff::new().seal(data, &[r]).unwrap()
}

// ---------------------------------------------------------------------------
// Scenario
// ---------------------------------------------------------------------------

#[tokio::test]
async fn register_seal_submit_download_revoke_fallback() {
    let app = app();

    // Register K1.
    let reply = register(&app, receiver(), "court-1").await;
    assert_eq!(reply.status, StatusCode::CREATED);
    let k1 = receiver().key_id().to_string();
    assert_eq!(reply.json(), json!({"keyId": k1, "deviceName": "court-1"}));

    // Directory lookup returns [K1].
    let reply = get(&app, "/keys/active").await;
    assert_eq!(reply.status, StatusCode::OK);
    let active: Vec<ActiveKey> = serde_json::from_slice(&reply.body).unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].key_id.as_str(), k1);
    let recipients: Vec<Recipient> = active
        .iter()
        .map(|k| Recipient::with_key_id(k.key_id.clone(), &k.public_key).unwrap())
        .collect();

    // Seal, submit, list.
    let envelope = Bailiff::new().seal(b"hello-pdf", &recipients).unwrap();
    let reply = submit(&app, "smith-v-jones", envelope).await;
    assert_eq!(reply.status, StatusCode::CREATED);
    let id = reply.json()["id"].as_i64().unwrap();

    let reply = get(&app, "/cases").await;
    let cases: Vec<CaseSummary> = serde_json::from_slice(&reply.body).unwrap();
    assert_eq!(cases.len(), 1);
    assert_eq!(
        cases[0].content_digest,
        "787039b5a469fb8e720be530ac94788a4a85c6b81b786efa5a2727738cfa8a6a"
    );
    assert!(!String::from_utf8_lossy(&reply.body).contains("ciphertext"));

    // Download.
    let reply = get(&app, &format!("/cases/{id}/download")).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body, b"hello-pdf");
    assert_eq!(reply.header(VERIFIED_HEADER), Some("true"));
    assert_eq!(reply.header(DIGEST_HEADER), Some(hasher::digest(b"hello-pdf").as_str()));
    assert_eq!(reply.header("content-type"), Some("application/pdf"));
    assert_eq!(
        reply.header("content-disposition"),
        Some("attachment; filename=\"order.pdf\"")
    );
    assert!(reply.header("warning").is_none());

    // Revoke K1; the directory is now empty.
    let reply = call(&app, Method::POST, &format!("/keys/{k1}/revoke"), None).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(
        reply.json(),
        json!({"keyId": k1, "deviceName": "court-1", "isActive": false})
    );
    let reply = get(&app, "/keys/active").await;
    assert_eq!(reply.json(), json!([]));

    // Legacy fallback with the receiver's raw public key.
    let reply = get(&app, "/crypto/public-key").await;
    assert_eq!(reply.json()["keyId"], json!(k1));
    let legacy_key = PublicKey::from_pem(reply.json()["publicKey"].as_str().unwrap()).unwrap();
    let envelope = Bailiff::new().seal_legacy(b"hello-pdf", &legacy_key).unwrap();
    assert!(matches!(envelope.wrapped_keys, WrappedKeys::Legacy(_)));

    let reply = submit(&app, "smith-v-jones", envelope).await;
    let legacy_id = reply.json()["id"].as_i64().unwrap();
    assert_ne!(legacy_id, id);

    let reply = get(&app, &format!("/cases/{legacy_id}/download")).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body, b"hello-pdf");
    assert_eq!(reply.header(VERIFIED_HEADER), Some("true"));

    // Newest first.
    let reply = get(&app, "/cases").await;
    let ids: Vec<i64> = serde_json::from_slice::<Vec<CaseSummary>>(&reply.body)
        .unwrap()
        .iter()
        .map(|c| c.id)
        .collect();
    assert_eq!(ids, vec![legacy_id, id]);
}

#[tokio::test]
async fn sender_client_against_live_receiver() {
    let app = app();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

    let client = ReceiverClient::new(&base).unwrap();

    // Nothing registered: legacy shape.
    let report = client.send("doe-v-roe", "brief.pdf", b"first").await.unwrap();
    assert!(matches!(report.mode, SendMode::Legacy { .. }));

    // One registered court: multi-recipient.
    let http = reqwest::Client::new();
    let resp = http
        .post(format!("{base}/keys"))
        .json(&json!({"publicKey": receiver().public_pem(), "deviceName": "court-1"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 201);

    let report = client.send("doe-v-roe", "brief.pdf", b"second").await.unwrap();
    assert_eq!(
        report.mode,
        SendMode::MultiRecipient {
            recipients: vec![receiver().key_id().clone()]
        }
    );
    assert_eq!(report.content_digest, hasher::digest(b"second"));

    let body = http
        .get(format!("{base}/cases/{}/download", report.case_id))
        .send()
        .await
        .unwrap()
        .bytes()
        .await
        .unwrap();
    assert_eq!(&body[..], b"second");
}

// ---------------------------------------------------------------------------
// Key administration
// ---------------------------------------------------------------------------

#[tokio::test]
async fn key_admin_errors() {
    let app = app();
    assert_eq!(register(&app, receiver(), "court-1").await.status, StatusCode::CREATED);

    let reply = register(&app, receiver(), "court-1-again").await;
    assert_eq!(reply.status, StatusCode::CONFLICT);
    assert!(reply.json()["error"].as_str().unwrap().contains(receiver().key_id().as_str()));

    let reply = post_json(&app, "/keys", &json!({"publicKey": "nope", "deviceName": "x"})).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);

    let reply = post_json(&app, "/keys", &json!({"deviceName": "x"})).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert!(reply.json()["error"].is_string());

    let reply = call(&app, Method::POST, "/keys/0000000000000000/revoke", None).await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn key_listing_has_no_key_material() {
    let app = app();
    register(&app, receiver(), "court-1").await;
    register(&app, other_court(), "court-2").await;

    let reply = get(&app, "/keys").await;
    let keys: Vec<KeySummary> = serde_json::from_slice(&reply.body).unwrap();
    assert_eq!(keys.len(), 2);
    assert!(keys.iter().all(|k| k.is_active));
    assert!(!String::from_utf8_lossy(&reply.body).contains("BEGIN PUBLIC KEY"));
}

// ---------------------------------------------------------------------------
// Receiving and opening
// ---------------------------------------------------------------------------

#[tokio::test]
async fn receive_rejects_bad_submissions() {
    let app = app();

    let reply = submit(&app, "   ", sealed_for(receiver(), b"x")).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);

    let mut short_nonce = sealed_for(receiver(), b"x");
    short_nonce.nonce.truncate(8);
    assert_eq!(submit(&app, "a", short_nonce).await.status, StatusCode::BAD_REQUEST);

    let mut no_keys = sealed_for(receiver(), b"x");
    no_keys.wrapped_keys = WrappedKeys::MultiRecipient(vec![]);
    assert_eq!(submit(&app, "a", no_keys).await.status, StatusCode::BAD_REQUEST);

    let reply = call(&app, Method::POST, "/cases/receive", Some(b"{not json".to_vec())).await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);

    assert!(get(&app, "/cases").await.json().as_array().unwrap().is_empty());
}

#[tokio::test]
async fn receive_accepts_legacy_field_names() {
    let app = app();
    let env = Bailiff::new()
        .seal_legacy(b"hello-pdf", receiver().public_key())
        .unwrap();
    let mut body = serde_json::to_value(&env).unwrap();
    let obj = body.as_object_mut().unwrap();
    let rename = |obj: &mut serde_json::Map<String, Value>, from: &str, to: &str| {
        let v = obj.remove(from).unwrap();
        obj.insert(to.into(), v);
    };
    rename(obj, "ciphertext", "encryptedFile");
    rename(obj, "wrappedKeys", "encryptedKey");
    rename(obj, "nonce", "iv");
    rename(obj, "contentDigest", "hash");
    obj.insert("caseName".into(), json!("doe-v-roe"));
    obj.insert("fileName".into(), json!(""));

    let reply = post_json(&app, "/cases/receive", &body).await;
    assert_eq!(reply.status, StatusCode::CREATED);
    let id = reply.json()["id"].as_i64().unwrap();

    let reply = get(&app, &format!("/cases/{id}")).await;
    assert_eq!(reply.json()["fileName"], json!("document.pdf"));
    assert_eq!(reply.json()["shape"], json!("legacy"));

    let reply = get(&app, &format!("/cases/{id}/download")).await;
    assert_eq!(reply.body, b"hello-pdf");
}

#[tokio::test]
async fn download_error_statuses() {
    let app = app();

    assert_eq!(get(&app, "/cases/42").await.status, StatusCode::NOT_FOUND);
    assert_eq!(get(&app, "/cases/42/download").await.status, StatusCode::NOT_FOUND);

    // Sealed only for another court.
    let reply = submit(&app, "a", sealed_for(other_court(), b"x")).await;
    let id = reply.json()["id"].as_i64().unwrap();
    let reply = get(&app, &format!("/cases/{id}/download")).await;
    assert_eq!(reply.status, StatusCode::FORBIDDEN);

    // Addressed to this receiver but wrapped under another key.
    let mut env = sealed_for(other_court(), b"x");
    if let WrappedKeys::MultiRecipient(list) = &mut env.wrapped_keys {
        list[0] = RecipientKey {
            key_id: receiver().key_id().clone(),
            wrapped_key: list[0].wrapped_key.clone(),
        };
    }
    let reply = submit(&app, "b", env).await;
    let id = reply.json()["id"].as_i64().unwrap();
    let reply = get(&app, &format!("/cases/{id}/download")).await;
    assert_eq!(reply.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(reply.json(), json!({"error": "session key unwrap failed"}));

    // Ciphertext flipped after sealing.
    let mut env = sealed_for(receiver(), b"hello-pdf");
    env.ciphertext[0] ^= 1;
    let reply = submit(&app, "c", env).await;
    let id = reply.json()["id"].as_i64().unwrap();
    let reply = get(&app, &format!("/cases/{id}/download")).await;
    assert_eq!(reply.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(reply.json(), json!({"error": "authentication failed"}));
}

#[tokio::test]
async fn digest_mismatch_is_served_with_warning() {
    let app = app();
    let mut env = sealed_for(receiver(), b"hello-pdf");
    env.content_digest = hasher::digest(b"something else");
    let expected = env.content_digest.clone();

    let reply = submit(&app, "a", env).await;
    let id = reply.json()["id"].as_i64().unwrap();

    let reply = get(&app, &format!("/cases/{id}/download")).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body, b"hello-pdf");
    assert_eq!(reply.header(VERIFIED_HEADER), Some("false"));
    assert_eq!(reply.header("warning"), Some(DIGEST_MISMATCH_WARNING));
    assert_ne!(reply.header(DIGEST_HEADER), Some(expected.as_str()));
}

#[tokio::test]
async fn oversized_upload_is_rejected() {
    let app = build_router(state_with_limit(1024));
    let env = sealed_for(receiver(), &vec![7u8; 4096]);
    assert_eq!(submit(&app, "big", env).await.status, StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn health_and_public_key() {
    let app = app();
    let reply = get(&app, "/health").await;
    assert_eq!(reply.json()["status"], json!("ok"));

    let reply = get(&app, "/crypto/public-key").await;
    assert_eq!(
        KeyId::for_public_key(reply.json()["publicKey"].as_str().unwrap()),
        *receiver().key_id()
    );
}

// ---------------------------------------------------------------------------
// Bootstrap
// ---------------------------------------------------------------------------

fn config_for(dir: &std::path::Path) -> ServerConfig {
    let data = dir.to_string_lossy().into_owned();
    ServerConfig::from_lookup(|name| match name {
        "BAILIFF_DATA_DIR" => Some(data.clone()),
        "BAILIFF_DEVICE_NAME" => Some("tribunal-test".into()),
        _ => None,
    })
}

#[tokio::test]
async fn bootstrap_seeds_identity_and_persists_cases() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_for(dir.path());

    let first_id = {
        let app = build_router(bootstrap(&config, receiver().clone()).await.unwrap());
        let reply = get(&app, "/keys/active").await;
        let active: Vec<ActiveKey> = serde_json::from_slice(&reply.body).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(&active[0].key_id, receiver().key_id());
        assert_eq!(active[0].device_name, "tribunal-test");

        let reply = submit(&app, "a", sealed_for(receiver(), b"persisted")).await;
        reply.json()["id"].as_i64().unwrap()
    };

    // Restart over the same directory: no duplicate key, cases still there.
    let app = build_router(bootstrap(&config, receiver().clone()).await.unwrap());
    assert_eq!(get(&app, "/keys").await.json().as_array().unwrap().len(), 1);

    let reply = get(&app, &format!("/cases/{first_id}/download")).await;
    assert_eq!(reply.body, b"persisted");

    let reply = submit(&app, "b", sealed_for(receiver(), b"next")).await;
    assert_eq!(reply.json()["id"].as_i64().unwrap(), first_id + 1);

    // The audit chain continues across the restart instead of starting over.
    let events = read_log(dir.path().join("bailiff-audit.jsonl")).unwrap();
    assert!(events.len() >= 2);
    assert_eq!(verify_chain(&events), Ok(()));
}
