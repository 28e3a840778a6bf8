//! Firebase REST clients against an in-process axum mock of the Identity
//! Toolkit, Secure Token and Firestore endpoints.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::{Json, Router};
use serde_json::{json, Value};

use so_core::backend::{IdentityProvider, MessageStore, SnapshotSink};
use so_core::config::FirebaseConfig;
use so_core::error::{AuthError, StreamError};
use so_core::storage::{KeyValueStore, MemoryStorage};
use so_core::types::{ConversationId, Message, MessageDraft, Session};
use so_integrations::firebase::{FirebaseIdentity, FirestoreStore, IdpTokenSource, TOKEN_KEY};

// ===========================================================================
// Mock server
// ===========================================================================

#[derive(Debug, Clone)]
struct Recorded {
    path: String,
    query: String,
    body: Value,
    auth: Option<String>,
}

type Log = Arc<Mutex<Vec<Recorded>>>;
type Responder = fn(&str, &Value) -> (StatusCode, Value);

async fn mock_server(responder: Responder) -> (String, Log) {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let log2 = Arc::clone(&log);
    let app = Router::new().fallback(move |uri: Uri, headers: HeaderMap, body: String| {
        let log = Arc::clone(&log2);
        async move {
            let value = serde_json::from_str(&body).unwrap_or(Value::String(body));
            let auth = headers
                .get("authorization")
                .and_then(|h| h.to_str().ok())
                .map(str::to_string);
            log.lock().unwrap().push(Recorded {
                path: uri.path().to_string(),
                query: uri.query().unwrap_or_default().to_string(),
                body: value.clone(),
                auth,
            });
            let (status, reply) = responder(uri.path(), &value);
            (status, Json(reply))
        }
    });
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), log)
}

fn config(base: &str) -> FirebaseConfig {
    FirebaseConfig {
        project_id: "demo".to_string(),
        identity_base_url: base.to_string(),
        token_base_url: base.to_string(),
        firestore_base_url: base.to_string(),
        ..FirebaseConfig::default()
    }
}

fn requests(log: &Log) -> Vec<Recorded> {
    log.lock().unwrap().clone()
}

fn auth_ok(local_id: &str, id_token: &str) -> Value {
    json!({
        "localId": local_id,
        "email": "aida@example.com",
        "displayName": "Aida",
        "idToken": id_token,
        "refreshToken": "refresh-1",
        "expiresIn": "3600"
    })
}

fn api_error(message: &str) -> (StatusCode, Value) {
    (
        StatusCode::BAD_REQUEST,
        json!({"error": {"code": 400, "message": message}}),
    )
}

fn identity_responder(path: &str, _body: &Value) -> (StatusCode, Value) {
    match path {
        "/v1/accounts:signInWithPassword" | "/v1/accounts:signUp" | "/v1/accounts:signInWithIdp" => {
            (StatusCode::OK, auth_ok("u1", "id-1"))
        }
        "/v1/accounts:update" => (StatusCode::OK, json!({"displayName": "Aida"})),
        "/v1/accounts:sendOobCode" => (StatusCode::OK, json!({"email": "aida@example.com"})),
        "/v1/token" => (
            StatusCode::OK,
            json!({"id_token": "id-2", "refresh_token": "refresh-2", "expires_in": "3600", "user_id": "u1"}),
        ),
        _ => (StatusCode::NOT_FOUND, json!({})),
    }
}

// ===========================================================================
// Identity
// ===========================================================================

#[tokio::test]
async fn sign_in_with_password_returns_session() {
    let (base, log) = mock_server(identity_responder).await;
    let identity = FirebaseIdentity::new(&config(&base), "test-key").unwrap();

    let session = identity
        .sign_in_with_credentials("aida@example.com", "pw123456")
        .await
        .unwrap();
    assert_eq!(
        session,
        Session::new("u1")
            .with_display_name("Aida")
            .with_email("aida@example.com")
    );
    assert_eq!(identity.id_token(false).await.unwrap(), "id-1");

    let reqs = requests(&log);
    assert_eq!(reqs.len(), 1);
    assert_eq!(reqs[0].query, "key=test-key");
    assert_eq!(reqs[0].body["email"], "aida@example.com");
    assert_eq!(reqs[0].body["returnSecureToken"], true);
}

#[tokio::test]
async fn wrong_password_is_invalid_credentials() {
    let (base, _log) = mock_server(|_, _| api_error("INVALID_PASSWORD")).await;
    let identity = FirebaseIdentity::new(&config(&base), "test-key").unwrap();
    let err = identity
        .sign_in_with_credentials("aida@example.com", "nope")
        .await
        .unwrap_err();
    assert_eq!(err, AuthError::InvalidCredentials);
    assert_eq!(identity.id_token(false).await, Err(AuthError::NoSession));
}

#[tokio::test]
async fn register_sets_display_name() {
    let (base, log) = mock_server(identity_responder).await;
    let identity = FirebaseIdentity::new(&config(&base), "test-key").unwrap();

    let session = identity
        .register("Aida", "aida@example.com", "pw123456")
        .await
        .unwrap();
    assert_eq!(session.display_name.as_deref(), Some("Aida"));

    let reqs = requests(&log);
    assert_eq!(reqs.len(), 2);
    assert_eq!(reqs[0].path, "/v1/accounts:signUp");
    assert_eq!(reqs[1].path, "/v1/accounts:update");
    assert_eq!(reqs[1].body["idToken"], "id-1");
    assert_eq!(reqs[1].body["displayName"], "Aida");
}

#[tokio::test]
async fn register_existing_email() {
    let (base, _log) = mock_server(|_, _| api_error("EMAIL_EXISTS")).await;
    let identity = FirebaseIdentity::new(&config(&base), "test-key").unwrap();
    assert_eq!(
        identity.register("A", "a@b.c", "pw123456").await,
        Err(AuthError::AccountExists)
    );
}

#[tokio::test]
async fn password_reset_requests_oob_code() {
    let (base, log) = mock_server(identity_responder).await;
    let identity = FirebaseIdentity::new(&config(&base), "test-key").unwrap();
    identity.send_password_reset("aida@example.com").await.unwrap();

    let reqs = requests(&log);
    assert_eq!(reqs[0].path, "/v1/accounts:sendOobCode");
    assert_eq!(reqs[0].body["requestType"], "PASSWORD_RESET");
    assert_eq!(reqs[0].body["email"], "aida@example.com");
}

#[tokio::test]
async fn provider_sign_in_needs_idp_source() {
    let (base, log) = mock_server(identity_responder).await;
    let identity = FirebaseIdentity::new(&config(&base), "test-key").unwrap();
    assert!(matches!(
        identity.sign_in_with_provider().await,
        Err(AuthError::Unsupported(_))
    ));
    assert!(requests(&log).is_empty());
}

struct FixedGoogleToken;

#[async_trait(?Send)]
impl IdpTokenSource for FixedGoogleToken {
    async fn google_id_token(&self) -> Result<String, AuthError> {
        Ok("google-oidc".to_string())
    }
}

#[tokio::test]
async fn provider_sign_in_exchanges_idp_token() {
    let (base, log) = mock_server(identity_responder).await;
    let identity = FirebaseIdentity::new(&config(&base), "test-key")
        .unwrap()
        .with_idp(Rc::new(FixedGoogleToken));

    let session = identity.sign_in_with_provider().await.unwrap();
    assert_eq!(session.id, "u1");

    let reqs = requests(&log);
    assert_eq!(reqs[0].path, "/v1/accounts:signInWithIdp");
    let post_body = reqs[0].body["postBody"].as_str().unwrap();
    assert!(post_body.contains("id_token=google-oidc"));
    assert!(post_body.contains("providerId=google.com"));
}

#[tokio::test]
async fn forced_refresh_uses_secure_token() {
    let (base, log) = mock_server(identity_responder).await;
    let identity = FirebaseIdentity::new(&config(&base), "test-key").unwrap();
    identity
        .sign_in_with_credentials("aida@example.com", "pw123456")
        .await
        .unwrap();

    assert_eq!(identity.id_token(true).await.unwrap(), "id-2");
    assert_eq!(identity.id_token(false).await.unwrap(), "id-2");

    let reqs = requests(&log);
    assert_eq!(reqs.len(), 2);
    assert_eq!(reqs[1].path, "/v1/token");
    let form = reqs[1].body.as_str().unwrap();
    assert!(form.contains("grant_type=refresh_token"));
    assert!(form.contains("refresh_token=refresh-1"));
}

#[tokio::test]
async fn tokens_survive_restart_and_clear_on_sign_out() {
    let (base, _log) = mock_server(identity_responder).await;
    let kv: Rc<dyn KeyValueStore> = Rc::new(MemoryStorage::new());

    let first = FirebaseIdentity::new(&config(&base), "test-key")
        .unwrap()
        .with_storage(Rc::clone(&kv));
    first
        .sign_in_with_credentials("aida@example.com", "pw123456")
        .await
        .unwrap();
    assert!(kv.get(TOKEN_KEY).unwrap().is_some());

    let second = FirebaseIdentity::new(&config(&base), "test-key")
        .unwrap()
        .with_storage(Rc::clone(&kv));
    assert_eq!(second.user_id().as_deref(), Some("u1"));
    assert_eq!(second.id_token(false).await.unwrap(), "id-1");

    second.sign_out().await.unwrap();
    assert!(kv.get(TOKEN_KEY).unwrap().is_none());
}

#[test]
fn empty_api_key_is_rejected() {
    assert!(FirebaseIdentity::new(&FirebaseConfig::default(), "  ").is_err());
}

// ===========================================================================
// Firestore
// ===========================================================================

/// Token provider that is always signed in as `u1`.
struct StaticTokens;

#[async_trait(?Send)]
impl IdentityProvider for StaticTokens {
    fn name(&self) -> &'static str {
        "static"
    }
    async fn sign_in_with_provider(&self) -> Result<Session, AuthError> {
        Err(AuthError::Unsupported("provider"))
    }
    async fn sign_in_with_credentials(&self, _: &str, _: &str) -> Result<Session, AuthError> {
        Err(AuthError::Unsupported("credentials"))
    }
    async fn register(&self, _: &str, _: &str, _: &str) -> Result<Session, AuthError> {
        Err(AuthError::Unsupported("register"))
    }
    async fn send_password_reset(&self, _: &str) -> Result<(), AuthError> {
        Ok(())
    }
    async fn sign_out(&self) -> Result<(), AuthError> {
        Ok(())
    }
    async fn id_token(&self, _: bool) -> Result<String, AuthError> {
        Ok("bearer-1".to_string())
    }
}

fn doc(id: &str, text: &str, ts: &str) -> Value {
    json!({
        "document": {
            "name": format!("projects/demo/databases/(default)/documents/messages/{id}"),
            "fields": {
                "text": {"stringValue": text},
                "fromUid": {"stringValue": "u2"},
                "displayName": {"stringValue": "Bo"},
                "ts": {"timestampValue": ts}
            }
        },
        "readTime": "2024-05-01T10:00:10Z"
    })
}

fn firestore_responder(path: &str, _body: &Value) -> (StatusCode, Value) {
    if path.ends_with(":commit") {
        return (StatusCode::OK, json!({"writeResults": [{}], "commitTime": "2024-05-01T10:00:00Z"}));
    }
    if path.ends_with(":runQuery") {
        // newest first, as ordered by the query
        return (
            StatusCode::OK,
            json!([
                doc("m2", "second", "2024-05-01T10:00:02Z"),
                doc("m1", "first", "2024-05-01T10:00:01Z"),
            ]),
        );
    }
    (StatusCode::NOT_FOUND, json!({}))
}

fn firestore(base: &str) -> FirestoreStore {
    FirestoreStore::new(&config(base), "test-key", Rc::new(StaticTokens)).unwrap()
}

fn draft(body: &str) -> MessageDraft {
    MessageDraft {
        author_id: "u1".into(),
        author_name: "Aida".into(),
        body: body.into(),
    }
}

fn collecting_sink() -> (SnapshotSink, Rc<RefCell<Vec<Result<Vec<Message>, StreamError>>>>) {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let seen2 = Rc::clone(&seen);
    let sink: SnapshotSink = Rc::new(move |result| seen2.borrow_mut().push(result));
    (sink, seen)
}

#[tokio::test]
async fn append_commits_with_server_timestamp() {
    let (base, log) = mock_server(firestore_responder).await;
    let store = firestore(&base);
    store.append(&ConversationId::global(), draft("hello")).await.unwrap();

    let reqs = requests(&log);
    assert_eq!(reqs[0].path, "/v1/projects/demo/databases/(default)/documents:commit");
    assert_eq!(reqs[0].auth.as_deref(), Some("Bearer bearer-1"));
    let write = &reqs[0].body["writes"][0];
    assert!(write["update"]["name"]
        .as_str()
        .unwrap()
        .starts_with("projects/demo/databases/(default)/documents/messages/"));
    assert_eq!(write["update"]["fields"]["text"]["stringValue"], "hello");
    assert_eq!(write["update"]["fields"]["fromUid"]["stringValue"], "u1");
    assert_eq!(write["update"]["fields"]["displayName"]["stringValue"], "Aida");
    assert_eq!(write["updateTransforms"][0]["fieldPath"], "ts");
    assert_eq!(write["updateTransforms"][0]["setToServerValue"], "REQUEST_TIME");
}

#[tokio::test]
async fn direct_conversation_uses_nested_collection() {
    let (base, log) = mock_server(firestore_responder).await;
    let store = firestore(&base);
    let dm = ConversationId::direct("b", "a");
    store.append(&dm, draft("psst")).await.unwrap();
    store.query(&dm, 50).await.unwrap();

    let reqs = requests(&log);
    assert!(reqs[0].body["writes"][0]["update"]["name"]
        .as_str()
        .unwrap()
        .contains("/documents/conversations/dm_a_b/messages/"));
    assert_eq!(
        reqs[1].path,
        "/v1/projects/demo/databases/(default)/documents/conversations/dm_a_b:runQuery"
    );
}

#[tokio::test]
async fn peer_ids_needing_escapes_read_where_they_write() {
    let (base, log) = mock_server(firestore_responder).await;
    let store = firestore(&base);
    let dm = ConversationId::direct("u1", "Aida Aliyeva");
    store.append(&dm, draft("salam")).await.unwrap();
    store.query(&dm, 50).await.unwrap();

    let reqs = requests(&log);
    let name = reqs[0].body["writes"][0]["update"]["name"].as_str().unwrap();
    let (written_parent, _) = name.rsplit_once("/messages/").unwrap();
    assert_eq!(
        written_parent,
        "projects/demo/databases/(default)/documents/conversations/dm_Aida Aliyeva_u1"
    );

    assert_eq!(
        reqs[1].path,
        "/v1/projects/demo/databases/(default)/documents/conversations/dm_Aida%20Aliyeva_u1:runQuery"
    );
    let read_parent = urlencoding::decode(&reqs[1].path).unwrap();
    let read_parent = read_parent
        .trim_start_matches("/v1/")
        .trim_end_matches(":runQuery");
    assert_eq!(read_parent, written_parent);
}

#[tokio::test]
async fn query_orders_ascending_and_limits() {
    let (base, log) = mock_server(firestore_responder).await;
    let store = firestore(&base);
    let messages = store.query(&ConversationId::global(), 25).await.unwrap();

    let bodies: Vec<_> = messages.iter().map(|m| m.body.as_str()).collect();
    assert_eq!(bodies, vec!["first", "second"]);

    let query = &requests(&log)[0].body["structuredQuery"];
    assert_eq!(query["limit"], 25);
    assert_eq!(query["orderBy"][0]["direction"], "DESCENDING");
    assert_eq!(query["from"][0]["collectionId"], "messages");
}

#[tokio::test]
async fn poll_delivers_only_on_change() {
    let (base, _log) = mock_server(firestore_responder).await;
    let store = firestore(&base);
    let (sink, seen) = collecting_sink();
    let mut sub = store.subscribe(&ConversationId::global(), 10, sink).unwrap();

    assert_eq!(store.poll_once().await, 1);
    assert_eq!(store.poll_once().await, 0);
    assert_eq!(seen.borrow().len(), 1);
    assert_eq!(seen.borrow()[0].as_ref().unwrap().len(), 2);

    sub.detach();
    assert_eq!(store.watch_count(), 0);
    assert_eq!(store.poll_once().await, 0);
}

#[tokio::test]
async fn poll_errors_are_reported_once() {
    let (base, _log) = mock_server(|_, _| api_error("PERMISSION_DENIED")).await;
    let store = firestore(&base);
    let (sink, seen) = collecting_sink();
    let _sub = store.subscribe(&ConversationId::global(), 10, sink).unwrap();

    store.poll_once().await;
    store.poll_once().await;
    assert_eq!(seen.borrow().len(), 1);
    assert!(matches!(seen.borrow()[0], Err(StreamError::Subscribe(_))));
}

#[tokio::test]
async fn watch_loop_polls_until_stopped() {
    let (base, _log) = mock_server(firestore_responder).await;
    let store = firestore(&base);
    let (sink, seen) = collecting_sink();
    let _sub = store.subscribe(&ConversationId::global(), 10, sink).unwrap();

    let stopper = store.clone();
    let sleep = move |_: Duration| -> std::pin::Pin<Box<dyn std::future::Future<Output = ()>>> {
        let stopper = stopper.clone();
        Box::pin(async move { stopper.stop() })
    };
    store.watch_loop(Duration::from_millis(10), sleep).await;

    assert_eq!(seen.borrow().len(), 1);
    assert!(store.subscribe(&ConversationId::global(), 10, collecting_sink().0).is_err());
}
