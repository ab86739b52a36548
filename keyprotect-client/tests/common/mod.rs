//! In-process mock of the Key Protect API
//!
//! Wraps DEKs with real AES-256-GCM under per-version key material, binding
//! the key ID and AAD, so AAD mismatches and rotations behave like the
//! service does.

#![allow(dead_code)]

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use keyprotect_client::{ClientConfig, Key, KeyProtectClient, KeyVersionRef, QscAlgorithm, QscConfig};
use rand::RngCore;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

pub const API_KEY: &str = "notARealApiKey";
pub const INSTANCE_ID: &str = "a6493c3a-5b29-4ac3-9eaa-deadbeef3bfd";
pub const TOKEN: &str = "mock-access-token";
/// Accepted as well, for per-call auth overrides
pub const OVERRIDE_TOKEN: &str = "override-access-token";

const KEY_MEDIA_TYPE: &str = "application/vnd.ibm.kms.key+json";

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<String> {
        self.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }
}

/// Serve `response` verbatim to every connection and hold the socket open.
///
/// Covers replies axum will not produce, such as a body shorter than its
/// `Content-Length`. Returns the base URL.
pub async fn serve_raw(response: &'static str) -> String {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    keyprotect_logging::init_test_logging();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let (mut socket, _) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(_) => return,
            };
            tokio::spawn(async move {
                let mut buf = [0u8; 8192];
                let _ = socket.read(&mut buf).await;
                let _ = socket.write_all(response.as_bytes()).await;
                tokio::time::sleep(Duration::from_secs(30)).await;
            });
        }
    });
    format!("http://{}", addr)
}

struct KeyVersion {
    id: String,
    material: [u8; 32],
}

struct MockKey {
    record: Key,
    versions: Vec<KeyVersion>,
}

impl MockKey {
    fn latest(&self) -> (u32, &KeyVersion) {
        let index = self.versions.len() - 1;
        (index as u32, &self.versions[index])
    }
}

#[derive(Default)]
struct MockState {
    keys: HashMap<String, MockKey>,
    order: Vec<String>,
    requests: Vec<RecordedRequest>,
    token_exchanges: usize,
    delay: Option<Duration>,
}

type Shared = Arc<Mutex<MockState>>;

/// Running mock service bound to an ephemeral port
pub struct MockKeyProtect {
    pub base_url: String,
    state: Shared,
}

impl MockKeyProtect {
    pub async fn start() -> Self {
        keyprotect_logging::init_test_logging();

        let state: Shared = Arc::new(Mutex::new(MockState::default()));

        let app = Router::new()
            .route("/identity/token", post(issue_token))
            .route("/api/v2/keys", post(create_key).get(list_keys))
            .route("/api/v2/keys/:id", get(get_key).delete(delete_key))
            .route("/api/v2/keys/:id/actions/:action", post(key_action))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{}", addr),
            state,
        }
    }

    pub fn token_url(&self) -> String {
        format!("{}/identity/token", self.base_url)
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig::new(self.base_url.clone(), API_KEY, INSTANCE_ID)
            .with_token_url(self.token_url())
            .with_timeout_secs(5)
    }

    /// QSC client authenticating through the mock IAM endpoint
    pub fn client(&self) -> KeyProtectClient {
        KeyProtectClient::with_qsc(self.client_config(), QscConfig::new(QscAlgorithm::Kyber768))
            .unwrap()
    }

    pub fn set_delay(&self, delay: Duration) {
        self.state.lock().unwrap().delay = Some(delay);
    }

    pub fn token_exchanges(&self) -> usize {
        self.state.lock().unwrap().token_exchanges
    }

    /// API requests seen so far (token exchanges excluded)
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn last_request(&self) -> RecordedRequest {
        self.requests().pop().expect("no requests recorded")
    }

    pub fn key_versions(&self, key_id: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .keys
            .get(key_id)
            .map(|k| k.versions.len())
            .unwrap_or(0)
    }
}

fn error_response(status: StatusCode, code: &str, message: &str) -> Response {
    let body = json!({
        "metadata": {
            "collectionType": "application/vnd.ibm.kms.error+json",
            "collectionTotal": 1
        },
        "resources": [{
            "errorMsg": message,
            "reasons": [{
                "code": code,
                "message": message,
                "status": status.as_u16(),
                "moreInfo": "https://cloud.ibm.com/apidocs/key-protect"
            }]
        }]
    });
    (status, Json(body)).into_response()
}

fn not_found() -> Response {
    error_response(
        StatusCode::NOT_FOUND,
        "KEY_NOT_FOUND_ERR",
        "Not Found: Key could not be found",
    )
}

fn collection(keys: Vec<&Key>) -> Value {
    json!({
        "metadata": {
            "collectionType": KEY_MEDIA_TYPE,
            "collectionTotal": keys.len()
        },
        "resources": keys
    })
}

/// Record the request and check credentials and instance scoping
fn admit(state: &Shared, method: Method, path: String, headers: &HeaderMap) -> Result<(), Response> {
    state.lock().unwrap().requests.push(RecordedRequest {
        method,
        path,
        headers: headers.clone(),
    });

    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if bearer != format!("Bearer {}", TOKEN) && bearer != format!("Bearer {}", OVERRIDE_TOKEN) {
        return Err(error_response(
            StatusCode::UNAUTHORIZED,
            "UNAUTHORIZED_ERR",
            "Unauthorized: The user does not have access to the specified resource",
        ));
    }

    let instance = headers
        .get("bluemix-instance")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if instance != INSTANCE_ID {
        return Err(error_response(
            StatusCode::FORBIDDEN,
            "INSTANCE_NOT_FOUND_ERR",
            "Forbidden: instance not found",
        ));
    }

    Ok(())
}

fn parse_body(body: &Bytes) -> Result<Value, Response> {
    serde_json::from_slice(body).map_err(|_| {
        error_response(
            StatusCode::BAD_REQUEST,
            "BAD_BODY_ERR",
            "Bad Request: body is not valid JSON",
        )
    })
}

fn aad_of(body: &Value) -> Vec<String> {
    body.get("aad")
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or_default()
}

fn bound_aad(key_id: &str, aad: &[String]) -> Vec<u8> {
    serde_json::to_vec(&(key_id, aad)).unwrap()
}

fn random_material() -> [u8; 32] {
    let mut material = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut material);
    material
}

fn seal(key_id: &str, version: u32, material: &[u8; 32], dek: &[u8], aad: &[String]) -> String {
    let cipher = Aes256Gcm::new(&(*material).into());
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let bound = bound_aad(key_id, aad);
    let ciphertext = cipher
        .encrypt(&nonce, Payload { msg: dek, aad: &bound })
        .unwrap();

    let mut blob = version.to_be_bytes().to_vec();
    blob.extend_from_slice(&nonce);
    blob.extend_from_slice(&ciphertext);
    STANDARD.encode(blob)
}

fn open(key: &MockKey, key_id: &str, wdek: &str, aad: &[String]) -> Option<(u32, Vec<u8>)> {
    let blob = STANDARD.decode(wdek).ok()?;
    if blob.len() < 4 + 12 + 16 {
        return None;
    }
    let version = u32::from_be_bytes(blob[..4].try_into().ok()?);
    let material = key.versions.get(version as usize)?.material;

    let cipher = Aes256Gcm::new(&material.into());
    let bound = bound_aad(key_id, aad);
    let dek = cipher
        .decrypt(
            Nonce::from_slice(&blob[4..16]),
            Payload {
                msg: &blob[16..],
                aad: &bound,
            },
        )
        .ok()?;
    Some((version, dek))
}

async fn issue_token(
    State(state): State<Shared>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    state.lock().unwrap().token_exchanges += 1;

    let grant_ok = form.get("grant_type").map(String::as_str)
        == Some("urn:ibm:params:oauth:grant-type:apikey");
    if !grant_ok || form.get("apikey").map(String::as_str) != Some(API_KEY) {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "errorCode": "BXNIM0415E",
                "errorMessage": "Provided API key could not be found."
            })),
        )
            .into_response();
    }

    let now = chrono::Utc::now().timestamp();
    Json(json!({
        "access_token": TOKEN,
        "refresh_token": "not_supported",
        "token_type": "Bearer",
        "expires_in": 3600,
        "expiration": now + 3600
    }))
    .into_response()
}

async fn create_key(State(state): State<Shared>, headers: HeaderMap, body: Bytes) -> Response {
    if let Err(rejection) = admit(&state, Method::POST, "/api/v2/keys".to_string(), &headers) {
        return rejection;
    }
    let body = match parse_body(&body) {
        Ok(body) => body,
        Err(rejection) => return rejection,
    };

    let requested: Key = match body
        .get("resources")
        .and_then(|r| r.get(0))
        .and_then(|k| serde_json::from_value(k.clone()).ok())
    {
        Some(key) => key,
        None => {
            return error_response(
                StatusCode::BAD_REQUEST,
                "BAD_BODY_ERR",
                "Bad Request: missing key resource",
            )
        }
    };

    let material = match requested.payload.as_deref() {
        Some(payload) => match STANDARD.decode(payload) {
            Ok(bytes) if requested.extractable || bytes.len() == 32 => {
                let mut material = [0u8; 32];
                let n = bytes.len().min(32);
                material[..n].copy_from_slice(&bytes[..n]);
                material
            }
            _ => {
                return error_response(
                    StatusCode::BAD_REQUEST,
                    "BAD_PAYLOAD_ERR",
                    "Bad Request: imported root key payload must be 256 bits",
                )
            }
        },
        None => random_material(),
    };

    let id = Uuid::new_v4().to_string();
    let version = KeyVersion {
        id: Uuid::new_v4().to_string(),
        material,
    };
    let now = chrono::Utc::now();

    let record = Key {
        id: Some(id.clone()),
        name: requested.name,
        description: requested.description,
        resource_type: Some(KEY_MEDIA_TYPE.to_string()),
        extractable: requested.extractable,
        state: Some(1),
        crn: Some(format!("crn:v1:mock:public:kms:local:a/0:{}:key:{}", INSTANCE_ID, id)),
        algorithm_type: Some("AES".to_string()),
        created_by: Some("IBMid-mock".to_string()),
        creation_date: Some(now),
        last_update_date: Some(now),
        expiration_date: requested.expiration_date,
        key_version: Some(KeyVersionRef {
            id: version.id.clone(),
            creation_date: Some(now),
        }),
        key_ring_id: Some(
            headers
                .get("x-kms-key-ring")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("default")
                .to_string(),
        ),
        imported: Some(requested.payload.is_some()),
        ..Default::default()
    };

    let mut guard = state.lock().unwrap();
    guard.order.push(id.clone());
    guard.keys.insert(
        id.clone(),
        MockKey {
            record: record.clone(),
            versions: vec![version],
        },
    );

    (StatusCode::CREATED, Json(collection(vec![&record]))).into_response()
}

async fn list_keys(
    State(state): State<Shared>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    if let Err(rejection) = admit(&state, Method::GET, "/api/v2/keys".to_string(), &headers) {
        return rejection;
    }

    let limit = params
        .get("limit")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(200);
    let offset = params
        .get("offset")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(0);

    let guard = state.lock().unwrap();
    let keys: Vec<&Key> = guard
        .order
        .iter()
        .filter_map(|id| guard.keys.get(id))
        .map(|k| &k.record)
        .skip(offset)
        .take(limit)
        .collect();

    Json(collection(keys)).into_response()
}

async fn get_key(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    if let Err(rejection) = admit(&state, Method::GET, format!("/api/v2/keys/{}", id), &headers) {
        return rejection;
    }

    let delay = state.lock().unwrap().delay;
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }

    let guard = state.lock().unwrap();
    match guard.keys.get(&id) {
        Some(key) => Json(collection(vec![&key.record])).into_response(),
        None => not_found(),
    }
}

async fn delete_key(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    if let Err(rejection) = admit(&state, Method::DELETE, format!("/api/v2/keys/{}", id), &headers)
    {
        return rejection;
    }

    let mut guard = state.lock().unwrap();
    let removed = match guard.keys.remove(&id) {
        Some(key) => key,
        None => return not_found(),
    };
    guard.order.retain(|k| k != &id);

    let wants_representation = headers
        .get("prefer")
        .and_then(|v| v.to_str().ok())
        == Some("return=representation");

    if !wants_representation {
        return StatusCode::NO_CONTENT.into_response();
    }

    let mut record = removed.record;
    record.state = Some(5);
    record.deleted = Some(true);
    record.deletion_date = Some(chrono::Utc::now());
    Json(collection(vec![&record])).into_response()
}

async fn key_action(
    State(state): State<Shared>,
    headers: HeaderMap,
    Path((id, action)): Path<(String, String)>,
    body: Bytes,
) -> Response {
    let path = format!("/api/v2/keys/{}/actions/{}", id, action);
    if let Err(rejection) = admit(&state, Method::POST, path, &headers) {
        return rejection;
    }
    let body = match parse_body(&body) {
        Ok(body) => body,
        Err(rejection) => return rejection,
    };

    let mut guard = state.lock().unwrap();
    let key = match guard.keys.get_mut(&id) {
        Some(key) => key,
        None => return not_found(),
    };

    if key.record.extractable {
        return error_response(
            StatusCode::BAD_REQUEST,
            "KEY_ACTION_INVALID_ERR",
            "Bad Request: only root keys support key actions",
        );
    }

    match action.as_str() {
        "wrap" => {
            let generated = body.get("plaintext").and_then(Value::as_str).is_none();
            let dek = match body.get("plaintext").and_then(Value::as_str) {
                Some(encoded) => match STANDARD.decode(encoded) {
                    Ok(bytes) if bytes.len() == 32 => bytes,
                    _ => {
                        return error_response(
                            StatusCode::BAD_REQUEST,
                            "BAD_PLAINTEXT_ERR",
                            "Bad Request: plaintext must be a base64 encoded 256 bit key",
                        )
                    }
                },
                None => random_material().to_vec(),
            };

            let aad = aad_of(&body);
            let (index, version) = key.latest();
            let ciphertext = seal(&id, index, &version.material, &dek, &aad);

            let mut response = json!({
                "ciphertext": ciphertext,
                "keyVersion": {"id": version.id}
            });
            if generated {
                response["plaintext"] = json!(STANDARD.encode(&dek));
            }
            Json(response).into_response()
        }
        "unwrap" => {
            let ciphertext = body
                .get("ciphertext")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let aad = aad_of(&body);

            let (version, dek) = match open(key, &id, &ciphertext, &aad) {
                Some(opened) => opened,
                None => {
                    return error_response(
                        StatusCode::UNPROCESSABLE_ENTITY,
                        "UNWRAPPING_ERR",
                        "Unprocessable Entity: the ciphertext or AAD does not match this key",
                    )
                }
            };

            let mut response = json!({
                "plaintext": STANDARD.encode(&dek),
                "keyVersion": {"id": key.versions[version as usize].id}
            });

            let (latest_index, latest) = key.latest();
            if version < latest_index {
                response["rewrappedCiphertext"] =
                    json!(seal(&id, latest_index, &latest.material, &dek, &aad));
                response["rewrappedKeyVersion"] = json!({"id": latest.id});
            }
            Json(response).into_response()
        }
        "rotate" => {
            let version = KeyVersion {
                id: Uuid::new_v4().to_string(),
                material: random_material(),
            };
            key.record.key_version = Some(KeyVersionRef {
                id: version.id.clone(),
                creation_date: Some(chrono::Utc::now()),
            });
            key.record.last_rotate_date = Some(chrono::Utc::now());
            key.versions.push(version);
            StatusCode::NO_CONTENT.into_response()
        }
        _ => error_response(
            StatusCode::BAD_REQUEST,
            "UNSUPPORTED_ACTION_ERR",
            "Bad Request: unsupported key action",
        ),
    }
}
