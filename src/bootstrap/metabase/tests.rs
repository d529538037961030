//! Tests for the Metabase client against an in-process stub.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use rstest::{fixture, rstest};
use serde_json::{Value, json};

use super::*;
use crate::bootstrap::stub;
use crate::engine::ContainerKind;

/// What the stub received, plus canned answers.
#[derive(Default)]
struct Recorder {
    listing: Value,
    reject_registration: Option<&'static str>,
    setup_body: Mutex<Option<Value>>,
    application_name: Mutex<Option<(String, Value)>>,
    database_posts: AtomicU32,
    database_payload: Mutex<Option<Value>>,
    api_key_body: Mutex<Option<Value>>,
}

type Shared = Arc<Recorder>;

fn cookie_of(headers: &HeaderMap) -> String {
    headers
        .get("cookie")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_owned()
}

async fn session_properties() -> Json<Value> {
    Json(json!({ "setup-token": "setup-123", "version": { "tag": "v1.50.1" } }))
}

async fn already_set_up() -> Json<Value> {
    Json(json!({ "setup-token": null }))
}

async fn record_setup(State(recorder): State<Shared>, Json(body): Json<Value>) -> Json<Value> {
    *recorder.setup_body.lock().expect("lock") = Some(body);
    Json(json!({ "id": "setup-session" }))
}

async fn refuse_setup() -> (StatusCode, &'static str) {
    (StatusCode::FORBIDDEN, "The /api/setup route can only be used to create the first user")
}

async fn open_session(Json(body): Json<Value>) -> Response {
    if body["username"] == "admin@metabase.test" && body["password"] == "metabot1" {
        Json(json!({ "id": "session-abc" })).into_response()
    } else {
        StatusCode::UNAUTHORIZED.into_response()
    }
}

async fn record_application_name(
    State(recorder): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> StatusCode {
    *recorder.application_name.lock().expect("lock") = Some((cookie_of(&headers), body));
    StatusCode::NO_CONTENT
}

async fn refuse_application_name() -> (StatusCode, &'static str) {
    (
        StatusCode::PAYMENT_REQUIRED,
        "Setting application-name is not enabled",
    )
}

async fn list_databases(State(recorder): State<Shared>) -> Json<Value> {
    Json(recorder.listing.clone())
}

async fn create_database(State(recorder): State<Shared>, Json(body): Json<Value>) -> Response {
    recorder.database_posts.fetch_add(1, Ordering::SeqCst);
    let reply = json!({ "id": 7, "name": body["name"], "engine": body["engine"] });
    *recorder.database_payload.lock().expect("lock") = Some(body);

    match recorder.reject_registration {
        Some(reason) => (StatusCode::BAD_REQUEST, reason).into_response(),
        None => Json(reply).into_response(),
    }
}

async fn create_api_key(State(recorder): State<Shared>, Json(body): Json<Value>) -> Json<Value> {
    *recorder.api_key_body.lock().expect("lock") = Some(body);
    Json(json!({ "unmasked_key": "mb_secret", "masked_key": "mb_****" }))
}

fn routes(recorder: &Shared) -> Router {
    Router::new()
        .route("/api/session/properties", get(session_properties))
        .route("/api/setup", post(record_setup))
        .route("/api/session", post(open_session))
        .route("/api/setting/application-name", put(record_application_name))
        .route("/api/database", get(list_databases).post(create_database))
        .route("/api/api-key", post(create_api_key))
        .with_state(Arc::clone(recorder))
}

async fn client_for(router: Router) -> MetabaseClient {
    let base_url = stub::serve(router).await;
    MetabaseClient::new(reqwest::Client::new(), base_url, &AppConfig::default())
}

fn metabase_container() -> ContainerName {
    ContainerName::new(ContainerKind::Metabase, "v1.50.1", 3001).expect("name should be valid")
}

fn postgres_container() -> ContainerName {
    ContainerName::new(ContainerKind::Database, "postgres", 5432).expect("name should be valid")
}

/// Fixture providing a recorder whose listing is empty.
#[fixture]
fn recorder() -> Shared {
    Arc::new(Recorder {
        listing: json!({ "data": [] }),
        ..Recorder::default()
    })
}

#[rstest]
#[tokio::test]
async fn bootstrap_walks_every_stage(recorder: Shared) {
    let client = client_for(routes(&recorder)).await;

    let session = client
        .bootstrap(&metabase_container())
        .await
        .expect("bootstrap should succeed");

    assert_eq!(session.id(), "session-abc");
    let setup = recorder.setup_body.lock().expect("lock").clone().expect("setup was sent");
    assert_eq!(setup["token"], "setup-123");
    assert_eq!(setup["prefs"]["site_name"], "metaship-metabase-v1.50.1-3001");
    let (cookie, body) = recorder
        .application_name
        .lock()
        .expect("lock")
        .clone()
        .expect("application name was sent");
    assert_eq!(cookie, "metabase.SESSION=session-abc");
    assert_eq!(body["value"], "metabase-v1.50.1-3001");
}

#[rstest]
#[tokio::test]
async fn refused_application_name_is_tolerated(recorder: Shared) {
    let router = Router::new()
        .route("/api/session/properties", get(session_properties))
        .route("/api/setup", post(record_setup))
        .route("/api/session", post(open_session))
        .route("/api/setting/application-name", put(refuse_application_name))
        .with_state(recorder);
    let client = client_for(router).await;

    let session = client
        .bootstrap(&metabase_container())
        .await
        .expect("community builds should still bootstrap");

    assert_eq!(session.id(), "session-abc");
}

#[rstest]
#[tokio::test]
async fn refused_setup_halts_after_token() {
    let router = Router::new()
        .route("/api/session/properties", get(session_properties))
        .route("/api/setup", post(refuse_setup));
    let client = client_for(router).await;

    let error = client
        .bootstrap(&metabase_container())
        .await
        .expect_err("bootstrap should halt");

    assert!(
        matches!(
            &error,
            BootstrapError::Halted { stage: BootstrapStage::LoggedIn, source }
                if matches!(source.as_ref(), BootstrapError::UnexpectedStatus { status: 403, .. })
        ),
        "unexpected error: {error:?}"
    );
}

#[rstest]
#[tokio::test]
async fn missing_setup_token_halts_before_setup() {
    let router = Router::new().route("/api/session/properties", get(already_set_up));
    let client = client_for(router).await;

    let error = client
        .bootstrap(&metabase_container())
        .await
        .expect_err("bootstrap should halt");

    assert!(
        matches!(
            &error,
            BootstrapError::Halted { stage: BootstrapStage::NotStarted, source }
                if matches!(source.as_ref(), BootstrapError::UnexpectedResponse { .. })
        ),
        "unexpected error: {error:?}"
    );
}

#[rstest]
#[tokio::test]
async fn duplicate_data_source_is_refused_without_posting() {
    let recorder = Arc::new(Recorder {
        listing: json!({ "data": [{ "id": 1, "name": "postgres-5432", "engine": "postgres" }] }),
        ..Recorder::default()
    });
    let client = client_for(routes(&recorder)).await;

    let error = client
        .register_data_source(&Session::new(String::from("session-abc")), &postgres_container())
        .await
        .expect_err("registration should be refused");

    assert!(
        matches!(&error, BootstrapError::DuplicateDataSource { name } if name == "postgres-5432"),
        "unexpected error: {error:?}"
    );
    assert_eq!(recorder.database_posts.load(Ordering::SeqCst), 0);
}

#[rstest]
#[tokio::test]
async fn rejected_registration_carries_upstream_body() {
    let recorder = Arc::new(Recorder {
        listing: json!([]),
        reject_registration: Some("Couldn't connect to the database"),
        ..Recorder::default()
    });
    let client = client_for(routes(&recorder)).await;

    let error = client
        .register_data_source(&Session::new(String::from("session-abc")), &postgres_container())
        .await
        .expect_err("registration should be rejected");

    assert!(
        matches!(
            &error,
            BootstrapError::RegistrationRejected { name, body }
                if name == "postgres-5432" && body == "Couldn't connect to the database"
        ),
        "unexpected error: {error:?}"
    );
    assert_eq!(recorder.database_posts.load(Ordering::SeqCst), 1);
}

#[rstest]
#[tokio::test]
async fn registration_posts_engine_payload(recorder: Shared) {
    let client = client_for(routes(&recorder)).await;

    let created = client
        .register_data_source(&Session::new(String::from("session-abc")), &postgres_container())
        .await
        .expect("registration should succeed");

    assert_eq!(created.name, "postgres-5432");
    assert_eq!(created.id, Some(7));
    let payload = recorder
        .database_payload
        .lock()
        .expect("lock")
        .clone()
        .expect("payload was sent");
    assert_eq!(payload["engine"], "postgres");
    assert_eq!(payload["details"]["port"], 5432);
}

#[rstest]
#[tokio::test]
async fn api_key_is_minted_in_configured_group(recorder: Shared) {
    let client = client_for(routes(&recorder)).await;

    let key = client
        .create_api_key(&Session::new(String::from("session-abc")))
        .await
        .expect("key should be minted");

    assert_eq!(key, "mb_secret");
    let body = recorder.api_key_body.lock().expect("lock").clone().expect("request was sent");
    assert_eq!(body["group_id"], 2);
    assert!(
        body["name"].as_str().is_some_and(|name| name.starts_with("apikey-20")),
        "{body}"
    );
}

#[rstest]
fn export_curl_targets_serialization_endpoint() {
    assert_eq!(
        export_curl("http://localhost:3001/", "mb_secret"),
        "curl --location --request POST 'http://localhost:3001/api/ee/serialization/export' \
         --header 'X-API-KEY: mb_secret'"
    );
}

#[rstest]
fn session_debug_hides_id() {
    let session = Session::new(String::from("session-abc"));

    assert_eq!(format!("{session:?}"), "Session(..)");
}
