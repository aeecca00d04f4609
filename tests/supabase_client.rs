mod common;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use cinma_tools::access::{Step, check_error_logs};
use cinma_tools::config::SupabaseCredentials;
use cinma_tools::migration::{MigrationOutcome, run_migration};
use cinma_tools::store::{Filter, Query, RowStore, SqliteStore};
use cinma_tools::supabase::{SupabaseClient, SupabaseError};
use serde_json::{Value, json};

#[derive(Debug, Clone)]
struct Seen {
    method: Method,
    path: String,
    params: HashMap<String, String>,
    apikey: Option<String>,
    authorization: Option<String>,
    prefer: Option<String>,
    body: Option<Value>,
}

type Log = Arc<Mutex<Vec<Seen>>>;

async fn mock(
    State(log): State<Log>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned)
    };
    let params: HashMap<String, String> =
        url::form_urlencoded::parse(uri.query().unwrap_or("").as_bytes())
            .into_owned()
            .collect();
    let body: Option<Value> = serde_json::from_slice(&body).ok();
    log.lock().unwrap().push(Seen {
        method: method.clone(),
        path: uri.path().to_string(),
        params: params.clone(),
        apikey: header("apikey"),
        authorization: header("authorization"),
        prefer: header("prefer"),
        body: body.clone(),
    });

    match (method.as_str(), uri.path()) {
        ("GET", "/rest/v1/movies") => {
            Json(json!([{"id": 7, "title": "الفيل الأزرق"}])).into_response()
        }
        ("HEAD", "/rest/v1/movies") => {
            (StatusCode::OK, [("content-range", "0-0/42")]).into_response()
        }
        ("POST", "/rest/v1/movies") => Json(body.unwrap_or(Value::Null)).into_response(),
        ("PATCH", "/rest/v1/movies") => {
            Json(json!([body.unwrap_or(Value::Null), {"id": 8}])).into_response()
        }
        ("DELETE", "/rest/v1/movies") => Json(json!([{"id": 7}])).into_response(),
        ("POST", "/rest/v1/error_logs")
            if header("prefer").as_deref() == Some("return=minimal") =>
        {
            StatusCode::CREATED.into_response()
        }
        ("POST", "/rest/v1/error_logs") => (
            StatusCode::UNAUTHORIZED,
            Json(json!({
                "code": "42501",
                "message": "new row violates row-level security policy for table \"error_logs\""
            })),
        )
            .into_response(),
        ("GET", "/rest/v1/missing") => (
            StatusCode::NOT_FOUND,
            Json(json!({
                "code": "42P01",
                "message": "relation \"public.missing\" does not exist",
                "details": null,
                "hint": null
            })),
        )
            .into_response(),
        ("POST", "/rest/v1/rpc/exec_sql") => {
            let query = body
                .as_ref()
                .and_then(|b| b.get("query"))
                .and_then(Value::as_str)
                .unwrap_or_default();
            if query.contains("broken") {
                (
                    StatusCode::BAD_REQUEST,
                    Json(json!({"code": "42601", "message": "syntax error at or near \"broken\""})),
                )
                    .into_response()
            } else {
                StatusCode::OK.into_response()
            }
        }
        ("GET", "/auth/v1/admin/users") => {
            let page: usize = params.get("page").and_then(|p| p.parse().ok()).unwrap_or(1);
            let count = if page == 1 { 50 } else { 3 };
            let users: Vec<Value> = (0..count)
                .map(|i| {
                    json!({
                        "id": format!("u-{page}-{i}"),
                        "email": format!("user{page}-{i}@example.com")
                    })
                })
                .collect();
            Json(json!({"users": users, "aud": "authenticated"})).into_response()
        }
        ("PUT", path) if path.starts_with("/auth/v1/admin/users/") => {
            let id = path.trim_start_matches("/auth/v1/admin/users/");
            let mut user = json!({"id": id, "email": "ops@example.com"});
            if let Some(Value::Object(attrs)) = body {
                for (key, value) in attrs {
                    user[key] = value;
                }
            }
            Json(user).into_response()
        }
        ("GET", "/storage/v1/bucket") => {
            Json(json!([{"id": "posters", "name": "posters", "public": true}])).into_response()
        }
        _ => (
            StatusCode::UNAUTHORIZED,
            Json(json!({"msg": "Invalid API key", "error_code": "bad_jwt", "code": 401})),
        )
            .into_response(),
    }
}

fn setup() -> (SupabaseClient, Log) {
    let log: Log = Arc::default();
    let app = Router::new().fallback(mock).with_state(log.clone());
    let base = common::spawn(app);
    let client = SupabaseClient::new(&SupabaseCredentials {
        url: format!("{base}/"),
        key: "service-key".to_string(),
    });
    (client, log)
}

fn last(log: &Log) -> Seen {
    log.lock().unwrap().last().cloned().expect("a recorded request")
}

#[test]
fn select_sends_postgrest_query() {
    let (client, log) = setup();
    let query = Query::all()
        .columns("id,title")
        .filter(Filter::eq("id", 7))
        .filter(Filter::not_null("poster_path"))
        .order_by("id", true)
        .limit(10)
        .offset(20);
    let rows = client.select("movies", &query).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["title"], "الفيل الأزرق");

    let seen = last(&log);
    assert_eq!(seen.path, "/rest/v1/movies");
    assert_eq!(seen.params["select"], "id,title");
    assert_eq!(seen.params["id"], "eq.7");
    assert_eq!(seen.params["poster_path"], "not.is.null");
    assert_eq!(seen.params["order"], "id.asc");
    assert_eq!(seen.params["limit"], "10");
    assert_eq!(seen.params["offset"], "20");
    assert_eq!(seen.apikey.as_deref(), Some("service-key"));
    assert_eq!(seen.authorization.as_deref(), Some("Bearer service-key"));
}

#[test]
fn writes_ask_for_representation() {
    let (client, log) = setup();
    let row = json!({"id": 9, "title": "x"}).as_object().cloned().unwrap();

    let stored = client.insert("movies", &[row.clone()]).unwrap();
    assert_eq!(stored, vec![row.clone()]);
    let seen = last(&log);
    assert_eq!(seen.method, Method::POST);
    assert_eq!(seen.prefer.as_deref(), Some("return=representation"));
    assert_eq!(seen.body, Some(json!([{"id": 9, "title": "x"}])));

    assert_eq!(client.update("movies", &[Filter::eq("id", 9)], &row).unwrap(), 2);
    assert_eq!(last(&log).params["id"], "eq.9");

    assert_eq!(client.delete("movies", &[Filter::neq("id", 0)]).unwrap(), 1);
    assert_eq!(last(&log).params["id"], "neq.0");
}

#[test]
fn count_reads_content_range() {
    let (client, log) = setup();
    assert_eq!(client.count("movies").unwrap(), 42);
    let seen = last(&log);
    assert_eq!(seen.method, Method::HEAD);
    assert_eq!(seen.prefer.as_deref(), Some("count=exact"));
}

#[test]
fn empty_insert_makes_no_request() {
    let (client, log) = setup();
    assert!(client.insert("movies", &[]).unwrap().is_empty());
    assert!(log.lock().unwrap().is_empty());
}

#[test]
fn write_only_inserts_ask_for_minimal_return() {
    let (client, log) = setup();
    let row = json!({"id": "e-1", "message": "boom"}).as_object().cloned().unwrap();

    client.insert_minimal("error_logs", &[row.clone()]).unwrap();
    let seen = last(&log);
    assert_eq!(seen.method, Method::POST);
    assert_eq!(seen.path, "/rest/v1/error_logs");
    assert_eq!(seen.prefer.as_deref(), Some("return=minimal"));
    assert_eq!(seen.body, Some(json!([{"id": "e-1", "message": "boom"}])));

    let err = client.insert("error_logs", &[row]).unwrap_err();
    let api = err.downcast_ref::<SupabaseError>().expect("typed error");
    assert!(api.is_permission_denied());
    assert!(!api.is_missing_table());

    client.insert_minimal("error_logs", &[]).unwrap();
    assert_eq!(log.lock().unwrap().len(), 2);
}

#[test]
fn anonymous_error_reports_do_not_need_read_access() {
    let (anon, log) = setup();
    let admin = SqliteStore::open_in_memory().unwrap();

    let report = check_error_logs(&admin, &anon);
    assert!(report.admin_insert.passed());
    assert_eq!(report.anon_insert, Step::Passed);
    assert!(matches!(report.anon_read, Step::Failed(_)));
    let prefer: Vec<Option<String>> = log
        .lock()
        .unwrap()
        .iter()
        .filter(|seen| seen.method == Method::POST)
        .map(|seen| seen.prefer.clone())
        .collect();
    assert_eq!(prefer, vec![Some("return=minimal".to_string())]);
}

#[test]
fn api_errors_keep_postgrest_fields() {
    let (client, _) = setup();
    let err = client.select("missing", &Query::all()).unwrap_err();
    let api = err.downcast_ref::<SupabaseError>().expect("typed error");
    assert_eq!(api.status(), Some(404));
    assert_eq!(api.code(), Some("42P01"));
    assert!(api.is_missing_table());
}

#[test]
fn gotrue_errors_use_msg_and_error_code() {
    let (client, _) = setup();
    let err = client.rpc("unknown_function_path", &json!({})).unwrap_err();
    // unknown routes answer like GoTrue
    match err {
        SupabaseError::Api { status, code, message, .. } => {
            assert_eq!(status, 401);
            assert_eq!(code.as_deref(), Some("bad_jwt"));
            assert_eq!(message, "Invalid API key");
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn migration_falls_back_to_statements() {
    let (client, log) = setup();
    assert_eq!(run_migration(&client, "SELECT 1;"), MigrationOutcome::Whole);

    let outcome = run_migration(&client, "SELECT 1; SELECT broken; SELECT 3;");
    assert_eq!(outcome, MigrationOutcome::Split { ok: 2, failed: 1 });
    let seen = last(&log);
    assert_eq!(seen.path, "/rest/v1/rpc/exec_sql");
    assert_eq!(seen.body, Some(json!({"query": "SELECT 3"})));
}

#[test]
fn admin_users_are_paged() {
    let (client, log) = setup();
    let users = client.list_all_users().unwrap();
    assert_eq!(users.len(), 53);
    assert_eq!(users[52].email.as_deref(), Some("user2-2@example.com"));
    let seen = last(&log);
    assert_eq!(seen.params["page"], "2");
    assert_eq!(seen.params["per_page"], "50");
}

#[test]
fn update_user_sends_metadata() {
    let (client, log) = setup();
    let user = client
        .update_user("u-1", &json!({"app_metadata": {"role": "admin"}}))
        .unwrap();
    assert_eq!(user.id, "u-1");
    assert_eq!(user.app_metadata["role"], "admin");
    assert_eq!(last(&log).method, Method::PUT);
}

#[test]
fn buckets_are_listed() {
    let (client, _) = setup();
    let buckets = client.list_buckets().unwrap();
    assert_eq!(buckets[0]["name"], "posters");
}

#[test]
fn unreachable_host_is_a_transport_error() {
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let client = SupabaseClient::new(&SupabaseCredentials {
        url: format!("http://127.0.0.1:{port}"),
        key: "k".to_string(),
    });
    let err = client.list_buckets().unwrap_err();
    assert!(matches!(err, SupabaseError::Transport { .. }), "{err:?}");
}
