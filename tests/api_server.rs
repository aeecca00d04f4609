mod common;

use std::fs;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::{
    Json, Router,
    body::{Body, Bytes},
    extract::{Path, Query},
    http::{HeaderMap, Method, Request, StatusCode, header},
    response::IntoResponse,
    routing::get,
};
use cinma_tools::linkcheck::LinkChecker;
use cinma_tools::catalog::Table;
use cinma_tools::server::{AppState, LIST_CACHE_CAPACITY, SyncJob, router};
use cinma_tools::store::{Filter, RowStore, SqliteStore};
use cinma_tools::tmdb::TmdbClient;
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::collections::HashMap;
use tempfile::TempDir;
use tower::ServiceExt;
use url::Url;

const TOKEN: &str = "s3cret-admin-token";

struct Fixture {
    state: AppState,
    store: Arc<Mutex<SqliteStore>>,
    _www: TempDir,
}

fn fixture() -> Fixture {
    let store = Arc::new(Mutex::new(SqliteStore::open_in_memory().unwrap()));
    store
        .insert(
            "movies",
            &[
                json!({"id": 550, "title": "Fight Club"}).as_object().cloned().unwrap(),
                json!({"id": 551, "title": "مسرحية"}).as_object().cloned().unwrap(),
            ],
        )
        .unwrap();
    store
        .insert(
            "profiles",
            &[json!({"id": "u-1", "role": "admin"}).as_object().cloned().unwrap()],
        )
        .unwrap();

    let www = TempDir::new().unwrap();
    fs::write(www.path().join("index.html"), "<!doctype html><title>cinma</title>").unwrap();
    fs::create_dir_all(www.path().join("assets")).unwrap();
    fs::write(www.path().join("assets/app.js"), "console.log('hi')").unwrap();

    let state = AppState::new(store.clone(), www.path()).with_admin_token(Some(TOKEN.to_string()));
    Fixture {
        state,
        store,
        _www: www,
    }
}

async fn call(
    state: &AppState,
    method: Method,
    uri: &str,
    token: Option<&str>,
) -> (StatusCode, HeaderMap, Bytes) {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        request = request.header("x-admin-token", token);
    }
    send(state, request.body(Body::empty()).unwrap()).await
}

async fn send(state: &AppState, request: Request<Body>) -> (StatusCode, HeaderMap, Bytes) {
    let response = router(state.clone()).oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, headers, body)
}

fn json_body(body: &Bytes) -> Value {
    serde_json::from_slice(body).unwrap()
}

#[tokio::test]
async fn catalog_lists_are_paged_and_cached() {
    let fx = fixture();
    let (status, _, body) = call(&fx.state, Method::GET, "/api/catalog/movies?limit=1", None).await;
    assert_eq!(status, StatusCode::OK);
    let rows = json_body(&body);
    assert_eq!(rows.as_array().unwrap().len(), 1);
    assert_eq!(rows[0]["id"], 550);

    fx.store.delete("movies", &[Filter::eq("id", 550)]).unwrap();
    let (_, _, body) = call(&fx.state, Method::GET, "/api/catalog/movies?limit=1", None).await;
    assert_eq!(json_body(&body)[0]["id"], 550);

    let (_, _, body) = call(&fx.state, Method::GET, "/api/catalog/movies?offset=1", None).await;
    assert_eq!(json_body(&body).as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn list_cache_stays_bounded() {
    let fx = fixture();
    for offset in 0..(LIST_CACHE_CAPACITY * 3) {
        let uri = format!("/api/catalog/movies?offset={offset}");
        let (status, _, _) = call(&fx.state, Method::GET, &uri, None).await;
        assert_eq!(status, StatusCode::OK);
    }
    let (_, _, body) = call(&fx.state, Method::GET, "/api/admin/health", Some(TOKEN)).await;
    let health = json_body(&body);
    let cached = health["cachedLists"].as_u64().unwrap() as usize;
    assert!(cached <= LIST_CACHE_CAPACITY, "{cached} cached lists");
    assert!(cached > 0);

    // The first page was evicted, so it is read again from the store.
    fx.store.delete("movies", &[Filter::eq("id", 550)]).unwrap();
    let (_, _, body) = call(&fx.state, Method::GET, "/api/catalog/movies", None).await;
    assert_eq!(json_body(&body).as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn cors_allows_configured_origins() {
    let fx = fixture();
    let state = fx
        .state
        .clone()
        .with_allowed_origins(vec!["https://cinma.online".to_string()]);

    let request = Request::get("/api/catalog/movies")
        .header(header::ORIGIN, "https://cinma.online")
        .body(Body::empty())
        .unwrap();
    let (status, headers, _) = send(&state, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        headers[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "https://cinma.online"
    );

    let request = Request::get("/api/catalog/movies")
        .header(header::ORIGIN, "https://elsewhere.example")
        .body(Body::empty())
        .unwrap();
    let (_, headers, _) = send(&state, request).await;
    assert!(headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());

    let preflight = Request::builder()
        .method(Method::OPTIONS)
        .uri("/api/admin/sync")
        .header(header::ORIGIN, "https://cinma.online")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "x-admin-token")
        .body(Body::empty())
        .unwrap();
    let (status, headers, _) = send(&state, preflight).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        headers[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "https://cinma.online"
    );
    assert_eq!(headers[header::ACCESS_CONTROL_MAX_AGE], "86400");
    let allowed = headers[header::ACCESS_CONTROL_ALLOW_HEADERS].to_str().unwrap();
    assert!(allowed.contains("x-admin-token"), "{allowed}");
}

#[tokio::test]
async fn cors_reflects_any_origin_when_unconfigured() {
    let fx = fixture();
    let request = Request::get("/api/catalog/movies")
        .header(header::ORIGIN, "http://localhost:5173")
        .body(Body::empty())
        .unwrap();
    let (_, headers, _) = send(&fx.state, request).await;
    assert_eq!(
        headers[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "http://localhost:5173"
    );
}

#[tokio::test]
async fn private_tables_are_not_browsable() {
    let fx = fixture();
    let (status, _, body) = call(&fx.state, Method::GET, "/api/catalog/profiles", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json_body(&body)["error"], "unknown catalog: profiles");

    let (status, _, _) = call(&fx.state, Method::GET, "/api/catalog/nope/1", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn media_items_come_with_embed_servers() {
    let fx = fixture();
    let (status, _, body) = call(&fx.state, Method::GET, "/api/catalog/movies/551", None).await;
    assert_eq!(status, StatusCode::OK);
    let body = json_body(&body);
    assert_eq!(body["item"]["title"], "مسرحية");
    assert_eq!(body["servers"][0]["url"], "https://vidsrc.to/embed/movie?tmdb=551");
    assert_eq!(body["servers"].as_array().unwrap().len(), 3);

    let (status, _, body) = call(&fx.state, Method::GET, "/api/catalog/movies/9999", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json_body(&body)["error"], "movies item not found");
}

#[tokio::test]
async fn check_link_rejects_bad_targets() {
    let fx = fixture();
    let (status, _, body) = call(&fx.state, Method::GET, "/api/check-link", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json_body(&body)["error"], "URL is required");

    let (status, _, body) = call(
        &fx.state,
        Method::GET,
        "/api/check-link?url=http%3A%2F%2F10.0.0.1%2F",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json_body(&body)["error"], "blocked_host");

    let (_, _, body) = call(
        &fx.state,
        Method::GET,
        "/api/check-link?url=file%3A%2F%2F%2Fetc%2Fpasswd",
        None,
    )
    .await;
    assert_eq!(json_body(&body)["error"], "invalid_protocol");
}

#[tokio::test]
async fn search_needs_tmdb() {
    let fx = fixture();
    let (status, _, _) = call(&fx.state, Method::GET, "/api/search?q=club", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let state = fx.state.clone().with_tmdb(TmdbClient::with_base_url(tmdb_mock(), "key"));
    let (status, _, body) = call(&state, Method::GET, "/api/search?q=club&page=1", None).await;
    assert_eq!(status, StatusCode::OK);
    let body = json_body(&body);
    assert_eq!(body["results"][0]["title"], "club");
    assert_eq!(body["results"][0]["language"], "ar-SA");

    let (_, _, body) = call(&state, Method::GET, "/api/search?q=club&lang=en", None).await;
    assert_eq!(json_body(&body)["results"][0]["language"], "en-US");

    let (status, _, _) = call(&state, Method::GET, "/api/search?q=club&lang=fr", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, _) = call(&state, Method::GET, "/api/search?q=%20", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

/// TMDB stand-in covering search, genre lists and US ratings.
fn tmdb_mock() -> String {
    common::spawn(
        Router::new()
            .route(
                "/search/multi",
                get(|Query(params): Query<HashMap<String, String>>| async move {
                    Json(json!({
                        "page": 1,
                        "results": [{
                            "id": 550,
                            "media_type": "movie",
                            "title": params["query"],
                            "language": params["language"]
                        }],
                        "total_pages": 1,
                        "total_results": 1
                    }))
                }),
            )
            .route("/genre/{kind}/list", get(genre_list))
            .route(
                "/movie/{id}/release_dates",
                get(|Path(id): Path<u64>| async move {
                    if id != 551 {
                        return (StatusCode::NOT_FOUND, Json(json!({"status_message": "nope"})))
                            .into_response();
                    }
                    Json(json!({"results": [
                        {"iso_3166_1": "EG", "release_dates": [{"certification": "+12"}]},
                        {"iso_3166_1": "US", "release_dates": [{"certification": "pg-13"}]}
                    ]}))
                    .into_response()
                }),
            ),
    )
}

async fn genre_list(
    Path(kind): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Value> {
    let name = if params["language"] == "en-US" { "Drama" } else { "دراما" };
    Json(json!({"genres": [{"id": 18, "name": format!("{kind}:{name}")}]}))
}

#[tokio::test]
async fn details_carry_us_rating_when_tmdb_is_configured() {
    let fx = fixture();
    let state = fx.state.clone().with_tmdb(TmdbClient::with_base_url(tmdb_mock(), "key"));

    let (status, _, body) = call(&state, Method::GET, "/api/catalog/movies/551", None).await;
    assert_eq!(status, StatusCode::OK);
    let body = json_body(&body);
    assert_eq!(body["rating"], json!({"certification": "PG-13", "color": "yellow"}));

    // A failed rating lookup leaves the item intact.
    let (status, _, body) = call(&state, Method::GET, "/api/catalog/movies/550", None).await;
    assert_eq!(status, StatusCode::OK);
    let body = json_body(&body);
    assert_eq!(body["item"]["title"], "Fight Club");
    assert!(body.get("rating").is_none());
}

#[tokio::test]
async fn genres_are_listed_per_kind_and_language() {
    let fx = fixture();
    let (status, _, _) = call(&fx.state, Method::GET, "/api/genres/movie", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let state = fx.state.clone().with_tmdb(TmdbClient::with_base_url(tmdb_mock(), "key"));
    let (status, _, body) = call(&state, Method::GET, "/api/genres/tv", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_body(&body), json!([{"id": 18, "name": "tv:دراما"}]));

    let (_, _, body) = call(&state, Method::GET, "/api/genres/movie?lang=en", None).await;
    assert_eq!(json_body(&body)[0]["name"], "movie:Drama");

    let (status, _, body) = call(&state, Method::GET, "/api/genres/anime", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json_body(&body)["error"], "unknown media kind: anime");
}

#[tokio::test]
async fn admin_routes_require_token() {
    let fx = fixture();
    let (status, _, body) = call(&fx.state, Method::GET, "/api/admin/health", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(&body)["error"], "invalid admin token");

    let (status, _, _) = call(&fx.state, Method::GET, "/api/admin/logs", Some("wrong")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _, body) = call(&fx.state, Method::GET, "/api/admin/health", Some(TOKEN)).await;
    assert_eq!(status, StatusCode::OK);
    let health = json_body(&body);
    assert_eq!(health["status"], "ok");
    assert_eq!(health["sync"]["state"], "idle");
    assert_eq!(health["syncConfigured"], false);

    let (status, _, _) = call(&fx.state, Method::POST, "/api/admin/sync", Some(TOKEN)).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn sync_runs_in_background_and_clears_cache() {
    let fx = fixture();
    let runs = Arc::new(AtomicUsize::new(0));
    let job: SyncJob = {
        let runs = runs.clone();
        Arc::new(move || {
            std::thread::sleep(Duration::from_millis(50));
            runs.fetch_add(1, Ordering::SeqCst);
            Ok("3 inserted".to_string())
        })
    };
    let state = fx.state.clone().with_sync_job(job);

    let (_, _, body) = call(&state, Method::GET, "/api/catalog/movies", None).await;
    assert_eq!(json_body(&body).as_array().unwrap().len(), 2);
    fx.store.delete("movies", &[Filter::eq("id", 551)]).unwrap();

    let (status, _, body) = call(&state, Method::POST, "/api/admin/sync", Some(TOKEN)).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(json_body(&body)["state"], "running");

    let (status, _, _) = call(&state, Method::POST, "/api/admin/sync", Some(TOKEN)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let mut finished = Value::Null;
    for _ in 0..200 {
        let (_, _, body) = call(&state, Method::GET, "/api/admin/sync", Some(TOKEN)).await;
        let status = json_body(&body);
        if status["state"] == "success" {
            finished = status;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(finished["message"], "3 inserted");
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    let (_, _, body) = call(&state, Method::GET, "/api/catalog/movies", None).await;
    assert_eq!(json_body(&body).as_array().unwrap().len(), 1);

    let (_, _, body) = call(&state, Method::GET, "/api/admin/logs", Some(TOKEN)).await;
    let logs = json_body(&body);
    assert_eq!(logs[0]["message"], "sync started");
    assert_eq!(logs[1]["message"], "sync finished: 3 inserted");
}

#[tokio::test]
async fn catalog_refresh_routes_run_their_job() {
    const SUMMARY: &str = "anime: 25 inserted, 0 updated, 0 skipped, 0 failed";
    let fx = fixture();
    let job: SyncJob = Arc::new(|| Ok(SUMMARY.to_string()));
    let broken: SyncJob = Arc::new(|| Err(anyhow::anyhow!("mp3quran unreachable")));
    let state = fx
        .state
        .clone()
        .with_refresh_job(Table::Anime, job)
        .with_refresh_job(Table::QuranReciters, broken);

    let (status, _, _) = call(&state, Method::POST, "/api/admin/refresh/anime", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _, body) =
        call(&state, Method::POST, "/api/admin/refresh/anime", Some(TOKEN)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_body(&body), json!({"ok": true, "message": SUMMARY}));

    let (status, _, body) =
        call(&state, Method::POST, "/api/admin/refresh/quran", Some(TOKEN)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json_body(&body)["error"], "mp3quran unreachable");

    let (status, _, _) = call(&state, Method::POST, "/api/admin/refresh/games", Some(TOKEN)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _, _) =
        call(&fx.state, Method::POST, "/api/admin/refresh/quran", Some(TOKEN)).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let (_, _, body) = call(&state, Method::GET, "/api/admin/logs", Some(TOKEN)).await;
    let messages: Vec<String> = json_body(&body)
        .as_array()
        .unwrap()
        .iter()
        .map(|entry| entry["message"].as_str().unwrap().to_string())
        .collect();
    assert!(messages.contains(&"quran refresh failed: mp3quran unreachable".to_string()));
}

#[tokio::test]
async fn frontend_is_served_with_spa_fallback() {
    let fx = fixture();
    let (status, headers, body) = call(&fx.state, Method::GET, "/assets/app.js", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(
        headers[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .contains("javascript")
    );
    assert_eq!(&body[..], b"console.log('hi')");

    let (status, headers, body) = call(&fx.state, Method::GET, "/movies/550/watch", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(headers[header::CONTENT_TYPE].to_str().unwrap().starts_with("text/html"));
    assert!(String::from_utf8_lossy(&body).contains("<title>cinma</title>"));

    let (status, _, body) = call(&fx.state, Method::GET, "/api/unknown", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json_body(&body)["error"], "unknown endpoint");
}

#[test]
fn link_check_falls_back_to_ranged_get() {
    let seen_range = Arc::new(Mutex::new(None::<String>));
    let app = {
        let seen_range = seen_range.clone();
        Router::new()
            .route(
                "/video",
                get(move |method: Method, headers: HeaderMap| {
                    let seen_range = seen_range.clone();
                    async move {
                        if method == Method::HEAD {
                            return StatusCode::METHOD_NOT_ALLOWED.into_response();
                        }
                        *seen_range.lock() = headers
                            .get(header::RANGE)
                            .and_then(|v| v.to_str().ok())
                            .map(str::to_owned);
                        (StatusCode::PARTIAL_CONTENT, "x").into_response()
                    }
                }),
            )
            .route("/gone", get(|| async { StatusCode::NOT_FOUND }))
    };
    let base = common::spawn(app);
    let checker = LinkChecker::new(Duration::from_secs(5));

    let status = checker.check_url(&Url::parse(&format!("{base}/video")).unwrap());
    assert!(status.valid, "{status:?}");
    assert_eq!(status.status, Some(206));
    assert!(status.response_time_ms.is_some());
    assert_eq!(seen_range.lock().as_deref(), Some("bytes=0-0"));

    let status = checker.check_url(&Url::parse(&format!("{base}/gone")).unwrap());
    assert!(!status.valid);
    assert_eq!(status.status, Some(404));
}

#[test]
fn redirects_are_checked_hop_by_hop() {
    let app = Router::new()
        .route(
            "/hop",
            get(|| async { (StatusCode::FOUND, [(header::LOCATION, "http://10.0.0.1/secret")]) }),
        )
        .route(
            "/relative",
            get(|| async { (StatusCode::MOVED_PERMANENTLY, [(header::LOCATION, "/hop")]) }),
        )
        .route("/dangling", get(|| async { StatusCode::TEMPORARY_REDIRECT }));
    let base = common::spawn(app);
    let checker = LinkChecker::new(Duration::from_secs(5));

    let status = checker.check_url(&Url::parse(&format!("{base}/hop")).unwrap());
    assert!(!status.valid);
    assert_eq!(status.status, Some(302));
    assert_eq!(status.error.as_deref(), Some("blocked_host"));

    // A relative hop back onto the loopback mock is itself a private target.
    let status = checker.check_url(&Url::parse(&format!("{base}/relative")).unwrap());
    assert_eq!(status.status, Some(301));
    assert_eq!(status.error.as_deref(), Some("blocked_host"));

    let status = checker.check_url(&Url::parse(&format!("{base}/dangling")).unwrap());
    assert!(!status.valid);
    assert_eq!(status.error.as_deref(), Some("redirect without location"));
}
