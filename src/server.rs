//! HTTP API for the site: cached catalog reads, TMDB search, the link
//! checker, a few admin endpoints and the built frontend as a fallback.

use std::{
    collections::{HashMap, VecDeque},
    hash::Hash,
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use axum::{
    Json, Router,
    body::Body,
    extract::{Path as AxumPath, Query, State},
    http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use mime_guess::MimeGuess;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::{fs::File, signal, task};
use tokio_util::io::ReaderStream;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{error, info, warn};

use crate::catalog::{MediaKind, Table, now_timestamp};
use crate::embed::{Episode, server_links};
use crate::linkcheck::{LinkChecker, LinkStatus, validate_target};
use crate::security::tokens_match;
use crate::store::{self, Row, RowStore};
use crate::tmdb::{ENGLISH_LANGUAGE, Genre, RatingColor, TmdbClient, TmdbPage, rating_color};

pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";
pub const DEFAULT_PAGE_LIMIT: usize = 20;
pub const MAX_PAGE_LIMIT: usize = 100;
pub const LOG_CAPACITY: usize = 20;
pub const CACHE_TTL: Duration = Duration::from_secs(5 * 60);
pub const LIST_CACHE_CAPACITY: usize = 64;
pub const DETAIL_CACHE_CAPACITY: usize = 1024;
pub const CORS_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);
const INDEX_FILE: &str = "index.html";

/// Work behind `POST /api/admin/sync` and the catalog refresh routes;
/// returns a one-line summary.
pub type SyncJob = Arc<dyn Fn() -> Result<String> + Send + Sync>;

pub type SharedStore = Arc<dyn RowStore + Send + Sync>;

#[derive(Clone)]
pub struct AppState {
    store: SharedStore,
    tmdb: Option<Arc<TmdbClient>>,
    sync_job: Option<SyncJob>,
    refresh_jobs: HashMap<Table, SyncJob>,
    allowed_origins: Arc<[String]>,
    admin_token: Option<Arc<str>>,
    www_root: Arc<PathBuf>,
    checker: Arc<LinkChecker>,
    cache: Arc<ApiCache>,
    admin: Arc<AdminState>,
    started: Instant,
}

/// Map whose entries expire after `ttl`. Once `capacity` live entries are
/// held, inserting a new key evicts the oldest one.
struct TtlCache<K, V> {
    entries: RwLock<HashMap<K, (Instant, V)>>,
    ttl: Duration,
    capacity: usize,
}

impl<K: Eq + Hash + Clone, V: Clone> TtlCache<K, V> {
    fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
            capacity: capacity.max(1),
        }
    }

    fn get(&self, key: &K) -> Option<V> {
        self.entries
            .read()
            .get(key)
            .filter(|(stored, _)| stored.elapsed() < self.ttl)
            .map(|(_, value)| value.clone())
    }

    fn insert(&self, key: K, value: V) {
        let mut entries = self.entries.write();
        entries.retain(|_, (stored, _)| stored.elapsed() < self.ttl);
        if entries.len() >= self.capacity && !entries.contains_key(&key) {
            let oldest = entries
                .iter()
                .min_by_key(|(_, (stored, _))| *stored)
                .map(|(key, _)| key.clone());
            if let Some(oldest) = oldest {
                entries.remove(&oldest);
            }
        }
        entries.insert(key, (Instant::now(), value));
    }

    fn len(&self) -> usize {
        self.entries
            .read()
            .values()
            .filter(|(stored, _)| stored.elapsed() < self.ttl)
            .count()
    }

    fn clear(&self) {
        self.entries.write().clear();
    }
}

struct ApiCache {
    lists: TtlCache<(Table, usize, usize), Vec<Row>>,
    details: TtlCache<(Table, String), Row>,
    ratings: TtlCache<(MediaKind, u64), String>,
    genres: TtlCache<(MediaKind, bool), Vec<Genre>>,
}

impl Default for ApiCache {
    fn default() -> Self {
        Self {
            lists: TtlCache::new(CACHE_TTL, LIST_CACHE_CAPACITY),
            details: TtlCache::new(CACHE_TTL, DETAIL_CACHE_CAPACITY),
            ratings: TtlCache::new(CACHE_TTL, DETAIL_CACHE_CAPACITY),
            genres: TtlCache::new(CACHE_TTL, 4),
        }
    }
}

impl ApiCache {
    fn clear(&self) {
        self.lists.clear();
        self.details.clear();
    }
}

#[derive(Default)]
struct AdminState {
    sync: RwLock<SyncStatus>,
    logs: RwLock<VecDeque<LogEntry>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    #[default]
    Idle,
    Running,
    Success,
    Error,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub state: SyncState,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    pub timestamp: String,
    pub level: &'static str,
    pub message: String,
}

impl AppState {
    pub fn new(store: SharedStore, www_root: impl Into<PathBuf>) -> Self {
        Self {
            store,
            tmdb: None,
            sync_job: None,
            refresh_jobs: HashMap::new(),
            allowed_origins: Arc::from(Vec::new()),
            admin_token: None,
            www_root: Arc::new(www_root.into()),
            checker: Arc::new(LinkChecker::default()),
            cache: Arc::new(ApiCache::default()),
            admin: Arc::new(AdminState::default()),
            started: Instant::now(),
        }
    }

    pub fn with_tmdb(mut self, tmdb: TmdbClient) -> Self {
        self.tmdb = Some(Arc::new(tmdb));
        self
    }

    pub fn with_sync_job(mut self, job: SyncJob) -> Self {
        self.sync_job = Some(job);
        self
    }

    /// Job behind `POST /api/admin/refresh/{catalog}` for one of the
    /// refreshable tables.
    pub fn with_refresh_job(mut self, table: Table, job: SyncJob) -> Self {
        self.refresh_jobs.insert(table, job);
        self
    }

    /// Browser origins allowed by CORS. An empty list reflects any origin.
    pub fn with_allowed_origins(mut self, origins: Vec<String>) -> Self {
        self.allowed_origins = Arc::from(origins);
        self
    }

    pub fn with_admin_token(mut self, token: Option<String>) -> Self {
        self.admin_token = token.map(Arc::from);
        self
    }

    pub fn with_link_checker(mut self, checker: LinkChecker) -> Self {
        self.checker = Arc::new(checker);
        self
    }

    fn authorize(&self, headers: &HeaderMap) -> ApiResult<()> {
        let provided = headers
            .get(ADMIN_TOKEN_HEADER)
            .and_then(|value| value.to_str().ok());
        if tokens_match(self.admin_token.as_deref(), provided) {
            Ok(())
        } else {
            Err(ApiError::new(StatusCode::UNAUTHORIZED, "invalid admin token"))
        }
    }

    fn log(&self, level: &'static str, message: impl Into<String>) {
        let mut logs = self.admin.logs.write();
        if logs.len() == LOG_CAPACITY {
            logs.pop_front();
        }
        logs.push_back(LogEntry {
            timestamp: now_timestamp(),
            level,
            message: message.into(),
        });
    }

    fn finish_sync(&self, outcome: std::result::Result<String, String>) {
        let (state, message, level) = match outcome {
            Ok(summary) => (SyncState::Success, summary, "info"),
            Err(reason) => (SyncState::Error, reason, "error"),
        };
        {
            let mut sync = self.admin.sync.write();
            sync.state = state;
            sync.finished_at = Some(now_timestamp());
            sync.message = Some(message.clone());
        }
        match state {
            SyncState::Success => info!("sync finished: {message}"),
            _ => error!("sync failed: {message}"),
        }
        self.log(level, format!("sync finished: {message}"));
        self.cache.clear();
    }

    async fn get_list(&self, table: Table, limit: usize, offset: usize) -> ApiResult<Vec<Row>> {
        let key = (table, limit, offset);
        if let Some(cached) = self.cache.lists.get(&key) {
            return Ok(cached);
        }

        let store = self.store.clone();
        let rows = task::spawn_blocking(move || {
            let query = store::Query::all()
                .order_by("id", true)
                .limit(limit)
                .offset(offset);
            store.select(table.name(), &query)
        })
        .await
        .map_err(|err| ApiError::internal(format!("task join error: {err}")))?
        .map_err(|err| ApiError::internal(format!("{err:#}")))?;

        self.cache.lists.insert(key, rows.clone());
        for row in &rows {
            if let Some(id) = row.get("id") {
                self.cache.details.insert((table, store::plain(id)), row.clone());
            }
        }

        Ok(rows)
    }

    async fn get_item(&self, table: Table, id: &str) -> ApiResult<Row> {
        if let Some(row) = self.cache.details.get(&(table, id.to_owned())) {
            return Ok(row);
        }

        let store = self.store.clone();
        let result = task::spawn_blocking({
            let id = id_value(id);
            move || store.find_one(table.name(), "id", id)
        })
        .await
        .map_err(|err| ApiError::internal(format!("task join error: {err}")))?
        .map_err(|err| ApiError::internal(format!("{err:#}")))?;

        let row = result.ok_or_else(|| ApiError::not_found(format!("{table} item not found")))?;

        self.cache.details.insert((table, id.to_owned()), row.clone());

        Ok(row)
    }

    /// US certification for a title. Lookup failures are logged and leave
    /// the rating out of the response.
    async fn get_rating(&self, kind: MediaKind, id: u64) -> Option<String> {
        let tmdb = self.tmdb.clone()?;
        if let Some(cached) = self.cache.ratings.get(&(kind, id)) {
            return Some(cached);
        }
        match task::spawn_blocking(move || tmdb.certification(kind, id)).await {
            Ok(Ok(certification)) => {
                self.cache.ratings.insert((kind, id), certification.clone());
                Some(certification)
            }
            Ok(Err(err)) => {
                warn!("rating lookup for {} {id} failed: {err:#}", kind.tmdb_path());
                None
            }
            Err(err) => {
                warn!("rating lookup task failed: {err}");
                None
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rating {
    pub certification: String,
    pub color: RatingColor,
}

impl Rating {
    pub fn new(certification: String) -> Self {
        let color = rating_color(&certification);
        Self {
            certification,
            color,
        }
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let listed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin.trim()) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("ignoring invalid CORS origin {origin:?}");
                None
            }
        })
        .collect();
    let allow_origin = if listed.is_empty() {
        AllowOrigin::mirror_request()
    } else {
        AllowOrigin::list(listed)
    };
    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static(ADMIN_TOKEN_HEADER),
        ])
        .max_age(CORS_MAX_AGE)
}

/// Route segment of each table the admin refresh endpoint can rebuild.
fn refresh_target(name: &str) -> Option<Table> {
    match name {
        "anime" => Some(Table::Anime),
        "quran" => Some(Table::QuranReciters),
        _ => None,
    }
}

/// Numeric ids are sent as numbers so PostgREST compares them as such.
fn id_value(raw: &str) -> Value {
    raw.parse::<i64>()
        .map(Value::from)
        .unwrap_or_else(|_| Value::from(raw))
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

pub fn router(state: AppState) -> Router {
    let cors = cors_layer(&state.allowed_origins);
    Router::new()
        .route("/api/catalog/{table}", get(list_catalog))
        .route("/api/catalog/{table}/{id}", get(get_catalog_item))
        .route("/api/genres/{kind}", get(list_genres))
        .route("/api/search", get(search))
        .route("/api/check-link", get(check_link))
        .route("/api/admin/health", get(admin_health))
        .route("/api/admin/logs", get(admin_logs))
        .route("/api/admin/sync", get(sync_status).post(start_sync))
        .route("/api/admin/refresh/{catalog}", post(refresh_catalog))
        .fallback(static_files)
        .with_state(state)
        .layer(cors)
}

pub async fn serve(state: AppState, addr: SocketAddr) -> Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;
    info!("API server listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("running API server")?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = signal::ctrl_c().await {
        error!("failed to install Ctrl+C handler: {err}");
    }
    info!("shutting down");
}

fn browsable(name: &str) -> ApiResult<Table> {
    name.parse::<Table>()
        .ok()
        .filter(|table| table.is_browsable())
        .ok_or_else(|| ApiError::not_found(format!("unknown catalog: {name}")))
}

#[derive(Debug, Deserialize)]
struct PageParams {
    limit: Option<usize>,
    offset: Option<usize>,
}

async fn list_catalog(
    State(state): State<AppState>,
    AxumPath(table): AxumPath<String>,
    Query(params): Query<PageParams>,
) -> ApiResult<Json<Vec<Row>>> {
    let table = browsable(&table)?;
    let limit = params
        .limit
        .unwrap_or(DEFAULT_PAGE_LIMIT)
        .clamp(1, MAX_PAGE_LIMIT);
    let rows = state
        .get_list(table, limit, params.offset.unwrap_or(0))
        .await?;
    Ok(Json(rows))
}

async fn get_catalog_item(
    State(state): State<AppState>,
    AxumPath((table, id)): AxumPath<(String, String)>,
) -> ApiResult<Json<Value>> {
    let table = browsable(&table)?;
    let item = state.get_item(table, &id).await?;
    let mut body = json!({ "item": item });
    if let (Some(kind), Ok(tmdb_id)) = (table.media_kind(), id.parse::<u64>()) {
        body["servers"] = serde_json::to_value(server_links(kind, tmdb_id, Episode::default()))
            .map_err(|err| ApiError::internal(err.to_string()))?;
        if let Some(certification) = state.get_rating(kind, tmdb_id).await {
            body["rating"] = serde_json::to_value(Rating::new(certification))
                .map_err(|err| ApiError::internal(err.to_string()))?;
        }
    }
    Ok(Json(body))
}

fn media_kind(name: &str) -> ApiResult<MediaKind> {
    match name {
        "movie" => Ok(MediaKind::Movie),
        "tv" => Ok(MediaKind::Tv),
        _ => Err(ApiError::not_found(format!("unknown media kind: {name}"))),
    }
}

fn search_client(state: &AppState) -> ApiResult<Arc<TmdbClient>> {
    state
        .tmdb
        .clone()
        .ok_or_else(|| ApiError::new(StatusCode::SERVICE_UNAVAILABLE, "search is not configured"))
}

/// `lang=en` switches TMDB text to English; anything else keeps the
/// client default.
fn localized(tmdb: Arc<TmdbClient>, lang: Option<&str>) -> ApiResult<Arc<TmdbClient>> {
    match lang.map(str::trim) {
        None | Some("") | Some("ar") => Ok(tmdb),
        Some("en") => Ok(Arc::new((*tmdb).clone().with_language(ENGLISH_LANGUAGE))),
        Some(other) => Err(ApiError::bad_request(format!("unsupported language: {other}"))),
    }
}

#[derive(Debug, Deserialize)]
struct LangParams {
    lang: Option<String>,
}

async fn list_genres(
    State(state): State<AppState>,
    AxumPath(kind): AxumPath<String>,
    Query(params): Query<LangParams>,
) -> ApiResult<Json<Vec<Genre>>> {
    let kind = media_kind(&kind)?;
    let english = params.lang.as_deref() == Some("en");
    let tmdb = localized(search_client(&state)?, params.lang.as_deref())?;
    if let Some(cached) = state.cache.genres.get(&(kind, english)) {
        return Ok(Json(cached));
    }

    let genres = task::spawn_blocking(move || tmdb.genres(kind))
        .await
        .map_err(|err| ApiError::internal(format!("task join error: {err}")))?
        .map_err(|err| ApiError::new(StatusCode::BAD_GATEWAY, format!("{err:#}")))?;
    state.cache.genres.insert((kind, english), genres.clone());
    Ok(Json(genres))
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    q: Option<String>,
    page: Option<u32>,
    lang: Option<String>,
}

async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> ApiResult<Json<TmdbPage<Value>>> {
    let query = params
        .q
        .map(|q| q.trim().to_owned())
        .filter(|q| !q.is_empty())
        .ok_or_else(|| ApiError::bad_request("query is required"))?;
    let tmdb = localized(search_client(&state)?, params.lang.as_deref())?;
    let page = params.page.unwrap_or(1);

    let results = task::spawn_blocking(move || tmdb.search_multi(&query, page))
        .await
        .map_err(|err| ApiError::internal(format!("task join error: {err}")))?
        .map_err(|err| ApiError::new(StatusCode::BAD_GATEWAY, format!("{err:#}")))?;
    Ok(Json(results))
}

#[derive(Debug, Deserialize)]
struct LinkParams {
    url: Option<String>,
}

async fn check_link(
    State(state): State<AppState>,
    Query(params): Query<LinkParams>,
) -> ApiResult<Json<LinkStatus>> {
    let raw = params
        .url
        .filter(|url| !url.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("URL is required"))?;
    let url = validate_target(&raw).map_err(|err| ApiError::bad_request(err.to_string()))?;

    let checker = state.checker.clone();
    let status = task::spawn_blocking(move || checker.check_url(&url))
        .await
        .map_err(|err| ApiError::internal(format!("task join error: {err}")))?;
    Ok(Json(status))
}

async fn admin_health(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Json<Value>> {
    state.authorize(&headers)?;
    let sync = state.admin.sync.read().clone();
    Ok(Json(json!({
        "status": "ok",
        "uptimeSeconds": state.started.elapsed().as_secs(),
        "searchConfigured": state.tmdb.is_some(),
        "syncConfigured": state.sync_job.is_some(),
        "cachedLists": state.cache.lists.len(),
        "cachedItems": state.cache.details.len(),
        "sync": sync,
    })))
}

async fn admin_logs(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<LogEntry>>> {
    state.authorize(&headers)?;
    let logs = state.admin.logs.read().iter().cloned().collect();
    Ok(Json(logs))
}

async fn sync_status(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<SyncStatus>> {
    state.authorize(&headers)?;
    Ok(Json(state.admin.sync.read().clone()))
}

async fn start_sync(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<(StatusCode, Json<SyncStatus>)> {
    state.authorize(&headers)?;
    let job = state
        .sync_job
        .clone()
        .ok_or_else(|| ApiError::new(StatusCode::SERVICE_UNAVAILABLE, "sync is not configured"))?;

    let snapshot = {
        let mut sync = state.admin.sync.write();
        if sync.state == SyncState::Running {
            return Err(ApiError::new(StatusCode::CONFLICT, "sync already running"));
        }
        *sync = SyncStatus {
            state: SyncState::Running,
            started_at: Some(now_timestamp()),
            finished_at: None,
            message: None,
        };
        sync.clone()
    };
    info!("sync started");
    state.log("info", "sync started");

    let worker = state.clone();
    tokio::spawn(async move {
        let outcome = match task::spawn_blocking(move || job()).await {
            Ok(Ok(summary)) => Ok(summary),
            Ok(Err(err)) => Err(format!("{err:#}")),
            Err(err) => Err(format!("task join error: {err}")),
        };
        worker.finish_sync(outcome);
    });

    Ok((StatusCode::ACCEPTED, Json(snapshot)))
}

async fn refresh_catalog(
    State(state): State<AppState>,
    headers: HeaderMap,
    AxumPath(catalog): AxumPath<String>,
) -> ApiResult<Json<Value>> {
    state.authorize(&headers)?;
    let table = refresh_target(&catalog)
        .ok_or_else(|| ApiError::not_found(format!("unknown catalog: {catalog}")))?;
    let job = state.refresh_jobs.get(&table).cloned().ok_or_else(|| {
        ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            format!("{catalog} refresh is not configured"),
        )
    })?;

    info!("{catalog} refresh started");
    state.log("info", format!("{catalog} refresh started"));
    let outcome = task::spawn_blocking(move || job())
        .await
        .map_err(|err| ApiError::internal(format!("task join error: {err}")))?;
    match outcome {
        Ok(summary) => {
            info!("{catalog} refresh finished: {summary}");
            state.log("info", format!("{catalog} refresh finished: {summary}"));
            state.cache.clear();
            Ok(Json(json!({ "ok": true, "message": summary })))
        }
        Err(err) => {
            let message = format!("{err:#}");
            error!("{catalog} refresh failed: {message}");
            state.log("error", format!("{catalog} refresh failed: {message}"));
            Err(ApiError::internal(message))
        }
    }
}

/// Maps a request path onto `root`, refusing `..` segments.
fn resolve_static(root: &Path, request_path: &str) -> Option<PathBuf> {
    let mut path = root.to_path_buf();
    for segment in request_path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => return None,
            s if s.contains('\\') => return None,
            s => path.push(s),
        }
    }
    Some(path)
}

async fn static_files(State(state): State<AppState>, uri: Uri) -> Response {
    let request_path = uri.path();
    if request_path.starts_with("/api/") {
        return ApiError::not_found("unknown endpoint").into_response();
    }

    if let Some(path) = resolve_static(&state.www_root, request_path) {
        let is_file = tokio::fs::metadata(&path)
            .await
            .map(|meta| meta.is_file())
            .unwrap_or(false);
        if is_file {
            return stream_file(path).await.into_response();
        }
    }

    stream_file(state.www_root.join(INDEX_FILE))
        .await
        .into_response()
}

async fn stream_file(path: PathBuf) -> ApiResult<Response> {
    let file = File::open(&path).await.map_err(|_| {
        warn!("static file missing: {}", path.display());
        ApiError::not_found("file not found")
    })?;

    let stream = ReaderStream::new(file);
    let mut response = Body::from_stream(stream).into_response();
    if let Some(mime) = MimeGuess::from_path(&path).first() {
        if let Ok(value) = mime.to_string().parse() {
            response.headers_mut().insert(header::CONTENT_TYPE, value);
        }
    }

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_paths_stay_under_root() {
        let root = Path::new("/srv/www");
        assert_eq!(
            resolve_static(root, "/assets/app.js"),
            Some(PathBuf::from("/srv/www/assets/app.js"))
        );
        assert_eq!(resolve_static(root, "/"), Some(PathBuf::from("/srv/www")));
        assert_eq!(resolve_static(root, "/../etc/passwd"), None);
        assert_eq!(resolve_static(root, "/a\\..\\b"), None);
    }

    #[test]
    fn ids_keep_their_type() {
        assert_eq!(id_value("42"), json!(42));
        assert_eq!(id_value("abc-1"), json!("abc-1"));
    }

    #[test]
    fn ttl_cache_evicts_oldest_and_expired() {
        let cache = TtlCache::new(Duration::from_secs(60), 2);
        cache.insert("a", 1);
        std::thread::sleep(Duration::from_millis(2));
        cache.insert("b", 2);
        std::thread::sleep(Duration::from_millis(2));
        cache.insert("a", 10);
        assert_eq!(cache.len(), 2);
        cache.insert("c", 3);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&"b"), None);
        assert_eq!(cache.get(&"a"), Some(10));

        let expired = TtlCache::new(Duration::ZERO, 8);
        expired.insert("a", 1);
        assert_eq!(expired.get(&"a"), None);
        assert_eq!(expired.len(), 0);
    }

    #[test]
    fn refresh_routes_cover_anime_and_quran() {
        assert_eq!(refresh_target("anime"), Some(Table::Anime));
        assert_eq!(refresh_target("quran"), Some(Table::QuranReciters));
        assert_eq!(refresh_target("movies"), None);
    }

    #[test]
    fn admin_log_keeps_latest_entries() {
        let state = AppState::new(Arc::new(parking_lot::Mutex::new(
            crate::store::SqliteStore::open_in_memory().unwrap(),
        )), "dist");
        for i in 0..(LOG_CAPACITY + 5) {
            state.log("info", format!("entry {i}"));
        }
        let logs = state.admin.logs.read();
        assert_eq!(logs.len(), LOG_CAPACITY);
        assert_eq!(logs.front().unwrap().message, "entry 5");
    }
}
