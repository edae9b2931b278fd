#![forbid(unsafe_code)]

//! Axum backend for the vidgate relay.
//!
//! Exposes the key-gated relay endpoint, a liveness route, and the
//! password-gated admin panel over the key store and audit log. All actual
//! behavior lives in the library modules; this binary is wiring, HTTP
//! translation, and HTML.

use std::{
    net::{IpAddr, SocketAddr},
    path::PathBuf,
    sync::Arc,
};

use anyhow::{Context, Result, anyhow, bail};
use axum::{
    Form, Json, Router,
    extract::{ConnectInfo, FromRequestParts, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header, request::Parts},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
};
use nix::unistd::Uid;
use serde::Deserialize;
use tokio::signal;
use vidgate::{
    auth::{self, AuthError},
    config::{RuntimeConfig, RuntimeOverrides, resolve_runtime_config},
    extract,
    pinger::LivenessPinger,
    relay::{self, Attempt, RelayError, RetryPolicy, RetryReason},
    session::{SESSION_COOKIE, SessionStore, cookie_value},
    store::{ApiKey, LogEntry, RelayStore},
};

/// How many audit rows the admin panel shows.
const ADMIN_LOG_ROWS: u32 = 50;

/// Attribution string returned with every successful relay response.
const DOWNLOAD_CREDITS: &str = "vidgate";

#[derive(Debug, Clone, Default)]
struct BackendArgs {
    db_path: Option<PathBuf>,
    host: Option<String>,
    port: Option<u16>,
    env_file: Option<PathBuf>,
}

impl BackendArgs {
    fn parse() -> Result<Self> {
        Self::from_iter(std::env::args().skip(1))
    }

    fn from_iter<I>(iter: I) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut parsed = Self::default();
        let mut args = iter.into_iter();
        while let Some(arg) = args.next() {
            if let Some(value) = arg.strip_prefix("--db-path=") {
                parsed.db_path = Some(PathBuf::from(value));
                continue;
            }
            if let Some(value) = arg.strip_prefix("--host=") {
                parsed.host = Some(value.to_string());
                continue;
            }
            if let Some(value) = arg.strip_prefix("--port=") {
                parsed.port = Some(parse_port_arg(value)?);
                continue;
            }
            if let Some(value) = arg.strip_prefix("--env-file=") {
                parsed.env_file = Some(PathBuf::from(value));
                continue;
            }

            match arg.as_str() {
                "--db-path" => parsed.db_path = Some(PathBuf::from(next_value(&mut args, &arg)?)),
                "--host" => parsed.host = Some(next_value(&mut args, &arg)?),
                "--port" => parsed.port = Some(parse_port_arg(&next_value(&mut args, &arg)?)?),
                "--env-file" => parsed.env_file = Some(PathBuf::from(next_value(&mut args, &arg)?)),
                _ => bail!("unknown argument: {arg}"),
            }
        }
        Ok(parsed)
    }

    fn into_overrides(self) -> RuntimeOverrides {
        RuntimeOverrides {
            db_path: self.db_path,
            host: self.host,
            port: self.port,
            env_path: self.env_file,
        }
    }
}

fn next_value(args: &mut impl Iterator<Item = String>, flag: &str) -> Result<String> {
    args.next().ok_or_else(|| anyhow!("{flag} requires a value"))
}

fn parse_port_arg(value: &str) -> Result<u16> {
    value
        .parse::<u16>()
        .context("expected a numeric port between 0 and 65535")
}

/// Shared state injected into every handler.
#[derive(Clone)]
struct AppState {
    store: Arc<RelayStore>,
    sessions: Arc<SessionStore>,
    agent: ureq::Agent,
    config: Arc<RuntimeConfig>,
}

/// Per-request admin state, resolved from the session cookie. Handlers only
/// ever see this value; there is no ambient admin flag anywhere.
#[derive(Debug, Clone)]
struct SessionContext {
    is_admin: bool,
    token: Option<String>,
}

impl FromRequestParts<AppState> for SessionContext {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::COOKIE)
            .and_then(|value| value.to_str().ok())
            .and_then(|raw| cookie_value(raw, SESSION_COOKIE))
            .map(str::to_owned);
        let is_admin = token
            .as_deref()
            .is_some_and(|token| state.sessions.is_admin(token));
        Ok(Self { is_admin, token })
    }
}

/// JSON error response mirroring the numeric status inside the body, which is
/// what relay clients key off.
#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn unauthorized(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "statusCode": self.status.as_u16(),
            "error": self.message,
        });
        (self.status, Json(body)).into_response()
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingKey => ApiError::bad_request("Missing key"),
            AuthError::InvalidKey => ApiError::unauthorized("Invalid key"),
            AuthError::NotAuthenticated => ApiError::unauthorized("Not authenticated"),
            AuthError::Backend(source) => {
                log::error!("key lookup failed: {source:#}");
                ApiError::internal("Internal server error")
            }
        }
    }
}

impl From<RelayError> for ApiError {
    fn from(err: RelayError) -> Self {
        match err {
            RelayError::MissingUrl => ApiError::bad_request("Missing url parameter"),
            RelayError::Service => ApiError::internal("Downloader service error"),
            RelayError::NoVideoFound => ApiError::not_found("No downloadable video found"),
            RelayError::Internal => ApiError::internal("Internal server error"),
        }
    }
}

fn storage_error(err: anyhow::Error) -> ApiError {
    log::error!("store operation failed: {err:#}");
    ApiError::internal("Internal server error")
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    refuse_root(Uid::current())?;

    let args = BackendArgs::parse()?;
    let config = resolve_runtime_config(args.into_overrides())?;
    let listen_host: IpAddr = config
        .host
        .parse()
        .with_context(|| format!("VIDGATE_HOST is not a valid address: {:?}", config.host))?;

    let store = RelayStore::open(&config.db_path, &config.seed_key)
        .await
        .context("initializing relay store")?;
    log::info!("relay store ready at {}", config.db_path.display());

    let pinger = config
        .public_url
        .as_deref()
        .map(|url| LivenessPinger::spawn(url, config.ping_interval));
    if pinger.is_some() {
        log::info!(
            "liveness pinger enabled every {}s",
            config.ping_interval.as_secs()
        );
    }

    let addr = SocketAddr::new(listen_host, config.port);
    let state = AppState {
        store: Arc::new(store),
        sessions: Arc::new(SessionStore::new()),
        agent: extract::http_agent(),
        config: Arc::new(config),
    };

    let app = Router::new()
        .route("/ping", get(ping))
        .route("/api/v1/relay", get(relay_download))
        .route("/admin", get(admin_panel))
        .route("/admin/login", get(admin_login_form).post(admin_login_submit))
        .route("/admin/create_key", post(admin_create_key))
        .route("/admin/delete_key", post(admin_delete_key))
        .route("/admin/logout", get(admin_logout))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;
    log::info!("relay listening on http://{addr}");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("running relay server")?;

    if let Some(pinger) = pinger {
        pinger.shutdown().await;
    }

    Ok(())
}

fn refuse_root(uid: Uid) -> Result<()> {
    if uid.is_root() {
        bail!("the relay backend must not run as root; use a dedicated service account");
    }
    Ok(())
}

async fn shutdown_signal() {
    // Losing the handler only costs graceful shutdown; the process still dies
    // when the signal fires.
    if let Err(err) = signal::ctrl_c().await {
        log::warn!("failed to install Ctrl+C handler: {err}");
    }
}

async fn ping() -> &'static str {
    "pong"
}

#[derive(Debug, Deserialize)]
struct RelayQuery {
    key: Option<String>,
    url: Option<String>,
}

async fn relay_download(
    State(state): State<AppState>,
    Query(query): Query<RelayQuery>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    let key = auth::authorize_key(&state.store, query.key.as_deref()).await?;
    let ip = client_ip(&headers, peer);

    let agent = state.agent.clone();
    let template = state.config.extractor_url.clone();
    let link = relay::resolve(
        &state.store,
        RetryPolicy::default(),
        &key,
        query.url.as_deref(),
        &ip,
        move |url, _number| {
            let agent = agent.clone();
            let endpoint = extract::render_endpoint(&template, &url);
            async move {
                let fetched = tokio::task::spawn_blocking(move || {
                    extract::fetch_media_list(&agent, &endpoint)
                })
                .await;
                match fetched {
                    Ok(outcome) => extract::evaluate(outcome),
                    Err(err) => {
                        log::warn!("extractor task did not complete: {err}");
                        Attempt::Retry(RetryReason::Transport)
                    }
                }
            }
        },
    )
    .await?;

    log::info!("relayed a download link for {ip}");
    Ok(Json(serde_json::json!({
        "statusCode": 200,
        "download_link": link,
        "credits": DOWNLOAD_CREDITS,
    })))
}

/// Deployments sit behind a hosting proxy, so the forwarded header wins over
/// the socket peer when present.
fn client_ip(headers: &HeaderMap, peer: SocketAddr) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|raw| raw.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(str::to_owned)
        .unwrap_or_else(|| peer.ip().to_string())
}

// ---- admin surface ----

#[derive(Debug, Deserialize)]
struct LoginForm {
    password: String,
}

#[derive(Debug, Deserialize)]
struct KeyForm {
    key: String,
}

async fn admin_login_form(session: SessionContext) -> Response {
    if session.is_admin {
        return Redirect::to("/admin").into_response();
    }
    Html(render_login_page(None)).into_response()
}

async fn admin_login_submit(
    State(state): State<AppState>,
    Form(form): Form<LoginForm>,
) -> Response {
    if form.password != state.config.admin_password {
        log::warn!("admin login rejected");
        return Html(render_login_page(Some("Invalid password"))).into_response();
    }

    let token = state.sessions.open_admin();
    let mut response = Redirect::to("/admin").into_response();
    response
        .headers_mut()
        .insert(header::SET_COOKIE, session_cookie(&token));
    response
}

async fn admin_panel(
    State(state): State<AppState>,
    session: SessionContext,
) -> Result<Response, ApiError> {
    if auth::authorize_admin(session.is_admin).is_err() {
        return Ok(Redirect::to("/admin/login").into_response());
    }

    let keys = state.store.list_keys().await.map_err(storage_error)?;
    let logs = state
        .store
        .list_recent_logs(ADMIN_LOG_ROWS)
        .await
        .map_err(storage_error)?;
    Ok(Html(render_admin_panel(state.store.seed_key(), &keys, &logs)).into_response())
}

async fn admin_create_key(
    State(state): State<AppState>,
    session: SessionContext,
    Form(form): Form<KeyForm>,
) -> Result<Response, ApiError> {
    if auth::authorize_admin(session.is_admin).is_err() {
        return Ok(Redirect::to("/admin/login").into_response());
    }

    let value = form.key.trim();
    if !value.is_empty() {
        state
            .store
            .create_key(value, "admin")
            .await
            .map_err(storage_error)?;
        log::info!("admin created an API key");
    }
    Ok(Redirect::to("/admin").into_response())
}

async fn admin_delete_key(
    State(state): State<AppState>,
    session: SessionContext,
    Form(form): Form<KeyForm>,
) -> Result<Response, ApiError> {
    if auth::authorize_admin(session.is_admin).is_err() {
        return Ok(Redirect::to("/admin/login").into_response());
    }

    let deleted = state
        .store
        .delete_key(form.key.trim())
        .await
        .map_err(storage_error)?;
    if deleted {
        log::info!("admin deleted an API key");
    }
    Ok(Redirect::to("/admin").into_response())
}

async fn admin_logout(State(state): State<AppState>, session: SessionContext) -> Response {
    if let Some(token) = &session.token {
        state.sessions.close(token);
    }
    let mut response = Redirect::to("/admin/login").into_response();
    response
        .headers_mut()
        .insert(header::SET_COOKIE, clear_session_cookie());
    response
}

fn session_cookie(token: &str) -> HeaderValue {
    // Tokens are URL-safe base64, always a valid header value.
    format!("{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax")
        .parse()
        .unwrap()
}

fn clear_session_cookie() -> HeaderValue {
    format!("{SESSION_COOKIE}=; Path=/; HttpOnly; Max-Age=0")
        .parse()
        .unwrap()
}

// ---- server-rendered admin HTML ----

fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

const PAGE_STYLE: &str = "body{font-family:sans-serif;margin:2rem auto;max-width:60rem}\
table{border-collapse:collapse;width:100%;margin-bottom:2rem}\
td,th{border:1px solid #ccc;padding:.4rem .6rem;text-align:left}\
.error{color:#b00}form.inline{display:inline}";

fn render_login_page(error: Option<&str>) -> String {
    let notice = error
        .map(|message| format!("<p class=\"error\">{}</p>", escape_html(message)))
        .unwrap_or_default();
    format!(
        r#"<!doctype html>
<html><head><title>vidgate admin</title><style>{PAGE_STYLE}</style></head>
<body>
<h1>Admin login</h1>
{notice}<form method="post" action="/admin/login">
<input type="password" name="password" autofocus>
<input type="submit" value="Log in">
</form>
</body></html>
"#
    )
}

fn render_admin_panel(seed_key: &str, keys: &[ApiKey], logs: &[LogEntry]) -> String {
    let mut key_rows = String::new();
    for key in keys {
        let actions = if key.value == seed_key {
            "(seed key)".to_string()
        } else {
            format!(
                r#"<form class="inline" method="post" action="/admin/delete_key"><input type="hidden" name="key" value="{value}"><input type="submit" value="Delete"></form>"#,
                value = escape_html(&key.value)
            )
        };
        key_rows.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>\n",
            escape_html(&key.value),
            key.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
            escape_html(&key.created_by),
            actions,
        ));
    }

    let mut log_rows = String::new();
    for entry in logs {
        log_rows.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>\n",
            entry.id,
            escape_html(&entry.key_used),
            escape_html(&entry.url),
            entry.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
            escape_html(&entry.ip),
        ));
    }

    format!(
        r#"<!doctype html>
<html><head><title>vidgate admin</title><style>{PAGE_STYLE}</style></head>
<body>
<p><a href="/admin/logout">Log out</a></p>
<h1>API keys</h1>
<table>
<tr><th>Key</th><th>Created</th><th>Created by</th><th></th></tr>
{key_rows}</table>
<form method="post" action="/admin/create_key">
<input type="text" name="key" placeholder="new key value">
<input type="submit" value="Create key">
</form>
<h1>Recent requests</h1>
<table>
<tr><th>#</th><th>Key</th><th>URL</th><th>Time</th><th>IP</th></tr>
{log_rows}</table>
</body></html>
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use chrono::{TimeZone, Utc};
    use std::time::Duration;
    use tempfile::tempdir;

    fn from_slice(values: &[&str]) -> Result<BackendArgs> {
        BackendArgs::from_iter(values.iter().map(|value| value.to_string()))
    }

    fn test_config() -> RuntimeConfig {
        RuntimeConfig {
            db_path: PathBuf::from("unused.db"),
            host: "127.0.0.1".to_string(),
            port: 0,
            admin_password: "hunter2".to_string(),
            seed_key: "seed".to_string(),
            extractor_url: "https://extract.example/?url={}".to_string(),
            public_url: None,
            ping_interval: Duration::from_secs(10),
        }
    }

    async fn test_state() -> (tempfile::TempDir, AppState) {
        let dir = tempdir().unwrap();
        let store = RelayStore::open(&dir.path().join("test.db"), "seed")
            .await
            .unwrap();
        let state = AppState {
            store: Arc::new(store),
            sessions: Arc::new(SessionStore::new()),
            agent: extract::http_agent(),
            config: Arc::new(test_config()),
        };
        (dir, state)
    }

    fn peer() -> ConnectInfo<SocketAddr> {
        ConnectInfo("192.0.2.10:4444".parse().unwrap())
    }

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn args_accept_both_flag_forms() {
        let args = from_slice(&["--db-path", "/tmp/a.db", "--port=9000", "--host", "0.0.0.0"])
            .unwrap();
        assert_eq!(args.db_path, Some(PathBuf::from("/tmp/a.db")));
        assert_eq!(args.port, Some(9000));
        assert_eq!(args.host.as_deref(), Some("0.0.0.0"));
        assert_eq!(args.env_file, None);
    }

    #[test]
    fn args_reject_unknown_flags_and_missing_values() {
        assert!(from_slice(&["--verbose"]).is_err());
        assert!(from_slice(&["--db-path"]).is_err());
        assert!(from_slice(&["--port", "not-a-port"]).is_err());
    }

    #[test]
    fn refuse_root_blocks_uid_zero() {
        assert!(refuse_root(Uid::from_raw(0)).is_err());
        assert!(refuse_root(Uid::from_raw(1000)).is_ok());
    }

    #[test]
    fn client_ip_prefers_forwarded_header() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            "203.0.113.7, 10.0.0.1".parse().unwrap(),
        );
        let peer: SocketAddr = "192.0.2.10:4444".parse().unwrap();
        assert_eq!(client_ip(&headers, peer), "203.0.113.7");
        assert_eq!(client_ip(&HeaderMap::new(), peer), "192.0.2.10");
    }

    #[test]
    fn api_error_bodies_mirror_the_status_code() {
        let missing: ApiError = AuthError::MissingKey.into();
        assert_eq!(missing.status, StatusCode::BAD_REQUEST);
        assert_eq!(missing.message, "Missing key");

        let invalid: ApiError = AuthError::InvalidKey.into();
        assert_eq!(invalid.status, StatusCode::UNAUTHORIZED);

        let no_video: ApiError = RelayError::NoVideoFound.into();
        assert_eq!(no_video.status, StatusCode::NOT_FOUND);
        assert_eq!(no_video.message, "No downloadable video found");

        let service: ApiError = RelayError::Service.into();
        assert_eq!(service.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(service.message, "Downloader service error");
    }

    #[tokio::test]
    async fn relay_rejects_missing_and_invalid_keys_before_logging() {
        let (_dir, state) = test_state().await;

        let missing = relay_download(
            State(state.clone()),
            Query(RelayQuery {
                key: None,
                url: Some("https://media.example/clip".into()),
            }),
            peer(),
            HeaderMap::new(),
        )
        .await
        .unwrap_err();
        assert_eq!(missing.status, StatusCode::BAD_REQUEST);

        let invalid = relay_download(
            State(state.clone()),
            Query(RelayQuery {
                key: Some("wrong".into()),
                url: Some("https://media.example/clip".into()),
            }),
            peer(),
            HeaderMap::new(),
        )
        .await
        .unwrap_err();
        assert_eq!(invalid.status, StatusCode::UNAUTHORIZED);

        assert!(state.store.list_recent_logs(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn relay_rejects_missing_url_after_auth_without_calling_out() {
        let (_dir, state) = test_state().await;

        let err = relay_download(
            State(state.clone()),
            Query(RelayQuery {
                key: Some("seed".into()),
                url: None,
            }),
            peer(),
            HeaderMap::new(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.message, "Missing url parameter");
        assert!(state.store.list_recent_logs(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn login_with_wrong_password_re_renders_the_form() {
        let (_dir, state) = test_state().await;
        let response = admin_login_submit(
            State(state),
            Form(LoginForm {
                password: "wrong".into(),
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(header::SET_COOKIE).is_none());
        let body = body_text(response).await;
        assert!(body.contains("Invalid password"));
    }

    #[tokio::test]
    async fn login_with_correct_password_opens_a_session() {
        let (_dir, state) = test_state().await;
        let response = admin_login_submit(
            State(state.clone()),
            Form(LoginForm {
                password: "hunter2".into(),
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            response.headers().get(header::LOCATION).unwrap(),
            "/admin"
        );

        let cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        let token = cookie_value(&cookie, SESSION_COOKIE).unwrap();
        assert!(state.sessions.is_admin(token));
    }

    #[tokio::test]
    async fn panel_redirects_anonymous_visitors_to_login() {
        let (_dir, state) = test_state().await;
        let response = admin_panel(
            State(state),
            SessionContext {
                is_admin: false,
                token: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            response.headers().get(header::LOCATION).unwrap(),
            "/admin/login"
        );
    }

    #[tokio::test]
    async fn panel_renders_keys_and_recent_logs() {
        let (_dir, state) = test_state().await;
        state.store.create_key("client-a", "admin").await.unwrap();
        state
            .store
            .record_request("client-a", "https://media.example/clip", "203.0.113.7")
            .await
            .unwrap();

        let response = admin_panel(
            State(state),
            SessionContext {
                is_admin: true,
                token: Some("t".into()),
            },
        )
        .await
        .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_text(response).await;
        assert!(body.contains("client-a"));
        assert!(body.contains("https://media.example/clip"));
        assert!(body.contains("203.0.113.7"));
        assert!(body.contains("(seed key)"));
    }

    #[tokio::test]
    async fn create_and_delete_key_round_trip_through_the_forms() {
        let (_dir, state) = test_state().await;
        let admin = SessionContext {
            is_admin: true,
            token: Some("t".into()),
        };

        let created = admin_create_key(
            State(state.clone()),
            admin.clone(),
            Form(KeyForm {
                key: " client-a ".into(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(created.status(), StatusCode::SEE_OTHER);
        assert!(state.store.key_exists("client-a").await.unwrap());

        let deleted = admin_delete_key(
            State(state.clone()),
            admin,
            Form(KeyForm {
                key: "client-a".into(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(deleted.status(), StatusCode::SEE_OTHER);
        assert!(!state.store.key_exists("client-a").await.unwrap());
    }

    #[tokio::test]
    async fn key_mutations_require_a_session() {
        let (_dir, state) = test_state().await;
        let anonymous = SessionContext {
            is_admin: false,
            token: None,
        };

        let response = admin_create_key(
            State(state.clone()),
            anonymous,
            Form(KeyForm {
                key: "client-a".into(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(
            response.headers().get(header::LOCATION).unwrap(),
            "/admin/login"
        );
        assert!(!state.store.key_exists("client-a").await.unwrap());
    }

    #[tokio::test]
    async fn logout_revokes_the_session_and_clears_the_cookie() {
        let (_dir, state) = test_state().await;
        let token = state.sessions.open_admin();

        let response = admin_logout(
            State(state.clone()),
            SessionContext {
                is_admin: true,
                token: Some(token.clone()),
            },
        )
        .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert!(!state.sessions.is_admin(&token));

        let cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap();
        assert!(cookie.contains("Max-Age=0"));
    }

    #[test]
    fn escape_html_neutralizes_markup() {
        assert_eq!(
            escape_html(r#"<script>alert("x&y')</script>"#),
            "&lt;script&gt;alert(&quot;x&amp;y&#39;)&lt;/script&gt;"
        );
    }

    #[test]
    fn login_page_only_shows_an_error_when_given_one() {
        assert!(!render_login_page(None).contains("class=\"error\""));
        let page = render_login_page(Some("Invalid <password>"));
        assert!(page.contains("class=\"error\""));
        assert!(page.contains("Invalid &lt;password&gt;"));
    }

    #[test]
    fn panel_markup_escapes_row_values_and_protects_the_seed() {
        let keys = vec![
            ApiKey {
                value: "seed".into(),
                created_at: Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap(),
                created_by: "bootstrap".into(),
            },
            ApiKey {
                value: "<evil>".into(),
                created_at: Utc.with_ymd_and_hms(2026, 1, 3, 3, 4, 5).unwrap(),
                created_by: "admin".into(),
            },
        ];
        let logs = vec![LogEntry {
            id: 1,
            key_used: "<evil>".into(),
            url: "https://media.example/?a=1&b=2".into(),
            timestamp: Utc.with_ymd_and_hms(2026, 1, 4, 3, 4, 5).unwrap(),
            ip: "203.0.113.7".into(),
        }];

        let page = render_admin_panel("seed", &keys, &logs);
        assert!(page.contains("&lt;evil&gt;"));
        assert!(!page.contains("<evil>"));
        assert!(page.contains("a=1&amp;b=2"));
        // The seed row carries no delete form; the other row does.
        assert!(page.contains("(seed key)"));
        assert_eq!(page.matches("action=\"/admin/delete_key\"").count(), 1);
    }
}
