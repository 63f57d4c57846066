//! API router and route handlers.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{Method, Uri};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Json;
use banbridge_config::AppConfig;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tracing::{debug, info};

use super::static_files;
use super::types::*;
use super::ApiError;
use crate::bridge::{BridgeClient, Command};
use crate::reply::RawReply;
use crate::response::{collect_addresses, flatten, is_valid_ipv4};
use crate::status::{GlobalStatus, StatusParser, UnitStatus};

/// Shared state accessible to all route handlers.
#[derive(Debug, Clone)]
pub struct ApiState {
    pub bridge: BridgeClient,
    pub parser: StatusParser,
    pub static_root: PathBuf,
}

impl ApiState {
    pub fn new(bridge: BridgeClient, parser: StatusParser, static_root: impl Into<PathBuf>) -> Self {
        Self {
            bridge,
            parser,
            static_root: static_root.into(),
        }
    }

    /// Assemble the state from a loaded configuration.
    pub fn from_config(config: &AppConfig) -> Result<Self, regex::Error> {
        Ok(Self::new(
            BridgeClient::from_config(&config.bridge),
            StatusParser::new(&config.aliases)?,
            &config.server.static_root,
        ))
    }

    /// Send one command and return the reply.
    async fn run(&self, command: &Command) -> Result<RawReply, ApiError> {
        debug!(command = %command, "forwarding to fail2ban");
        Ok(self.bridge.execute(command).await?)
    }

    /// Send a command and return its flattened reply.
    async fn run_text(&self, command: &Command) -> Result<String, ApiError> {
        let reply = self.run(command).await?;
        Ok(flatten(&reply).trim().to_string())
    }
}

/// Build the axum router with all API routes and the static file fallback.
pub fn router(state: Arc<ApiState>) -> axum::Router {
    axum::Router::new()
        .route("/api/health", get(handle_health))
        .route("/api/status", get(handle_status))
        .route("/api/jails", get(handle_jails))
        .route("/api/banned", get(handle_banned))
        .route("/api/file", get(handle_file))
        .route("/api/version", get(handle_version).post(handle_version))
        .route("/api/loglevel", get(handle_get_loglevel).post(handle_set_loglevel))
        .route("/api/db/file", get(handle_get_dbfile))
        .route(
            "/api/db/maxmatches",
            get(handle_get_maxmatches).post(handle_set_maxmatches),
        )
        .route(
            "/api/db/purgeage",
            get(handle_get_purgeage).post(handle_set_purgeage),
        )
        .route("/api/jail/{jail}/status", get(handle_jail_status))
        .route("/api/jail/{jail}/ban", post(handle_jail_ban))
        .route("/api/jail/{jail}/unban", post(handle_jail_unban))
        .route("/api/jail/{jail}/restart", post(handle_jail_restart))
        .route("/api/jail/{jail}/reload", post(handle_jail_reload))
        .route("/api/server/start", post(handle_server_start))
        .route("/api/server/restart", post(handle_server_restart))
        .route("/api/server/reload", post(handle_server_reload))
        .route("/api/server/stop", post(handle_server_stop))
        .route("/api/unban", post(handle_unban_body))
        .route("/api/unban/all", post(handle_unban_all))
        .route("/api/unban/{ip}", post(handle_unban_path))
        .fallback(handle_fallback)
        .with_state(state)
}

/// Serve the API on `listener` until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    state: Arc<ApiState>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), std::io::Error> {
    let addr = listener.local_addr()?;
    info!(%addr, socket = %state.bridge.socket_path().display(), "HTTP API listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("HTTP API stopped");
    Ok(())
}

fn command<I, S>(tokens: I) -> Result<Command, ApiError>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    Ok(Command::new(tokens)?)
}

/// `{"<name>": "<flattened reply>"}` for the single-value getters.
fn setting(name: &str, value: String) -> Json<Value> {
    Json(json!({ name: value }))
}

// ── Status & queries ───────────────────────────────────────────────────

async fn handle_health(State(state): State<Arc<ApiState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: crate::build_info::VERSION.to_string(),
        git_hash: crate::build_info::GIT_HASH.to_string(),
        build_profile: crate::build_info::BUILD_PROFILE.to_string(),
        socket_path: state.bridge.socket_path().display().to_string(),
    })
}

async fn handle_status(State(state): State<Arc<ApiState>>) -> Result<Json<GlobalStatus>, ApiError> {
    let reply = state.run(&command(["status"])?).await?;
    Ok(Json(state.parser.parse_global_status(&reply)))
}

async fn handle_jails(State(state): State<Arc<ApiState>>) -> Result<Json<Vec<String>>, ApiError> {
    let reply = state.run(&command(["status"])?).await?;
    Ok(Json(state.parser.parse_global_status(&reply).jail_names))
}

async fn handle_banned(State(state): State<Arc<ApiState>>) -> Result<Json<BannedResponse>, ApiError> {
    let reply = state.run(&command(["banned"])?).await?;
    let ips = collect_addresses(&reply);
    Ok(Json(BannedResponse {
        count: ips.len(),
        ips,
    }))
}

async fn handle_jail_status(
    State(state): State<Arc<ApiState>>,
    Path(jail): Path<String>,
) -> Result<Json<UnitStatus>, ApiError> {
    let reply = state.run(&command(["status", jail.as_str()])?).await?;
    Ok(Json(state.parser.parse_unit_status(&reply)))
}

async fn handle_file(Query(query): Query<FileQuery>) -> Result<Json<FileResponse>, ApiError> {
    let not_found = || ApiError::FileNotFound {
        path: query.path.clone(),
    };
    if query.path.is_empty() {
        return Err(not_found());
    }
    let abs = std::path::absolute(&query.path).map_err(|_| not_found())?;
    match tokio::fs::metadata(&abs).await {
        Ok(meta) if meta.is_file() => {}
        _ => return Err(not_found()),
    }

    let bytes = tokio::fs::read(&abs).await?;
    let content = String::from_utf8_lossy(&bytes);
    let all: Vec<String> = content
        .split_inclusive('\n')
        .map(|line| line.strip_suffix('\n').unwrap_or(line).to_string())
        .collect();

    let limit = query.line_limit();
    let count = usize::try_from(limit.unsigned_abs()).unwrap_or(usize::MAX);
    let lines = match limit {
        0 => all,
        n if n > 0 => all.into_iter().take(count).collect(),
        _ => {
            let skip = all.len().saturating_sub(count);
            all.into_iter().skip(skip).collect()
        }
    };

    Ok(Json(FileResponse {
        path: query.path.clone(),
        exists: true,
        lines,
    }))
}

async fn handle_version(State(state): State<Arc<ApiState>>) -> Result<Json<Value>, ApiError> {
    let text = state.run_text(&command(["version"])?).await?;
    Ok(setting("version", text))
}

async fn handle_get_loglevel(State(state): State<Arc<ApiState>>) -> Result<Json<Value>, ApiError> {
    let text = state.run_text(&command(["get", "loglevel"])?).await?;
    Ok(setting("loglevel", text))
}

async fn handle_get_dbfile(State(state): State<Arc<ApiState>>) -> Result<Json<Value>, ApiError> {
    let text = state.run_text(&command(["get", "dbfile"])?).await?;
    Ok(setting("dbfile", text))
}

async fn handle_get_maxmatches(State(state): State<Arc<ApiState>>) -> Result<Json<Value>, ApiError> {
    let text = state.run_text(&command(["get", "dbmaxmatches"])?).await?;
    Ok(setting("dbmaxmatches", text))
}

async fn handle_get_purgeage(State(state): State<Arc<ApiState>>) -> Result<Json<Value>, ApiError> {
    let text = state.run_text(&command(["get", "dbpurgeage"])?).await?;
    Ok(setting("dbpurgeage", text))
}

// ── Jail control ───────────────────────────────────────────────────────

fn body_ip(body: &JsonBody) -> Result<String, ApiError> {
    match body.str("ip") {
        Some(ip) if is_valid_ipv4(ip) => Ok(ip.to_string()),
        _ => Err(ApiError::BadRequest(
            "A valid IPv4 address must be provided in the body as \"ip\"".to_string(),
        )),
    }
}

async fn handle_jail_ban(
    State(state): State<Arc<ApiState>>,
    Path(jail): Path<String>,
    body: JsonBody,
) -> Result<Json<CommandResponse>, ApiError> {
    let ip = body_ip(&body)?;
    let cmd = command(["set".to_string(), jail, "banip".to_string(), ip])?;
    Ok(Json(CommandResponse::new(state.run_text(&cmd).await?)))
}

async fn handle_jail_unban(
    State(state): State<Arc<ApiState>>,
    Path(jail): Path<String>,
    body: JsonBody,
) -> Result<Json<CommandResponse>, ApiError> {
    let ip = body_ip(&body)?;
    let cmd = command(["set".to_string(), jail, "unbanip".to_string(), ip])?;
    Ok(Json(CommandResponse::new(state.run_text(&cmd).await?)))
}

/// `verb [flags...] [target]`, with each flag included when set in `body`.
fn flagged(verb: &str, body: &JsonBody, flags: &[(&str, &str)], target: Option<String>) -> Vec<String> {
    let mut tokens = vec![verb.to_string()];
    tokens.extend(
        flags
            .iter()
            .filter(|(key, _)| body.flag(key))
            .map(|(_, flag)| flag.to_string()),
    );
    tokens.extend(target);
    tokens
}

async fn echoed(state: &ApiState, tokens: Vec<String>) -> Result<Json<CommandResponse>, ApiError> {
    let cmd = command(tokens)?;
    let result = state.run_text(&cmd).await?;
    Ok(Json(CommandResponse::echo(result, &cmd)))
}

async fn handle_jail_restart(
    State(state): State<Arc<ApiState>>,
    Path(jail): Path<String>,
    body: JsonBody,
) -> Result<Json<CommandResponse>, ApiError> {
    let tokens = flagged(
        "restart",
        &body,
        &[("unban", "--unban"), ("ifExists", "--if-exists")],
        Some(jail),
    );
    echoed(&state, tokens).await
}

async fn handle_jail_reload(
    State(state): State<Arc<ApiState>>,
    Path(jail): Path<String>,
    body: JsonBody,
) -> Result<Json<CommandResponse>, ApiError> {
    let tokens = flagged(
        "reload",
        &body,
        &[
            ("restart", "--restart"),
            ("unban", "--unban"),
            ("ifExists", "--if-exists"),
        ],
        Some(jail),
    );
    echoed(&state, tokens).await
}

// ── Server control ─────────────────────────────────────────────────────

async fn handle_server_start(State(state): State<Arc<ApiState>>) -> Result<Json<CommandResponse>, ApiError> {
    Ok(Json(CommandResponse::new(state.run_text(&command(["start"])?).await?)))
}

async fn handle_server_restart(State(state): State<Arc<ApiState>>) -> Result<Json<CommandResponse>, ApiError> {
    Ok(Json(CommandResponse::new(state.run_text(&command(["restart"])?).await?)))
}

async fn handle_server_stop(State(state): State<Arc<ApiState>>) -> Result<Json<CommandResponse>, ApiError> {
    info!("fail2ban stop requested via API");
    Ok(Json(CommandResponse::new(state.run_text(&command(["stop"])?).await?)))
}

async fn handle_server_reload(
    State(state): State<Arc<ApiState>>,
    body: JsonBody,
) -> Result<Json<CommandResponse>, ApiError> {
    let tokens = flagged(
        "reload",
        &body,
        &[("restart", "--restart"), ("unban", "--unban"), ("all", "--all")],
        None,
    );
    echoed(&state, tokens).await
}

// ── Unban ──────────────────────────────────────────────────────────────

async fn handle_unban_all(State(state): State<Arc<ApiState>>) -> Result<Json<CommandResponse>, ApiError> {
    echoed(&state, vec!["unban".to_string(), "--all".to_string()]).await
}

async fn handle_unban_path(
    State(state): State<Arc<ApiState>>,
    Path(ip): Path<String>,
) -> Result<Json<CommandResponse>, ApiError> {
    if !is_valid_ipv4(&ip) {
        return Err(ApiError::NotFound);
    }
    echoed(&state, vec!["unban".to_string(), ip]).await
}

async fn handle_unban_body(
    State(state): State<Arc<ApiState>>,
    body: JsonBody,
) -> Result<Json<CommandResponse>, ApiError> {
    let ip = match body.str("ip") {
        Some(ip) if is_valid_ipv4(ip) => ip.to_string(),
        _ => {
            return Err(ApiError::BadRequest(
                "Body must contain a single valid IPv4 as \"ip\"".to_string(),
            ));
        }
    };
    echoed(&state, vec!["unban".to_string(), ip]).await
}

// ── Settings ───────────────────────────────────────────────────────────

/// fail2ban accepts level names (`INFO`, `DEBUG`, ...) or numbers.
fn level_token(level: &Value) -> String {
    match level {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_uppercase(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        other => other.to_string().to_uppercase(),
    }
}

async fn handle_set_loglevel(
    State(state): State<Arc<ApiState>>,
    body: JsonBody,
) -> Result<Json<CommandResponse>, ApiError> {
    let level = body
        .get("level")
        .ok_or_else(|| ApiError::BadRequest("Body must contain \"level\"".to_string()))?;
    let tokens = vec!["set".to_string(), "loglevel".to_string(), level_token(level)];
    echoed(&state, tokens).await
}

fn int_field(body: &JsonBody, key: &str) -> Result<i64, ApiError> {
    match body.int(key) {
        IntField::Value(v) => Ok(v),
        IntField::Missing => Err(ApiError::BadRequest(format!(
            "Body must contain \"{key}\" (int)"
        ))),
        IntField::Invalid => Err(ApiError::BadRequest(format!("\"{key}\" must be an integer"))),
    }
}

async fn handle_set_maxmatches(
    State(state): State<Arc<ApiState>>,
    body: JsonBody,
) -> Result<Json<CommandResponse>, ApiError> {
    let value = int_field(&body, "value")?;
    let cmd = command(["set".to_string(), "dbmaxmatches".to_string(), value.to_string()])?;
    Ok(Json(CommandResponse::new(state.run_text(&cmd).await?)))
}

async fn handle_set_purgeage(
    State(state): State<Arc<ApiState>>,
    body: JsonBody,
) -> Result<Json<CommandResponse>, ApiError> {
    let seconds = int_field(&body, "seconds")?;
    let cmd = command(["set".to_string(), "dbpurgeage".to_string(), seconds.to_string()])?;
    Ok(Json(CommandResponse::new(state.run_text(&cmd).await?)))
}

// ── Static files ───────────────────────────────────────────────────────

async fn handle_fallback(
    State(state): State<Arc<ApiState>>,
    method: Method,
    uri: Uri,
) -> Result<Response, ApiError> {
    if method != Method::GET && method != Method::HEAD {
        return Err(ApiError::NotFound);
    }
    static_files::serve_file(&state.static_root, uri.path()).await
}
