use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::{
    auth::require_admin_token,
    dirs,
    handlers::{create_secret, get_secret, health, prune_secrets, root},
    store::{Limits, MemoryStore, RecordStore, RedbStore, Vault},
    AppState,
};

/// Origin the bundled frontend is served from during development.
const DEV_FRONTEND_ORIGIN: &str = "http://localhost:3000";

pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: Option<PathBuf>,
    /// Keep records in process memory instead of a redb file.
    pub in_memory: bool,
    pub sweep_interval: Duration,
    /// Public URL of the frontend; always allowed by CORS.
    pub public_url: String,
    /// Extra comma-separated CORS origins, or `*`.
    pub cors_origins: Option<String>,
    pub limits: Limits,
    /// Enables `POST /api/prune` when set.
    pub admin_token: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let limits = Limits::default();
        Self {
            host: std::env::var("VANISH_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env_parse("VANISH_PORT").unwrap_or(8000),
            data_dir: std::env::var("VANISH_DATA_DIR").ok().map(PathBuf::from),
            in_memory: false,
            sweep_interval: Duration::from_secs(
                env_parse("VANISH_SWEEP_INTERVAL_SECS").unwrap_or(60),
            ),
            public_url: std::env::var("VANISH_PUBLIC_URL")
                .unwrap_or_else(|_| DEV_FRONTEND_ORIGIN.into()),
            cors_origins: std::env::var("VANISH_CORS_ORIGINS").ok(),
            limits: Limits {
                default_ttl_secs: env_parse("VANISH_DEFAULT_TTL_SECS")
                    .unwrap_or(limits.default_ttl_secs),
                max_ttl_secs: env_parse("VANISH_MAX_TTL_SECS").unwrap_or(limits.max_ttl_secs),
                max_payload_bytes: env_parse("VANISH_MAX_PAYLOAD_BYTES")
                    .unwrap_or(limits.max_payload_bytes),
            },
            admin_token: None,
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

/// Resolve the admin token from `VANISH_ADMIN_TOKEN_FILE` or
/// `VANISH_ADMIN_TOKEN`. `None` disables the admin routes.
pub fn resolve_admin_token() -> Result<Option<String>> {
    let file = std::env::var_os("VANISH_ADMIN_TOKEN_FILE").map(PathBuf::from);
    let inline = std::env::var("VANISH_ADMIN_TOKEN").ok();
    admin_token_from(file.as_deref(), inline.as_deref())
}

/// A token file wins over an inline token. A file that is unreadable or
/// blank is an error; a blank inline token counts as unset.
fn admin_token_from(file: Option<&Path>, inline: Option<&str>) -> Result<Option<String>> {
    let inline = inline.map(str::trim).filter(|t| !t.is_empty());
    let Some(path) = file else {
        return Ok(inline.map(str::to_owned));
    };
    if inline.is_some() {
        warn!(path = %path.display(), "admin token set both inline and by file; using file");
    }
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("read admin token file {}", path.display()))?;
    let token = contents.trim();
    anyhow::ensure!(!token.is_empty(), "admin token file {} is blank", path.display());
    Ok(Some(token.to_owned()))
}

/// Open the record store selected by `cfg`.
pub fn open_store(cfg: &ServerConfig) -> Result<Arc<dyn RecordStore>> {
    if cfg.in_memory {
        warn!("using in-memory store; secrets will not survive a restart");
        return Ok(Arc::new(MemoryStore::new()));
    }
    let data_dir = dirs::resolve_data_dir(cfg.data_dir.as_deref())?;
    let db_path = dirs::database_path(&data_dir);
    info!(path = %db_path.display(), "opening secret store");
    let store = RedbStore::open(&db_path).context("open store")?;
    Ok(Arc::new(store))
}

/// Build the full router. The admin prune route is only mounted when the
/// state carries an admin token.
pub fn app(state: AppState, cors: CorsLayer) -> Router {
    let body_limit = request_body_limit(state.vault.limits().max_payload_bytes);

    let mut api = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/api/secrets", post(create_secret))
        .route("/api/secrets/{id}", get(get_secret));

    if state.admin_token.is_some() {
        let admin = Router::new()
            .route("/api/prune", post(prune_secrets))
            .layer(middleware::from_fn_with_state(
                state.clone(),
                require_admin_token,
            ));
        api = api.merge(admin);
    }

    api.with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Largest accepted request body for a given ciphertext limit: base64 grows
/// the payload by 4/3, plus headroom for the JSON envelope.
fn request_body_limit(max_payload_bytes: usize) -> usize {
    max_payload_bytes
        .div_ceil(3)
        .saturating_mul(4)
        .saturating_add(64 * 1024)
}

pub async fn run(cfg: ServerConfig) -> Result<()> {
    let records = open_store(&cfg)?;
    let vault = Vault::new(records).with_limits(cfg.limits);

    // tokio intervals panic on a zero period.
    vault
        .clone()
        .spawn_sweep(cfg.sweep_interval.max(Duration::from_secs(1)));

    let state = AppState {
        vault,
        admin_token: cfg.admin_token.clone(),
    };
    if state.admin_token.is_none() {
        info!("no admin token configured; /api/prune is disabled");
    }

    let cors = build_cors(&cfg.public_url, cfg.cors_origins.as_deref());
    let app = app(state, cors);

    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port)
        .parse()
        .context("invalid host/port")?;

    info!(%addr, "vanish server listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("bind listener")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("received shutdown signal, draining connections");
}

/// CORS for the frontend: `public_url`, the local dev origin, and any extras.
/// A `*` anywhere in `extra` allows every origin.
pub fn build_cors(public_url: &str, extra: Option<&str>) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([http::Method::GET, http::Method::POST, http::Method::OPTIONS])
        .allow_headers(Any);

    let extra: Vec<&str> = extra
        .map(|o| o.split(',').map(str::trim).filter(|s| !s.is_empty()).collect())
        .unwrap_or_default();
    if extra.contains(&"*") {
        return cors.allow_origin(Any);
    }

    let origins: Vec<http::HeaderValue> =
        [public_url.trim_end_matches('/'), DEV_FRONTEND_ORIGIN]
            .into_iter()
            .chain(extra)
            .filter_map(|s| s.parse().ok())
            .collect();
    cors.allow_origin(AllowOrigin::list(origins))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn body_limit_covers_base64_and_saturates() {
        assert_eq!(request_body_limit(3), 4 + 64 * 1024);
        assert_eq!(request_body_limit(4), 8 + 64 * 1024);
        assert_eq!(request_body_limit(usize::MAX), usize::MAX);
    }

    #[test]
    fn admin_token_prefers_the_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("admin.token");
        std::fs::write(&path, "  from-file\n").unwrap();

        let token = admin_token_from(Some(&path), Some("inline")).unwrap();
        assert_eq!(token.as_deref(), Some("from-file"));
    }

    #[test]
    fn blank_or_missing_token_file_is_an_error() {
        let dir = tempdir().unwrap();
        let blank = dir.path().join("blank.token");
        std::fs::write(&blank, " \n").unwrap();

        assert!(admin_token_from(Some(&blank), None).is_err());
        assert!(admin_token_from(Some(&dir.path().join("absent")), None).is_err());
    }

    #[test]
    fn inline_token_is_trimmed_and_blank_means_unset() {
        assert_eq!(admin_token_from(None, Some(" t0k ")).unwrap().as_deref(), Some("t0k"));
        assert_eq!(admin_token_from(None, Some("   ")).unwrap(), None);
        assert_eq!(admin_token_from(None, None).unwrap(), None);
    }
}
