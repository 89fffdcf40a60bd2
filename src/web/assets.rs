//! Frontend asset resolution and the single-page-app fallback
//!
//! Request paths are resolved with an explicit priority order rather than
//! relying on route-registration order:
//!
//! 1. API prefix — dispatched to the API subsystem; unmatched API paths get
//!    a structured not-found payload and never fall through to the frontend.
//! 2. Static asset — a file that exists under the resolved asset root.
//! 3. SPA fallback — the entry document, so the client-side router can
//!    handle deep links.
//! 4. Not found — only when no frontend bundle could be located; the
//!    response names the expected location instead of a bare 404.
//!
//! The asset root is resolved once at startup: an explicit override first,
//! then the packaged `static/` directory, then the development build at
//! `frontend/dist`. Resolution failure is non-fatal; the API keeps serving.

use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode, Uri};
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use std::path::{Component, Path, PathBuf};
use tower::ServiceExt;
use tower_http::services::ServeFile;

use super::api::ErrorResponse;
use super::server::AppState;

/// Path prefix for static asset requests
pub const ASSET_PREFIX: &str = "/assets";

/// Entry document served for SPA routes
pub const INDEX_FILE: &str = "index.html";

/// Decision for a single request path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    /// Belongs to the API namespace
    Api,

    /// An existing file under the asset root
    StaticAsset(PathBuf),

    /// Serve the entry document and let the client-side router take over
    SpaFallback(PathBuf),

    /// No frontend bundle available; the diagnostic names the expected root
    NotFound { expected_root: PathBuf },
}

/// Resolves request paths against the frontend bundle on disk
#[derive(Debug, Clone)]
pub struct AssetResolver {
    /// Located bundle root, if any
    asset_root: Option<PathBuf>,

    /// Where the bundle was expected, for diagnostics when absent
    expected_root: PathBuf,
}

impl AssetResolver {
    /// Locate the frontend bundle using the documented search order
    pub fn locate(override_dir: Option<&Path>) -> Self {
        let mut candidates: Vec<PathBuf> = Vec::new();
        if let Some(dir) = override_dir {
            candidates.push(dir.to_path_buf());
        }
        candidates.push(PathBuf::from("static"));
        candidates.push(PathBuf::from("frontend/dist"));

        let expected_root = candidates[0].clone();
        let asset_root = candidates
            .iter()
            .find(|dir| dir.join(INDEX_FILE).is_file())
            .cloned();

        match &asset_root {
            Some(root) => {
                tracing::info!(root = %root.display(), "Frontend bundle located");
            }
            None => {
                tracing::warn!(
                    expected = %expected_root.display(),
                    "No frontend bundle found; static and SPA routes will report not found"
                );
            }
        }

        Self {
            asset_root,
            expected_root,
        }
    }

    /// Build a resolver with a known root (for tests)
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            expected_root: root.clone(),
            asset_root: Some(root),
        }
    }

    /// Build a resolver that found no bundle
    pub fn missing(expected_root: impl Into<PathBuf>) -> Self {
        Self {
            asset_root: None,
            expected_root: expected_root.into(),
        }
    }

    /// The located bundle root, if any
    pub fn asset_root(&self) -> Option<&Path> {
        self.asset_root.as_deref()
    }

    /// Resolve a request path to a routing decision
    pub fn resolve(&self, path: &str) -> RouteDecision {
        if is_api_path(path) {
            return RouteDecision::Api;
        }

        if let Some(root) = &self.asset_root {
            if let Some(relative) = asset_relative_path(path) {
                let file = root.join(relative);
                if file.is_file() {
                    return RouteDecision::StaticAsset(file);
                }
            }

            let index = root.join(INDEX_FILE);
            if index.is_file() {
                return RouteDecision::SpaFallback(index);
            }
        }

        RouteDecision::NotFound {
            expected_root: self.expected_root.clone(),
        }
    }
}

/// True for paths in the API namespace
fn is_api_path(path: &str) -> bool {
    let trimmed = path.trim_start_matches('/');
    trimmed == "api" || trimmed.starts_with("api/")
}

/// Extract the bundle-relative path of an asset request.
///
/// Returns `None` for paths outside the asset prefix or containing parent
/// components; those fall through to the SPA fallback.
fn asset_relative_path(path: &str) -> Option<PathBuf> {
    let trimmed = path.trim_start_matches('/');
    let rest = trimmed.strip_prefix("assets/")?;
    if rest.is_empty() {
        return None;
    }

    let relative = Path::new(rest);
    if relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_)))
    {
        return None;
    }

    Some(Path::new("assets").join(relative))
}

// ============================================================================
// Fallback Handler
// ============================================================================

/// Catch-all handler implementing the resolution order above.
///
/// Mounted as the router fallback, after the API namespace and the static
/// asset service.
pub async fn serve_frontend(State(state): State<AppState>, uri: Uri) -> Response {
    match state.assets.resolve(uri.path()) {
        RouteDecision::Api => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new("API route not found")),
        )
            .into_response(),

        RouteDecision::StaticAsset(file) => serve_asset_file(&file, &uri).await,

        RouteDecision::SpaFallback(index) => match tokio::fs::read_to_string(&index).await {
            Ok(body) => Html(body).into_response(),
            Err(e) => {
                tracing::error!(path = %index.display(), error = %e, "Failed to read entry document");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse::new("Failed to read frontend entry document")),
                )
                    .into_response()
            }
        },

        RouteDecision::NotFound { expected_root } => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new(format!(
                "Frontend not built or found at {}",
                expected_root.display()
            ))),
        )
            .into_response(),
    }
}

/// Serve a single asset file with its content type
async fn serve_asset_file(file: &Path, uri: &Uri) -> Response {
    let request = match Request::builder().uri(uri.clone()).body(Body::empty()) {
        Ok(request) => request,
        Err(e) => {
            tracing::error!(error = %e, "Failed to build asset request");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    match ServeFile::new(file).oneshot(request).await {
        Ok(response) => response.into_response(),
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}
