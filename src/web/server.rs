//! HTTP server for the search UI.
//!
//! `GET /` renders the search page for the submitted sidebar settings and
//! query; `GET /images/:image_id` serves extracted PM-JAY images. A request
//! with the rebuild box ticked rebuilds the selected store, then redirects to
//! the same page without the flag so reloading it does not rebuild again.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    Router,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
};
use tokio::net::TcpListener;
use tracing::{error, info};

use super::query::{SearchParams, handle_query};
use super::render::{MSG_IMAGE_MISSING, render_page};
use super::state::AppState;
use crate::indexer::images::is_safe_image_id;

/// Handler error: logged, then reported as a 500 with its message.
pub struct AppError(anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        error!("Request failed: {:#}", self.0);
        (StatusCode::INTERNAL_SERVER_ERROR, format!("Error: {:#}", self.0)).into_response()
    }
}

impl<E: Into<anyhow::Error>> From<E> for AppError {
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(search_page))
        .route("/images/:image_id", get(serve_image))
        .with_state(state)
}

async fn search_page(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> Result<Response, AppError> {
    if params.rebuild_requested() {
        state.rebuild(params.mode).await?;
        return Ok(Redirect::to(&params.results_url()).into_response());
    }

    let outcome = handle_query(&state, &params).await?;
    let config = &state.config;
    let k = params.top_k(config);
    Ok(Html(render_page(&params, k, config.max_top_k, &outcome)).into_response())
}

fn image_content_type(image_id: &str) -> &'static str {
    let ext = std::path::Path::new(image_id)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        _ => "application/octet-stream",
    }
}

async fn serve_image(
    State(state): State<Arc<AppState>>,
    Path(image_id): Path<String>,
) -> Result<Response, AppError> {
    if !is_safe_image_id(&image_id) {
        return Ok((StatusCode::BAD_REQUEST, "Invalid image id").into_response());
    }

    let path = state.config.image_store_dir().join(&image_id);
    match tokio::fs::read(&path).await {
        Ok(bytes) => Ok((
            [(header::CONTENT_TYPE, image_content_type(&image_id))],
            bytes,
        )
            .into_response()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Ok((StatusCode::NOT_FOUND, MSG_IMAGE_MISSING).into_response())
        }
        Err(e) => Err(anyhow::Error::new(e)
            .context(format!("failed to read image {}", path.display()))
            .into()),
    }
}

/// Serves the UI until Ctrl-C.
pub struct WebServer {
    state: Arc<AppState>,
}

impl WebServer {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    pub async fn start(self, bind: &str) -> Result<()> {
        let listener = TcpListener::bind(bind)
            .await
            .with_context(|| format!("failed to bind {bind}"))?;
        info!("Search UI listening on http://{}", listener.local_addr()?);

        axum::serve(listener, router(self.state))
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("web server error")?;

        info!("Search UI stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::store::{Collection, Document};
    use crate::web::state::testing::{RecordingLoader, loaded_state};
    use axum::body::{Body, to_bytes};
    use axum::http::{HeaderMap, Request};
    use serde_json::{Map, json};
    use tempfile::tempdir;
    use tower::ServiceExt;

    async fn get(app: Router, uri: &str) -> (StatusCode, String, HeaderMap) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8_lossy(&body).to_string(), headers)
    }

    fn location(headers: &HeaderMap) -> String {
        headers[header::LOCATION].to_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_index_prompts_without_query() {
        let (state, _) = loaded_state(Config::default()).await;
        let (status, body, _) = get(router(state), "/").await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("Enter your question above to start searching."));
        assert!(body.contains("Your question:"));
    }

    #[tokio::test]
    async fn test_search_renders_results() {
        let (state, _) = loaded_state(Config::default()).await;
        let mut meta = Map::new();
        meta.insert("page".into(), json!(7));
        state
            .store(Collection::Text)
            .await
            .unwrap()
            .add_documents(
                "html.pdf",
                &[
                    Document::new("Semantic HTML elements describe content", meta.clone()),
                    Document::new("CSS grid lays out pages", meta),
                ],
            )
            .await
            .unwrap();

        let (status, body, _) = get(router(state), "/?mode=text&k=1&q=semantic+html").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("Results from: HTML &amp; CSS documents"));
        assert!(body.contains("Result 1 &#8211; Page 7"));
        assert!(!body.contains("Result 2"));
        assert!(body.contains("Semantic HTML elements describe content"));
    }

    #[tokio::test]
    async fn test_pmjay_mode_before_load() {
        let loader = Arc::new(RecordingLoader::new());
        let (state, _) = AppState::startup(Arc::new(Config::default()), loader.clone(), false, false)
            .await
            .unwrap();

        let app = router(state);

        let (status, _, headers) = get(app.clone(), "/?mode=pmjay&q=card&rebuild=on").await;
        assert_eq!(status, StatusCode::SEE_OTHER);
        let target = location(&headers);
        assert_eq!(target, "/?mode=pmjay&q=card");

        let (status, body, _) = get(app, &target).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("PM-JAY vector store not loaded yet."));
        assert_eq!(loader.rebuild_count(Collection::Pmjay), 0);
    }

    #[tokio::test]
    async fn test_rebuild_redirects_and_reload_does_not_rebuild() {
        let (state, loader) = loaded_state(Config::default()).await;
        let app = router(state.clone());

        let (status, body, headers) = get(app.clone(), "/?mode=text&rebuild=on&k=3&q=grid").await;
        assert_eq!(status, StatusCode::SEE_OTHER);
        assert!(body.is_empty());
        let target = location(&headers);
        assert_eq!(target, "/?mode=text&k=3&q=grid");
        assert_eq!(loader.rebuild_count(Collection::Text), 1);

        state
            .store(Collection::Text)
            .await
            .unwrap()
            .add_documents("css.pdf", &[Document::new("CSS grid lays out pages", Map::new())])
            .await
            .unwrap();

        for _ in 0..3 {
            let (status, body, _) = get(app.clone(), &target).await;
            assert_eq!(status, StatusCode::OK);
            assert!(body.contains("CSS grid lays out pages"));
        }
        assert_eq!(loader.rebuild_count(Collection::Text), 1);
    }

    #[tokio::test]
    async fn test_serve_image() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("scheme_p1_0.jpg"), [0xFF, 0xD8, 0xFF, 0xD9]).unwrap();
        let mut config = Config::default();
        config.image_store = dir.path().to_string_lossy().to_string();
        let (state, _) = loaded_state(config).await;
        let app = router(state);

        let (status, body, headers) = get(app.clone(), "/images/scheme_p1_0.jpg").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::CONTENT_TYPE], "image/jpeg");
        assert!(!body.is_empty());

        let (status, body, _) = get(app.clone(), "/images/absent.jpg").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, "Image file not found");

        let (status, _, _) = get(app, "/images/..%2Fconfig.json").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_image_content_type() {
        assert_eq!(image_content_type("a.JPG"), "image/jpeg");
        assert_eq!(image_content_type("a.png"), "image/png");
        assert_eq!(image_content_type("a.bin"), "application/octet-stream");
    }
}
