pub mod ads;
pub mod auth;

use askama::Template;
use axum::extract::DefaultBodyLimit;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use rust_embed::Embed;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Wrapper to render askama templates as axum responses
pub struct Html<T: Template>(pub T);

impl<T: Template> IntoResponse for Html<T> {
    fn into_response(self) -> Response {
        match self.0.render() {
            Ok(body) => (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
                body,
            )
                .into_response(),
            Err(e) => {
                tracing::error!("Template render error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Template error").into_response()
            }
        }
    }
}

/// The compiled-in static files: just the stylesheet tree. User uploads
/// are not embedded; they are served from disk under /media.
#[derive(Embed)]
#[folder = "assets/"]
struct StaticAssets;

async fn static_asset(axum::extract::Path(path): axum::extract::Path<String>) -> Response {
    let Some(file) = StaticAssets::get(&path) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let mime = mime_guess::from_path(&path).first_or_octet_stream();
    (
        [
            (header::CONTENT_TYPE, mime.as_ref().to_string()),
            (header::CACHE_CONTROL, "public, max-age=86400".to_string()),
        ],
        file.data.to_vec(),
    )
        .into_response()
}

/// Build the full application router.
pub fn router(state: AppState) -> Router {
    // Room for the multipart framing and text fields around the picture
    let body_limit = (state.config.media.max_upload_bytes + 64 * 1024) as usize;
    let media_dir = state.config.media_path().clone();

    Router::new()
        .merge(ads::router())
        .merge(auth::router())
        .route("/assets/{*path}", get(static_asset))
        .nest_service("/media", ServeDir::new(media_dir))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
