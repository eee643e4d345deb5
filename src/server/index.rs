use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use tracing::error;

use super::AppState;

pub async fn handle_index_page(State(state): State<AppState>) -> Response {
    match tokio::fs::read_to_string(&state.config.index).await {
        Ok(contents) => Html(contents).into_response(),
        Err(err) => {
            error!(path = %state.config.index.display(), %err, "failed to read index page");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
