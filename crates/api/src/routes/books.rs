use axum::routing::{get, post};
use axum::Router;

use crate::handlers::books;
use crate::state::AppState;

/// Routes mounted at `/books`.
///
/// ```text
/// POST   /                -> save_book
/// GET    /export          -> export_books
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(books::save_book))
        .route("/export", get(books::export_books))
}
