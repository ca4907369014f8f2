use axum::routing::post;
use axum::Router;

use crate::handlers::scrape;
use crate::state::AppState;

/// Routes mounted at `/scrape`.
///
/// ```text
/// POST   /                -> scrape_one
/// ```
///
/// `POST /scrape/batch` lives in [`super::batch_routes`].
pub fn router() -> Router<AppState> {
    Router::new().route("/", post(scrape::scrape_one))
}
