use axum::routing::get;
use axum::Router;

use crate::handlers::sites;
use crate::state::AppState;

/// Routes mounted at `/sites`.
pub fn router() -> Router<AppState> {
    Router::new().route("/", get(sites::list_sites))
}
