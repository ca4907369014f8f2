use axum::Json;
use bookmeta_core::sites::{all_sites, Site, DEFAULT_SITE};
use serde::Serialize;

use crate::response::DataResponse;

#[derive(Debug, Serialize)]
pub struct SiteCatalogue {
    pub sites: &'static [Site],
    pub default: &'static str,
}

/// GET /api/v1/sites
pub async fn list_sites() -> Json<DataResponse<SiteCatalogue>> {
    Json(DataResponse {
        data: SiteCatalogue {
            sites: all_sites(),
            default: DEFAULT_SITE,
        },
    })
}
