// SPDX-License-Identifier: Apache-2.0

use cmr_query::{search, SearchRequest};

use crate::{with_store, AppState, ServerError, ServerErrorCode};

pub(crate) mod handlers;
pub(crate) mod response;

pub const ROUTE_SEARCH: &str = "search";
pub const ROUTE_MAP: &str = "map";
pub const ROUTE_LOCATION: &str = "location";
pub const ROUTE_COMPONENT_RAW: &str = "component_raw";
pub const ROUTE_SUGGEST: &str = "suggest";

/// Serialized list page for `req`, as served and cached by `/api/search`.
pub async fn search_payload(state: &AppState, req: SearchRequest) -> Result<Vec<u8>, ServerError> {
    let page = with_store(state, move |store, env| {
        Ok(search(store.connection(), &req, &env.search_context())?)
    })
    .await?;
    serde_json::to_vec(&page).map_err(|e| ServerError::new(ServerErrorCode::Internal, e.to_string()))
}
