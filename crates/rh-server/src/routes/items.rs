//! Item query route handlers.

use axum::extract::{Path, Query, State};
use axum::Json;
use rh_core::{ListQuery, MediaId, MediaItem, SortBy};
use serde::{Deserialize, Serialize};

use crate::context::AppContext;
use crate::error::AppError;

/// Query parameters for listing items.
#[derive(Debug, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListItemsParams {
    /// Case-insensitive title substring.
    pub search: Option<String>,
    /// `title`, `modified` or `size`.
    pub sort: Option<String>,
    #[serde(default)]
    pub offset: usize,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

/// Item response.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ItemResponse {
    pub id: String,
    pub title: String,
    pub path: String,
    pub size: u64,
    pub modified: String,
    pub season: Option<u32>,
    pub episode: Option<u32>,
    pub has_nfo: bool,
    pub has_poster: bool,
}

impl ItemResponse {
    pub fn from_model(item: &MediaItem) -> Self {
        Self {
            id: item.id.to_string(),
            title: item.title.clone(),
            path: item.path.to_string_lossy().into_owned(),
            size: item.size,
            modified: item.modified.to_rfc3339(),
            season: item.season,
            episode: item.episode,
            has_nfo: item.nfo_path.is_some(),
            has_poster: item.poster_path.is_some(),
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ItemPage {
    pub items: Vec<ItemResponse>,
    /// Size of the filtered set before paging.
    pub total: usize,
    pub offset: usize,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ItemDetailResponse {
    pub item: ItemResponse,
    /// Parsed sidecar metadata, tagged by `kind`.
    #[schema(value_type = Object)]
    pub metadata: Option<serde_json::Value>,
    #[schema(value_type = Object)]
    pub extended: Option<serde_json::Value>,
}

/// GET /api/items
#[utoipa::path(
    get,
    path = "/api/items",
    params(ListItemsParams),
    responses(
        (status = 200, description = "Page of items", body = ItemPage),
        (status = 400, description = "Unknown sort key")
    )
)]
pub async fn list_items(
    State(ctx): State<AppContext>,
    Query(params): Query<ListItemsParams>,
) -> Result<Json<ItemPage>, AppError> {
    let sort: SortBy = params.sort.as_deref().unwrap_or_default().parse()?;
    let query = ListQuery {
        search: params.search.filter(|s| !s.trim().is_empty()),
        sort,
        offset: params.offset,
        limit: Some(params.limit),
    };
    let page = ctx.scanner.list(&query)?;
    Ok(Json(ItemPage {
        items: page.items.iter().map(ItemResponse::from_model).collect(),
        total: page.total,
        offset: page.offset,
    }))
}

/// GET /api/items/{id}
#[utoipa::path(
    get,
    path = "/api/items/{id}",
    params(("id" = String, Path, description = "Media ID")),
    responses(
        (status = 200, description = "Item with metadata", body = ItemDetailResponse),
        (status = 404, description = "Item not found")
    )
)]
pub async fn get_item(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<Json<ItemDetailResponse>, AppError> {
    let id = MediaId::new(id);
    let item = ctx
        .scanner
        .get(&id)?
        .ok_or_else(|| rh_core::Error::not_found("media", &id))?;

    let metadata = match ctx.scanner.metadata(&item) {
        Ok(meta) => meta,
        Err(e) => {
            tracing::warn!(media_id = %id, error = %e, "Failed to load metadata");
            None
        }
    };
    let extended = match &ctx.store {
        Some(store) => store.get_extended_metadata(&id)?,
        None => None,
    };

    Ok(Json(ItemDetailResponse {
        item: ItemResponse::from_model(&item),
        metadata: metadata.and_then(|m| serde_json::to_value(m).ok()),
        extended,
    }))
}
