use crate::api::rest::state::AppState;
use crate::error::ApiResult;
use axum::{
    extract::{Path, State},
    Json,
};
use ctf_types::{UserAggregate, UserId};

/// Point total and solved challenges of one user
pub async fn get_user_aggregate(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<UserAggregate>> {
    let aggregate = state.engine.user_aggregate(&UserId::new(user_id)).await?;
    Ok(Json(aggregate))
}
