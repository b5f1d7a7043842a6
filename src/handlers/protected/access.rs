use axum::{
    extract::{rejection::JsonRejection, Extension, State},
    Json,
};
use serde::Serialize;

use crate::access::AccessRequest;
use crate::handlers::AppState;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};

#[derive(Debug, Serialize)]
pub struct AccessCheck {
    pub allowed: bool,
}

/// POST /api/access/check - may the caller use this bucket/course/file scope?
///
/// A denial is a normal answer (`allowed: false`); only store failures
/// produce an error status.
pub async fn check(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    payload: Result<Json<AccessRequest>, JsonRejection>,
) -> ApiResult<AccessCheck> {
    let Json(request) = payload?;
    let allowed = state
        .resolver
        .has_permissions(user.user_id, &user.scope, &request)
        .await?;

    Ok(ApiResponse::success(AccessCheck { allowed }))
}
