use axum::extract::{rejection::QueryRejection, Extension, Path, Query, State};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::access::AccessRequest;
use crate::database::models::{FileRecord, Page};
use crate::error::ApiError;
use crate::handlers::{AppState, ListingLimits};
use crate::middleware::{ApiResponse, ApiResult, AuthUser};

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page_number: u32,
    pub items_per_page: u32,
}

#[derive(Debug, Deserialize)]
pub struct FilesQuery {
    pub bucket_id: Uuid,
    /// Comma-separated course ids
    pub course_ids: String,
    pub page_number: u32,
    pub items_per_page: u32,
}

#[derive(Debug, Serialize)]
pub struct FileListing {
    pub items: Vec<FileRecord>,
}

/// GET /api/files - files across several courses of one bucket
pub async fn list(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    query: Result<Query<FilesQuery>, QueryRejection>,
) -> ApiResult<FileListing> {
    let Query(query) = query?;
    let course_ids = parse_course_ids(&query.course_ids, &state.limits)?;
    let page = validate_page(query.page_number, query.items_per_page, &state.limits)?;

    let request = AccessRequest::bucket(query.bucket_id).with_courses(course_ids.iter().copied());
    authorize(&state, &user, &request).await?;

    let items = state.catalog.list_files(&course_ids, page).await?;
    Ok(ApiResponse::success(FileListing { items }))
}

/// GET /api/files/:course_id - files of a single course
pub async fn list_for_course(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(course_id): Path<Uuid>,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> ApiResult<FileListing> {
    let Query(query) = query?;
    let page = validate_page(query.page_number, query.items_per_page, &state.limits)?;

    let bucket_id = state
        .catalog
        .bucket_for_course(course_id)
        .await?
        .ok_or_else(|| ApiError::not_found("NOT_FOUND"))?;

    let request = AccessRequest::bucket(bucket_id).with_courses([course_id]);
    authorize(&state, &user, &request).await?;

    let items = state.catalog.list_files(&[course_id], page).await?;
    Ok(ApiResponse::success(FileListing { items }))
}

async fn authorize(state: &AppState, user: &AuthUser, request: &AccessRequest) -> Result<(), ApiError> {
    if state
        .resolver
        .has_permissions(user.user_id, &user.scope, request)
        .await?
    {
        Ok(())
    } else {
        Err(ApiError::forbidden("FORBIDDEN"))
    }
}

fn parse_course_ids(raw: &str, limits: &ListingLimits) -> Result<Vec<Uuid>, ApiError> {
    let mut ids = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let id = Uuid::parse_str(part)
            .map_err(|_| ApiError::invalid_field("course_ids", format!("'{}' is not a valid UUID", part)))?;
        if !ids.contains(&id) {
            ids.push(id);
        }
    }

    if ids.is_empty() || ids.len() > limits.max_course_ids {
        return Err(ApiError::invalid_field(
            "course_ids",
            format!("expected between 1 and {} course ids", limits.max_course_ids),
        ));
    }
    Ok(ids)
}

fn validate_page(page_number: u32, items_per_page: u32, limits: &ListingLimits) -> Result<Page, ApiError> {
    if items_per_page == 0 || items_per_page > limits.max_items_per_page {
        return Err(ApiError::invalid_field(
            "items_per_page",
            format!("must be between 1 and {}", limits.max_items_per_page),
        ));
    }
    Ok(Page::new(page_number, items_per_page))
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIMITS: ListingLimits = ListingLimits {
        max_course_ids: 2,
        max_items_per_page: 50,
    };

    #[test]
    fn parses_and_dedups_course_ids() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let ids = parse_course_ids(&format!("{a}, {b},{a}"), &LIMITS).unwrap();
        assert_eq!(ids, vec![a, b]);
    }

    #[test]
    fn rejects_bad_course_id_lists() {
        assert!(parse_course_ids("", &LIMITS).is_err());
        assert!(parse_course_ids("not-a-uuid", &LIMITS).is_err());

        let too_many = format!("{},{},{}", Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        assert!(parse_course_ids(&too_many, &LIMITS).is_err());
    }

    #[test]
    fn page_size_is_bounded() {
        assert!(validate_page(0, 0, &LIMITS).is_err());
        assert!(validate_page(0, 51, &LIMITS).is_err());
        assert_eq!(validate_page(2, 50, &LIMITS).unwrap().offset(), 100);
    }
}
