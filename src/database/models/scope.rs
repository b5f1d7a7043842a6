use sqlx::FromRow;
use uuid::Uuid;

use crate::access::CachedScope;

/// Row of `user_access_scopes`.
#[derive(Debug, Clone, Default, FromRow)]
pub struct ScopeRow {
    pub bucket_ids: Vec<Uuid>,
    pub course_ids: Vec<Uuid>,
    pub file_ids: Vec<Uuid>,
}

impl From<ScopeRow> for CachedScope {
    fn from(row: ScopeRow) -> Self {
        CachedScope {
            bucket_ids: row.bucket_ids.into_iter().collect(),
            course_ids: row.course_ids.into_iter().collect(),
            file_ids: row.file_ids.into_iter().collect(),
        }
    }
}

impl From<&CachedScope> for ScopeRow {
    fn from(scope: &CachedScope) -> Self {
        ScopeRow {
            bucket_ids: scope.bucket_ids.iter().copied().collect(),
            course_ids: scope.course_ids.iter().copied().collect(),
            file_ids: scope.file_ids.iter().copied().collect(),
        }
    }
}
