use async_trait::async_trait;
use uuid::Uuid;

use crate::access::scope::CachedScope;
use crate::database::models::{FileCourse, FileRecord, Page};
use crate::database::DatabaseError;

/// Authoritative relational reads behind the access check.
#[async_trait]
pub trait AccessStore: Send + Sync {
    /// Owner of the bucket, or a `bucket_users` row for (bucket, user).
    async fn has_bucket_access(&self, user_id: Uuid, bucket_id: Uuid) -> Result<bool, DatabaseError>;

    /// Owning course of each file that exists. Missing files are simply absent.
    async fn file_courses(&self, file_ids: &[Uuid]) -> Result<Vec<FileCourse>, DatabaseError>;

    /// Subset of `course_ids` that belong to `bucket_id` and that the user may
    /// open. Private courses also need a `course_users` row for the user.
    async fn validated_courses(
        &self,
        user_id: Uuid,
        bucket_id: Uuid,
        course_ids: &[Uuid],
    ) -> Result<Vec<Uuid>, DatabaseError>;
}

/// Persistent home of the user's cached scope.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Stored scope for the user; empty when nothing has been cached yet.
    async fn load_scope(&self, user_id: Uuid) -> Result<CachedScope, DatabaseError>;

    /// Union `scope` into the stored scope. Never removes ids, so concurrent
    /// merges for one user commute.
    async fn merge_scope(&self, user_id: Uuid, scope: &CachedScope) -> Result<(), DatabaseError>;
}

/// Course and file reads used by the protected routes.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn ping(&self) -> Result<(), DatabaseError>;

    async fn bucket_for_course(&self, course_id: Uuid) -> Result<Option<Uuid>, DatabaseError>;

    async fn list_files(&self, course_ids: &[Uuid], page: Page) -> Result<Vec<FileRecord>, DatabaseError>;
}
