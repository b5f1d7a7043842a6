use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::access::{AccessStore, CachedScope, CatalogStore, MetadataStore};
use crate::database::manager::{DatabaseError, DatabaseManager};
use crate::database::models::{CourseVisibility, FileCourse, FileRecord, Page, ScopeRow};

/// Postgres-backed implementation of every store seam.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccessStore for PgStore {
    async fn has_bucket_access(&self, user_id: Uuid, bucket_id: Uuid) -> Result<bool, DatabaseError> {
        let query = r#"
            SELECT EXISTS (
                SELECT 1 FROM buckets WHERE id = $1 AND owner = $2
                UNION ALL
                SELECT 1 FROM bucket_users WHERE bucket_id = $1 AND user_id = $2
            )
        "#;

        let allowed: bool = sqlx::query_scalar(query)
            .bind(bucket_id)
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(allowed)
    }

    async fn file_courses(&self, file_ids: &[Uuid]) -> Result<Vec<FileCourse>, DatabaseError> {
        let rows = sqlx::query_as::<_, FileCourse>(
            "SELECT id AS file_id, course_id FROM files WHERE id = ANY($1)",
        )
        .bind(file_ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn validated_courses(
        &self,
        user_id: Uuid,
        bucket_id: Uuid,
        course_ids: &[Uuid],
    ) -> Result<Vec<Uuid>, DatabaseError> {
        let courses = sqlx::query_as::<_, CourseVisibility>(
            "SELECT id, private FROM courses WHERE bucket_id = $1 AND id = ANY($2)",
        )
        .bind(bucket_id)
        .bind(course_ids)
        .fetch_all(&self.pool)
        .await?;

        let (private, public): (Vec<CourseVisibility>, Vec<CourseVisibility>) =
            courses.into_iter().partition(|c| c.private);
        let mut validated: Vec<Uuid> = public.into_iter().map(|c| c.id).collect();

        if !private.is_empty() {
            let private_ids: Vec<Uuid> = private.into_iter().map(|c| c.id).collect();
            let joined: Vec<Uuid> = sqlx::query_scalar(
                "SELECT course_id FROM course_users WHERE user_id = $1 AND course_id = ANY($2)",
            )
            .bind(user_id)
            .bind(&private_ids)
            .fetch_all(&self.pool)
            .await?;
            validated.extend(joined);
        }

        Ok(validated)
    }
}

#[async_trait]
impl MetadataStore for PgStore {
    async fn load_scope(&self, user_id: Uuid) -> Result<CachedScope, DatabaseError> {
        let row = sqlx::query_as::<_, ScopeRow>(
            "SELECT bucket_ids, course_ids, file_ids FROM user_access_scopes WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(CachedScope::from).unwrap_or_default())
    }

    async fn merge_scope(&self, user_id: Uuid, scope: &CachedScope) -> Result<(), DatabaseError> {
        // The union happens in the upsert so a writer holding a stale copy
        // can only add ids.
        let query = r#"
            INSERT INTO user_access_scopes (user_id, bucket_ids, course_ids, file_ids)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id) DO UPDATE SET
                bucket_ids = ARRAY(SELECT DISTINCT unnest(user_access_scopes.bucket_ids || EXCLUDED.bucket_ids)),
                course_ids = ARRAY(SELECT DISTINCT unnest(user_access_scopes.course_ids || EXCLUDED.course_ids)),
                file_ids = ARRAY(SELECT DISTINCT unnest(user_access_scopes.file_ids || EXCLUDED.file_ids)),
                updated_at = now()
        "#;

        let row = ScopeRow::from(scope);
        sqlx::query(query)
            .bind(user_id)
            .bind(&row.bucket_ids)
            .bind(&row.course_ids)
            .bind(&row.file_ids)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl CatalogStore for PgStore {
    async fn ping(&self) -> Result<(), DatabaseError> {
        DatabaseManager::health_check(&self.pool).await
    }

    async fn bucket_for_course(&self, course_id: Uuid) -> Result<Option<Uuid>, DatabaseError> {
        let bucket: Option<Uuid> = sqlx::query_scalar("SELECT bucket_id FROM courses WHERE id = $1")
            .bind(course_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(bucket)
    }

    async fn list_files(&self, course_ids: &[Uuid], page: Page) -> Result<Vec<FileRecord>, DatabaseError> {
        let query = r#"
            SELECT id, course_id, name, size, page_count, created_at
            FROM files
            WHERE course_id = ANY($1)
            ORDER BY created_at, id
            LIMIT $2 OFFSET $3
        "#;

        let files = sqlx::query_as::<_, FileRecord>(query)
            .bind(course_ids)
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;
        Ok(files)
    }
}
