use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FileRecord {
    pub id: Uuid,
    pub course_id: Uuid,
    pub name: String,
    pub size: i32,
    pub page_count: Option<i16>,
    pub created_at: NaiveDateTime,
}

/// A file id paired with the course that owns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRow)]
pub struct FileCourse {
    pub file_id: Uuid,
    pub course_id: Uuid,
}
