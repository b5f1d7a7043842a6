use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Course row as seen by the access check.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, FromRow)]
pub struct CourseVisibility {
    pub id: Uuid,
    pub private: bool,
}
