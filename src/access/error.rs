use thiserror::Error;

use crate::database::DatabaseError;

/// Infrastructure failures while resolving access. A denial is never an
/// error; it is `Ok(false)` / `AccessDecision::Denied`.
#[derive(Debug, Error)]
pub enum AccessError {
    #[error("Access store unavailable: {0}")]
    Store(#[from] DatabaseError),
}
