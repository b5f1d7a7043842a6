use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Identifiers a user has already been validated against. Stored per user by
/// the metadata store and optionally seeded from the token's `app_metadata`.
/// Grows monotonically; never a source of truth.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedScope {
    #[serde(default)]
    pub bucket_ids: BTreeSet<Uuid>,
    #[serde(default)]
    pub course_ids: BTreeSet<Uuid>,
    #[serde(default)]
    pub file_ids: BTreeSet<Uuid>,
}

impl CachedScope {
    /// Decode the scope from a user's `app_metadata` object.
    ///
    /// The blob may carry unrelated keys (roles, provider info). Absent keys
    /// decode as empty sets. A blob that cannot be read as a scope at all is
    /// treated as an empty cache so the caller falls through to the
    /// authoritative check.
    pub fn from_app_metadata(metadata: &Value) -> Self {
        match metadata {
            Value::Null => Self::default(),
            value => match serde_json::from_value(value.clone()) {
                Ok(scope) => scope,
                Err(e) => {
                    tracing::warn!("Ignoring malformed cached permissions: {}", e);
                    Self::default()
                }
            },
        }
    }

    /// True when every requested id is already cached.
    pub fn covers(&self, bucket_id: Uuid, course_ids: &[Uuid], file_ids: &[Uuid]) -> bool {
        self.bucket_ids.contains(&bucket_id)
            && course_ids.iter().all(|id| self.course_ids.contains(id))
            && file_ids.iter().all(|id| self.file_ids.contains(id))
    }

    /// Set union of `self` and `other`.
    pub fn merged(&self, other: &CachedScope) -> CachedScope {
        CachedScope {
            bucket_ids: self.bucket_ids.union(&other.bucket_ids).copied().collect(),
            course_ids: self.course_ids.union(&other.course_ids).copied().collect(),
            file_ids: self.file_ids.union(&other.file_ids).copied().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bucket_ids.is_empty() && self.course_ids.is_empty() && self.file_ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_partial_metadata() {
        let bucket = Uuid::new_v4();
        let scope = CachedScope::from_app_metadata(&json!({
            "provider": "email",
            "bucket_ids": [bucket.to_string()],
        }));

        assert!(scope.bucket_ids.contains(&bucket));
        assert!(scope.course_ids.is_empty());
        assert!(scope.file_ids.is_empty());
    }

    #[test]
    fn malformed_metadata_is_empty() {
        let scope = CachedScope::from_app_metadata(&json!({ "bucket_ids": "not-a-list" }));
        assert!(scope.is_empty());

        let scope = CachedScope::from_app_metadata(&Value::Null);
        assert!(scope.is_empty());
    }

    #[test]
    fn covers_requires_every_id() {
        let (bucket, course, file) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let scope = CachedScope {
            bucket_ids: [bucket].into(),
            course_ids: [course].into(),
            file_ids: BTreeSet::new(),
        };

        assert!(scope.covers(bucket, &[course], &[]));
        assert!(!scope.covers(bucket, &[course], &[file]));
        assert!(!scope.covers(Uuid::new_v4(), &[], &[]));
    }

    #[test]
    fn merge_is_a_union() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let left = CachedScope { bucket_ids: [a].into(), ..Default::default() };
        let right = CachedScope { bucket_ids: [a, b].into(), course_ids: [b].into(), ..Default::default() };

        let merged = left.merged(&right);
        assert_eq!(merged.bucket_ids.len(), 2);
        assert_eq!(merged.course_ids, BTreeSet::from([b]));
        assert_eq!(merged, right.merged(&left));
    }
}
