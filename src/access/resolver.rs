use std::collections::BTreeSet;
use std::sync::Arc;

use futures::future::try_join;
use serde::Deserialize;
use uuid::Uuid;

use crate::access::attachment::AttachmentPolicy;
use crate::access::error::AccessError;
use crate::access::scope::CachedScope;
use crate::access::store::{AccessStore, MetadataStore};
use crate::database::models::FileCourse;
use crate::database::DatabaseError;

/// Scope a caller wants to operate on.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccessRequest {
    pub bucket_id: Uuid,
    #[serde(default)]
    pub course_ids: Vec<Uuid>,
    #[serde(default)]
    pub file_ids: Vec<Uuid>,
    #[serde(default)]
    pub attachments: Vec<String>,
}

impl AccessRequest {
    pub fn bucket(bucket_id: Uuid) -> Self {
        Self {
            bucket_id,
            ..Default::default()
        }
    }

    pub fn with_courses(mut self, course_ids: impl IntoIterator<Item = Uuid>) -> Self {
        self.course_ids.extend(course_ids);
        self
    }

    pub fn with_files(mut self, file_ids: impl IntoIterator<Item = Uuid>) -> Self {
        self.file_ids.extend(file_ids);
        self
    }

    pub fn with_attachments(mut self, urls: impl IntoIterator<Item = String>) -> Self {
        self.attachments.extend(urls);
        self
    }
}

/// Why a request was denied. Logged, never shown to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    BucketNotAccessible,
    FileNotFound,
    CourseNotInBucket,
    AttachmentNotOwned,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessDecision {
    /// Every requested id was already cached.
    Cached,
    /// The authoritative store approved this scope.
    Authorized(CachedScope),
    Denied(Denial),
}

/// Two-tier permission check: the user's cached scope first, then the
/// relational store, refreshing the cache after an authoritative success.
pub struct AccessResolver {
    store: Arc<dyn AccessStore>,
    metadata: Arc<dyn MetadataStore>,
    attachments: AttachmentPolicy,
}

impl AccessResolver {
    pub fn new(
        store: Arc<dyn AccessStore>,
        metadata: Arc<dyn MetadataStore>,
        attachments: AttachmentPolicy,
    ) -> Self {
        Self {
            store,
            metadata,
            attachments,
        }
    }

    /// The user's cached scope: what the metadata store holds plus any ids
    /// the bearer token was issued with. A failed read falls back to the
    /// token copy, which only costs an authoritative check.
    pub async fn cached_scope(&self, user_id: Uuid, token_scope: &CachedScope) -> CachedScope {
        match self.metadata.load_scope(user_id).await {
            Ok(stored) => stored.merged(token_scope),
            Err(e) => {
                tracing::warn!("Failed to load cached permissions for user {}: {}", user_id, e);
                token_scope.clone()
            }
        }
    }

    /// May `user_id` operate on `request`? Denials are `Ok(false)`; only
    /// store failures are errors. A failed cache write is logged and ignored.
    pub async fn has_permissions(
        &self,
        user_id: Uuid,
        cached: &CachedScope,
        request: &AccessRequest,
    ) -> Result<bool, AccessError> {
        match self.resolve(user_id, cached, request).await? {
            AccessDecision::Cached => {
                tracing::debug!("Access for user {} on bucket {} served from cache", user_id, request.bucket_id);
                Ok(true)
            }
            AccessDecision::Denied(reason) => {
                tracing::debug!("Access denied for user {} on bucket {}: {:?}", user_id, request.bucket_id, reason);
                Ok(false)
            }
            AccessDecision::Authorized(granted) => {
                let updated = cached.merged(&granted);
                if updated != *cached {
                    if let Err(e) = self.metadata.merge_scope(user_id, &updated).await {
                        tracing::warn!("Failed to refresh cached permissions for user {}: {}", user_id, e);
                    }
                }
                Ok(true)
            }
        }
    }

    /// Decide without touching the cache.
    pub async fn resolve(
        &self,
        user_id: Uuid,
        cached: &CachedScope,
        request: &AccessRequest,
    ) -> Result<AccessDecision, AccessError> {
        if !self.attachments.permits(user_id, &request.attachments) {
            return Ok(AccessDecision::Denied(Denial::AttachmentNotOwned));
        }

        if cached.covers(request.bucket_id, &request.course_ids, &request.file_ids) {
            return Ok(AccessDecision::Cached);
        }

        let file_ids: BTreeSet<Uuid> = request.file_ids.iter().copied().collect();

        let (bucket_ok, file_courses) = try_join(
            self.store.has_bucket_access(user_id, request.bucket_id),
            self.file_courses(&file_ids),
        )
        .await?;

        if !bucket_ok {
            return Ok(AccessDecision::Denied(Denial::BucketNotAccessible));
        }

        let found: BTreeSet<Uuid> = file_courses
            .iter()
            .map(|fc| fc.file_id)
            .filter(|id| file_ids.contains(id))
            .collect();
        if found.len() != file_ids.len() {
            return Ok(AccessDecision::Denied(Denial::FileNotFound));
        }

        let course_ids: BTreeSet<Uuid> = request
            .course_ids
            .iter()
            .copied()
            .chain(file_courses.iter().map(|fc| fc.course_id))
            .collect();

        if !course_ids.is_empty() {
            let requested: Vec<Uuid> = course_ids.iter().copied().collect();
            let validated: BTreeSet<Uuid> = self
                .store
                .validated_courses(user_id, request.bucket_id, &requested)
                .await?
                .into_iter()
                .filter(|id| course_ids.contains(id))
                .collect();

            if validated.len() != course_ids.len() {
                return Ok(AccessDecision::Denied(Denial::CourseNotInBucket));
            }
        }

        Ok(AccessDecision::Authorized(CachedScope {
            bucket_ids: BTreeSet::from([request.bucket_id]),
            course_ids,
            file_ids,
        }))
    }

    async fn file_courses(&self, file_ids: &BTreeSet<Uuid>) -> Result<Vec<FileCourse>, DatabaseError> {
        if file_ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<Uuid> = file_ids.iter().copied().collect();
        self.store.file_courses(&ids).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::InMemoryStore;

    const PREFIX: &str = "gs://uploads-correction-bucket/";

    fn resolver(store: &Arc<InMemoryStore>) -> AccessResolver {
        AccessResolver::new(
            store.clone(),
            store.clone(),
            AttachmentPolicy::new(Some(PREFIX.to_string())),
        )
    }

    #[tokio::test]
    async fn cached_scope_skips_store() {
        let store = Arc::new(InMemoryStore::new());
        let user = Uuid::new_v4();
        let (bucket, course, file) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let cached = CachedScope {
            bucket_ids: [bucket].into(),
            course_ids: [course, Uuid::new_v4()].into(),
            file_ids: [file].into(),
        };

        let request = AccessRequest::bucket(bucket).with_courses([course]).with_files([file]);
        let allowed = resolver(&store).has_permissions(user, &cached, &request).await.unwrap();

        assert!(allowed);
        assert_eq!(store.query_count(), 0);
        assert!(store.scope_writes().is_empty());
    }

    #[tokio::test]
    async fn owner_gains_bucket_in_cache() {
        let store = Arc::new(InMemoryStore::new());
        let owner = Uuid::new_v4();
        let bucket = store.add_bucket(owner);

        let cached = CachedScope::default();
        let allowed = resolver(&store)
            .has_permissions(owner, &cached, &AccessRequest::bucket(bucket))
            .await
            .unwrap();

        assert!(allowed);
        let writes = store.scope_writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].0, owner);
        assert_eq!(writes[0].1.bucket_ids, BTreeSet::from([bucket]));
        assert!(writes[0].1.course_ids.is_empty());
        assert!(writes[0].1.file_ids.is_empty());
    }

    #[tokio::test]
    async fn member_without_ownership_is_allowed() {
        let store = Arc::new(InMemoryStore::new());
        let bucket = store.add_bucket(Uuid::new_v4());
        let member = Uuid::new_v4();
        store.add_bucket_member(bucket, member);

        let allowed = resolver(&store)
            .has_permissions(member, &CachedScope::default(), &AccessRequest::bucket(bucket))
            .await
            .unwrap();
        assert!(allowed);
    }

    #[tokio::test]
    async fn non_member_is_denied_and_cache_untouched() {
        let store = Arc::new(InMemoryStore::new());
        let bucket = store.add_bucket(Uuid::new_v4());
        let stranger = Uuid::new_v4();

        let resolver = resolver(&store);
        let decision = resolver
            .resolve(stranger, &CachedScope::default(), &AccessRequest::bucket(bucket))
            .await
            .unwrap();
        assert_eq!(decision, AccessDecision::Denied(Denial::BucketNotAccessible));

        let allowed = resolver
            .has_permissions(stranger, &CachedScope::default(), &AccessRequest::bucket(bucket))
            .await
            .unwrap();
        assert!(!allowed);
        assert!(store.scope_writes().is_empty());
    }

    #[tokio::test]
    async fn one_invalid_course_fails_whole_request() {
        let store = Arc::new(InMemoryStore::new());
        let user = Uuid::new_v4();
        let bucket = store.add_bucket(user);
        let valid = store.add_course(bucket, false);
        let elsewhere = store.add_course(store.add_bucket(Uuid::new_v4()), false);

        let resolver = resolver(&store);
        for other in [elsewhere, Uuid::new_v4()] {
            let request = AccessRequest::bucket(bucket).with_courses([valid, other]);
            let decision = resolver.resolve(user, &CachedScope::default(), &request).await.unwrap();
            assert_eq!(decision, AccessDecision::Denied(Denial::CourseNotInBucket));

            assert!(!resolver.has_permissions(user, &CachedScope::default(), &request).await.unwrap());
        }
        assert!(store.scope_writes().is_empty());
    }

    #[tokio::test]
    async fn files_imply_their_courses() {
        let store = Arc::new(InMemoryStore::new());
        let user = Uuid::new_v4();
        let bucket = store.add_bucket(Uuid::new_v4());
        store.add_bucket_member(bucket, user);
        let c1 = store.add_course(bucket, false);
        let c2 = store.add_course(bucket, false);
        let f1 = store.add_file(c1, "one.pdf");
        let f2 = store.add_file(c2, "two.pdf");

        let request = AccessRequest::bucket(bucket).with_courses([c1]).with_files([f1, f2]);
        let allowed = resolver(&store)
            .has_permissions(user, &CachedScope::default(), &request)
            .await
            .unwrap();

        assert!(allowed);
        let writes = store.scope_writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].1.course_ids, BTreeSet::from([c1, c2]));
        assert_eq!(writes[0].1.file_ids, BTreeSet::from([f1, f2]));
    }

    #[tokio::test]
    async fn duplicate_course_ids_are_collapsed() {
        let store = Arc::new(InMemoryStore::new());
        let user = Uuid::new_v4();
        let bucket = store.add_bucket(user);
        let course = store.add_course(bucket, false);
        let file = store.add_file(course, "notes.pdf");

        let request = AccessRequest::bucket(bucket)
            .with_courses([course, course])
            .with_files([file, file]);
        let decision = resolver(&store)
            .resolve(user, &CachedScope::default(), &request)
            .await
            .unwrap();

        match decision {
            AccessDecision::Authorized(scope) => {
                assert_eq!(scope.course_ids, BTreeSet::from([course]));
                assert_eq!(scope.file_ids, BTreeSet::from([file]));
            }
            other => panic!("expected authorization, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn missing_or_foreign_file_is_denied() {
        let store = Arc::new(InMemoryStore::new());
        let user = Uuid::new_v4();
        let bucket = store.add_bucket(user);
        let course = store.add_course(bucket, false);
        let foreign_course = store.add_course(store.add_bucket(Uuid::new_v4()), false);
        let foreign_file = store.add_file(foreign_course, "other.pdf");

        let resolver = resolver(&store);

        let missing = AccessRequest::bucket(bucket).with_courses([course]).with_files([Uuid::new_v4()]);
        assert_eq!(
            resolver.resolve(user, &CachedScope::default(), &missing).await.unwrap(),
            AccessDecision::Denied(Denial::FileNotFound)
        );

        let foreign = AccessRequest::bucket(bucket).with_files([foreign_file]);
        assert_eq!(
            resolver.resolve(user, &CachedScope::default(), &foreign).await.unwrap(),
            AccessDecision::Denied(Denial::CourseNotInBucket)
        );
    }

    #[tokio::test]
    async fn repeat_with_refreshed_cache_writes_once() {
        let store = Arc::new(InMemoryStore::new());
        let user = Uuid::new_v4();
        let bucket = store.add_bucket(user);
        let course = store.add_course(bucket, false);
        let request = AccessRequest::bucket(bucket).with_courses([course]);

        let resolver = resolver(&store);
        assert!(resolver.has_permissions(user, &CachedScope::default(), &request).await.unwrap());
        let refreshed = store.scope_writes()[0].1.clone();
        let queries_after_first = store.query_count();

        assert!(resolver.has_permissions(user, &refreshed, &request).await.unwrap());
        assert_eq!(store.scope_writes().len(), 1);
        assert_eq!(store.query_count(), queries_after_first);
    }

    #[tokio::test]
    async fn partial_cache_forces_full_check_and_keeps_old_entries() {
        let store = Arc::new(InMemoryStore::new());
        let user = Uuid::new_v4();
        let bucket = store.add_bucket(user);
        let c1 = store.add_course(bucket, false);
        let f1 = store.add_file(c1, "lecture.pdf");
        let earlier_bucket = Uuid::new_v4();

        let cached = CachedScope {
            bucket_ids: [bucket, earlier_bucket].into(),
            course_ids: [c1].into(),
            file_ids: Default::default(),
        };
        let request = AccessRequest::bucket(bucket).with_courses([c1]).with_files([f1]);

        assert!(resolver(&store).has_permissions(user, &cached, &request).await.unwrap());
        assert!(store.query_count() > 0);

        let writes = store.scope_writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].1.bucket_ids, BTreeSet::from([bucket, earlier_bucket]));
        assert_eq!(writes[0].1.course_ids, BTreeSet::from([c1]));
        assert_eq!(writes[0].1.file_ids, BTreeSet::from([f1]));
    }

    #[tokio::test]
    async fn empty_scope_only_caches_bucket() {
        let store = Arc::new(InMemoryStore::new());
        let user = Uuid::new_v4();
        let bucket = store.add_bucket(user);
        let old_course = Uuid::new_v4();
        let cached = CachedScope {
            course_ids: [old_course].into(),
            ..Default::default()
        };

        assert!(resolver(&store)
            .has_permissions(user, &cached, &AccessRequest::bucket(bucket))
            .await
            .unwrap());

        let writes = store.scope_writes();
        assert_eq!(writes[0].1.course_ids, BTreeSet::from([old_course]));
        assert!(writes[0].1.file_ids.is_empty());
    }

    #[tokio::test]
    async fn store_failure_is_an_error_not_a_denial() {
        let store = Arc::new(InMemoryStore::new());
        let user = Uuid::new_v4();
        let bucket = store.add_bucket(user);
        store.fail_reads(true);

        let result = resolver(&store)
            .has_permissions(user, &CachedScope::default(), &AccessRequest::bucket(bucket))
            .await;
        assert!(matches!(result, Err(AccessError::Store(_))));
    }

    #[tokio::test]
    async fn failed_cache_write_still_allows() {
        let store = Arc::new(InMemoryStore::new());
        let user = Uuid::new_v4();
        let bucket = store.add_bucket(user);
        store.fail_writes(true);

        let allowed = resolver(&store)
            .has_permissions(user, &CachedScope::default(), &AccessRequest::bucket(bucket))
            .await
            .unwrap();
        assert!(allowed);
        assert!(store.scope_writes().is_empty());
    }

    #[tokio::test]
    async fn private_course_needs_course_membership() {
        let store = Arc::new(InMemoryStore::new());
        let user = Uuid::new_v4();
        let bucket = store.add_bucket(Uuid::new_v4());
        store.add_bucket_member(bucket, user);
        let private = store.add_course(bucket, true);

        let resolver = resolver(&store);
        let request = AccessRequest::bucket(bucket).with_courses([private]);
        assert!(!resolver.has_permissions(user, &CachedScope::default(), &request).await.unwrap());

        store.add_course_member(private, user);
        assert!(resolver.has_permissions(user, &CachedScope::default(), &request).await.unwrap());
    }

    #[tokio::test]
    async fn foreign_attachment_denied_even_when_cached() {
        let store = Arc::new(InMemoryStore::new());
        let user = Uuid::new_v4();
        let bucket = Uuid::new_v4();
        let cached = CachedScope {
            bucket_ids: [bucket].into(),
            ..Default::default()
        };

        let resolver = resolver(&store);
        let own = AccessRequest::bucket(bucket).with_attachments([format!("{PREFIX}{user}/page.png")]);
        assert_eq!(resolver.resolve(user, &cached, &own).await.unwrap(), AccessDecision::Cached);

        let foreign = AccessRequest::bucket(bucket)
            .with_attachments([format!("{PREFIX}{}/page.png", Uuid::new_v4())]);
        assert_eq!(
            resolver.resolve(user, &cached, &foreign).await.unwrap(),
            AccessDecision::Denied(Denial::AttachmentNotOwned)
        );
        assert_eq!(store.query_count(), 0);
    }

    #[tokio::test]
    async fn cached_scope_combines_store_and_token() {
        let store = Arc::new(InMemoryStore::new());
        let user = Uuid::new_v4();
        let (stored_bucket, token_bucket) = (Uuid::new_v4(), Uuid::new_v4());
        store
            .merge_scope(user, &CachedScope { bucket_ids: [stored_bucket].into(), ..Default::default() })
            .await
            .unwrap();

        let token = CachedScope { bucket_ids: [token_bucket].into(), ..Default::default() };
        let scope = resolver(&store).cached_scope(user, &token).await;
        assert_eq!(scope.bucket_ids, BTreeSet::from([stored_bucket, token_bucket]));

        store.fail_reads(true);
        assert_eq!(resolver(&store).cached_scope(user, &token).await, token);
    }

    /// Holds the bucket check and the file lookup at a two-party barrier, so
    /// neither finishes unless both are in flight at once.
    struct Rendezvous {
        inner: Arc<InMemoryStore>,
        barrier: tokio::sync::Barrier,
    }

    #[async_trait::async_trait]
    impl AccessStore for Rendezvous {
        async fn has_bucket_access(&self, user_id: Uuid, bucket_id: Uuid) -> Result<bool, DatabaseError> {
            self.barrier.wait().await;
            self.inner.has_bucket_access(user_id, bucket_id).await
        }

        async fn file_courses(&self, file_ids: &[Uuid]) -> Result<Vec<FileCourse>, DatabaseError> {
            self.barrier.wait().await;
            self.inner.file_courses(file_ids).await
        }

        async fn validated_courses(
            &self,
            user_id: Uuid,
            bucket_id: Uuid,
            course_ids: &[Uuid],
        ) -> Result<Vec<Uuid>, DatabaseError> {
            self.inner.validated_courses(user_id, bucket_id, course_ids).await
        }
    }

    #[tokio::test]
    async fn bucket_check_and_file_lookup_run_concurrently() {
        let store = Arc::new(InMemoryStore::new());
        let user = Uuid::new_v4();
        let bucket = store.add_bucket(user);
        let course = store.add_course(bucket, false);
        let file = store.add_file(course, "reader.pdf");

        let resolver = AccessResolver::new(
            Arc::new(Rendezvous {
                inner: store.clone(),
                barrier: tokio::sync::Barrier::new(2),
            }),
            store.clone(),
            AttachmentPolicy::new(None),
        );

        let request = AccessRequest::bucket(bucket).with_files([file]);
        let decision = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            resolver.resolve(user, &CachedScope::default(), &request),
        )
        .await
        .expect("bucket check and file lookup were awaited one after the other")
        .unwrap();

        assert!(matches!(decision, AccessDecision::Authorized(_)));
    }
}
