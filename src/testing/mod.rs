//! In-memory store fakes for unit and integration tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::access::{AccessStore, CachedScope, CatalogStore, MetadataStore};
use crate::database::models::{FileCourse, FileRecord, Page};
use crate::database::DatabaseError;

#[derive(Default)]
struct Tables {
    bucket_owners: HashMap<Uuid, Uuid>,
    bucket_users: HashSet<(Uuid, Uuid)>,
    courses: HashMap<Uuid, (Uuid, bool)>,
    course_users: HashSet<(Uuid, Uuid)>,
    files: Vec<FileRecord>,
}

/// Implements every store trait over plain collections, counting reads and
/// recording metadata writes so tests can assert on I/O.
#[derive(Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
    reads: AtomicUsize,
    writes: Mutex<Vec<(Uuid, CachedScope)>>,
    scopes: Mutex<HashMap<Uuid, CachedScope>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_bucket(&self, owner: Uuid) -> Uuid {
        let id = Uuid::new_v4();
        self.tables.lock().unwrap().bucket_owners.insert(id, owner);
        id
    }

    pub fn add_bucket_member(&self, bucket_id: Uuid, user_id: Uuid) {
        self.tables.lock().unwrap().bucket_users.insert((bucket_id, user_id));
    }

    pub fn add_course(&self, bucket_id: Uuid, private: bool) -> Uuid {
        let id = Uuid::new_v4();
        self.tables.lock().unwrap().courses.insert(id, (bucket_id, private));
        id
    }

    pub fn add_course_member(&self, course_id: Uuid, user_id: Uuid) {
        self.tables.lock().unwrap().course_users.insert((course_id, user_id));
    }

    pub fn add_file(&self, course_id: Uuid, name: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.tables.lock().unwrap().files.push(FileRecord {
            id,
            course_id,
            name: name.to_string(),
            size: 1024,
            page_count: Some(1),
            created_at: Utc::now().naive_utc(),
        });
        id
    }

    /// Make every read fail as if the database were unreachable.
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Scope currently stored for the user.
    pub fn stored_scope(&self, user_id: Uuid) -> CachedScope {
        self.scopes.lock().unwrap().get(&user_id).cloned().unwrap_or_default()
    }

    /// Number of access and catalog reads issued so far. Scope loads are not
    /// counted.
    pub fn query_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Successful scope merges as submitted, in order.
    pub fn scope_writes(&self) -> Vec<(Uuid, CachedScope)> {
        self.writes.lock().unwrap().clone()
    }

    fn read(&self) -> Result<std::sync::MutexGuard<'_, Tables>, DatabaseError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(DatabaseError::QueryError("connection refused".to_string()));
        }
        Ok(self.tables.lock().unwrap())
    }
}

#[async_trait]
impl AccessStore for InMemoryStore {
    async fn has_bucket_access(&self, user_id: Uuid, bucket_id: Uuid) -> Result<bool, DatabaseError> {
        let tables = self.read()?;
        let owner = tables.bucket_owners.get(&bucket_id) == Some(&user_id);
        Ok(owner || tables.bucket_users.contains(&(bucket_id, user_id)))
    }

    async fn file_courses(&self, file_ids: &[Uuid]) -> Result<Vec<FileCourse>, DatabaseError> {
        let tables = self.read()?;
        Ok(tables
            .files
            .iter()
            .filter(|f| file_ids.contains(&f.id))
            .map(|f| FileCourse {
                file_id: f.id,
                course_id: f.course_id,
            })
            .collect())
    }

    async fn validated_courses(
        &self,
        user_id: Uuid,
        bucket_id: Uuid,
        course_ids: &[Uuid],
    ) -> Result<Vec<Uuid>, DatabaseError> {
        let tables = self.read()?;
        Ok(course_ids
            .iter()
            .copied()
            .filter(|id| match tables.courses.get(id) {
                Some((bucket, private)) if *bucket == bucket_id => {
                    !private || tables.course_users.contains(&(*id, user_id))
                }
                _ => false,
            })
            .collect())
    }
}

#[async_trait]
impl MetadataStore for InMemoryStore {
    async fn load_scope(&self, user_id: Uuid) -> Result<CachedScope, DatabaseError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(DatabaseError::QueryError("connection refused".to_string()));
        }
        Ok(self.scopes.lock().unwrap().get(&user_id).cloned().unwrap_or_default())
    }

    async fn merge_scope(&self, user_id: Uuid, scope: &CachedScope) -> Result<(), DatabaseError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(DatabaseError::QueryError("metadata write rejected".to_string()));
        }
        let mut scopes = self.scopes.lock().unwrap();
        let merged = scopes.get(&user_id).cloned().unwrap_or_default().merged(scope);
        scopes.insert(user_id, merged);
        self.writes.lock().unwrap().push((user_id, scope.clone()));
        Ok(())
    }
}

#[async_trait]
impl CatalogStore for InMemoryStore {
    async fn ping(&self) -> Result<(), DatabaseError> {
        self.read().map(|_| ())
    }

    async fn bucket_for_course(&self, course_id: Uuid) -> Result<Option<Uuid>, DatabaseError> {
        let tables = self.read()?;
        Ok(tables.courses.get(&course_id).map(|(bucket, _)| *bucket))
    }

    async fn list_files(&self, course_ids: &[Uuid], page: Page) -> Result<Vec<FileRecord>, DatabaseError> {
        let tables = self.read()?;
        Ok(tables
            .files
            .iter()
            .filter(|f| course_ids.contains(&f.course_id))
            .skip(page.offset() as usize)
            .take(page.limit() as usize)
            .cloned()
            .collect())
    }
}
