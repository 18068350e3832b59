//! Per-user session state and the multi-session manager.
//!
//! A [`SessionState`] owns the current raw dataset and pipeline for one user
//! and is passed to/returned from every controller operation - no ambient
//! global storage. Sessions are fully isolated from each other; the only
//! intentionally shared resource is the [`ResultCache`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::cache::{CacheConfig, CacheKey, ResultCache};
use crate::error::{LoadResult, SessionError, SessionResult};
use crate::models::{DerivedDataset, InputFormat, RawDataset};
use crate::parser;
use crate::transform::ops::Operation;
use crate::transform::pipeline::{run, Pipeline};

/// State for one user session.
pub struct SessionState {
    id: Uuid,
    created_at: DateTime<Utc>,
    raw: Option<Arc<RawDataset>>,
    pipeline: Pipeline,
    cache: Arc<ResultCache>,
}

impl SessionState {
    pub fn new(cache: Arc<ResultCache>) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            raw: None,
            pipeline: Pipeline::new(),
            cache,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn raw(&self) -> Option<&Arc<RawDataset>> {
        self.raw.as_ref()
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Replace the raw dataset and clear the pipeline, atomically.
    ///
    /// The new file is parsed first; on failure the session is left exactly
    /// as it was. On success no operation of the previous pipeline survives,
    /// since its column names and types may no longer be valid.
    pub fn upload(&mut self, bytes: &[u8], format: InputFormat) -> LoadResult<&Arc<RawDataset>> {
        let raw = parser::load_bytes(bytes, format)?;
        self.pipeline.clear();
        Ok(&*self.raw.insert(Arc::new(raw)))
    }

    /// Validate `op` against the schema of the current result, then append it.
    ///
    /// A rejected operation never enters the pipeline. When the current
    /// pipeline itself fails to run, the append is rejected with that error:
    /// the schema at the new operation's point of application is unknowable.
    pub fn append_operation(&mut self, op: Operation) -> SessionResult<()> {
        let current = self.current_result()?;
        op.validate(current.schema())?;
        self.pipeline.push(op);
        Ok(())
    }

    /// Remove the operation at `index`.
    pub fn remove_operation(&mut self, index: usize) -> SessionResult<Operation> {
        let len = self.pipeline.len();
        self.pipeline
            .remove(index)
            .ok_or(SessionError::IndexOutOfBounds { index, len })
    }

    /// Move the operation at `from` to position `to`.
    pub fn reorder(&mut self, from: usize, to: usize) -> SessionResult<()> {
        let len = self.pipeline.len();
        if self.pipeline.reorder(from, to) {
            Ok(())
        } else {
            Err(SessionError::IndexOutOfBounds {
                index: from.max(to),
                len,
            })
        }
    }

    /// Discard all operations, keeping the raw dataset.
    pub fn reset(&mut self) {
        self.pipeline.clear();
    }

    /// The derived dataset for the current (dataset, pipeline) state.
    ///
    /// Goes through the shared cache, so an unchanged state never recomputes;
    /// repeated calls between edits return the same `Arc`.
    pub fn current_result(&self) -> SessionResult<Arc<DerivedDataset>> {
        let raw = self.raw.as_ref().ok_or(SessionError::NoDataset)?;
        let key = CacheKey::new(raw.fingerprint(), self.pipeline.content_hash());
        let result = self
            .cache
            .get_or_compute(key, || run(raw, self.pipeline.ops()))?;
        Ok(result)
    }
}

/// Owner of all live sessions in a multi-tenant deployment.
///
/// Sessions share nothing but the result cache; a session is torn down by
/// [`SessionManager::remove`] or when the process ends (all "persistence" is
/// the in-memory session lifetime).
pub struct SessionManager {
    cache: Arc<ResultCache>,
    sessions: Mutex<HashMap<Uuid, SessionState>>,
}

impl SessionManager {
    pub fn new(cache_config: CacheConfig) -> Self {
        Self {
            cache: Arc::new(ResultCache::new(cache_config)),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    /// Create a new empty session and return its id.
    pub fn create(&self) -> Uuid {
        let session = SessionState::new(self.cache.clone());
        let id = session.id();
        self.sessions
            .lock()
            .expect("session lock poisoned")
            .insert(id, session);
        id
    }

    /// Tear a session down. Returns whether it existed.
    pub fn remove(&self, id: Uuid) -> bool {
        self.sessions
            .lock()
            .expect("session lock poisoned")
            .remove(&id)
            .is_some()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().expect("session lock poisoned").len()
    }

    /// Run `f` against the named session.
    pub fn with_session<T>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut SessionState) -> T,
    ) -> SessionResult<T> {
        let mut sessions = self.sessions.lock().expect("session lock poisoned");
        let session = sessions
            .get_mut(&id)
            .ok_or(SessionError::UnknownSession(id))?;
        Ok(f(session))
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}
