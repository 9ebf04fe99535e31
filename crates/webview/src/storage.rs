//! Storage Context Manager
//!
//! Maps profile ids to isolated storage/cookie contexts:
//! - empty id is the shared global context, never backed by a new directory
//! - a non-empty id gets one context, created on first use and reused after
//! - a profile that cannot get its own context degrades to the global one,
//!   without caching that, so the next request tries again

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::engine::{ContextHandle, ContextSettings, Engine};
use crate::error::{Error, Result};

/// Isolated storage scope shared by every session of one profile
#[derive(Debug, Clone, PartialEq)]
pub struct StorageContext {
    handle: ContextHandle,
    profile_id: Option<String>,
    cache_path: Option<PathBuf>,
    persist_session_cookies: bool,
}

impl StorageContext {
    fn global() -> Self {
        Self {
            handle: ContextHandle::GLOBAL,
            profile_id: None,
            cache_path: None,
            persist_session_cookies: false,
        }
    }

    pub fn handle(&self) -> ContextHandle {
        self.handle
    }

    /// `None` for the global context
    pub fn profile_id(&self) -> Option<&str> {
        self.profile_id.as_deref()
    }

    pub fn cache_path(&self) -> Option<&Path> {
        self.cache_path.as_deref()
    }

    pub fn persist_session_cookies(&self) -> bool {
        self.persist_session_cookies
    }

    pub fn is_global(&self) -> bool {
        self.handle.is_global()
    }
}

/// Outcome of [`StorageContextManager::resolve`]
#[derive(Debug)]
pub struct Resolved {
    pub context: Arc<StorageContext>,
    /// Why the profile fell back to the global context, if it did
    pub fallback: Option<Error>,
}

/// Directory name for a profile: `profile_` + 16 hex chars of SHA-256(id).
///
/// Stable across runs and builds, filesystem-safe for any id.
pub fn profile_dir_name(profile_id: &str) -> String {
    let digest = Sha256::digest(profile_id.as_bytes());
    let mut name = String::with_capacity(24);
    name.push_str("profile_");
    for byte in &digest[..8] {
        let _ = write!(name, "{:02x}", byte);
    }
    name
}

pub struct StorageContextManager {
    profiles_root: PathBuf,
    persist_session_cookies: bool,
    global: Arc<StorageContext>,
    contexts: HashMap<String, Arc<StorageContext>>,
}

impl StorageContextManager {
    pub fn new(cache_root: &Path, persist_session_cookies: bool) -> Self {
        Self {
            profiles_root: cache_root.join("profiles"),
            persist_session_cookies,
            global: Arc::new(StorageContext::global()),
            contexts: HashMap::new(),
        }
    }

    pub fn global(&self) -> Arc<StorageContext> {
        self.global.clone()
    }

    pub fn profile_path(&self, profile_id: &str) -> PathBuf {
        self.profiles_root.join(profile_dir_name(profile_id))
    }

    /// Context for `profile_id`, creating it on first use
    pub fn resolve(&mut self, engine: &mut dyn Engine, profile_id: &str) -> Resolved {
        if profile_id.is_empty() {
            tracing::debug!("Empty profile id, using global context");
            return Resolved {
                context: self.global(),
                fallback: None,
            };
        }

        if let Some(context) = self.contexts.get(profile_id) {
            tracing::debug!(profile = %profile_id, "Reusing storage context");
            return Resolved {
                context: context.clone(),
                fallback: None,
            };
        }

        let path = self.profile_path(profile_id);
        match self.create(engine, profile_id, path) {
            Ok(context) => {
                tracing::info!(
                    profile = %profile_id,
                    path = ?context.cache_path(),
                    "Created storage context"
                );
                self.contexts.insert(profile_id.to_string(), context.clone());
                Resolved {
                    context,
                    fallback: None,
                }
            }
            Err(err) => {
                tracing::warn!(
                    profile = %profile_id,
                    error = %err,
                    "Storage context unavailable, falling back to global context"
                );
                Resolved {
                    context: self.global(),
                    fallback: Some(err),
                }
            }
        }
    }

    fn create(
        &self,
        engine: &mut dyn Engine,
        profile_id: &str,
        path: PathBuf,
    ) -> Result<Arc<StorageContext>> {
        std::fs::create_dir_all(&path).map_err(|source| Error::Storage {
            profile: profile_id.to_string(),
            source,
        })?;

        let handle = engine.create_context(&ContextSettings {
            cache_path: path.clone(),
            persist_session_cookies: self.persist_session_cookies,
        })?;

        Ok(Arc::new(StorageContext {
            handle,
            profile_id: Some(profile_id.to_string()),
            cache_path: Some(path),
            persist_session_cookies: self.persist_session_cookies,
        }))
    }

    pub fn get(&self, profile_id: &str) -> Option<Arc<StorageContext>> {
        self.contexts.get(profile_id).cloned()
    }

    /// Number of profile contexts created so far (the global one excluded)
    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{shared_log, Call, FakeEngine};

    fn context_calls(engine: &FakeEngine) -> usize {
        engine
            .calls()
            .iter()
            .filter(|call| matches!(call, Call::CreateContext { .. }))
            .count()
    }

    #[test]
    fn test_profile_dir_name_is_stable_and_safe() {
        let name = profile_dir_name("alice");
        assert_eq!(name, profile_dir_name("alice"));
        assert_ne!(name, profile_dir_name("bob"));
        assert_eq!(name.len(), "profile_".len() + 16);
        assert!(name
            .trim_start_matches("profile_")
            .chars()
            .all(|c| c.is_ascii_hexdigit()));

        let odd = profile_dir_name("../../etc/passwd \u{0}");
        assert!(odd.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));
    }

    #[test]
    fn test_empty_profile_is_global_without_storage() {
        let root = tempfile::tempdir().unwrap();
        let mut engine = FakeEngine::detached(shared_log());
        let mut manager = StorageContextManager::new(root.path(), true);

        let first = manager.resolve(&mut engine, "");
        let second = manager.resolve(&mut engine, "");

        assert!(first.context.is_global());
        assert!(Arc::ptr_eq(&first.context, &second.context));
        assert!(Arc::ptr_eq(&first.context, &manager.global()));
        assert!(first.fallback.is_none());
        assert!(!root.path().join("profiles").exists());
        assert_eq!(context_calls(&engine), 0);
    }

    #[test]
    fn test_same_profile_reuses_context() {
        let root = tempfile::tempdir().unwrap();
        let mut engine = FakeEngine::detached(shared_log());
        let mut manager = StorageContextManager::new(root.path(), true);

        let first = manager.resolve(&mut engine, "alice").context;
        let second = manager.resolve(&mut engine, "alice").context;
        let global = manager.resolve(&mut engine, "").context;

        assert!(Arc::ptr_eq(&first, &second));
        assert!(!first.is_global());
        assert!(global.is_global());
        assert_eq!(first.profile_id(), Some("alice"));
        assert_eq!(first.cache_path(), Some(manager.profile_path("alice").as_path()));
        assert!(first.persist_session_cookies());
        assert!(manager.profile_path("alice").is_dir());
        assert_eq!(context_calls(&engine), 1);
    }

    #[test]
    fn test_distinct_profiles_are_isolated() {
        let root = tempfile::tempdir().unwrap();
        let mut engine = FakeEngine::detached(shared_log());
        let mut manager = StorageContextManager::new(root.path(), false);

        let alice = manager.resolve(&mut engine, "alice").context;
        let bob = manager.resolve(&mut engine, "bob").context;

        assert!(!Arc::ptr_eq(&alice, &bob));
        assert_ne!(alice.handle(), bob.handle());
        assert_ne!(alice.cache_path(), bob.cache_path());
        assert_eq!(manager.len(), 2);
    }

    #[test]
    fn test_engine_failure_falls_back_without_caching() {
        let root = tempfile::tempdir().unwrap();
        let log = shared_log();
        let mut engine = FakeEngine::detached(log.clone());
        let mut manager = StorageContextManager::new(root.path(), true);

        log.lock().fail_contexts = true;
        let resolved = manager.resolve(&mut engine, "carol");
        assert!(resolved.context.is_global());
        assert!(matches!(resolved.fallback, Some(Error::Engine(_))));
        assert!(manager.get("carol").is_none());

        log.lock().fail_contexts = false;
        let retried = manager.resolve(&mut engine, "carol");
        assert!(!retried.context.is_global());
        assert!(retried.fallback.is_none());
        assert!(manager.get("carol").is_some());
    }

    #[test]
    fn test_directory_failure_falls_back() {
        let root = tempfile::tempdir().unwrap();
        // A file where the profiles directory should go
        std::fs::write(root.path().join("profiles"), b"not a directory").unwrap();

        let mut engine = FakeEngine::detached(shared_log());
        let mut manager = StorageContextManager::new(root.path(), true);

        let resolved = manager.resolve(&mut engine, "dave");
        assert!(resolved.context.is_global());
        assert!(matches!(resolved.fallback, Some(Error::Storage { .. })));
        assert_eq!(context_calls(&engine), 0);
        assert!(manager.is_empty());
    }
}
