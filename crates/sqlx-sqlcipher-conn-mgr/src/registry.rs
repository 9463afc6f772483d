//! Process-wide cache of open databases keyed by absolute file path

use crate::Result;
use crate::database::SqliteDatabase;
use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, Weak};
use tokio::sync::Mutex;
use tracing::debug;

/// Holds `Weak` references so dropping the last `Arc` frees the database
/// without an explicit close.
static DATABASES: LazyLock<Mutex<HashMap<PathBuf, Weak<SqliteDatabase>>>> =
   LazyLock::new(|| Mutex::new(HashMap::new()));

/// Whether `path` names an in-memory database.
pub(crate) fn is_memory_database(path: &Path) -> bool {
   match path.to_str() {
      Some(p) => p == ":memory:" || p.starts_with("file::memory:") || p.contains("mode=memory"),
      None => false,
   }
}

fn registry_key(path: &Path) -> PathBuf {
   std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Returns the cached database for `path` when `reusable` accepts it, or
/// opens a new one.
///
/// Only a database opened for a path with no live entry is cached; one
/// opened because `reusable` refused the cached instance stays private to its
/// caller. In-memory databases bypass the cache: every call yields an
/// independent database. The registry lock is held while opening so two
/// concurrent callers never open the same file twice.
pub(crate) async fn get_or_open_database<R, F, Fut>(
   path: &Path,
   reusable: R,
   open: F,
) -> Result<Arc<SqliteDatabase>>
where
   R: FnOnce(&SqliteDatabase) -> bool,
   F: FnOnce() -> Fut,
   Fut: Future<Output = Result<SqliteDatabase>>,
{
   if is_memory_database(path) {
      return open().await.map(Arc::new);
   }

   let key = registry_key(path);
   let mut databases = DATABASES.lock().await;

   if let Some(db) = databases.get(&key).and_then(Weak::upgrade)
      && !db.is_closed()
   {
      if reusable(&db) {
         db.retain();
         debug!("Reusing open database {}", key.display());
         return Ok(db);
      }
      debug!("Opening a separate instance of {} with its own settings", key.display());
      return open().await.map(Arc::new);
   }

   let db = Arc::new(open().await?);
   databases.insert(key, Arc::downgrade(&db));
   Ok(db)
}

/// Drops one handle on `db` under the registry lock, so a concurrent connect
/// cannot revive it in between.
///
/// When that was the last handle, or nothing else holds the database, it is
/// marked closed and its registry entry removed. Returns whether that
/// happened.
pub(crate) async fn release_database(db: &Arc<SqliteDatabase>) -> bool {
   let mut databases = DATABASES.lock().await;
   if db.is_closed() {
      return false;
   }

   let last = db.drop_handle() || Arc::strong_count(db) == 1;
   if last {
      db.mark_closed();
      let key = registry_key(db.path());
      if databases
         .get(&key)
         .is_some_and(|weak| std::ptr::eq(weak.as_ptr(), Arc::as_ptr(db)))
      {
         databases.remove(&key);
      }
   }
   last
}

/// Drops the registry entry for `path` if it is dead or closed.
pub(crate) async fn uncache_database(path: &Path) {
   if is_memory_database(path) {
      return;
   }

   let key = registry_key(path);
   let mut databases = DATABASES.lock().await;
   let stale = databases
      .get(&key)
      .is_some_and(|weak| weak.upgrade().is_none_or(|db| db.is_closed()));

   if stale {
      databases.remove(&key);
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn test_memory_paths() {
      assert!(is_memory_database(Path::new(":memory:")));
      assert!(is_memory_database(Path::new("file::memory:?cache=shared")));
      assert!(is_memory_database(Path::new("file:db1?mode=memory")));
      assert!(!is_memory_database(Path::new("memory.db")));
   }

   #[test]
   fn test_relative_and_absolute_paths_share_a_key() {
      let cwd = std::env::current_dir().unwrap();
      assert_eq!(registry_key(Path::new("a.db")), cwd.join("a.db"));
   }
}
