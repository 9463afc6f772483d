//! Removal of a database file and its sidecar files

use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::registry::is_memory_database;

fn sibling(path: &Path, suffix: &str) -> PathBuf {
   let mut name = OsString::from(path.as_os_str());
   name.push(suffix);
   PathBuf::from(name)
}

fn remove(path: &Path) -> bool {
   match std::fs::remove_file(path) {
      Ok(()) => {
         warn!("deleted database file {}", path.display());
         true
      }
      Err(e) if e.kind() == ErrorKind::NotFound => false,
      Err(e) => {
         warn!("could not delete {}: {}", path.display(), e);
         false
      }
   }
}

/// Deletes a database file together with its rollback journal, WAL, shared
/// memory index and any `<name>-mj*` master journals left beside it.
///
/// Returns `true` if any file was deleted. In-memory and empty paths are
/// ignored. Callers must close every connection to the database first.
pub fn delete_database_files(path: impl AsRef<Path>) -> bool {
   let path = path.as_ref();
   if path.as_os_str().is_empty() || is_memory_database(path) {
      return false;
   }

   let mut deleted = remove(path);
   for suffix in ["-journal", "-shm", "-wal"] {
      deleted |= remove(&sibling(path, suffix));
   }

   let Some(file_name) = path.file_name() else {
      return deleted;
   };
   let mut prefix = OsString::from(file_name);
   prefix.push("-mj");
   let Some(prefix) = prefix.to_str().map(str::to_owned) else {
      return deleted;
   };

   let dir = match path.parent() {
      Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
      _ => PathBuf::from("."),
   };
   if let Ok(entries) = std::fs::read_dir(&dir) {
      for entry in entries.flatten() {
         if entry.file_name().to_str().is_some_and(|n| n.starts_with(&prefix)) {
            deleted |= remove(&entry.path());
         }
      }
   }

   deleted
}

#[cfg(test)]
mod tests {
   use super::*;
   use tempfile::TempDir;

   #[test]
   fn test_deletes_main_file_and_sidecars() {
      let dir = TempDir::new().unwrap();
      let db = dir.path().join("app.db");
      for name in ["app.db", "app.db-journal", "app.db-wal", "app.db-shm", "app.db-mj1A2B"] {
         std::fs::write(dir.path().join(name), b"x").unwrap();
      }
      std::fs::write(dir.path().join("other.db"), b"x").unwrap();

      assert!(delete_database_files(&db));

      let remaining: Vec<_> = std::fs::read_dir(dir.path())
         .unwrap()
         .map(|e| e.unwrap().file_name().into_string().unwrap())
         .collect();
      assert_eq!(remaining, vec!["other.db".to_string()]);
   }

   #[test]
   fn test_missing_files_report_false() {
      let dir = TempDir::new().unwrap();
      assert!(!delete_database_files(dir.path().join("absent.db")));
   }

   #[test]
   fn test_memory_and_empty_paths_are_ignored() {
      assert!(!delete_database_files(":memory:"));
      assert!(!delete_database_files(""));
   }
}
