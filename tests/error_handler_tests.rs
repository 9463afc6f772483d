use std::path::Path;
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use sqlcipher_db::{
   DatabaseErrorHandler, DefaultDatabaseErrorHandler, Error, OpenOptions, SqlCipherDatabase,
};
use tempfile::TempDir;

fn init_tracing() {
   let _ = tracing_subscriber::fmt()
      .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
      .with_test_writer()
      .try_init();
}

/// With a codec nothing is deleted, since the right key may still open the
/// file.
fn assert_deleted(path: impl AsRef<Path>) {
   let path = path.as_ref();
   if SqlCipherDatabase::has_codec() {
      assert!(path.exists(), "{} should be kept", path.display());
   } else {
      assert!(!path.exists(), "{} should be deleted", path.display());
   }
}

fn corruption() -> Error {
   Error::IllegalState("simulated corruption".into())
}

#[tokio::test]
async fn test_default_handler_on_closed_database() {
   init_tracing();
   let temp = TempDir::new().unwrap();
   let path = temp.path().join("closed.db");
   let db = SqlCipherDatabase::open_or_create_database(&path).await.unwrap();
   db.exec_sql("CREATE TABLE t (a INTEGER)").await.unwrap();
   db.close().await.unwrap();
   assert!(!db.is_open());
   assert!(path.exists());

   DefaultDatabaseErrorHandler::new().on_corruption(&db, &corruption()).await;
   assert_deleted(&path);
}

#[tokio::test]
async fn test_default_handler_skips_memory_database() {
   init_tracing();
   let db = SqlCipherDatabase::open_or_create_database(":memory:").await.unwrap();
   db.close().await.unwrap();
   DefaultDatabaseErrorHandler::new().on_corruption(&db, &corruption()).await;

   let db = SqlCipherDatabase::open_or_create_database(":memory:").await.unwrap();
   DefaultDatabaseErrorHandler::new().on_corruption(&db, &corruption()).await;
   if !SqlCipherDatabase::has_codec() {
      assert!(!db.is_open());
   }
}

#[tokio::test]
async fn test_default_handler_on_open_database() {
   init_tracing();
   let temp = TempDir::new().unwrap();
   let path = temp.path().join("open.db");
   let db = SqlCipherDatabase::open_or_create_database(&path).await.unwrap();
   db.exec_sql("CREATE TABLE t (a INTEGER)").await.unwrap();
   assert!(db.is_open());
   assert!(path.exists());

   DefaultDatabaseErrorHandler::new().on_corruption(&db, &corruption()).await;
   assert_deleted(&path);
   if !SqlCipherDatabase::has_codec() {
      assert!(!db.is_open());
   }
}

#[tokio::test]
async fn test_default_handler_deletes_attached_databases() {
   init_tracing();
   let temp = TempDir::new().unwrap();
   let path = temp.path().join("attached.db");
   let path_str = path.to_str().unwrap().to_string();
   let attached: Vec<String> = (0..5).map(|i| format!("{}{}", path_str, i)).collect();

   let db = SqlCipherDatabase::open_or_create_database(&path).await.unwrap();
   db.exec_sql("CREATE TABLE t (a INTEGER)").await.unwrap();
   db.exec_sql("ATTACH DATABASE ':memory:' AS memoryDb").await.unwrap();
   for (i, file) in attached.iter().enumerate() {
      db.attach_database(file, &format!("attachedDb{}", i)).await.unwrap();
   }

   assert!(path.exists());
   for file in &attached {
      assert!(Path::new(file).exists(), "{} should exist after ATTACH", file);
   }
   assert_eq!(
      db.attached_dbs()
         .await
         .unwrap()
         .unwrap()
         .iter()
         .filter(|(schema, _)| schema.starts_with("attachedDb"))
         .count(),
      5
   );

   DefaultDatabaseErrorHandler::new().on_corruption(&db, &corruption()).await;
   assert_deleted(&path);
   for file in &attached {
      assert_deleted(file);
   }
}

#[derive(Clone, Default)]
struct RecordingHandler {
   reports: Arc<Mutex<Vec<(String, bool)>>>,
}

impl DatabaseErrorHandler for RecordingHandler {
   fn on_corruption<'a>(&'a self, db: &'a SqlCipherDatabase, error: &'a Error) -> BoxFuture<'a, ()> {
      Box::pin(async move {
         self.reports.lock().unwrap().push((db.path().to_string(), error.is_corruption()));
      })
   }
}

#[tokio::test]
async fn test_handler_only_sees_corruption() {
   init_tracing();
   let temp = TempDir::new().unwrap();
   let handler = RecordingHandler::default();
   let db = SqlCipherDatabase::open(
      temp.path().join("recorded.db"),
      OpenOptions::new().error_handler(handler.clone()),
   )
   .await
   .unwrap();

   assert!(db.exec_sql("SELEC 1").await.is_err());
   assert!(db.raw_query("SELECT * FROM missing", &[]).await.is_err());
   assert!(handler.reports.lock().unwrap().is_empty());

   db.close().await.unwrap();
}

#[tokio::test]
async fn test_handler_called_when_file_is_overwritten() {
   init_tracing();
   let temp = TempDir::new().unwrap();
   let path = temp.path().join("overwritten.db");
   let handler = RecordingHandler::default();
   let db = SqlCipherDatabase::open(&path, OpenOptions::new().error_handler(handler.clone()))
      .await
      .unwrap();
   db.exec_sql("CREATE TABLE t (a INTEGER)").await.unwrap();
   db.exec_sql("INSERT INTO t VALUES (1)").await.unwrap();

   // Rewrite the file in place so the open connection reads the garbage
   std::fs::write(&path, vec![0x5au8; 8192]).unwrap();

   let err = db.raw_query("SELECT a FROM t WHERE a > 0", &[]).await.unwrap_err();
   assert!(err.is_corruption(), "unexpected error: {err}");

   let reports = handler.reports.lock().unwrap().clone();
   assert_eq!(reports, vec![(db.path().to_string(), true)]);

   db.close().await.unwrap();
}
