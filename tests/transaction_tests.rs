use std::sync::{Arc, Mutex};
use std::time::Duration;

use sqlcipher_db::{Error, SqlCipherDatabase, SqlValue, TransactionListener};
use tempfile::TempDir;

async fn create_test_db() -> (SqlCipherDatabase, TempDir) {
   let temp_dir = TempDir::new().expect("Failed to create temp directory");
   let db = SqlCipherDatabase::open_or_create_database(temp_dir.path().join("transactions.db"))
      .await
      .expect("Failed to open test database");

   db.exec_sql("CREATE TABLE test (num INTEGER)").await.unwrap();
   db.exec_sql("INSERT INTO test (num) VALUES (0)").await.unwrap();

   (db, temp_dir)
}

async fn set_num(db: &SqlCipherDatabase, num: i64) {
   db.exec_sql_with_args("UPDATE test SET num = ?", vec![SqlValue::Integer(num)])
      .await
      .unwrap();
}

async fn num(db: &SqlCipherDatabase) -> i64 {
   db.compile_statement("SELECT num FROM test")
      .await
      .unwrap()
      .simple_query_for_long()
      .await
      .unwrap()
}

#[tokio::test]
async fn test_single_level_transactions() {
   let (db, _temp) = create_test_db().await;

   // Committed
   db.begin_transaction().await.unwrap();
   assert!(db.in_transaction().await);
   assert!(db.is_db_locked().await);
   set_num(&db, 1).await;
   db.set_transaction_successful().await.unwrap();
   db.end_transaction().await.unwrap();
   assert_eq!(num(&db).await, 1);
   assert!(!db.in_transaction().await);
   assert!(!db.is_db_locked().await);

   // Rolled back
   set_num(&db, 0).await;
   db.begin_transaction().await.unwrap();
   set_num(&db, 1).await;
   db.end_transaction().await.unwrap();
   assert_eq!(num(&db).await, 0);

   db.close().await.unwrap();
}

#[tokio::test]
async fn test_transaction_modes() {
   let (db, _temp) = create_test_db().await;

   db.begin_transaction_non_exclusive().await.unwrap();
   set_num(&db, 7).await;
   db.set_transaction_successful().await.unwrap();
   db.end_transaction().await.unwrap();
   assert_eq!(num(&db).await, 7);

   db.begin_transaction_deferred().await.unwrap();
   set_num(&db, 8).await;
   db.set_transaction_successful().await.unwrap();
   db.end_transaction().await.unwrap();
   assert_eq!(num(&db).await, 8);

   db.close().await.unwrap();
}

#[tokio::test]
async fn test_marking_successful_twice_fails() {
   let (db, _temp) = create_test_db().await;

   db.begin_transaction().await.unwrap();
   db.set_transaction_successful().await.unwrap();
   let err = db.set_transaction_successful().await.unwrap_err();
   assert!(matches!(err, Error::IllegalState(_)));
   assert!(err.to_string().contains("already been marked successful"));
   db.end_transaction().await.unwrap();

   db.close().await.unwrap();
}

#[tokio::test]
async fn test_begin_after_marking_successful_fails() {
   let (db, _temp) = create_test_db().await;

   db.begin_transaction().await.unwrap();
   db.set_transaction_successful().await.unwrap();
   let err = db.begin_transaction().await.unwrap_err();
   assert!(matches!(err, Error::IllegalState(_)));
   assert_eq!(db.transaction_depth().await, 1);
   db.end_transaction().await.unwrap();
   assert!(!db.in_transaction().await);

   db.close().await.unwrap();
}

#[tokio::test]
async fn test_no_current_transaction() {
   let (db, _temp) = create_test_db().await;

   let err = db.end_transaction().await.unwrap_err();
   assert_eq!(
      err.to_string(),
      "Cannot perform this operation because there is no current transaction."
   );
   assert!(matches!(db.set_transaction_successful().await, Err(Error::IllegalState(_))));

   db.close().await.unwrap();
}

#[tokio::test]
async fn test_nested_transactions_commit() {
   let (db, _temp) = create_test_db().await;

   db.begin_transaction().await.unwrap();
   set_num(&db, 1).await;
   db.begin_transaction().await.unwrap();
   assert_eq!(db.transaction_depth().await, 2);
   set_num(&db, 2).await;
   db.set_transaction_successful().await.unwrap();
   db.end_transaction().await.unwrap();
   assert_eq!(db.transaction_depth().await, 1);
   db.set_transaction_successful().await.unwrap();
   db.end_transaction().await.unwrap();

   assert_eq!(num(&db).await, 2);
   db.close().await.unwrap();
}

#[tokio::test]
async fn test_nested_transaction_failures_roll_back_everything() {
   let (db, _temp) = create_test_db().await;

   // (inner successful, outer successful)
   for (inner, outer) in [(false, true), (true, false), (false, false)] {
      set_num(&db, 0).await;
      db.begin_transaction().await.unwrap();
      set_num(&db, 1).await;
      db.begin_transaction().await.unwrap();
      set_num(&db, 2).await;
      if inner {
         db.set_transaction_successful().await.unwrap();
      }
      db.end_transaction().await.unwrap();
      if outer {
         db.set_transaction_successful().await.unwrap();
      }
      db.end_transaction().await.unwrap();

      assert_eq!(num(&db).await, 0, "inner: {inner}, outer: {outer}");
   }

   db.close().await.unwrap();
}

#[tokio::test]
async fn test_close_rolls_back_open_transaction() {
   let (db, temp) = create_test_db().await;

   db.begin_transaction().await.unwrap();
   set_num(&db, 5).await;
   db.close().await.unwrap();

   let db = SqlCipherDatabase::open_or_create_database(temp.path().join("transactions.db"))
      .await
      .unwrap();
   assert_eq!(num(&db).await, 0);
   db.close().await.unwrap();
}

#[derive(Default)]
struct RecordingListener {
   events: Mutex<Vec<&'static str>>,
   fail_begin: bool,
   fail_commit: bool,
}

impl RecordingListener {
   fn events(&self) -> Vec<&'static str> {
      self.events.lock().unwrap().clone()
   }
}

impl TransactionListener for RecordingListener {
   fn on_begin(&self) -> sqlcipher_db::Result<()> {
      self.events.lock().unwrap().push("begin");
      if self.fail_begin {
         return Err(Error::Listener("begin refused".into()));
      }
      Ok(())
   }

   fn on_commit(&self) -> sqlcipher_db::Result<()> {
      self.events.lock().unwrap().push("commit");
      if self.fail_commit {
         return Err(Error::Listener("commit refused".into()));
      }
      Ok(())
   }

   fn on_rollback(&self) -> sqlcipher_db::Result<()> {
      self.events.lock().unwrap().push("rollback");
      Ok(())
   }
}

#[tokio::test]
async fn test_listener_commit_and_rollback() {
   let (db, _temp) = create_test_db().await;

   let listener = Arc::new(RecordingListener::default());
   db.begin_transaction_with_listener(listener.clone()).await.unwrap();
   set_num(&db, 3).await;
   db.set_transaction_successful().await.unwrap();
   db.end_transaction().await.unwrap();
   assert_eq!(listener.events(), vec!["begin", "commit"]);
   assert_eq!(num(&db).await, 3);

   let listener = Arc::new(RecordingListener::default());
   db.begin_transaction_with_listener(listener.clone()).await.unwrap();
   set_num(&db, 4).await;
   db.end_transaction().await.unwrap();
   assert_eq!(listener.events(), vec!["begin", "rollback"]);
   assert_eq!(num(&db).await, 3);

   db.close().await.unwrap();
}

#[tokio::test]
async fn test_nested_listeners_see_child_failure() {
   let (db, _temp) = create_test_db().await;

   let outer = Arc::new(RecordingListener::default());
   let inner = Arc::new(RecordingListener::default());
   db.begin_transaction_with_listener(outer.clone()).await.unwrap();
   db.begin_transaction_with_listener(inner.clone()).await.unwrap();
   set_num(&db, 9).await;
   db.end_transaction().await.unwrap();
   db.set_transaction_successful().await.unwrap();
   db.end_transaction().await.unwrap();

   assert_eq!(inner.events(), vec!["begin", "rollback"]);
   assert_eq!(outer.events(), vec!["begin", "rollback"]);
   assert_eq!(num(&db).await, 0);

   db.close().await.unwrap();
}

#[tokio::test]
async fn test_listener_refusing_begin() {
   let (db, _temp) = create_test_db().await;

   let listener = Arc::new(RecordingListener {
      fail_begin: true,
      ..Default::default()
   });
   let err = db.begin_transaction_with_listener(listener.clone()).await.unwrap_err();
   assert!(matches!(err, Error::Listener(_)));
   assert!(!db.in_transaction().await);
   assert!(!db.is_db_locked().await);

   // The handle is usable afterwards
   set_num(&db, 6).await;
   assert_eq!(num(&db).await, 6);

   db.close().await.unwrap();
}

#[tokio::test]
async fn test_listener_refusing_commit_rolls_back() {
   let (db, _temp) = create_test_db().await;

   let listener = Arc::new(RecordingListener {
      fail_commit: true,
      ..Default::default()
   });
   db.begin_transaction_with_listener(listener.clone()).await.unwrap();
   set_num(&db, 2).await;
   db.set_transaction_successful().await.unwrap();
   let err = db.end_transaction().await.unwrap_err();
   assert!(matches!(err, Error::Listener(_)));

   assert!(!db.in_transaction().await);
   assert_eq!(num(&db).await, 0);

   db.close().await.unwrap();
}

#[tokio::test]
async fn test_other_handle_waits_for_transaction() {
   let (db, temp) = create_test_db().await;
   let other = Arc::new(
      SqlCipherDatabase::open_or_create_database(temp.path().join("transactions.db"))
         .await
         .unwrap(),
   );

   db.begin_transaction().await.unwrap();
   set_num(&db, 1).await;

   let writer = Arc::clone(&other);
   let pending = tokio::spawn(async move { set_num(&writer, 2).await });

   tokio::time::sleep(Duration::from_millis(100)).await;
   assert!(!pending.is_finished());

   db.set_transaction_successful().await.unwrap();
   db.end_transaction().await.unwrap();
   pending.await.unwrap();

   assert_eq!(num(&db).await, 2);
   other.close().await.unwrap();
   db.close().await.unwrap();
}
