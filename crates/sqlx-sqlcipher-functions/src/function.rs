//! Application-defined scalar SQL functions.
//!
//! Functions are registered per connection through `sqlite3_create_function_v2`.
//! Each registration owns a boxed `FunctionContext` passed as the function's
//! user data; SQLite frees it through `destroy_context` when the function is
//! replaced, the connection closes, or registration fails.

use std::ffi::{CString, c_char, c_int, c_void};
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use libsqlite3_sys::{
   SQLITE_OK, SQLITE_TRANSIENT, SQLITE_UTF8, sqlite3, sqlite3_context, sqlite3_create_function_v2,
   sqlite3_result_blob, sqlite3_result_double, sqlite3_result_error, sqlite3_result_int64,
   sqlite3_result_null, sqlite3_result_text, sqlite3_user_data, sqlite3_value,
};
use tracing::{debug, error};

use crate::error::Error;
use crate::value::SqliteValue;

/// Callback invoked for each row the function is evaluated on.
///
/// `Ok(None)` yields SQL NULL. `Err(message)` aborts the statement with
/// `message` as the error text.
pub type FunctionCallback =
   Arc<dyn Fn(&[SqliteValue]) -> Result<Option<SqliteValue>, String> + Send + Sync>;

/// A scalar SQL function definition.
#[derive(Clone)]
pub struct CustomFunction {
   name: String,
   num_args: i32,
   callback: FunctionCallback,
}

impl CustomFunction {
   /// Defines a function callable from SQL as `name(...)`.
   ///
   /// `num_args` is the exact argument count, or -1 for any number of
   /// arguments. SQLite treats functions with the same name but different
   /// argument counts as distinct.
   pub fn new<F>(name: impl Into<String>, num_args: i32, callback: F) -> crate::Result<Self>
   where
      F: Fn(&[SqliteValue]) -> Result<Option<SqliteValue>, String> + Send + Sync + 'static,
   {
      let name = name.into();
      let valid_name = name
         .chars()
         .next()
         .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
         && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
      if !valid_name {
         return Err(Error::InvalidName(name));
      }
      if !(-1..=127).contains(&num_args) {
         return Err(Error::InvalidArgumentCount(num_args));
      }

      Ok(Self {
         name,
         num_args,
         callback: Arc::new(callback),
      })
   }

   pub fn name(&self) -> &str {
      &self.name
   }

   pub fn num_args(&self) -> i32 {
      self.num_args
   }

   /// Whether `other` occupies the same slot on a connection.
   pub(crate) fn same_signature(&self, other: &CustomFunction) -> bool {
      self.num_args == other.num_args && self.name.eq_ignore_ascii_case(&other.name)
   }

   /// Invokes the callback directly, outside SQLite.
   pub fn call(&self, args: &[SqliteValue]) -> Result<Option<SqliteValue>, String> {
      (self.callback)(args)
   }
}

impl fmt::Debug for CustomFunction {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_struct("CustomFunction")
         .field("name", &self.name)
         .field("num_args", &self.num_args)
         .finish_non_exhaustive()
   }
}

/// User data attached to a registered function.
struct FunctionContext {
   name: String,
   callback: FunctionCallback,
}

/// Registers `function` on a raw SQLite connection, replacing any function
/// with the same name and argument count.
///
/// # Safety
///
/// - `db` must be a valid pointer to an open sqlite3 connection
/// - The caller must have exclusive use of the connection for the duration
///   of the call (e.g. hold sqlx's `lock_handle` guard)
pub unsafe fn register_function(db: *mut sqlite3, function: &CustomFunction) -> crate::Result<()> {
   let c_name =
      CString::new(function.name.as_str()).map_err(|_| Error::InvalidName(function.name.clone()))?;

   let context = Box::new(FunctionContext {
      name: function.name.clone(),
      callback: Arc::clone(&function.callback),
   });
   // Ownership passes to SQLite, which calls destroy_context exactly once,
   // including when registration fails.
   let context_ptr = Box::into_raw(context) as *mut c_void;

   // SAFETY: db is valid (guaranteed by caller); c_name outlives the call
   // because SQLite copies the name.
   let rc = unsafe {
      sqlite3_create_function_v2(
         db,
         c_name.as_ptr(),
         function.num_args as c_int,
         SQLITE_UTF8,
         context_ptr,
         Some(call_function),
         None,
         None,
         Some(destroy_context),
      )
   };

   if rc != SQLITE_OK {
      error!("Failed to register SQL function {}: {}", function.name, rc);
      return Err(Error::Registration {
         name: function.name.clone(),
         code: rc,
      });
   }

   debug!("Registered SQL function {}/{}", function.name, function.num_args);
   Ok(())
}

unsafe extern "C" fn destroy_context(user_data: *mut c_void) {
   if !user_data.is_null() {
      // SAFETY: user_data was created by Box::into_raw in register_function
      drop(unsafe { Box::from_raw(user_data as *mut FunctionContext) });
   }
}

/// Scalar function entry point called by SQLite.
unsafe extern "C" fn call_function(
   ctx: *mut sqlite3_context,
   argc: c_int,
   argv: *mut *mut sqlite3_value,
) {
   // SAFETY: ctx is valid for this call; user data was set in register_function.
   let user_data = unsafe { sqlite3_user_data(ctx) } as *const FunctionContext;
   if user_data.is_null() {
      unsafe { sqlite3_result_null(ctx) };
      return;
   }

   // SAFETY: user_data stays alive until destroy_context runs, which cannot
   // happen while the function is executing.
   let context = unsafe { &*user_data };

   // Catch any panics to prevent unwinding across the FFI boundary (which is UB).
   let outcome = catch_unwind(AssertUnwindSafe(|| {
      let args: Vec<SqliteValue> = if argv.is_null() || argc <= 0 {
         Vec::new()
      } else {
         (0..argc as usize)
            // SAFETY: argv holds argc valid value pointers for this call
            .map(|i| unsafe { SqliteValue::from_raw(*argv.add(i)) })
            .collect()
      };

      (context.callback)(&args)
   }));

   match outcome {
      Ok(Ok(value)) => unsafe { set_result(ctx, value.unwrap_or(SqliteValue::Null)) },
      Ok(Err(message)) => unsafe { set_error(ctx, &message) },
      Err(_) => {
         error!("SQL function {} panicked", context.name);
         unsafe { set_error(ctx, "panic in application-defined function") }
      }
   }
}

/// # Safety
///
/// `ctx` must be the context of the currently executing function call.
unsafe fn set_result(ctx: *mut sqlite3_context, value: SqliteValue) {
   // SAFETY: SQLITE_TRANSIENT makes SQLite copy text and blobs before we free them
   unsafe {
      match value {
         SqliteValue::Null => sqlite3_result_null(ctx),
         SqliteValue::Integer(i) => sqlite3_result_int64(ctx, i),
         SqliteValue::Real(f) => sqlite3_result_double(ctx, f),
         SqliteValue::Text(s) => sqlite3_result_text(
            ctx,
            s.as_ptr() as *const c_char,
            s.len() as c_int,
            SQLITE_TRANSIENT(),
         ),
         SqliteValue::Blob(b) => sqlite3_result_blob(
            ctx,
            b.as_ptr() as *const c_void,
            b.len() as c_int,
            SQLITE_TRANSIENT(),
         ),
      }
   }
}

/// # Safety
///
/// `ctx` must be the context of the currently executing function call.
unsafe fn set_error(ctx: *mut sqlite3_context, message: &str) {
   // SAFETY: the message is copied by SQLite before returning
   unsafe { sqlite3_result_error(ctx, message.as_ptr() as *const c_char, message.len() as c_int) };
}

#[cfg(test)]
mod tests {
   use super::*;

   fn noop(_: &[SqliteValue]) -> Result<Option<SqliteValue>, String> {
      Ok(None)
   }

   #[test]
   fn test_name_validation() {
      assert!(CustomFunction::new("my_func", 1, noop).is_ok());
      assert!(CustomFunction::new("_x2", 0, noop).is_ok());
      assert!(matches!(CustomFunction::new("", 1, noop), Err(Error::InvalidName(_))));
      assert!(matches!(CustomFunction::new("9lives", 1, noop), Err(Error::InvalidName(_))));
      assert!(matches!(CustomFunction::new("drop table", 1, noop), Err(Error::InvalidName(_))));
   }

   #[test]
   fn test_argument_count_bounds() {
      assert!(CustomFunction::new("f", -1, noop).is_ok());
      assert!(CustomFunction::new("f", 127, noop).is_ok());
      assert!(matches!(CustomFunction::new("f", 128, noop), Err(Error::InvalidArgumentCount(128))));
      assert!(matches!(CustomFunction::new("f", -2, noop), Err(Error::InvalidArgumentCount(-2))));
   }

   #[test]
   fn test_signature_matching_ignores_case() {
      let a = CustomFunction::new("Upper2", 1, noop).unwrap();
      let b = CustomFunction::new("upper2", 1, noop).unwrap();
      let c = CustomFunction::new("upper2", 2, noop).unwrap();
      assert!(a.same_signature(&b));
      assert!(!a.same_signature(&c));
   }

   #[test]
   fn test_call_runs_callback() {
      let f = CustomFunction::new("twice", 1, |args| {
         Ok(args[0].as_i64().map(|v| SqliteValue::Integer(v * 2)))
      })
      .unwrap();
      assert_eq!(f.call(&[SqliteValue::Integer(21)]), Ok(Some(SqliteValue::Integer(42))));
   }
}
