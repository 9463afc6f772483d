//! Values crossing the SQL function boundary.

use std::borrow::Cow;

use libsqlite3_sys::{
   SQLITE_BLOB, SQLITE_FLOAT, SQLITE_INTEGER, SQLITE_NULL, SQLITE_TEXT, sqlite3_value,
   sqlite3_value_blob, sqlite3_value_bytes, sqlite3_value_double, sqlite3_value_int64,
   sqlite3_value_text, sqlite3_value_type,
};

/// A dynamically typed SQLite value.
///
/// Arguments handed to a [`CustomFunction`](crate::CustomFunction) arrive as
/// `SqliteValue`s, and the callback returns one as its result.
#[derive(Debug, Clone, PartialEq)]
pub enum SqliteValue {
   Null,
   Integer(i64),
   Real(f64),
   Text(String),
   Blob(Vec<u8>),
}

impl SqliteValue {
   /// Extracts a value from a raw sqlite3_value pointer.
   ///
   /// # Safety
   ///
   /// The pointer must be null or point to a properly initialized sqlite3_value
   /// that stays valid for the duration of this call.
   pub unsafe fn from_raw(value: *mut sqlite3_value) -> Self {
      if value.is_null() {
         return SqliteValue::Null;
      }

      // SAFETY: value is non-null and valid for the duration of the callback.
      match unsafe { sqlite3_value_type(value) } {
         SQLITE_NULL => SqliteValue::Null,
         SQLITE_INTEGER => SqliteValue::Integer(unsafe { sqlite3_value_int64(value) }),
         SQLITE_FLOAT => SqliteValue::Real(unsafe { sqlite3_value_double(value) }),
         SQLITE_TEXT => {
            // sqlite3_value_bytes must follow sqlite3_value_text so it reports
            // the length of the UTF-8 rendering.
            let text_ptr = unsafe { sqlite3_value_text(value) };
            let len = unsafe { sqlite3_value_bytes(value) } as usize;
            if text_ptr.is_null() {
               SqliteValue::Null
            } else {
               // SAFETY: text_ptr is non-null and len bytes are valid for the callback duration
               let bytes = unsafe { std::slice::from_raw_parts(text_ptr, len) };
               SqliteValue::Text(String::from_utf8_lossy(bytes).into_owned())
            }
         }
         SQLITE_BLOB => {
            let blob_ptr = unsafe { sqlite3_value_blob(value) };
            let len = unsafe { sqlite3_value_bytes(value) } as usize;
            if blob_ptr.is_null() || len == 0 {
               SqliteValue::Blob(Vec::new())
            } else {
               // SAFETY: blob_ptr is non-null and len bytes are valid for the callback duration
               let slice = unsafe { std::slice::from_raw_parts(blob_ptr as *const u8, len) };
               SqliteValue::Blob(slice.to_vec())
            }
         }
         _ => SqliteValue::Null,
      }
   }

   pub fn is_null(&self) -> bool {
      matches!(self, SqliteValue::Null)
   }

   /// Renders the value as text the way `CAST(x AS TEXT)` does.
   ///
   /// Returns `None` for NULL.
   pub fn as_text(&self) -> Option<Cow<'_, str>> {
      match self {
         SqliteValue::Null => None,
         SqliteValue::Integer(i) => Some(Cow::Owned(i.to_string())),
         SqliteValue::Real(f) => Some(Cow::Owned(real_to_text(*f))),
         SqliteValue::Text(s) => Some(Cow::Borrowed(s)),
         SqliteValue::Blob(b) => Some(String::from_utf8_lossy(b)),
      }
   }

   /// Integer value, with SQLite's numeric affinity applied to text and reals.
   pub fn as_i64(&self) -> Option<i64> {
      match self {
         SqliteValue::Null | SqliteValue::Blob(_) => None,
         SqliteValue::Integer(i) => Some(*i),
         SqliteValue::Real(f) => Some(*f as i64),
         SqliteValue::Text(s) => {
            let s = s.trim();
            s.parse::<i64>().ok().or_else(|| s.parse::<f64>().ok().map(|f| f as i64))
         }
      }
   }
}

/// SQLite prints reals with 15 significant digits and always keeps a decimal
/// point for integral values.
fn real_to_text(f: f64) -> String {
   if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e15 {
      format!("{:.1}", f)
   } else {
      f.to_string()
   }
}

impl From<i64> for SqliteValue {
   fn from(v: i64) -> Self {
      SqliteValue::Integer(v)
   }
}

impl From<f64> for SqliteValue {
   fn from(v: f64) -> Self {
      SqliteValue::Real(v)
   }
}

impl From<String> for SqliteValue {
   fn from(v: String) -> Self {
      SqliteValue::Text(v)
   }
}

impl From<&str> for SqliteValue {
   fn from(v: &str) -> Self {
      SqliteValue::Text(v.to_string())
   }
}

impl From<Vec<u8>> for SqliteValue {
   fn from(v: Vec<u8>) -> Self {
      SqliteValue::Blob(v)
   }
}

impl<T: Into<SqliteValue>> From<Option<T>> for SqliteValue {
   fn from(v: Option<T>) -> Self {
      v.map_or(SqliteValue::Null, Into::into)
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn test_sqlite_value_from_null() {
      let value = unsafe { SqliteValue::from_raw(std::ptr::null_mut()) };
      assert_eq!(value, SqliteValue::Null);
   }

   #[test]
   fn test_text_rendering() {
      assert_eq!(SqliteValue::Integer(-4).as_text().unwrap(), "-4");
      assert_eq!(SqliteValue::Real(2.0).as_text().unwrap(), "2.0");
      assert_eq!(SqliteValue::Real(2.5).as_text().unwrap(), "2.5");
      assert_eq!(SqliteValue::Null.as_text(), None);
   }

   #[test]
   fn test_integer_affinity() {
      assert_eq!(SqliteValue::Text(" 42 ".into()).as_i64(), Some(42));
      assert_eq!(SqliteValue::Text("3.9".into()).as_i64(), Some(3));
      assert_eq!(SqliteValue::Text("x".into()).as_i64(), None);
      assert_eq!(SqliteValue::from(Option::<i64>::None), SqliteValue::Null);
   }
}
