//! Query results with position-based access

use crate::value::SqlValue;
use crate::{Error, Result};

/// Storage class of a cell, as reported by [`Cursor::get_type`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
   Null,
   Integer,
   Float,
   String,
   Blob,
}

impl From<&SqlValue> for FieldType {
   fn from(value: &SqlValue) -> Self {
      match value {
         SqlValue::Null => FieldType::Null,
         SqlValue::Integer(_) => FieldType::Integer,
         SqlValue::Real(_) => FieldType::Float,
         SqlValue::Text(_) => FieldType::String,
         SqlValue::Blob(_) => FieldType::Blob,
      }
   }
}

/// A reusable character buffer filled by [`Cursor::copy_string_to_buffer`].
#[derive(Debug, Clone, Default)]
pub struct CharArrayBuffer {
   pub data: Vec<char>,
   pub size_copied: usize,
}

impl CharArrayBuffer {
   pub fn new(capacity: usize) -> Self {
      Self {
         data: vec!['\0'; capacity],
         size_copied: 0,
      }
   }

   /// The copied characters as a string.
   pub fn as_string(&self) -> String {
      self.data[..self.size_copied.min(self.data.len())].iter().collect()
   }
}

/// The rows produced by a query.
///
/// A cursor holds a complete snapshot of the result set, so it stays valid
/// while the database changes underneath it and can be read without touching
/// the connection again. It starts positioned before the first row.
#[derive(Debug, Clone)]
pub struct Cursor {
   columns: Vec<String>,
   rows: Vec<Vec<SqlValue>>,
   position: i64,
   closed: bool,
}

impl Cursor {
   pub(crate) fn new(columns: Vec<String>, rows: Vec<Vec<SqlValue>>) -> Self {
      Self {
         columns,
         rows,
         position: -1,
         closed: false,
      }
   }

   pub fn count(&self) -> usize {
      self.rows.len()
   }

   /// Current row index; -1 before the first row, `count()` after the last.
   pub fn position(&self) -> i64 {
      self.position
   }

   /// Moves to `position`, clamping to just before the first or just after
   /// the last row. Returns whether the cursor is now on a row.
   pub fn move_to_position(&mut self, position: i64) -> bool {
      let count = self.rows.len() as i64;
      if position >= count {
         self.position = count;
         return false;
      }
      if position < 0 {
         self.position = -1;
         return false;
      }
      self.position = position;
      true
   }

   /// Moves by `offset` rows relative to the current position.
   pub fn move_by(&mut self, offset: i64) -> bool {
      self.move_to_position(self.position.saturating_add(offset))
   }

   pub fn move_to_first(&mut self) -> bool {
      self.move_to_position(0)
   }

   pub fn move_to_last(&mut self) -> bool {
      self.move_to_position(self.rows.len() as i64 - 1)
   }

   pub fn move_to_next(&mut self) -> bool {
      self.move_by(1)
   }

   pub fn move_to_previous(&mut self) -> bool {
      self.move_by(-1)
   }

   pub fn is_first(&self) -> bool {
      !self.rows.is_empty() && self.position == 0
   }

   pub fn is_last(&self) -> bool {
      !self.rows.is_empty() && self.position == self.rows.len() as i64 - 1
   }

   pub fn is_before_first(&self) -> bool {
      self.rows.is_empty() || self.position == -1
   }

   pub fn is_after_last(&self) -> bool {
      self.rows.is_empty() || self.position == self.rows.len() as i64
   }

   pub fn column_count(&self) -> usize {
      self.columns.len()
   }

   pub fn column_names(&self) -> &[String] {
      &self.columns
   }

   pub fn column_name(&self, column: usize) -> Option<&str> {
      self.columns.get(column).map(String::as_str)
   }

   /// Index of the column called `name`, ignoring ASCII case.
   ///
   /// A qualified name such as `test.data` matches on the part after the
   /// last period, since result columns carry no table prefix.
   pub fn column_index(&self, name: &str) -> Option<usize> {
      let name = name.rsplit_once('.').map_or(name, |(_, column)| column);
      self.columns.iter().position(|c| c.eq_ignore_ascii_case(name))
   }

   pub fn column_index_or_throw(&self, name: &str) -> Result<usize> {
      self
         .column_index(name)
         .ok_or_else(|| Error::IllegalArgument(format!("column '{}' does not exist", name)))
   }

   fn cell(&self, column: usize) -> Result<&SqlValue> {
      if self.closed {
         return Err(Error::CursorClosed);
      }

      let row = usize::try_from(self.position)
         .ok()
         .and_then(|p| self.rows.get(p))
         .ok_or(Error::CursorIndexOutOfBounds {
            index: self.position,
            count: self.rows.len(),
         })?;

      row.get(column).ok_or(Error::ColumnIndexOutOfBounds {
         index: column,
         count: self.columns.len(),
      })
   }

   /// The raw value of `column` in the current row.
   pub fn get_value(&self, column: usize) -> Result<&SqlValue> {
      self.cell(column)
   }

   pub fn get_string(&self, column: usize) -> Result<Option<String>> {
      self.cell(column)?.as_string()
   }

   pub fn get_long(&self, column: usize) -> Result<i64> {
      self.cell(column)?.as_long()
   }

   /// [`get_long`](Self::get_long) truncated to 32 bits.
   pub fn get_int(&self, column: usize) -> Result<i32> {
      Ok(self.get_long(column)? as i32)
   }

   pub fn get_double(&self, column: usize) -> Result<f64> {
      self.cell(column)?.as_double()
   }

   pub fn get_blob(&self, column: usize) -> Result<Option<Vec<u8>>> {
      self.cell(column)?.as_blob()
   }

   pub fn is_null(&self, column: usize) -> Result<bool> {
      Ok(self.cell(column)?.is_null())
   }

   pub fn get_type(&self, column: usize) -> Result<FieldType> {
      Ok(FieldType::from(self.cell(column)?))
   }

   /// Copies the text of `column` into `buffer`, growing it when too small.
   ///
   /// NULL copies nothing and sets `size_copied` to zero.
   pub fn copy_string_to_buffer(&self, column: usize, buffer: &mut CharArrayBuffer) -> Result<()> {
      let Some(text) = self.get_string(column)? else {
         buffer.size_copied = 0;
         return Ok(());
      };

      let mut copied = 0;
      for c in text.chars() {
         if copied < buffer.data.len() {
            buffer.data[copied] = c;
         } else {
            buffer.data.push(c);
         }
         copied += 1;
      }
      buffer.size_copied = copied;
      Ok(())
   }

   /// Releases the rows. Further reads fail with [`Error::CursorClosed`].
   pub fn close(&mut self) {
      self.closed = true;
      self.rows = Vec::new();
   }

   pub fn is_closed(&self) -> bool {
      self.closed
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   fn sample() -> Cursor {
      Cursor::new(
         vec!["_id".into(), "data".into()],
         vec![
            vec![SqlValue::Integer(1), SqlValue::Text("one".into())],
            vec![SqlValue::Integer(2), SqlValue::Null],
         ],
      )
   }

   #[test]
   fn test_navigation() {
      let mut cursor = sample();
      assert!(cursor.is_before_first());
      assert!(cursor.move_to_first());
      assert!(cursor.is_first());
      assert!(cursor.move_to_next());
      assert!(cursor.is_last());
      assert!(!cursor.move_to_next());
      assert!(cursor.is_after_last());
      assert_eq!(cursor.position(), 2);
      assert!(cursor.move_to_previous());
      assert_eq!(cursor.position(), 1);
      assert!(!cursor.move_to_position(-5));
      assert_eq!(cursor.position(), -1);
   }

   #[test]
   fn test_reading_off_row_fails() {
      let cursor = sample();
      assert!(matches!(
         cursor.get_long(0),
         Err(Error::CursorIndexOutOfBounds { index: -1, count: 2 })
      ));
   }

   #[test]
   fn test_column_lookup() {
      let cursor = sample();
      assert_eq!(cursor.column_index("DATA"), Some(1));
      assert_eq!(cursor.column_index("test.data"), Some(1));
      assert_eq!(cursor.column_index("nope"), None);
      assert!(matches!(cursor.column_index_or_throw("nope"), Err(Error::IllegalArgument(_))));
   }

   #[test]
   fn test_copy_string_grows_buffer() {
      let mut cursor = sample();
      cursor.move_to_first();
      let mut buffer = CharArrayBuffer::new(1);
      cursor.copy_string_to_buffer(1, &mut buffer).unwrap();
      assert_eq!(buffer.size_copied, 3);
      assert_eq!(buffer.as_string(), "one");

      cursor.move_to_next();
      cursor.copy_string_to_buffer(1, &mut buffer).unwrap();
      assert_eq!(buffer.size_copied, 0);
   }

   #[test]
   fn test_buffer_size_past_capacity_is_clamped() {
      let buffer = CharArrayBuffer {
         data: vec!['a', 'b'],
         size_copied: 5,
      };
      assert_eq!(buffer.as_string(), "ab");
   }

   #[test]
   fn test_closed_cursor() {
      let mut cursor = sample();
      cursor.move_to_first();
      cursor.close();
      assert!(cursor.is_closed());
      assert!(matches!(cursor.get_string(0), Err(Error::CursorClosed)));
   }
}
