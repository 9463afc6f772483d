use sqlx::sqlite::{SqliteRow, SqliteValueRef};
use sqlx::{Row, TypeInfo, Value, ValueRef};

use crate::Error;
use crate::value::SqlValue;

/// Convert a SQLite value to a [`SqlValue`].
///
/// A non-NULL value reports its runtime storage class (`INTEGER`, `REAL`,
/// `TEXT` or `BLOB`) rather than the declared column type, so a column
/// declared `FLOAT` holding `0` decodes as an integer, as the engine stored it.
pub fn to_value(value: SqliteValueRef) -> Result<SqlValue, Error> {
   if value.is_null() {
      return Ok(SqlValue::Null);
   }

   let column_type = value.type_info();

   let result = match column_type.name() {
      "TEXT" => SqlValue::Text(value.to_owned().try_decode::<String>()?),

      "REAL" => SqlValue::Real(value.to_owned().try_decode::<f64>()?),

      "INTEGER" | "NUMERIC" | "BOOLEAN" => SqlValue::Integer(value.to_owned().try_decode::<i64>()?),

      "BLOB" => SqlValue::Blob(value.to_owned().try_decode::<Vec<u8>>()?),

      "NULL" => SqlValue::Null,

      _ => {
         // For unknown types, try to decode as text
         if let Ok(text) = value.to_owned().try_decode::<String>() {
            SqlValue::Text(text)
         } else {
            return Err(Error::UnsupportedDatatype(format!(
               "Unknown SQLite type: {}",
               column_type.name()
            )));
         }
      }
   };

   Ok(result)
}

/// Decode every cell of `rows`, in column order.
pub(crate) fn decode_rows(rows: Vec<SqliteRow>) -> Result<Vec<Vec<SqlValue>>, Error> {
   let mut values = Vec::with_capacity(rows.len());
   for row in rows {
      let mut cells = Vec::with_capacity(row.columns().len());
      for i in 0..row.columns().len() {
         cells.push(to_value(row.try_get_raw(i)?)?);
      }
      values.push(cells);
   }
   Ok(values)
}
