//! Column values and bind arguments

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sqlx::Sqlite;
use sqlx::query::Query;
use sqlx::sqlite::SqliteArguments;
use sqlx_sqlcipher_functions::SqliteValue;

use crate::{Error, Result};

/// Map key used when a BLOB is serialized.
const BLOB_KEY: &str = "base64";

/// A value in one of SQLite's five storage classes.
///
/// Used for result cells, bind arguments and [`ContentValues`](crate::ContentValues)
/// entries. The `as_*` conversions follow the rules of Android's cursor
/// window: NULL reads as zero or `None`, text is parsed, and BLOBs only
/// convert to bytes.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum SqlValue {
   #[default]
   Null,
   Integer(i64),
   Real(f64),
   Text(String),
   Blob(Vec<u8>),
}

impl SqlValue {
   pub fn is_null(&self) -> bool {
      matches!(self, SqlValue::Null)
   }

   /// Integer value; text is parsed and reals are truncated.
   pub fn as_long(&self) -> Result<i64> {
      match self {
         SqlValue::Null => Ok(0),
         SqlValue::Integer(v) => Ok(*v),
         SqlValue::Real(v) => Ok(*v as i64),
         SqlValue::Text(s) => Ok(parse_long(s)),
         SqlValue::Blob(_) => Err(Error::UnsupportedDatatype("Unable to convert BLOB to long".into())),
      }
   }

   pub fn as_double(&self) -> Result<f64> {
      match self {
         SqlValue::Null => Ok(0.0),
         SqlValue::Integer(v) => Ok(*v as f64),
         SqlValue::Real(v) => Ok(*v),
         SqlValue::Text(s) => Ok(s.trim().parse().unwrap_or(0.0)),
         SqlValue::Blob(_) => {
            Err(Error::UnsupportedDatatype("Unable to convert BLOB to double".into()))
         }
      }
   }

   /// Text rendering of the value, `None` for NULL.
   ///
   /// Reals use `printf("%g")` formatting, so `-1.0` reads as `"-1"`.
   pub fn as_string(&self) -> Result<Option<String>> {
      match self {
         SqlValue::Null => Ok(None),
         SqlValue::Integer(v) => Ok(Some(v.to_string())),
         SqlValue::Real(v) => Ok(Some(format_real(*v))),
         SqlValue::Text(s) => Ok(Some(s.clone())),
         SqlValue::Blob(_) => {
            Err(Error::UnsupportedDatatype("Unable to convert BLOB to string".into()))
         }
      }
   }

   /// Raw bytes of a BLOB, or the UTF-8 bytes of text; `None` for NULL.
   pub fn as_blob(&self) -> Result<Option<Vec<u8>>> {
      match self {
         SqlValue::Null => Ok(None),
         SqlValue::Blob(b) => Ok(Some(b.clone())),
         SqlValue::Text(s) => Ok(Some(s.clone().into_bytes())),
         SqlValue::Integer(_) | SqlValue::Real(_) => {
            Err(Error::UnsupportedDatatype("Unable to convert number to BLOB".into()))
         }
      }
   }
}

/// Leading-integer parse in the manner of `strtoll`: surrounding whitespace
/// is skipped, a real is truncated, and anything else reads as zero.
fn parse_long(text: &str) -> i64 {
   let text = text.trim();
   if let Ok(v) = text.parse::<i64>() {
      return v;
   }
   if let Ok(v) = text.parse::<f64>() {
      return v as i64;
   }

   let end = text
      .char_indices()
      .find(|&(i, c)| !(c.is_ascii_digit() || (i == 0 && (c == '-' || c == '+'))))
      .map_or(text.len(), |(i, _)| i);
   text[..end].parse().unwrap_or(0)
}

/// `printf("%g")`: six significant digits, trailing zeros removed, and
/// scientific notation for very large or small magnitudes.
pub(crate) fn format_real(v: f64) -> String {
   if v.is_nan() {
      return "nan".to_string();
   }
   if v.is_infinite() {
      return if v > 0.0 { "inf".to_string() } else { "-inf".to_string() };
   }
   if v == 0.0 {
      return if v.is_sign_negative() { "-0".to_string() } else { "0".to_string() };
   }

   // Round to six significant digits first; the exponent of the rounded
   // value decides the notation.
   let scientific = format!("{:.5e}", v);
   let (mantissa, exponent) = match scientific.split_once('e') {
      Some((m, e)) => (m, e.parse::<i32>().unwrap_or(0)),
      None => (scientific.as_str(), 0),
   };

   if !(-4..6).contains(&exponent) {
      let sign = if exponent < 0 { '-' } else { '+' };
      format!("{}e{}{:02}", trim_fraction(mantissa), sign, exponent.abs())
   } else {
      let decimals = (5 - exponent) as usize;
      trim_fraction(&format!("{:.*}", decimals, v)).to_string()
   }
}

fn trim_fraction(number: &str) -> &str {
   if number.contains('.') {
      number.trim_end_matches('0').trim_end_matches('.')
   } else {
      number
   }
}

impl fmt::Display for SqlValue {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      match self {
         SqlValue::Null => f.write_str("NULL"),
         SqlValue::Integer(v) => write!(f, "{}", v),
         SqlValue::Real(v) => f.write_str(&format_real(*v)),
         SqlValue::Text(s) => f.write_str(s),
         SqlValue::Blob(b) => write!(f, "<BLOB {} bytes>", b.len()),
      }
   }
}

/// Bind a value as the next positional argument of a query
pub(crate) fn bind_value<'a>(
   query: Query<'a, Sqlite, SqliteArguments<'a>>,
   value: SqlValue,
) -> Query<'a, Sqlite, SqliteArguments<'a>> {
   match value {
      SqlValue::Null => query.bind(None::<String>),
      SqlValue::Integer(v) => query.bind(v),
      SqlValue::Real(v) => query.bind(v),
      SqlValue::Text(s) => query.bind(s),
      SqlValue::Blob(b) => query.bind(b),
   }
}

impl From<SqliteValue> for SqlValue {
   fn from(value: SqliteValue) -> Self {
      match value {
         SqliteValue::Null => SqlValue::Null,
         SqliteValue::Integer(v) => SqlValue::Integer(v),
         SqliteValue::Real(v) => SqlValue::Real(v),
         SqliteValue::Text(s) => SqlValue::Text(s),
         SqliteValue::Blob(b) => SqlValue::Blob(b),
      }
   }
}

impl From<SqlValue> for SqliteValue {
   fn from(value: SqlValue) -> Self {
      match value {
         SqlValue::Null => SqliteValue::Null,
         SqlValue::Integer(v) => SqliteValue::Integer(v),
         SqlValue::Real(v) => SqliteValue::Real(v),
         SqlValue::Text(s) => SqliteValue::Text(s),
         SqlValue::Blob(b) => SqliteValue::Blob(b),
      }
   }
}

macro_rules! from_integer {
   ($($t:ty),*) => {
      $(impl From<$t> for SqlValue {
         fn from(v: $t) -> Self {
            SqlValue::Integer(i64::from(v))
         }
      })*
   };
}

from_integer!(i8, i16, i32, i64, u8, u16, u32, bool);

impl From<f32> for SqlValue {
   fn from(v: f32) -> Self {
      SqlValue::Real(f64::from(v))
   }
}

impl From<f64> for SqlValue {
   fn from(v: f64) -> Self {
      SqlValue::Real(v)
   }
}

impl From<String> for SqlValue {
   fn from(v: String) -> Self {
      SqlValue::Text(v)
   }
}

impl From<&str> for SqlValue {
   fn from(v: &str) -> Self {
      SqlValue::Text(v.to_string())
   }
}

impl From<Vec<u8>> for SqlValue {
   fn from(v: Vec<u8>) -> Self {
      SqlValue::Blob(v)
   }
}

impl From<&[u8]> for SqlValue {
   fn from(v: &[u8]) -> Self {
      SqlValue::Blob(v.to_vec())
   }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
   fn from(v: Option<T>) -> Self {
      v.map_or(SqlValue::Null, Into::into)
   }
}

/// NULL, numbers and text map to their JSON counterparts; a BLOB becomes
/// `{"base64": "..."}` so that it survives a round trip.
impl Serialize for SqlValue {
   fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
      match self {
         SqlValue::Null => serializer.serialize_none(),
         SqlValue::Integer(v) => serializer.serialize_i64(*v),
         SqlValue::Real(v) => serializer.serialize_f64(*v),
         SqlValue::Text(s) => serializer.serialize_str(s),
         SqlValue::Blob(b) => {
            let mut map = serializer.serialize_map(Some(1))?;
            map.serialize_entry(BLOB_KEY, &BASE64.encode(b))?;
            map.end()
         }
      }
   }
}

struct SqlValueVisitor;

impl<'de> Visitor<'de> for SqlValueVisitor {
   type Value = SqlValue;

   fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.write_str("null, a number, a string or a base64 blob")
   }

   fn visit_unit<E: de::Error>(self) -> std::result::Result<SqlValue, E> {
      Ok(SqlValue::Null)
   }

   fn visit_none<E: de::Error>(self) -> std::result::Result<SqlValue, E> {
      Ok(SqlValue::Null)
   }

   fn visit_some<D: Deserializer<'de>>(self, d: D) -> std::result::Result<SqlValue, D::Error> {
      d.deserialize_any(SqlValueVisitor)
   }

   fn visit_bool<E: de::Error>(self, v: bool) -> std::result::Result<SqlValue, E> {
      Ok(SqlValue::Integer(i64::from(v)))
   }

   fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<SqlValue, E> {
      Ok(SqlValue::Integer(v))
   }

   fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<SqlValue, E> {
      match i64::try_from(v) {
         Ok(v) => Ok(SqlValue::Integer(v)),
         Err(_) => Ok(SqlValue::Real(v as f64)),
      }
   }

   fn visit_f64<E: de::Error>(self, v: f64) -> std::result::Result<SqlValue, E> {
      Ok(SqlValue::Real(v))
   }

   fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<SqlValue, E> {
      Ok(SqlValue::Text(v.to_string()))
   }

   fn visit_string<E: de::Error>(self, v: String) -> std::result::Result<SqlValue, E> {
      Ok(SqlValue::Text(v))
   }

   fn visit_bytes<E: de::Error>(self, v: &[u8]) -> std::result::Result<SqlValue, E> {
      Ok(SqlValue::Blob(v.to_vec()))
   }

   fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<SqlValue, A::Error> {
      let mut blob = None;
      while let Some(key) = map.next_key::<String>()? {
         if key != BLOB_KEY {
            return Err(de::Error::unknown_field(&key, &[BLOB_KEY]));
         }
         let encoded: String = map.next_value()?;
         blob = Some(BASE64.decode(encoded).map_err(de::Error::custom)?);
      }
      blob
         .map(SqlValue::Blob)
         .ok_or_else(|| de::Error::missing_field(BLOB_KEY))
   }
}

impl<'de> Deserialize<'de> for SqlValue {
   fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
      deserializer.deserialize_any(SqlValueVisitor)
   }
}
