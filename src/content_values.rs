//! Column/value sets for inserts and updates

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::value::SqlValue;

/// An ordered set of column values used by
/// [`insert`](crate::SqlCipherDatabase::insert) and
/// [`update`](crate::SqlCipherDatabase::update).
///
/// Columns keep insertion order, which is the order they appear in the
/// generated SQL. Serializes as a JSON object; BLOBs are written as
/// `{"base64": "..."}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentValues {
   values: IndexMap<String, SqlValue>,
}

impl ContentValues {
   pub fn new() -> Self {
      Self::default()
   }

   pub fn with_capacity(capacity: usize) -> Self {
      Self {
         values: IndexMap::with_capacity(capacity),
      }
   }

   /// Sets `key`, replacing any previous value while keeping its position.
   pub fn put(&mut self, key: impl Into<String>, value: impl Into<SqlValue>) -> &mut Self {
      self.values.insert(key.into(), value.into());
      self
   }

   pub fn put_null(&mut self, key: impl Into<String>) -> &mut Self {
      self.values.insert(key.into(), SqlValue::Null);
      self
   }

   pub fn get(&self, key: &str) -> Option<&SqlValue> {
      self.values.get(key)
   }

   /// The value rendered as text; `None` when missing or NULL.
   pub fn get_as_string(&self, key: &str) -> Option<String> {
      match self.values.get(key)? {
         SqlValue::Blob(_) => None,
         value => value.as_string().ok().flatten(),
      }
   }

   /// The value as an integer; `None` when missing, NULL or not numeric.
   pub fn get_as_long(&self, key: &str) -> Option<i64> {
      match self.values.get(key)? {
         SqlValue::Integer(v) => Some(*v),
         SqlValue::Real(v) => Some(*v as i64),
         SqlValue::Text(s) => s.trim().parse().ok(),
         SqlValue::Null | SqlValue::Blob(_) => None,
      }
   }

   pub fn get_as_double(&self, key: &str) -> Option<f64> {
      match self.values.get(key)? {
         SqlValue::Integer(v) => Some(*v as f64),
         SqlValue::Real(v) => Some(*v),
         SqlValue::Text(s) => s.trim().parse().ok(),
         SqlValue::Null | SqlValue::Blob(_) => None,
      }
   }

   pub fn get_as_blob(&self, key: &str) -> Option<&[u8]> {
      match self.values.get(key)? {
         SqlValue::Blob(b) => Some(b),
         _ => None,
      }
   }

   pub fn contains_key(&self, key: &str) -> bool {
      self.values.contains_key(key)
   }

   /// Removes `key`, keeping the order of the remaining columns.
   pub fn remove(&mut self, key: &str) -> Option<SqlValue> {
      self.values.shift_remove(key)
   }

   pub fn clear(&mut self) {
      self.values.clear();
   }

   pub fn len(&self) -> usize {
      self.values.len()
   }

   pub fn is_empty(&self) -> bool {
      self.values.is_empty()
   }

   pub fn keys(&self) -> impl Iterator<Item = &str> {
      self.values.keys().map(String::as_str)
   }

   pub fn iter(&self) -> impl Iterator<Item = (&str, &SqlValue)> {
      self.values.iter().map(|(k, v)| (k.as_str(), v))
   }
}

impl<K: Into<String>, V: Into<SqlValue>> FromIterator<(K, V)> for ContentValues {
   fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
      Self {
         values: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
      }
   }
}

impl IntoIterator for ContentValues {
   type Item = (String, SqlValue);
   type IntoIter = indexmap::map::IntoIter<String, SqlValue>;

   fn into_iter(self) -> Self::IntoIter {
      self.values.into_iter()
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn test_put_and_typed_getters() {
      let mut values = ContentValues::new();
      values.put("string", "value").put("count", 3).put("ratio", 0.5);
      values.put_null("missing");

      assert_eq!(values.get_as_string("string").as_deref(), Some("value"));
      assert_eq!(values.get_as_long("count"), Some(3));
      assert_eq!(values.get_as_string("count").as_deref(), Some("3"));
      assert_eq!(values.get_as_double("ratio"), Some(0.5));
      assert_eq!(values.get_as_long("missing"), None);
      assert_eq!(values.get_as_string("absent"), None);
      assert!(values.contains_key("missing"));
   }

   #[test]
   fn test_order_is_preserved() {
      let mut values: ContentValues = [("b", 1), ("a", 2), ("c", 3)].into_iter().collect();
      values.put("b", 10);
      values.remove("a");
      assert_eq!(values.keys().collect::<Vec<_>>(), vec!["b", "c"]);
      assert_eq!(values.get("b"), Some(&SqlValue::Integer(10)));
   }

   #[test]
   fn test_serde_round_trip_keeps_blobs() {
      let bytes = vec![0x28u8; 42];
      let mut values = ContentValues::new();
      values.put("string", "value");
      values.put("byteArray", bytes.clone());

      let json = serde_json::to_string(&values).unwrap();
      let restored: ContentValues = serde_json::from_str(&json).unwrap();

      assert_eq!(restored.get_as_blob("byteArray"), Some(bytes.as_slice()));
      assert_eq!(restored.get("string"), Some(&SqlValue::Text("value".into())));
      assert_eq!(restored, values);
   }
}
