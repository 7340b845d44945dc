//! (De-)serialize a `HashMap` with structured keys (e.g., `(peer, prefix)` pairs) as a list of
//! `{"key": .., "val": ..}` entries. JSON only allows string keys, so such maps cannot be written
//! directly.
//!
//! ```ignore
//! #[derive(Serialize, Deserialize)]
//! struct Dump {
//!     #[serde(with = "commwatch_utils::serde::entries")]
//!     routes: HashMap<RouteKey, Route>,
//! }
//! ```

use std::{collections::HashMap, hash::Hash};

use serde::{ser::SerializeSeq, Deserialize, Deserializer, Serialize, Serializer};

#[derive(Serialize)]
struct EntryRef<'a, K, V> {
    key: &'a K,
    val: &'a V,
}

#[derive(Deserialize)]
struct Entry<K, V> {
    key: K,
    val: V,
}

pub fn serialize<K, V, S>(map: &HashMap<K, V>, serializer: S) -> Result<S::Ok, S::Error>
where
    K: Serialize,
    V: Serialize,
    S: Serializer,
{
    let mut seq = serializer.serialize_seq(Some(map.len()))?;
    for (key, val) in map {
        seq.serialize_element(&EntryRef { key, val })?;
    }
    seq.end()
}

pub fn deserialize<'de, K, V, D>(deserializer: D) -> Result<HashMap<K, V>, D::Error>
where
    K: Deserialize<'de> + Eq + Hash,
    V: Deserialize<'de>,
    D: Deserializer<'de>,
{
    let entries = Vec::<Entry<K, V>>::deserialize(deserializer)?;
    Ok(entries.into_iter().map(|e| (e.key, e.val)).collect())
}
