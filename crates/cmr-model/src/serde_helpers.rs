// SPDX-License-Identifier: Apache-2.0

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserializer, Serializer};
use std::fmt;

/// Serialize `(key, count)` pairs as a JSON object in the given order.
pub(crate) fn serialize_ordered_counts<S>(
    entries: &[(String, u64)],
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let mut map = serializer.serialize_map(Some(entries.len()))?;
    for (k, v) in entries {
        map.serialize_entry(k, v)?;
    }
    map.end()
}

/// Deserialize a JSON object into `(key, count)` pairs in document order.
pub(crate) fn deserialize_ordered_counts<'de, D>(deserializer: D) -> Result<Vec<(String, u64)>, D::Error>
where
    D: Deserializer<'de>,
{
    struct OrderedCounts;

    impl<'de> Visitor<'de> for OrderedCounts {
        type Value = Vec<(String, u64)>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("an object mapping labels to counts")
        }

        fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut out: Vec<(String, u64)> = Vec::with_capacity(access.size_hint().unwrap_or(0));
            while let Some((k, v)) = access.next_entry::<String, u64>()? {
                if let Some(existing) = out.iter_mut().find(|(key, _)| *key == k) {
                    existing.1 = v;
                } else {
                    out.push((k, v));
                }
            }
            Ok(out)
        }
    }

    deserializer.deserialize_map(OrderedCounts)
}
