use crate::{SyncMap, SyncMapRef};
use serde::{
    de::{MapAccess, Visitor},
    Deserialize, Deserializer, Serialize, Serializer,
};
use std::fmt::{self, Formatter};
use std::hash::{BuildHasher, Hash};
use std::marker::PhantomData;

struct SyncMapVisitor<K, V, S> {
    key_marker: PhantomData<K>,
    value_marker: PhantomData<V>,
    hash_builder_marker: PhantomData<S>,
}

impl<K, V, S> Serialize for SyncMapRef<'_, K, V, S>
where
    K: Serialize,
    V: Serialize,
{
    fn serialize<Sr>(&self, serializer: Sr) -> Result<Sr::Ok, Sr::Error>
    where
        Sr: Serializer,
    {
        serializer.collect_map(self.iter())
    }
}

impl<K, V, S> Serialize for SyncMap<K, V, S>
where
    K: Serialize,
    V: Serialize,
{
    fn serialize<Sr>(&self, serializer: Sr) -> Result<Sr::Ok, Sr::Error>
    where
        Sr: Serializer,
    {
        self.pin().serialize(serializer)
    }
}

impl<'de, K, V, S> Deserialize<'de> for SyncMap<K, V, S>
where
    K: 'static + Deserialize<'de> + Send + Sync + Hash + Clone + Eq,
    V: 'static + Deserialize<'de> + Send + Sync,
    S: 'static + Default + BuildHasher + Clone + Send + Sync,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_map(SyncMapVisitor::new())
    }
}

impl<K, V, S> SyncMapVisitor<K, V, S> {
    pub(crate) fn new() -> Self {
        Self {
            key_marker: PhantomData,
            value_marker: PhantomData,
            hash_builder_marker: PhantomData,
        }
    }
}

impl<'de, K, V, S> Visitor<'de> for SyncMapVisitor<K, V, S>
where
    K: 'static + Deserialize<'de> + Send + Sync + Hash + Clone + Eq,
    V: 'static + Deserialize<'de> + Send + Sync,
    S: 'static + Default + BuildHasher + Clone + Send + Sync,
{
    type Value = SyncMap<K, V, S>;

    fn expecting(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "a map")
    }

    fn visit_map<M>(self, mut access: M) -> Result<Self::Value, M::Error>
    where
        M: MapAccess<'de>,
    {
        let map = match access.size_hint() {
            Some(n) => SyncMap::with_capacity_and_hasher(n, S::default()),
            None => SyncMap::with_hasher(S::default()),
        };

        {
            let guard = map.guard();

            while let Some((key, value)) = access.next_entry()? {
                if let Some(_old_value) = map.swap(key, value, &guard) {
                    unreachable!("Serialized map held two values with the same key");
                }
            }
        }

        Ok(map)
    }
}
