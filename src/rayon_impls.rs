use crate::SyncMap;
use rayon::iter::{FromParallelIterator, IntoParallelIterator, ParallelExtend, ParallelIterator};
use std::hash::{BuildHasher, Hash};

impl<K, V, S> ParallelExtend<(K, V)> for SyncMap<K, V, S>
where
    K: 'static + Sync + Send + Clone + Hash + Eq,
    V: 'static + Sync + Send,
    S: 'static + Sync + Send + BuildHasher + Clone,
{
    // This is of limited use due to the `&mut self` parameter. See `par_extend_sync`
    fn par_extend<I>(&mut self, par_iter: I)
    where
        I: IntoParallelIterator<Item = (K, V)>,
    {
        self.par_extend_sync(par_iter);
    }
}

impl<K, V, S> ParallelExtend<(K, V)> for &SyncMap<K, V, S>
where
    K: 'static + Sync + Send + Clone + Hash + Eq,
    V: 'static + Sync + Send,
    S: 'static + Sync + Send + BuildHasher + Clone,
{
    fn par_extend<I>(&mut self, par_iter: I)
    where
        I: IntoParallelIterator<Item = (K, V)>,
    {
        (*self).par_extend_sync(par_iter);
    }
}

impl<K, V, S> SyncMap<K, V, S>
where
    K: 'static + Sync + Send + Clone + Hash + Eq,
    V: 'static + Sync + Send,
    S: 'static + Sync + Send + BuildHasher + Clone,
{
    fn par_extend_sync<I>(&self, par_iter: I)
    where
        I: IntoParallelIterator<Item = (K, V)>,
    {
        par_iter.into_par_iter().for_each(|(k, v)| {
            // a guard per store, since guards cannot be shared between rayon's worker threads
            let guard = self.guard();
            self.store(k, v, &guard);
        });
    }
}

impl<K, V> FromParallelIterator<(K, V)> for SyncMap<K, V, crate::DefaultHashBuilder>
where
    K: 'static + Sync + Send + Clone + Hash + Eq,
    V: 'static + Sync + Send,
{
    fn from_par_iter<I>(par_iter: I) -> Self
    where
        I: IntoParallelIterator<Item = (K, V)>,
    {
        let mut created_map = SyncMap::new();
        created_map.par_extend(par_iter);
        created_map
    }
}
