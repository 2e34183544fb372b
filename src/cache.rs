use std::collections::HashMap;
use std::hash::{BuildHasher, Hash};

pub trait Cache {
    type K;
    type V;

    fn get(&self, key: &Self::K) -> Option<&Self::V>;

    fn insert(&mut self, key: Self::K, value: Self::V);
    fn insert_many<I: IntoIterator<Item = (Self::K, Self::V)>>(&mut self, key_vals: I);

    fn remove(&mut self, keys: &[Self::K]);
    fn flush(&mut self);
}

impl<K, V, S: BuildHasher> Cache for HashMap<K, V, S>
where
    K: Eq + Hash,
{
    type K = K;
    type V = V;

    fn get(&self, key: &Self::K) -> Option<&Self::V> {
        self.get(key)
    }

    fn insert(&mut self, key: Self::K, value: Self::V) {
        self.insert(key, value);
    }

    fn insert_many<I: IntoIterator<Item = (Self::K, Self::V)>>(&mut self, key_vals: I) {
        for (key, value) in key_vals.into_iter() {
            self.insert(key, value);
        }
    }

    fn remove(&mut self, keys: &[Self::K]) {
        for key in keys.iter() {
            self.remove(key);
        }
    }

    fn flush(&mut self) {
        self.clear();
    }
}
