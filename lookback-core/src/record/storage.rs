//! Aggregation of stored records.
use super::{Record, RecordValue};
use std::collections::HashSet;
use xxhash_rust::xxh3::Xxh3Builder;

/// Stores records and aggregates them on demand.
///
/// Scalars under the same key are summarized with `_min`, `_max`, `_mean` and
/// `_median` entries (a single value is passed through as is). For any other
/// value type the most recent value is kept.
#[derive(Debug, Default)]
pub struct RecordStorage {
    data: Vec<Record>,
}

fn median(mut vs: Vec<f32>) -> f32 {
    vs.sort_by(|x, y| x.total_cmp(y));
    vs[vs.len() / 2]
}

impl RecordStorage {
    /// Creates an empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a record.
    pub fn store(&mut self, record: Record) {
        self.data.push(record);
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn keys(&self) -> HashSet<String, Xxh3Builder> {
        let mut keys = HashSet::<String, Xxh3Builder>::default();
        for record in self.data.iter() {
            keys.extend(record.keys().cloned());
        }
        keys
    }

    fn scalar(&self, key: &str) -> Record {
        let vs: Vec<f32> = self
            .data
            .iter()
            .filter_map(|record| match record.get(key) {
                Some(RecordValue::Scalar(v)) => Some(*v),
                _ => None,
            })
            .collect();

        if vs.len() == 1 {
            return Record::from_scalar(key, vs[0]);
        }
        let min = vs.iter().copied().fold(f32::INFINITY, f32::min);
        let max = vs.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let mean = vs.iter().sum::<f32>() / vs.len() as f32;
        Record::from_slice(&[
            (format!("{}_min", key), RecordValue::Scalar(min)),
            (format!("{}_max", key), RecordValue::Scalar(max)),
            (format!("{}_mean", key), RecordValue::Scalar(mean)),
            (format!("{}_median", key), RecordValue::Scalar(median(vs))),
        ])
    }

    fn latest(&self, key: &str) -> Option<Record> {
        self.data
            .iter()
            .rev()
            .find_map(|record| record.get(key))
            .map(|value| Record::from_slice(&[(key, value.clone())]))
    }

    /// Aggregates all stored records and clears the storage.
    pub fn aggregate(&mut self) -> Record {
        let mut record = Record::empty();

        for key in self.keys().iter() {
            let is_scalar = self
                .data
                .iter()
                .find_map(|r| r.get(key))
                .map_or(false, |v| matches!(v, RecordValue::Scalar(_)));
            let r = match is_scalar {
                true => Some(self.scalar(key)),
                false => self.latest(key),
            };
            if let Some(r) = r {
                record.merge_inplace(r);
            }
        }

        self.data.clear();
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_scalars() {
        let mut storage = RecordStorage::new();
        for v in [3.0, 1.0, 2.0] {
            storage.store(Record::from_scalar("bonus", v));
        }
        storage.store(Record::from_scalar("single", 7.0));

        let record = storage.aggregate();
        assert_eq!(record.get_scalar("bonus_min").unwrap(), 1.0);
        assert_eq!(record.get_scalar("bonus_max").unwrap(), 3.0);
        assert_eq!(record.get_scalar("bonus_mean").unwrap(), 2.0);
        assert_eq!(record.get_scalar("bonus_median").unwrap(), 2.0);
        assert_eq!(record.get_scalar("single").unwrap(), 7.0);
        assert!(storage.is_empty());
    }

    #[test]
    fn test_aggregate_keeps_latest_array() {
        let mut storage = RecordStorage::new();
        storage.store(Record::from_slice(&[("ff", RecordValue::Array1(vec![1.0]))]));
        storage.store(Record::from_slice(&[("ff", RecordValue::Array1(vec![2.0]))]));
        let record = storage.aggregate();
        assert_eq!(record.get_array1("ff").unwrap(), &[2.0]);
    }
}
