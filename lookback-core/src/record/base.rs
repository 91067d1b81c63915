//! Records and their values.
use crate::error::LookbackError;
use std::collections::{
    hash_map::{Iter, Keys},
    HashMap,
};

/// A value stored in a [`Record`].
#[derive(Debug, Clone, PartialEq)]
pub enum RecordValue {
    /// A single floating-point value.
    Scalar(f32),

    /// A 1-dimensional array.
    Array1(Vec<f32>),

    /// A 2-dimensional array in row-major order with its shape.
    Array2(Vec<f32>, [usize; 2]),
}

impl RecordValue {
    /// Flattens the value into a vector, row-major for matrices.
    pub fn to_vec(&self) -> Vec<f32> {
        match self {
            RecordValue::Scalar(v) => vec![*v],
            RecordValue::Array1(v) => v.clone(),
            RecordValue::Array2(v, _) => v.clone(),
        }
    }

    /// Builds an [`RecordValue::Array2`] from an ndarray matrix.
    pub fn from_array2(a: &ndarray::Array2<f32>) -> Self {
        let shape = [a.nrows(), a.ncols()];
        RecordValue::Array2(a.iter().copied().collect(), shape)
    }
}

/// A container of key-value pairs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record(HashMap<String, RecordValue>);

impl Record {
    /// Creates an empty record.
    pub fn empty() -> Self {
        Self(HashMap::new())
    }

    /// Creates a record containing a single scalar value.
    pub fn from_scalar(name: impl Into<String>, value: f32) -> Self {
        Self(HashMap::from([(name.into(), RecordValue::Scalar(value))]))
    }

    /// Creates a record from a slice of key-value pairs.
    pub fn from_slice<K: Into<String> + Clone>(s: &[(K, RecordValue)]) -> Self {
        Self(
            s.iter()
                .map(|(k, v)| (k.clone().into(), v.clone()))
                .collect(),
        )
    }

    /// Iterator over the keys.
    pub fn keys(&self) -> Keys<String, RecordValue> {
        self.0.keys()
    }

    /// Inserts a key-value pair.
    pub fn insert(&mut self, k: impl Into<String>, v: RecordValue) {
        self.0.insert(k.into(), v);
    }

    /// Iterator over the key-value pairs.
    pub fn iter(&self) -> Iter<'_, String, RecordValue> {
        self.0.iter()
    }

    /// Value associated with `k`.
    pub fn get(&self, k: &str) -> Option<&RecordValue> {
        self.0.get(k)
    }

    /// Returns `true` if `k` is present.
    pub fn contains_key(&self, k: &str) -> bool {
        self.0.contains_key(k)
    }

    /// Merges two records. Values of `record` win on key collisions.
    pub fn merge(self, record: Record) -> Self {
        Record(self.0.into_iter().chain(record.0).collect())
    }

    /// Merges `record` into this one. Values of `record` win on key collisions.
    pub fn merge_inplace(&mut self, record: Record) {
        self.0.extend(record.0);
    }

    /// Scalar value of `k`.
    pub fn get_scalar(&self, k: &str) -> Result<f32, LookbackError> {
        match self.0.get(k) {
            Some(RecordValue::Scalar(v)) => Ok(*v),
            Some(_) => Err(LookbackError::RecordValueTypeError("Scalar".to_string())),
            None => Err(LookbackError::RecordKeyError(k.to_string())),
        }
    }

    /// 1-dimensional array of `k`.
    pub fn get_array1(&self, k: &str) -> Result<&[f32], LookbackError> {
        match self.0.get(k) {
            Some(RecordValue::Array1(v)) => Ok(v.as_slice()),
            Some(_) => Err(LookbackError::RecordValueTypeError("Array1".to_string())),
            None => Err(LookbackError::RecordKeyError(k.to_string())),
        }
    }

    /// 2-dimensional array of `k` with its shape.
    pub fn get_array2(&self, k: &str) -> Result<(&[f32], [usize; 2]), LookbackError> {
        match self.0.get(k) {
            Some(RecordValue::Array2(v, s)) => Ok((v.as_slice(), *s)),
            Some(_) => Err(LookbackError::RecordValueTypeError("Array2".to_string())),
            None => Err(LookbackError::RecordKeyError(k.to_string())),
        }
    }

    /// Returns `true` if the record has no entries.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The number of entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_getters() {
        let mut record = Record::from_scalar("reward", 1.5);
        record.insert("ff", RecordValue::Array1(vec![1.0, 2.0]));

        assert_eq!(record.get_scalar("reward").unwrap(), 1.5);
        assert_eq!(record.get_array1("ff").unwrap(), &[1.0, 2.0]);
        assert!(matches!(
            record.get_scalar("ff"),
            Err(LookbackError::RecordValueTypeError(_))
        ));
        assert!(matches!(
            record.get_array1("missing"),
            Err(LookbackError::RecordKeyError(_))
        ));
    }

    #[test]
    fn test_merge_prefers_right() {
        let left = Record::from_slice(&[
            ("a", RecordValue::Scalar(1.0)),
            ("b", RecordValue::Scalar(2.0)),
        ]);
        let right = Record::from_scalar("b", 3.0);
        let merged = left.merge(right);
        assert_eq!(merged.get_scalar("a").unwrap(), 1.0);
        assert_eq!(merged.get_scalar("b").unwrap(), 3.0);
    }

    #[test]
    fn test_to_vec() {
        let a = ndarray::arr2(&[[1.0f32, 2.0], [3.0, 4.0]]);
        let v = RecordValue::from_array2(&a);
        assert_eq!(v, RecordValue::Array2(vec![1.0, 2.0, 3.0, 4.0], [2, 2]));
        assert_eq!(v.to_vec(), vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(RecordValue::Scalar(0.5).to_vec(), vec![0.5]);
    }
}
