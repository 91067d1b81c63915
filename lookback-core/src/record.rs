//! Key-value records.
//!
//! A [`Record`] carries the per-lane, per-agent information returned by
//! environment steps (including the internal signals of transparent
//! policies), the per-step debug traces of an environment pipeline, and
//! summary statistics.
//!
//! ```rust
//! use lookback_core::record::{Record, RecordValue};
//!
//! let mut record = Record::empty();
//! record.insert("ff", RecordValue::Array1(vec![0.1, -0.3]));
//! record.insert("winner", RecordValue::Scalar(1.0));
//! assert_eq!(record.get_scalar("winner").unwrap(), 1.0);
//! ```
//!
//! [`Recorder`] is the sink trait; [`BufferedRecorder`] keeps records in
//! memory and [`RecordStorage`] aggregates scalar records.
mod base;
mod buffered_recorder;
mod recorder;
mod storage;

pub use base::{Record, RecordValue};
pub use buffered_recorder::BufferedRecorder;
pub use recorder::Recorder;
pub use storage::RecordStorage;
