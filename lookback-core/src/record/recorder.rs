use super::Record;

/// A sink of [`Record`]s.
pub trait Recorder {
    /// Writes a record.
    fn write(&mut self, record: Record);
}
