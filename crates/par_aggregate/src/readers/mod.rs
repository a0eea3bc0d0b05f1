pub mod record;

pub use record::{RecordHeader, RecordPair, RecordPairReader, RecordPairWriter};

use anyhow::Result;

/// A sequential source of record pairs, consumed by the pipeline loader.
///
/// Implementations are read by exactly one thread at a time; they only need
/// to be `Send` so the loader can take ownership of them.
pub trait RecordSource: Send {
    /// Header parsed when the source was opened.
    fn header(&self) -> RecordHeader;

    /// Reads the next pair.
    ///
    /// Returns `Ok(None)` at a clean end of stream (the declared record count
    /// was reached, or the stream ended on a record boundary) and `Err` when
    /// the stream ends in the middle of a record.
    fn read_record_pair(&mut self) -> Result<Option<RecordPair>>;
}

impl<S: RecordSource + ?Sized> RecordSource for Box<S> {
    fn header(&self) -> RecordHeader {
        (**self).header()
    }

    fn read_record_pair(&mut self) -> Result<Option<RecordPair>> {
        (**self).read_record_pair()
    }
}
