use anyhow::{bail, ensure, Context, Result};
use bytemuck::{cast_slice, cast_slice_mut};
use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::Path;

use super::RecordSource;

/// Size of the stream header: two `i32` values.
pub const HEADER_LEN: usize = 8;

/// Leading header of a record-pair stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    /// Number of record pairs the stream declares.
    pub records: usize,
    /// Number of `f64` elements in each vector.
    pub elements: usize,
}

impl RecordHeader {
    pub fn new(records: usize, elements: usize) -> Self {
        Self { records, elements }
    }

    /// Bytes occupied by one vector.
    pub fn vector_bytes(&self) -> usize {
        self.elements * std::mem::size_of::<f64>()
    }

    /// Total stream length when every declared pair is present.
    pub fn stream_len(&self) -> usize {
        HEADER_LEN + 2 * self.records * self.vector_bytes()
    }

    fn parse(bytes: [u8; HEADER_LEN]) -> Result<Self> {
        let records = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let elements = i32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        ensure!(
            records >= 0 && elements >= 0,
            "Malformed record header: records={}, elements={}",
            records,
            elements
        );
        Ok(Self {
            records: records as usize,
            elements: elements as usize,
        })
    }

    fn encode(&self) -> Result<[u8; HEADER_LEN]> {
        let records = i32::try_from(self.records)
            .with_context(|| format!("Record count {} does not fit in the header", self.records))?;
        let elements = i32::try_from(self.elements).with_context(|| {
            format!("Element count {} does not fit in the header", self.elements)
        })?;
        let mut bytes = [0u8; HEADER_LEN];
        bytes[..4].copy_from_slice(&records.to_le_bytes());
        bytes[4..].copy_from_slice(&elements.to_le_bytes());
        Ok(bytes)
    }
}

/// Two equal-length vectors read together from the stream.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordPair {
    pub a: Vec<f64>,
    pub b: Vec<f64>,
}

impl RecordPair {
    pub fn new(a: Vec<f64>, b: Vec<f64>) -> Self {
        debug_assert_eq!(a.len(), b.len());
        Self { a, b }
    }

    pub fn len(&self) -> usize {
        self.a.len()
    }

    pub fn is_empty(&self) -> bool {
        self.a.is_empty()
    }

    pub fn dot(&self) -> f64 {
        self.a.iter().zip(&self.b).map(|(x, y)| x * y).sum()
    }
}

/// Reads record pairs from a binary stream.
///
/// # Layout
/// ```text
/// +-----------+------------+----------------------+----------------------+---
/// | i32 count | i32 length | f64 x length (a[0])  | f64 x length (b[0])  | ...
/// +-----------+------------+----------------------+----------------------+---
/// ```
/// Header integers are little-endian. Vector payloads are raw `f64` values in
/// host byte order with no padding between them.
///
/// # Example
/// ```ignore
/// let mut reader = RecordPairReader::open("vectors.bin")?;
/// while let Some(pair) = reader.read_record_pair()? {
///     total += pair.dot();
/// }
/// ```
pub struct RecordPairReader<R> {
    reader: R,
    header: RecordHeader,
    records_read: usize,
}

impl RecordPairReader<BufReader<File>> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Failed to open record file: {}", path.display()))?;
        Self::new(BufReader::new(file))
            .with_context(|| format!("Failed to read record header: {}", path.display()))
    }
}

impl<R: Read> RecordPairReader<R> {
    /// Wraps `reader` and consumes the header.
    pub fn new(mut reader: R) -> Result<Self> {
        let mut bytes = [0u8; HEADER_LEN];
        reader
            .read_exact(&mut bytes)
            .context("Stream is shorter than the record header")?;
        Ok(Self {
            reader,
            header: RecordHeader::parse(bytes)?,
            records_read: 0,
        })
    }

    pub fn records_read(&self) -> usize {
        self.records_read
    }

    /// Fills `buf` as far as the stream allows and returns the byte count.
    fn fill(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e).context("Failed to read record payload"),
            }
        }
        Ok(filled)
    }
}

impl<R: Read + Send> RecordSource for RecordPairReader<R> {
    fn header(&self) -> RecordHeader {
        self.header
    }

    fn read_record_pair(&mut self) -> Result<Option<RecordPair>> {
        if self.records_read >= self.header.records {
            return Ok(None);
        }
        let elements = self.header.elements;
        let vector_bytes = self.header.vector_bytes();
        let mut a = vec![0f64; elements];
        let mut b = vec![0f64; elements];

        let got = self.fill(cast_slice_mut(a.as_mut_slice()))?;
        if got == 0 && vector_bytes > 0 {
            // Ended on a record boundary before the declared count.
            return Ok(None);
        }
        if got < vector_bytes {
            bail!(
                "Record {} truncated: first vector has {} of {} bytes",
                self.records_read,
                got,
                vector_bytes
            );
        }
        let got = self.fill(cast_slice_mut(b.as_mut_slice()))?;
        if got < vector_bytes {
            bail!(
                "Record {} truncated: second vector has {} of {} bytes",
                self.records_read,
                got,
                vector_bytes
            );
        }

        self.records_read += 1;
        Ok(Some(RecordPair { a, b }))
    }
}

/// Writes a record-pair stream in the layout read by `RecordPairReader`.
pub struct RecordPairWriter<W: Write> {
    writer: W,
    header: RecordHeader,
    records_written: usize,
}

impl RecordPairWriter<BufWriter<File>> {
    pub fn create(path: impl AsRef<Path>, header: RecordHeader) -> Result<Self> {
        let path = path.as_ref();
        let file = File::create(path)
            .with_context(|| format!("Failed to create record file: {}", path.display()))?;
        Self::new(BufWriter::new(file), header)
    }
}

impl<W: Write> RecordPairWriter<W> {
    /// Writes the header immediately.
    pub fn new(mut writer: W, header: RecordHeader) -> Result<Self> {
        writer
            .write_all(&header.encode()?)
            .context("Failed to write record header")?;
        Ok(Self {
            writer,
            header,
            records_written: 0,
        })
    }

    pub fn write_pair(&mut self, a: &[f64], b: &[f64]) -> Result<()> {
        for vector in [a, b] {
            ensure!(
                vector.len() == self.header.elements,
                "Vector has {} elements, header declares {}",
                vector.len(),
                self.header.elements
            );
        }
        self.writer.write_all(cast_slice(a))?;
        self.writer.write_all(cast_slice(b))?;
        self.records_written += 1;
        Ok(())
    }

    pub fn records_written(&self) -> usize {
        self.records_written
    }

    /// Flushes and returns the underlying writer.
    ///
    /// Writing fewer pairs than the header declares is allowed; readers report
    /// the shortfall as a clean end of stream.
    pub fn finish(mut self) -> Result<W> {
        self.writer.flush().context("Failed to flush record stream")?;
        Ok(self.writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::NamedTempFile;

    fn encode(header: RecordHeader, pairs: &[(Vec<f64>, Vec<f64>)]) -> Vec<u8> {
        let mut writer = RecordPairWriter::new(Vec::new(), header).unwrap();
        for (a, b) in pairs {
            writer.write_pair(a, b).unwrap();
        }
        writer.finish().unwrap()
    }

    #[test]
    fn reads_back_written_pairs() -> Result<()> {
        let pairs = vec![
            (vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]),
            (vec![0.5, 0.25, 0.0], vec![2.0, 4.0, 8.0]),
        ];
        let bytes = encode(RecordHeader::new(2, 3), &pairs);
        assert_eq!(bytes.len(), RecordHeader::new(2, 3).stream_len());

        let mut reader = RecordPairReader::new(Cursor::new(bytes))?;
        assert_eq!(reader.header(), RecordHeader::new(2, 3));
        let first = reader.read_record_pair()?.unwrap();
        assert_eq!(first.dot(), 32.0);
        let second = reader.read_record_pair()?.unwrap();
        assert_eq!(second.dot(), 2.0);
        assert!(reader.read_record_pair()?.is_none());
        assert_eq!(reader.records_read(), 2);
        Ok(())
    }

    #[test]
    fn stops_at_declared_count_even_with_trailing_bytes() -> Result<()> {
        let mut bytes = encode(RecordHeader::new(1, 2), &[(vec![1.0, 1.0], vec![1.0, 1.0])]);
        bytes.extend_from_slice(&[0u8; 64]);
        let mut reader = RecordPairReader::new(Cursor::new(bytes))?;
        assert!(reader.read_record_pair()?.is_some());
        assert!(reader.read_record_pair()?.is_none());
        Ok(())
    }

    #[test]
    fn missing_records_on_boundary_end_cleanly() -> Result<()> {
        let bytes = encode(RecordHeader::new(5, 2), &[(vec![1.0, 2.0], vec![3.0, 4.0])]);
        let mut reader = RecordPairReader::new(Cursor::new(bytes))?;
        assert!(reader.read_record_pair()?.is_some());
        assert!(reader.read_record_pair()?.is_none());
        Ok(())
    }

    #[test]
    fn short_read_mid_record_is_an_error() -> Result<()> {
        let mut bytes = encode(RecordHeader::new(2, 4), &[(vec![1.0; 4], vec![2.0; 4])]);
        bytes.extend_from_slice(cast_slice(&[7.0f64; 5][..]));
        let mut reader = RecordPairReader::new(Cursor::new(bytes))?;
        assert!(reader.read_record_pair()?.is_some());
        let err = reader.read_record_pair().unwrap_err();
        assert!(err.to_string().contains("truncated"));
        Ok(())
    }

    #[test]
    fn rejects_negative_header() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&(-1i32).to_le_bytes());
        bytes.extend_from_slice(&4i32.to_le_bytes());
        assert!(RecordPairReader::new(Cursor::new(bytes)).is_err());
        assert!(RecordPairReader::new(Cursor::new(vec![1u8, 2, 3])).is_err());
    }

    #[test]
    fn zero_length_vectors_still_count_records() -> Result<()> {
        let empty = (Vec::new(), Vec::new());
        let bytes = encode(RecordHeader::new(3, 0), &[empty.clone(), empty.clone(), empty]);
        let mut reader = RecordPairReader::new(Cursor::new(bytes))?;
        let mut count = 0;
        while let Some(pair) = reader.read_record_pair()? {
            assert!(pair.is_empty());
            count += 1;
        }
        assert_eq!(count, 3);
        Ok(())
    }

    #[test]
    fn writer_rejects_wrong_length() {
        let mut writer = RecordPairWriter::new(Vec::new(), RecordHeader::new(1, 3)).unwrap();
        assert!(writer.write_pair(&[1.0, 2.0], &[1.0, 2.0, 3.0]).is_err());
    }

    #[test]
    fn round_trips_through_a_file() -> Result<()> {
        let file = NamedTempFile::new()?;
        let mut writer = RecordPairWriter::create(file.path(), RecordHeader::new(1, 2))?;
        writer.write_pair(&[3.0, 4.0], &[3.0, 4.0])?;
        writer.finish()?;

        let mut reader = RecordPairReader::open(file.path())?;
        assert_eq!(reader.read_record_pair()?.map(|p| p.dot()), Some(25.0));
        Ok(())
    }
}
