#![allow(dead_code)]

use par_aggregate::datagen::DataGen;
use par_aggregate::readers::{RecordHeader, RecordPair, RecordPairWriter, RecordSource};

use anyhow::{bail, Result};
use std::io::Write;
use std::thread;
use std::time::Duration;
use tempfile::NamedTempFile;

/// Writes `pairs` full record pairs under a header that declares `declared`
/// pairs, and returns the file with the dot product of every written pair.
pub fn vector_file(
    declared: usize,
    pairs: usize,
    size: usize,
    seed: u64,
) -> Result<(NamedTempFile, Vec<f64>)> {
    let mut data = DataGen::new(Some(seed));
    let file = NamedTempFile::new()?;
    let mut writer = RecordPairWriter::create(file.path(), RecordHeader::new(declared, size))?;
    let mut dots = Vec::with_capacity(pairs);
    for _ in 0..pairs {
        let a = data.random_record_vector(size);
        let b = data.random_record_vector(size);
        let pair = RecordPair::new(a, b);
        writer.write_pair(&pair.a, &pair.b)?;
        dots.push(pair.dot());
    }
    writer.finish()?;
    Ok((file, dots))
}

/// Appends `bytes` of junk after the last full record, so the next read
/// stops in the middle of a vector.
pub fn append_partial_record(file: &NamedTempFile, bytes: usize) -> Result<()> {
    let mut handle = std::fs::OpenOptions::new().append(true).open(file.path())?;
    handle.write_all(&vec![0x3fu8; bytes])?;
    Ok(())
}

pub fn assert_close(actual: f64, expected: f64, rel_tol: f64) {
    let scale = expected.abs().max(1.0);
    assert!(
        (actual - expected).abs() <= rel_tol * scale,
        "expected {expected}, got {actual} (relative tolerance {rel_tol})"
    );
}

/// In-memory source that can slow down or fail its reads.
pub struct ScriptedSource {
    pub pairs: Vec<RecordPair>,
    pub declared: usize,
    pub fail_at: Option<usize>,
    pub delay: Duration,
    next: usize,
}

impl ScriptedSource {
    pub fn new(pairs: Vec<RecordPair>) -> Self {
        Self {
            declared: pairs.len(),
            pairs,
            fail_at: None,
            delay: Duration::ZERO,
            next: 0,
        }
    }

    pub fn fail_at(mut self, index: usize) -> Self {
        self.fail_at = Some(index);
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn dots(&self) -> Vec<f64> {
        self.pairs.iter().map(RecordPair::dot).collect()
    }
}

impl RecordSource for ScriptedSource {
    fn header(&self) -> RecordHeader {
        RecordHeader::new(self.declared, self.pairs.first().map_or(0, RecordPair::len))
    }

    fn read_record_pair(&mut self) -> Result<Option<RecordPair>> {
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        if self.fail_at == Some(self.next) {
            bail!("simulated read failure at record {}", self.next);
        }
        let pair = self.pairs.get(self.next).cloned();
        self.next += 1;
        Ok(pair)
    }
}

pub fn small_pairs(count: usize, size: usize) -> Vec<RecordPair> {
    (0..count)
        .map(|r| {
            RecordPair::new(
                (0..size).map(|i| ((r + i) % 10) as f64).collect(),
                (0..size).map(|i| ((r * i) % 7) as f64 * 0.5).collect(),
            )
        })
        .collect()
}
