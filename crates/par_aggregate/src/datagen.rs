//! src/datagen.rs
//!
//! Seeded synthetic inputs for the benchmark workloads.
//!
//! All generators draw from one `StdRng`, so a `DataGen` built with the same
//! seed produces the same sequence of buffers. Without a seed a random one is
//! chosen and can be read back with `DataGen::seed` to reproduce the run.

use anyhow::{ensure, Result};
use log::info;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::readers::{RecordHeader, RecordPairWriter};

/// Dense row-major matrix of integers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<i64>,
}

impl Matrix {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0; rows * cols],
        }
    }

    pub fn from_rows(rows: Vec<Vec<i64>>) -> Result<Self> {
        let cols = rows.first().map_or(0, Vec::len);
        ensure!(
            rows.iter().all(|r| r.len() == cols),
            "All matrix rows must have {} columns",
            cols
        );
        Ok(Self {
            rows: rows.len(),
            cols,
            data: rows.into_iter().flatten().collect(),
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn row(&self, i: usize) -> &[i64] {
        &self.data[i * self.cols..(i + 1) * self.cols]
    }

    pub fn set(&mut self, i: usize, j: usize, value: i64) {
        self.data[i * self.cols + j] = value;
    }

    pub fn get(&self, i: usize, j: usize) -> i64 {
        self.data[i * self.cols + j]
    }
}

/// Sparsity pattern of a generated square matrix. Cells outside the pattern
/// are zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatrixKind {
    /// Only the main diagonal.
    Diagonal,
    /// The main diagonal and everything above it.
    Triangular,
    /// Two cells either side of the diagonal.
    Banded,
}

impl MatrixKind {
    pub const ALL: [MatrixKind; 3] = [
        MatrixKind::Diagonal,
        MatrixKind::Triangular,
        MatrixKind::Banded,
    ];

    const BAND_HALF_WIDTH: usize = 2;

    /// Column range of the non-zero cells in row `i` of an `n x n` matrix.
    fn columns(self, i: usize, n: usize) -> std::ops::Range<usize> {
        match self {
            MatrixKind::Diagonal => i..i + 1,
            MatrixKind::Triangular => i..n,
            MatrixKind::Banded => {
                i.saturating_sub(Self::BAND_HALF_WIDTH)..(i + Self::BAND_HALF_WIDTH + 1).min(n)
            }
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MatrixKind::Diagonal => "diagonal",
            MatrixKind::Triangular => "triangular",
            MatrixKind::Banded => "banded",
        }
    }
}

impl fmt::Display for MatrixKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatrixKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "diagonal" => Ok(MatrixKind::Diagonal),
            "triangular" => Ok(MatrixKind::Triangular),
            "banded" => Ok(MatrixKind::Banded),
            other => anyhow::bail!(
                "Unknown matrix kind '{}', expected one of: diagonal, triangular, banded",
                other
            ),
        }
    }
}

/// Seeded generator for benchmark inputs.
pub struct DataGen {
    seed: u64,
    rng: StdRng,
}

impl DataGen {
    pub fn new(seed: Option<u64>) -> Self {
        let seed = seed.unwrap_or_else(|| rand::rng().random());
        Self {
            seed,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Integers in `[0, 1_000_000)`.
    pub fn random_ints(&mut self, len: usize) -> Vec<i64> {
        (0..len).map(|_| self.rng.random_range(0..1_000_000)).collect()
    }

    /// Integers in `[0, 1000)`.
    pub fn random_small_ints(&mut self, len: usize) -> Vec<i64> {
        (0..len).map(|_| self.rng.random_range(0..1000)).collect()
    }

    /// Doubles in `[0, 100)` on a 0.1 grid.
    pub fn random_doubles(&mut self, len: usize) -> Vec<f64> {
        (0..len)
            .map(|_| self.rng.random_range(0..1000) as f64 / 10.0)
            .collect()
    }

    /// Dense matrix with cells in `[1, 10_000]`. No cell is zero, so every
    /// cell takes part in a row minimum.
    pub fn random_matrix(&mut self, rows: usize, cols: usize) -> Matrix {
        Matrix {
            rows,
            cols,
            data: (0..rows * cols)
                .map(|_| self.rng.random_range(1..=10_000))
                .collect(),
        }
    }

    /// `size x size` matrix with cells in `[1, 100]` inside the pattern of
    /// `kind` and zero elsewhere.
    pub fn special_matrix(&mut self, size: usize, kind: MatrixKind) -> Matrix {
        let mut matrix = Matrix::zeros(size, size);
        for i in 0..size {
            for j in kind.columns(i, size) {
                matrix.set(i, j, self.rng.random_range(1..=100));
            }
        }
        matrix
    }

    /// Vector for the record stream: values in `[0, 10)` on a 0.01 grid.
    pub fn random_record_vector(&mut self, len: usize) -> Vec<f64> {
        (0..len)
            .map(|_| self.rng.random_range(0..1000) as f64 / 100.0)
            .collect()
    }

    /// Writes a record-pair file with `pairs` pairs of `size`-element vectors.
    pub fn write_vector_file(
        &mut self,
        path: impl AsRef<Path>,
        pairs: usize,
        size: usize,
    ) -> Result<()> {
        let path = path.as_ref();
        let mut writer = RecordPairWriter::create(path, RecordHeader::new(pairs, size))?;
        for _ in 0..pairs {
            let a = self.random_record_vector(size);
            let b = self.random_record_vector(size);
            writer.write_pair(&a, &b)?;
        }
        writer.finish()?;
        info!(
            "Generated {} ({} pairs x {} elements, seed {})",
            path.display(),
            pairs,
            size,
            self.seed
        );
        Ok(())
    }
}
