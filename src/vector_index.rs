//! Exhaustive (flat) L2 vector index.
//!
//! Vectors are kept in one contiguous row-major buffer and searched
//! exhaustively, so results are exact and reproducible across runs.
//!
//! Binary format:
//! - 4 bytes: magic `DVFL`
//! - 4 bytes: format version (u32 LE)
//! - 4 bytes: dimension D (u32 LE)
//! - 8 bytes: vector count N (u64 LE)
//! - 8 bytes: checkpoint generation (u64 LE)
//! - N * D * 4 bytes: f32 LE values in row-major order

use std::{io::Write, path::Path};

use rayon::prelude::*;

use crate::error::{Error, Result};

const MAGIC: &[u8; 4] = b"DVFL";
const FORMAT_VERSION: u32 = 2;
const HEADER_SIZE: usize = 28;

/// Below this many vectors, distances are computed on the calling thread.
const PARALLEL_THRESHOLD: usize = 4096;

/// One search hit: the ordinal of a stored vector and its squared L2
/// distance to the query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub ordinal: usize,
    pub distance: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlatL2Index {
    dimension: usize,
    data: Vec<f32>,
}

impl FlatL2Index {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            data: Vec::new(),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.data.len() / self.dimension
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The vector stored at `ordinal`.
    pub fn vector(&self, ordinal: usize) -> Option<&[f32]> {
        let start = ordinal.checked_mul(self.dimension)?;
        self.data.get(start..start + self.dimension)
    }

    /// Append vectors in order.
    ///
    /// All vectors are checked before any is appended, so a mismatch leaves
    /// the index unchanged.
    ///
    /// # Examples
    ///
    /// ```
    /// use docvec::vector_index::FlatL2Index;
    ///
    /// let mut index = FlatL2Index::new(2);
    /// index.add(&[vec![0.0, 0.0], vec![1.0, 1.0]]).unwrap();
    /// assert_eq!(index.len(), 2);
    /// assert!(index.add(&[vec![1.0, 2.0, 3.0]]).is_err());
    /// assert_eq!(index.len(), 2);
    /// ```
    pub fn add(&mut self, vectors: &[Vec<f32>]) -> Result<()> {
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dimension)
        {
            return Err(Error::DimensionMismatch {
                expected: self.dimension,
                actual: bad.len(),
            });
        }
        self.data.reserve(vectors.len() * self.dimension);
        for vector in vectors {
            self.data.extend_from_slice(vector);
        }
        Ok(())
    }

    /// Return up to `k` nearest vectors by squared L2 distance, closest
    /// first. Equal distances are ordered by ordinal.
    ///
    /// # Examples
    ///
    /// ```
    /// use docvec::vector_index::FlatL2Index;
    ///
    /// let mut index = FlatL2Index::new(1);
    /// index.add(&[vec![0.0], vec![5.0], vec![2.0]]).unwrap();
    ///
    /// let hits = index.search(&[1.5], 2).unwrap();
    /// assert_eq!(hits.len(), 2);
    /// assert_eq!(hits[0].ordinal, 2);
    /// assert_eq!(hits[0].distance, 0.25);
    /// ```
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        if query.len() != self.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        let distance = |(ordinal, row): (usize, &[f32])| Neighbor {
            ordinal,
            distance: squared_l2(query, row),
        };
        let mut neighbors: Vec<Neighbor> = if self.len() >= PARALLEL_THRESHOLD
        {
            self.data
                .par_chunks_exact(self.dimension)
                .enumerate()
                .map(distance)
                .collect()
        } else {
            self.data
                .chunks_exact(self.dimension)
                .enumerate()
                .map(distance)
                .collect()
        };

        let by_distance = |a: &Neighbor, b: &Neighbor| {
            a.distance
                .total_cmp(&b.distance)
                .then(a.ordinal.cmp(&b.ordinal))
        };
        if k < neighbors.len() {
            neighbors.select_nth_unstable_by(k - 1, by_distance);
            neighbors.truncate(k);
        }
        neighbors.sort_by(by_distance);

        Ok(neighbors)
    }

    /// Keep only the vectors whose ordinal satisfies `keep`, preserving order.
    pub fn retain(&mut self, mut keep: impl FnMut(usize) -> bool) {
        if self.dimension == 0 {
            return;
        }
        let mut kept = Vec::with_capacity(self.data.len());
        for (ordinal, row) in self.data.chunks_exact(self.dimension).enumerate()
        {
            if keep(ordinal) {
                kept.extend_from_slice(row);
            }
        }
        self.data = kept;
    }

    /// Serialize the index, tagged with the checkpoint `generation` it
    /// belongs to.
    pub fn to_bytes(&self, generation: u64) -> Vec<u8> {
        let mut bytes =
            Vec::with_capacity(HEADER_SIZE + std::mem::size_of_val(&*self.data));
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        bytes.extend_from_slice(&(self.dimension as u32).to_le_bytes());
        bytes.extend_from_slice(&(self.len() as u64).to_le_bytes());
        bytes.extend_from_slice(&generation.to_le_bytes());
        bytes.extend_from_slice(bytemuck::cast_slice(&self.data[..]));
        bytes
    }

    /// Parse a blob written by [`FlatL2Index::to_bytes`], returning the
    /// index and its generation tag.
    pub fn from_bytes(bytes: &[u8]) -> Result<(Self, u64)> {
        if bytes.len() < HEADER_SIZE || &bytes[0..4] != MAGIC {
            return Err(Error::StoreCorrupt(
                "vector index header is missing or invalid".to_string(),
            ));
        }

        let version = read_u32(&bytes[4..8]);
        if version != FORMAT_VERSION {
            return Err(Error::StoreCorrupt(format!(
                "unsupported vector index version {version}"
            )));
        }
        let dimension = read_u32(&bytes[8..12]) as usize;
        let count = read_u64(&bytes[12..20]) as usize;
        let generation = read_u64(&bytes[20..28]);

        let expected_len = count
            .checked_mul(dimension)
            .and_then(|n| n.checked_mul(4))
            .and_then(|n| n.checked_add(HEADER_SIZE));
        if expected_len != Some(bytes.len()) {
            return Err(Error::StoreCorrupt(format!(
                "vector index holds {} bytes, expected {count} vectors of dimension {dimension}",
                bytes.len()
            )));
        }

        // Copy through the f32 buffer so the source needs no alignment.
        let mut data = vec![0.0f32; count * dimension];
        bytemuck::cast_slice_mut::<f32, u8>(&mut data)
            .copy_from_slice(&bytes[HEADER_SIZE..]);

        Ok((Self { dimension, data }, generation))
    }

    /// Write the index to `path`, synced to disk before returning.
    pub fn save(&self, path: &Path, generation: u64) -> Result<()> {
        let mut file = std::fs::File::create(path)?;
        file.write_all(&self.to_bytes(generation))?;
        file.sync_all()?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<(Self, u64)> {
        Self::from_bytes(&std::fs::read(path)?)
    }
}

fn read_u32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes(bytes.try_into().unwrap_or([0; 4]))
}

fn read_u64(bytes: &[u8]) -> u64 {
    u64::from_le_bytes(bytes.try_into().unwrap_or([0; 8]))
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}
