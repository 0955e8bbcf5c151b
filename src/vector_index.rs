use std::path::Path;

use rayon::prelude::*;

use crate::error::{Error, Result};

const MAGIC: &[u8; 4] = b"DWIX";
const FORMAT_VERSION: u32 = 1;

/// Header size: 4 bytes magic + 4 bytes version + 4 bytes dimension +
/// 8 bytes vector count.
const HEADER_SIZE: usize = 20;

/// One result slot of a nearest-neighbour query.
///
/// `position` is `None` for the "no match" slots that pad a result when
/// the index holds fewer than `k` vectors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Squared Euclidean distance to the query.
    pub distance: f32,
    pub position: Option<usize>,
}

impl Neighbor {
    const NO_MATCH: Self = Self {
        distance: f32::MAX,
        position: None,
    };
}

/// Exact nearest-neighbour index over dense vectors.
///
/// Vectors are append-only and identified by insertion position.
///
/// Binary format:
/// - 4 bytes: magic `DWIX`
/// - 4 bytes: format version (u32 LE)
/// - 4 bytes: dimension D (u32 LE)
/// - 8 bytes: vector count N (u64 LE)
/// - N * D * 4 bytes: f32 LE values in row-major order
#[derive(Debug, Clone, PartialEq)]
pub struct FlatIndex {
    dimension: usize,
    /// Row-major: `data[position * dimension + dim_idx]`.
    data: Vec<f32>,
}

impl FlatIndex {
    /// Create an empty index for vectors of `dimension` components.
    ///
    /// # Examples
    ///
    /// ```
    /// use docwell::vector_index::FlatIndex;
    ///
    /// let mut index = FlatIndex::new(2);
    /// index.add(&[vec![0.0, 0.0], vec![3.0, 4.0]]).unwrap();
    ///
    /// let hits = index.search(&[3.0, 3.0], 3).unwrap();
    /// assert_eq!(hits[0].position, Some(1));
    /// assert_eq!(hits[0].distance, 1.0);
    /// assert_eq!(hits[2].position, None);
    /// ```
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            data: Vec::new(),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Number of vectors stored.
    pub fn len(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.data.len() / self.dimension
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Append vectors. Every vector must match the index dimension; on
    /// error nothing is added.
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

    /// Return exactly `k` slots ordered by ascending squared Euclidean
    /// distance, ties broken by lower position.
    ///
    /// When fewer than `k` vectors are stored the tail is padded with
    /// "no match" slots, so `k` slots are always allocated. Callers that
    /// discard padding should bound `k` by [`FlatIndex::len`].
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        if query.len() != self.dimension {
            return Err(Error::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(f32, usize)> = if self.dimension == 0 {
            Vec::new()
        } else {
            self.data
                .par_chunks_exact(self.dimension)
                .enumerate()
                .map(|(position, vector)| {
                    (squared_l2(query, vector), position)
                })
                .collect()
        };

        scored.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        scored.truncate(k);

        let mut neighbors: Vec<Neighbor> = scored
            .into_iter()
            .map(|(distance, position)| Neighbor {
                distance,
                position: Some(position),
            })
            .collect();
        neighbors.resize(k, Neighbor::NO_MATCH);
        Ok(neighbors)
    }

    /// Write the index to `path`, replacing any existing file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut bytes =
            Vec::with_capacity(HEADER_SIZE + std::mem::size_of_val(&*self.data));
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        bytes.extend_from_slice(&(self.dimension as u32).to_le_bytes());
        bytes.extend_from_slice(&(self.len() as u64).to_le_bytes());
        for value in &self.data {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        std::fs::write(path, bytes)?;
        Ok(())
    }

    /// Read an index previously written with [`FlatIndex::save`].
    pub fn load(path: &Path) -> Result<Self> {
        let corrupt = |reason: String| Error::CorruptSnapshot {
            path: path.to_path_buf(),
            reason,
        };
        let bytes = std::fs::read(path)
            .map_err(|e| corrupt(format!("cannot read index: {e}")))?;

        if bytes.len() < HEADER_SIZE {
            return Err(corrupt(format!(
                "file is {} bytes, shorter than the header",
                bytes.len()
            )));
        }
        if &bytes[0..4] != MAGIC {
            return Err(corrupt("not a docwell index file".into()));
        }

        let version = read_u32(&bytes[4..8]);
        if version != FORMAT_VERSION {
            return Err(corrupt(format!("unsupported format version {version}")));
        }

        let dimension = read_u32(&bytes[8..12]) as usize;
        let count = read_u64(&bytes[12..20]) as usize;

        let expected_len = count
            .checked_mul(dimension)
            .and_then(|n| n.checked_mul(4))
            .and_then(|n| n.checked_add(HEADER_SIZE));
        if expected_len != Some(bytes.len()) {
            return Err(corrupt(format!(
                "header declares {count} vectors of dimension {dimension}, \
                 but the file is {} bytes",
                bytes.len()
            )));
        }

        let mut data: Vec<f32> =
            bytemuck::pod_collect_to_vec(&bytes[HEADER_SIZE..]);
        if cfg!(target_endian = "big") {
            for value in &mut data {
                *value = f32::from_bits(value.to_bits().swap_bytes());
            }
        }

        Ok(Self { dimension, data })
    }
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

fn read_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(bytes);
    u32::from_le_bytes(buf)
}

fn read_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    u64::from_le_bytes(buf)
}
