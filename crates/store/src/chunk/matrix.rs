//! Dense row-major vector matrix and its on-disk encoding.
//!
//! File layout (little-endian):
//!
//! ```text
//! magic "AFVM" | version u16 | rows u32 | dim u32 | rows * dim f32
//! ```

use affinity_core::{AppError, AppResult};

/// Magic bytes at the start of every vector file.
pub const MATRIX_MAGIC: [u8; 4] = *b"AFVM";

/// Current vector file format version.
pub const MATRIX_VERSION: u16 = 1;

const HEADER_LEN: usize = 4 + 2 + 4 + 4;

/// A `rows x dim` matrix of embedding vectors.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    rows: usize,
    dim: usize,
    data: Vec<f32>,
}

impl Matrix {
    /// Create an empty matrix with a fixed column count.
    pub fn empty(dim: usize) -> AppResult<Self> {
        if dim == 0 {
            return Err(AppError::Consistency(
                "Vector dimension must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            rows: 0,
            dim,
            data: Vec::new(),
        })
    }

    /// Build a matrix from individual rows; every row must have `dim` columns.
    pub fn from_rows(rows: Vec<Vec<f32>>, dim: usize) -> AppResult<Self> {
        let mut matrix = Self::empty(dim)?;
        matrix.data.reserve(rows.len() * dim);
        for row in rows {
            matrix.push_row(&row)?;
        }
        Ok(matrix)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Borrow row `i`. Panics if `i >= rows`, like slice indexing.
    pub fn row(&self, i: usize) -> &[f32] {
        &self.data[i * self.dim..(i + 1) * self.dim]
    }

    pub fn iter_rows(&self) -> impl Iterator<Item = &[f32]> + '_ {
        (0..self.rows).map(move |i| self.row(i))
    }

    pub fn push_row(&mut self, row: &[f32]) -> AppResult<()> {
        if row.len() != self.dim {
            return Err(AppError::Consistency(format!(
                "Dimension mismatch: expected {}, got {}",
                self.dim,
                row.len()
            )));
        }
        self.data.extend_from_slice(row);
        self.rows += 1;
        Ok(())
    }

    /// Append all rows of `other` after the existing rows.
    pub fn append(&mut self, other: &Matrix) -> AppResult<()> {
        if other.dim != self.dim {
            return Err(AppError::Consistency(format!(
                "Cannot concatenate matrices of dimension {} and {}",
                self.dim, other.dim
            )));
        }
        self.data.extend_from_slice(&other.data);
        self.rows += other.rows;
        Ok(())
    }

    /// Keep only the first `rows` rows.
    pub fn truncate_rows(&mut self, rows: usize) {
        if rows < self.rows {
            self.rows = rows;
            self.data.truncate(rows * self.dim);
        }
    }

    /// Serialize into the vector file format.
    pub fn to_bytes(&self) -> AppResult<Vec<u8>> {
        let rows = u32::try_from(self.rows)
            .map_err(|_| AppError::Consistency("Row count out of range".to_string()))?;
        let dim = u32::try_from(self.dim)
            .map_err(|_| AppError::Consistency("Dimension out of range".to_string()))?;

        let mut bytes = Vec::with_capacity(HEADER_LEN + self.data.len() * 4);
        bytes.extend_from_slice(&MATRIX_MAGIC);
        bytes.extend_from_slice(&MATRIX_VERSION.to_le_bytes());
        bytes.extend_from_slice(&rows.to_le_bytes());
        bytes.extend_from_slice(&dim.to_le_bytes());
        for &value in &self.data {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        Ok(bytes)
    }

    /// Parse the vector file format.
    pub fn from_bytes(bytes: &[u8]) -> AppResult<Self> {
        let (rows, dim) = read_header(bytes)?;

        let expected = rows
            .checked_mul(dim)
            .and_then(|n| n.checked_mul(4))
            .and_then(|n| n.checked_add(HEADER_LEN))
            .ok_or_else(|| AppError::Consistency("Vector file header overflows".to_string()))?;
        if bytes.len() != expected {
            return Err(AppError::Consistency(format!(
                "Vector file length {} does not match header ({} rows x {} dims)",
                bytes.len(),
                rows,
                dim
            )));
        }

        let data = bytes[HEADER_LEN..]
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();

        Ok(Self { rows, dim, data })
    }
}

/// Decode `(rows, dim)` from the start of a vector file.
pub fn read_header(bytes: &[u8]) -> AppResult<(usize, usize)> {
    if bytes.len() < HEADER_LEN {
        return Err(AppError::Consistency(
            "Vector file is shorter than its header".to_string(),
        ));
    }
    if bytes[0..4] != MATRIX_MAGIC {
        return Err(AppError::Consistency(format!(
            "Invalid vector file magic: {:?}",
            &bytes[0..4]
        )));
    }
    let version = u16::from_le_bytes([bytes[4], bytes[5]]);
    if version != MATRIX_VERSION {
        return Err(AppError::Consistency(format!(
            "Unsupported vector file version: {}",
            version
        )));
    }
    let rows = u32::from_le_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]) as usize;
    let dim = u32::from_le_bytes([bytes[10], bytes[11], bytes[12], bytes[13]]) as usize;
    if dim == 0 {
        return Err(AppError::Consistency(
            "Vector file declares zero dimensions".to_string(),
        ));
    }
    Ok((rows, dim))
}

/// Euclidean length of a vector.
pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Scale a vector to unit length in place. Zero vectors are left untouched.
pub fn l2_normalize(v: &mut [f32]) {
    let norm = l2_norm(v);
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}
