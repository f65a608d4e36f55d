use std::fs;
use std::path::Path;

use crate::error::{ArtifactError, Result};
use crate::io::{f32s_from_le_bytes, f32s_to_le_bytes, write_atomic};

const NPY_MAGIC: &[u8; 6] = b"\x93NUMPY";
const NPY_ALIGN: usize = 64;

/// Dense row-major `f32` matrix, one row per corpus chunk.
///
/// Persisted in NumPy `.npy` format (`<f4`, C order) so the embeddings can be
/// inspected with standard tooling.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingMatrix {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl EmbeddingMatrix {
    pub fn new(rows: usize, cols: usize, data: Vec<f32>) -> Result<Self> {
        if rows.checked_mul(cols) != Some(data.len()) {
            return Err(ArtifactError::Shape(format!(
                "{} values cannot form a {rows}x{cols} matrix",
                data.len()
            )));
        }
        Ok(Self { rows, cols, data })
    }

    pub fn from_rows(cols: usize, rows: &[Vec<f32>]) -> Result<Self> {
        let mut data = Vec::with_capacity(rows.len() * cols);
        for (idx, row) in rows.iter().enumerate() {
            if row.len() != cols {
                return Err(ArtifactError::Shape(format!(
                    "row {idx} has {} columns, expected {cols}",
                    row.len()
                )));
            }
            data.extend_from_slice(row);
        }
        Ok(Self {
            rows: rows.len(),
            cols,
            data,
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn row(&self, idx: usize) -> Option<&[f32]> {
        if idx >= self.rows {
            return None;
        }
        let start = idx * self.cols;
        Some(&self.data[start..start + self.cols])
    }

    pub fn iter_rows(&self) -> impl Iterator<Item = &[f32]> + '_ {
        (0..self.rows).filter_map(move |idx| self.row(idx))
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn to_npy_bytes(&self) -> Vec<u8> {
        let dict = format!(
            "{{'descr': '<f4', 'fortran_order': False, 'shape': ({}, {}), }}",
            self.rows, self.cols
        );
        // magic(6) + version(2) + header_len(2)
        let preamble = NPY_MAGIC.len() + 4;
        let unpadded = preamble + dict.len() + 1;
        let padding = (NPY_ALIGN - unpadded % NPY_ALIGN) % NPY_ALIGN;
        let header_len = dict.len() + padding + 1;

        let mut out = Vec::with_capacity(preamble + header_len + self.data.len() * 4);
        out.extend_from_slice(NPY_MAGIC);
        out.extend_from_slice(&[1, 0]);
        out.extend_from_slice(&(header_len as u16).to_le_bytes());
        out.extend_from_slice(dict.as_bytes());
        out.extend(std::iter::repeat(b' ').take(padding));
        out.push(b'\n');
        out.extend_from_slice(&f32s_to_le_bytes(&self.data));
        out
    }

    pub fn from_npy_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < NPY_MAGIC.len() + 4 || &bytes[..NPY_MAGIC.len()] != NPY_MAGIC {
            return Err(ArtifactError::BadMagic("npy"));
        }
        let major = bytes[6];
        let (header_len, header_start) = match major {
            1 => (u16::from_le_bytes([bytes[8], bytes[9]]) as usize, 10),
            2 | 3 => {
                let raw = bytes.get(8..12).ok_or(ArtifactError::Truncated {
                    offset: 8,
                    needed: 4,
                })?;
                (
                    u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]) as usize,
                    12,
                )
            }
            other => {
                return Err(ArtifactError::UnsupportedVersion {
                    kind: "npy",
                    version: other as u32,
                })
            }
        };
        let data_start = header_start + header_len;
        let header = bytes
            .get(header_start..data_start)
            .ok_or(ArtifactError::Truncated {
                offset: header_start,
                needed: header_len,
            })?;
        let header = std::str::from_utf8(header)
            .map_err(|_| ArtifactError::NpyHeader("header is not utf-8".to_string()))?;
        let (rows, cols) = parse_npy_header(header)?;

        let expected = rows
            .checked_mul(cols)
            .and_then(|n| n.checked_mul(4))
            .ok_or_else(|| ArtifactError::Shape(format!("{rows}x{cols} overflows")))?;
        let payload = &bytes[data_start..];
        if payload.len() < expected {
            return Err(ArtifactError::Truncated {
                offset: data_start + payload.len(),
                needed: expected - payload.len(),
            });
        }
        let data = f32s_from_le_bytes(&payload[..expected]);
        Self::new(rows, cols, data)
    }

    pub fn save_npy(&self, path: &Path) -> Result<()> {
        write_atomic(path, &self.to_npy_bytes())?;
        Ok(())
    }

    pub fn load_npy(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        Self::from_npy_bytes(&bytes)
    }
}

fn parse_npy_header(header: &str) -> Result<(usize, usize)> {
    let descr = quoted(dict_value(header, "descr")?)?;
    if descr != "<f4" {
        return Err(ArtifactError::NpyHeader(format!(
            "unsupported dtype {descr}, expected <f4"
        )));
    }
    let fortran = dict_value(header, "fortran_order")?;
    if !fortran.starts_with("False") {
        return Err(ArtifactError::NpyHeader(
            "fortran-ordered arrays are not supported".to_string(),
        ));
    }
    let shape = dict_value(header, "shape")?;
    let open = shape
        .strip_prefix('(')
        .ok_or_else(|| ArtifactError::NpyHeader("shape is not a tuple".to_string()))?;
    let close = open
        .find(')')
        .ok_or_else(|| ArtifactError::NpyHeader("unterminated shape tuple".to_string()))?;
    let dims = open[..close]
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<usize>()
                .map_err(|_| ArtifactError::NpyHeader(format!("bad shape entry {part}")))
        })
        .collect::<Result<Vec<_>>>()?;
    match dims.as_slice() {
        [rows, cols] => Ok((*rows, *cols)),
        other => Err(ArtifactError::NpyHeader(format!(
            "expected a 2-d shape, found {} dimensions",
            other.len()
        ))),
    }
}

/// Raw text after `key:` in the header dict. Keys may use either Python
/// quote style and any spacing around the colon; order does not matter.
fn dict_value<'a>(header: &'a str, key: &str) -> Result<&'a str> {
    for quote in ['\'', '"'] {
        let needle = format!("{quote}{key}{quote}");
        let mut offset = 0;
        while let Some(found) = header[offset..].find(&needle) {
            offset += found + needle.len();
            if let Some(value) = header[offset..].trim_start().strip_prefix(':') {
                return Ok(value.trim_start());
            }
        }
    }
    Err(ArtifactError::NpyHeader(format!("missing key {key}")))
}

fn quoted(value: &str) -> Result<&str> {
    let quote = value
        .chars()
        .next()
        .filter(|c| matches!(c, '\'' | '"'))
        .ok_or_else(|| ArtifactError::NpyHeader("expected a quoted string".to_string()))?;
    let body = &value[1..];
    let end = body
        .find(quote)
        .ok_or_else(|| ArtifactError::NpyHeader("unterminated string".to_string()))?;
    Ok(&body[..end])
}
