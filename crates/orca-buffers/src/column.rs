//! Typed columnar storage for one schema field.
//!
//! Scalar fields hold `capacity` elements; array fields hold
//! `capacity × length` elements laid out row-major, so one row of a waveform
//! is a contiguous slice.

use orca_core::{BufferError, DType, FieldSpec};

/// A scalar value on its way into (or out of) a column.
///
/// Values are cast into the column's dtype with `as` semantics, matching how
/// the hardware fields are masked to width before they are written.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    U(u64),
    I(i64),
    F(f64),
}

impl Scalar {
    pub fn as_u64(self) -> u64 {
        match self {
            Scalar::U(v) => v,
            Scalar::I(v) => v as u64,
            Scalar::F(v) => v as u64,
        }
    }

    pub fn as_i64(self) -> i64 {
        match self {
            Scalar::U(v) => v as i64,
            Scalar::I(v) => v,
            Scalar::F(v) => v as i64,
        }
    }

    pub fn as_f64(self) -> f64 {
        match self {
            Scalar::U(v) => v as f64,
            Scalar::I(v) => v as f64,
            Scalar::F(v) => v,
        }
    }
}

macro_rules! scalar_from {
    ($variant:ident: $($ty:ty),*) => {
        $(impl From<$ty> for Scalar {
            fn from(v: $ty) -> Self {
                Scalar::$variant(v.into())
            }
        })*
    };
}

scalar_from!(U: u8, u16, u32, u64);
scalar_from!(I: i32, i64);
scalar_from!(F: f32, f64);

/// Backing storage, one vector per dtype.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    U8(Vec<u8>),
    U16(Vec<u16>),
    U32(Vec<u32>),
    U64(Vec<u64>),
    I64(Vec<i64>),
    F64(Vec<f64>),
}

impl ColumnData {
    fn zeroed(dtype: DType, len: usize) -> Self {
        match dtype {
            DType::U8 => ColumnData::U8(vec![0; len]),
            DType::U16 => ColumnData::U16(vec![0; len]),
            DType::U32 => ColumnData::U32(vec![0; len]),
            DType::U64 => ColumnData::U64(vec![0; len]),
            DType::I64 => ColumnData::I64(vec![0; len]),
            DType::F64 => ColumnData::F64(vec![0.0; len]),
        }
    }

    fn len(&self) -> usize {
        match self {
            ColumnData::U8(v) => v.len(),
            ColumnData::U16(v) => v.len(),
            ColumnData::U32(v) => v.len(),
            ColumnData::U64(v) => v.len(),
            ColumnData::I64(v) => v.len(),
            ColumnData::F64(v) => v.len(),
        }
    }
}

/// One field's storage plus its declaration.
#[derive(Debug, Clone)]
pub struct Column {
    name: String,
    spec: FieldSpec,
    width: usize,
    data: ColumnData,
}

impl Column {
    /// Allocate a zeroed column with room for `capacity` rows.
    pub fn new(name: impl Into<String>, spec: FieldSpec, capacity: usize) -> Self {
        let width = spec.length.unwrap_or(1);
        let data = ColumnData::zeroed(spec.dtype, capacity * width);
        Self {
            name: name.into(),
            spec,
            width,
            data,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn spec(&self) -> &FieldSpec {
        &self.spec
    }

    /// Elements per row (1 for scalars).
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn data(&self) -> &ColumnData {
        &self.data
    }

    pub fn memory_bytes(&self) -> usize {
        self.data.len() * self.spec.dtype.size_bytes()
    }

    pub(crate) fn set_scalar(&mut self, row: usize, value: Scalar) -> Result<(), BufferError> {
        if self.spec.is_array() {
            return Err(BufferError::ShapeMismatch {
                field: self.name.clone(),
                expected: "an array",
                actual: "a scalar",
            });
        }
        match &mut self.data {
            ColumnData::U8(v) => v[row] = value.as_u64() as u8,
            ColumnData::U16(v) => v[row] = value.as_u64() as u16,
            ColumnData::U32(v) => v[row] = value.as_u64() as u32,
            ColumnData::U64(v) => v[row] = value.as_u64(),
            ColumnData::I64(v) => v[row] = value.as_i64(),
            ColumnData::F64(v) => v[row] = value.as_f64(),
        }
        Ok(())
    }

    /// Copy `samples` into `row`, truncating to the field length and
    /// zero-filling whatever the samples do not cover.
    pub(crate) fn set_samples(&mut self, row: usize, samples: &[u16]) -> Result<(), BufferError> {
        if !self.spec.is_array() {
            return Err(BufferError::ShapeMismatch {
                field: self.name.clone(),
                expected: "a scalar",
                actual: "an array",
            });
        }
        let width = self.width;
        let start = row * width;
        let n = samples.len().min(width);

        macro_rules! copy_into {
            ($v:expr, $zero:expr) => {{
                let dst = &mut $v[start..start + width];
                for (d, s) in dst.iter_mut().zip(&samples[..n]) {
                    *d = (*s).into();
                }
                dst[n..].fill($zero);
            }};
        }

        match &mut self.data {
            ColumnData::U16(v) => {
                let dst = &mut v[start..start + width];
                dst[..n].copy_from_slice(&samples[..n]);
                dst[n..].fill(0);
            }
            ColumnData::U32(v) => copy_into!(v, 0),
            ColumnData::U64(v) => copy_into!(v, 0),
            ColumnData::I64(v) => copy_into!(v, 0),
            ColumnData::F64(v) => copy_into!(v, 0.0),
            ColumnData::U8(_) => {
                return Err(BufferError::ShapeMismatch {
                    field: self.name.clone(),
                    expected: "uint8 samples",
                    actual: "uint16 samples",
                })
            }
        }
        Ok(())
    }

    /// Value of a scalar field at `row`.
    pub fn scalar(&self, row: usize) -> Option<Scalar> {
        if self.spec.is_array() {
            return None;
        }
        match &self.data {
            ColumnData::U8(v) => v.get(row).map(|&x| Scalar::U(x.into())),
            ColumnData::U16(v) => v.get(row).map(|&x| Scalar::U(x.into())),
            ColumnData::U32(v) => v.get(row).map(|&x| Scalar::U(x.into())),
            ColumnData::U64(v) => v.get(row).map(|&x| Scalar::U(x)),
            ColumnData::I64(v) => v.get(row).map(|&x| Scalar::I(x)),
            ColumnData::F64(v) => v.get(row).map(|&x| Scalar::F(x)),
        }
    }

    /// One row of a `uint16` array field.
    pub fn samples(&self, row: usize) -> Option<&[u16]> {
        match &self.data {
            ColumnData::U16(v) if self.spec.is_array() => {
                let start = row * self.width;
                v.get(start..start + self.width)
            }
            _ => None,
        }
    }
}
