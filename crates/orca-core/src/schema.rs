//! Channel schemas: the named, typed field layout a decoder produces per channel.
//!
//! A [`ChannelSchema`] is built once per channel key when the run header is
//! applied, wrapped in an `Arc` and never mutated afterwards. Buffers allocate
//! their columns from it and the storage layer reads names, dtypes and units
//! from it, so it is `Serialize`.

use crate::ccc::ChannelKey;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Underlying numeric type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    U8,
    U16,
    U32,
    U64,
    I64,
    F64,
}

impl DType {
    /// Width of one element in bytes.
    pub const fn size_bytes(self) -> usize {
        match self {
            DType::U8 => 1,
            DType::U16 => 2,
            DType::U32 => 4,
            DType::U64 | DType::I64 | DType::F64 => 8,
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DType::U8 => "uint8",
            DType::U16 => "uint16",
            DType::U32 => "uint32",
            DType::U64 => "uint64",
            DType::I64 => "int64",
            DType::F64 => "float64",
        };
        write!(f, "{}", label)
    }
}

/// Sampling metadata attached to waveform fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sampling {
    /// Sample period
    pub dt: f64,
    pub dt_units: String,
    pub t0_units: String,
}

/// Declaration of one field in a channel schema.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldSpec {
    pub dtype: DType,

    /// Physical unit, if any (e.g. `clock_ticks`, `V`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,

    /// Fixed element count for array fields; `None` for scalars
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub sampling: Option<Sampling>,
}

impl FieldSpec {
    pub fn scalar(dtype: DType) -> Self {
        Self {
            dtype,
            unit: None,
            length: None,
            sampling: None,
        }
    }

    /// Fixed-length array field sampled every `dt` nanoseconds.
    pub fn waveform(dtype: DType, length: usize, dt_ns: f64) -> Self {
        Self {
            dtype,
            unit: None,
            length: Some(length),
            sampling: Some(Sampling {
                dt: dt_ns,
                dt_units: "ns".to_string(),
                t0_units: "ns".to_string(),
            }),
        }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn is_array(&self) -> bool {
        self.length.is_some()
    }
}

/// Ordered field layout for one channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ChannelSchema {
    fields: Vec<(String, FieldSpec)>,
}

impl ChannelSchema {
    pub fn builder() -> ChannelSchemaBuilder {
        ChannelSchemaBuilder { fields: Vec::new() }
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldSpec)> {
        self.fields.iter().map(|(name, spec)| (name.as_str(), spec))
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.index_of(name).map(|idx| &self.fields[idx].1)
    }

    /// Position of a field in declaration order.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|(n, _)| n == name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Copy of this schema with one array field resized.
    ///
    /// Used to apply header-derived parameters (trace length) to a template.
    pub fn with_array_length(&self, name: &str, length: usize) -> Self {
        let mut schema = self.clone();
        if let Some((_, spec)) = schema.fields.iter_mut().find(|(n, _)| n == name) {
            spec.length = Some(length);
        }
        schema
    }

    /// Bytes needed for one row.
    pub fn row_bytes(&self) -> usize {
        self.fields
            .iter()
            .map(|(_, spec)| spec.dtype.size_bytes() * spec.length.unwrap_or(1))
            .sum()
    }
}

/// Builder for [`ChannelSchema`] templates.
#[derive(Debug)]
pub struct ChannelSchemaBuilder {
    fields: Vec<(String, FieldSpec)>,
}

impl ChannelSchemaBuilder {
    /// Add a field; a later field with the same name replaces the earlier one.
    pub fn field(mut self, name: impl Into<String>, spec: FieldSpec) -> Self {
        let name = name.into();
        self.fields.retain(|(n, _)| *n != name);
        self.fields.push((name, spec));
        self
    }

    pub fn build(self) -> ChannelSchema {
        ChannelSchema {
            fields: self.fields,
        }
    }
}

/// All schemas produced by one decoder, keyed by channel.
pub type SchemaMap = BTreeMap<ChannelKey, Arc<ChannelSchema>>;

/// Result of a schema query: one channel, or the decoder's whole map.
#[derive(Debug, Clone, Copy)]
pub enum SchemaView<'a> {
    Channel(&'a Arc<ChannelSchema>),
    All(&'a SchemaMap),
}

impl<'a> SchemaView<'a> {
    pub fn channel(self) -> Option<&'a Arc<ChannelSchema>> {
        match self {
            SchemaView::Channel(schema) => Some(schema),
            SchemaView::All(_) => None,
        }
    }

    pub fn all(self) -> Option<&'a SchemaMap> {
        match self {
            SchemaView::Channel(_) => None,
            SchemaView::All(map) => Some(map),
        }
    }
}
