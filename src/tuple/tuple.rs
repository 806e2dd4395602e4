use std::sync::Arc;

use crate::common::{IndexKey, Result};

use super::{Schema, Value};

/// A single row: one value per schema column.
///
/// ## Binary format
///
/// ```text
/// +-------------+------------------------------------------+
/// | Null Bitmap | Column encodings in schema order          |
/// | (N bytes)   | (fixed width, or u16 length + bytes)      |
/// +-------------+------------------------------------------+
/// ```
///
/// A set bit in the null bitmap marks the column NULL; its encoding slot is
/// still present (zeroed / zero-length) so offsets stay computable in one
/// forward pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Tuple {
    schema: Arc<Schema>,
    values: Vec<Value>,
}

impl Tuple {
    /// # Panics
    /// Panics if the value count does not match the schema.
    pub fn new(schema: Arc<Schema>, values: Vec<Value>) -> Self {
        assert_eq!(
            values.len(),
            schema.column_count(),
            "value count must match schema column count"
        );
        Self { schema, values }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn value(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn value_by_name(&self, name: &str) -> Option<&Value> {
        self.schema
            .column_index(name)
            .and_then(|i| self.values.get(i))
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Serializes the tuple for heap storage.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; self.schema.null_bitmap_size()];
        for (i, (value, column)) in self.values.iter().zip(self.schema.columns()).enumerate() {
            if value.is_null() {
                buf[i / 8] |= 1 << (i % 8);
            }
            value.encode(column.data_type(), &mut buf)?;
        }
        Ok(buf)
    }

    /// Deserializes a tuple produced by [`Tuple::to_bytes`].
    pub fn from_bytes(schema: Arc<Schema>, data: &[u8]) -> Result<Self> {
        let bitmap_size = schema.null_bitmap_size();
        let bitmap = &data[..bitmap_size];
        let mut rest = &data[bitmap_size..];

        let mut values = Vec::with_capacity(schema.column_count());
        for (i, column) in schema.columns().enumerate() {
            let decoded = Value::decode(column.data_type(), &mut rest)?;
            if bitmap[i / 8] >> (i % 8) & 1 != 0 {
                values.push(Value::Null);
            } else {
                values.push(decoded);
            }
        }
        Ok(Self { schema, values })
    }

    /// Folds the key columns into the fixed-width key the hash index
    /// stores. A single integer column keeps its numeric value; composite
    /// keys mix the per-value hashes.
    pub fn key_from_tuple(&self, key_attrs: &[usize]) -> IndexKey {
        if let [attr] = key_attrs {
            return self.values[*attr].hash_key();
        }
        let mut key: u64 = 0;
        for &attr in key_attrs {
            key = key
                .rotate_left(17)
                .wrapping_mul(0x9e37_79b9_7f4a_7c15)
                ^ self.values[attr].hash_key();
        }
        key
    }
}
