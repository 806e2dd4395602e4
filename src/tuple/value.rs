use std::cmp::Ordering;
use std::fmt;

use bytes::{Buf, BufMut};

use crate::common::{Result, StrataError};

use super::DataType;

/// A typed value held by a tuple or produced by expression evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i32),
    BigInt(i64),
    Varchar(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn data_type(&self) -> Option<DataType> {
        match self {
            Value::Null => None,
            Value::Boolean(_) => Some(DataType::Boolean),
            Value::Integer(_) => Some(DataType::Integer),
            Value::BigInt(_) => Some(DataType::BigInt),
            Value::Varchar(s) => Some(DataType::Varchar(s.len() as u16)),
        }
    }

    /// Interprets the value as a predicate result. Null is false.
    pub fn as_bool(&self) -> bool {
        match self {
            Value::Boolean(b) => *b,
            _ => false,
        }
    }

    /// Three-way comparison between same-typed values. Nulls compare as
    /// unordered and type mixes (other than the integer widths) are errors.
    pub fn compare(&self, other: &Value) -> Result<Ordering> {
        match (self, other) {
            (Value::Boolean(a), Value::Boolean(b)) => Ok(a.cmp(b)),
            (Value::Integer(a), Value::Integer(b)) => Ok(a.cmp(b)),
            (Value::BigInt(a), Value::BigInt(b)) => Ok(a.cmp(b)),
            (Value::Integer(a), Value::BigInt(b)) => Ok((*a as i64).cmp(b)),
            (Value::BigInt(a), Value::Integer(b)) => Ok(a.cmp(&(*b as i64))),
            (Value::Varchar(a), Value::Varchar(b)) => Ok(a.cmp(b)),
            (a, b) => Err(StrataError::TypeMismatch {
                expected: format!("{:?}", a.data_type()),
                actual: format!("{:?}", b.data_type()),
            }),
        }
    }

    /// Value equality across the integer widths; null equals nothing.
    pub fn equals(&self, other: &Value) -> bool {
        if self.is_null() || other.is_null() {
            return false;
        }
        matches!(self.compare(other), Ok(Ordering::Equal))
    }

    /// Checked integer addition; overflow surfaces as OutOfRange.
    pub fn add(&self, other: &Value) -> Result<Value> {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => a
                .checked_add(*b)
                .map(Value::Integer)
                .ok_or_else(|| StrataError::OutOfRange(format!("{a} + {b} overflows INTEGER"))),
            (Value::BigInt(a), Value::BigInt(b)) => a
                .checked_add(*b)
                .map(Value::BigInt)
                .ok_or_else(|| StrataError::OutOfRange(format!("{a} + {b} overflows BIGINT"))),
            (Value::Integer(a), Value::BigInt(b)) | (Value::BigInt(b), Value::Integer(a)) => {
                (*a as i64)
                    .checked_add(*b)
                    .map(Value::BigInt)
                    .ok_or_else(|| StrataError::OutOfRange(format!("{a} + {b} overflows BIGINT")))
            }
            (a, b) => Err(StrataError::TypeMismatch {
                expected: "numeric operands".to_string(),
                actual: format!("{:?} + {:?}", a.data_type(), b.data_type()),
            }),
        }
    }

    /// Folds the value into a 64-bit key for hash-keyed operators and the
    /// hash index. Integers map to their two's-complement bits so equal
    /// numbers across widths agree; strings use FNV-1a.
    pub fn hash_key(&self) -> u64 {
        match self {
            Value::Null => 0,
            Value::Boolean(b) => *b as u64,
            Value::Integer(v) => *v as i64 as u64,
            Value::BigInt(v) => *v as u64,
            Value::Varchar(s) => {
                let mut h: u64 = 0xcbf2_9ce4_8422_2325;
                for &b in s.as_bytes() {
                    h ^= b as u64;
                    h = h.wrapping_mul(0x0000_0100_0000_01b3);
                }
                h
            }
        }
    }

    /// Encodes the value into `buf` according to the column type. Fixed
    /// types write their full width (zeroed when null); varchars write a
    /// u16 length prefix.
    pub fn encode(&self, data_type: &DataType, buf: &mut impl BufMut) -> Result<()> {
        match (self, data_type) {
            (Value::Null, DataType::Boolean) => buf.put_u8(0),
            (Value::Null, DataType::Integer) => buf.put_i32_le(0),
            (Value::Null, DataType::BigInt) => buf.put_i64_le(0),
            (Value::Null, DataType::Varchar(_)) => buf.put_u16_le(0),
            (Value::Boolean(b), DataType::Boolean) => buf.put_u8(*b as u8),
            (Value::Integer(v), DataType::Integer) => buf.put_i32_le(*v),
            (Value::BigInt(v), DataType::BigInt) => buf.put_i64_le(*v),
            (Value::Integer(v), DataType::BigInt) => buf.put_i64_le(*v as i64),
            (Value::Varchar(s), DataType::Varchar(max)) => {
                if s.len() > *max as usize {
                    return Err(StrataError::OutOfRange(format!(
                        "string of {} bytes exceeds VARCHAR({max})",
                        s.len()
                    )));
                }
                buf.put_u16_le(s.len() as u16);
                buf.put_slice(s.as_bytes());
            }
            (v, t) => {
                return Err(StrataError::TypeMismatch {
                    expected: t.to_string(),
                    actual: format!("{v}"),
                })
            }
        }
        Ok(())
    }

    /// Decodes a non-null value of the given type, advancing the buffer.
    pub fn decode(data_type: &DataType, buf: &mut impl Buf) -> Result<Value> {
        Ok(match data_type {
            DataType::Boolean => Value::Boolean(buf.get_u8() != 0),
            DataType::Integer => Value::Integer(buf.get_i32_le()),
            DataType::BigInt => Value::BigInt(buf.get_i64_le()),
            DataType::Varchar(_) => {
                let len = buf.get_u16_le() as usize;
                let mut bytes = vec![0u8; len];
                buf.copy_to_slice(&mut bytes);
                Value::Varchar(String::from_utf8_lossy(&bytes).into_owned())
            }
        })
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Integer(v) => write!(f, "{v}"),
            Value::BigInt(v) => write!(f, "{v}"),
            Value::Varchar(s) => write!(f, "'{s}'"),
        }
    }
}
