//! Row-oriented view of Arrow record batches

use crate::{Error, Result};
use deltalake::arrow::array::{Array, ArrayRef, AsArray, RecordBatch};
use deltalake::arrow::datatypes::{DataType, Fields};
use deltalake::datafusion::scalar::ScalarValue;
use ndarray::ArrayD;

/// A single cell of a scanned row, or a transformed sample value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Utf8(String),
    Binary(Vec<u8>),
    /// Elements of a list, large list or fixed-size list cell; map cells are
    /// lists of `key`/`value` structs
    List(Vec<Value>),
    Struct(Record),
    /// Source bytes reinterpreted with a [`crate::SourceShape`]
    Tensor(ArrayD<u8>),
}

impl Value {
    /// Read the value at `row` of an Arrow array
    pub fn from_array(array: &dyn Array, row: usize) -> Result<Self> {
        if array.is_null(row) {
            return Ok(Value::Null);
        }

        match array.data_type() {
            DataType::List(_) => Self::from_elements(array.as_list::<i32>().value(row)),
            DataType::LargeList(_) => Self::from_elements(array.as_list::<i64>().value(row)),
            DataType::FixedSizeList(..) => {
                Self::from_elements(array.as_fixed_size_list().value(row))
            }
            DataType::Struct(_) => {
                let array = array.as_struct();
                Record::from_columns(array.fields(), array.columns(), row).map(Value::Struct)
            }
            DataType::Map(..) => {
                let entries = array.as_map().value(row);
                (0..entries.len())
                    .map(|i| {
                        Record::from_columns(entries.fields(), entries.columns(), i)
                            .map(Value::Struct)
                    })
                    .collect::<Result<Vec<_>>>()
                    .map(Value::List)
            }
            _ => Self::try_from(ScalarValue::try_from_array(array, row)?),
        }
    }

    fn from_elements(values: ArrayRef) -> Result<Self> {
        (0..values.len())
            .map(|i| Self::from_array(values.as_ref(), i))
            .collect::<Result<Vec<_>>>()
            .map(Value::List)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::UInt(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Utf8(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Binary(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&Record> {
        match self {
            Value::Struct(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_tensor(&self) -> Option<&ArrayD<u8>> {
        match self {
            Value::Tensor(v) => Some(v),
            _ => None,
        }
    }

    /// Short description used in error messages and CLI output
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::UInt(_) => "uint",
            Value::Float(_) => "float",
            Value::Utf8(_) => "utf8",
            Value::Binary(_) => "binary",
            Value::List(_) => "list",
            Value::Struct(_) => "struct",
            Value::Tensor(_) => "tensor",
        }
    }
}

impl TryFrom<ScalarValue> for Value {
    type Error = Error;

    fn try_from(scalar: ScalarValue) -> Result<Self> {
        if scalar.is_null() {
            return Ok(Value::Null);
        }

        let value = match scalar {
            ScalarValue::Boolean(Some(v)) => Value::Bool(v),
            ScalarValue::Int8(Some(v)) => Value::Int(v.into()),
            ScalarValue::Int16(Some(v)) => Value::Int(v.into()),
            ScalarValue::Int32(Some(v)) => Value::Int(v.into()),
            ScalarValue::Int64(Some(v)) => Value::Int(v),
            ScalarValue::UInt8(Some(v)) => Value::UInt(v.into()),
            ScalarValue::UInt16(Some(v)) => Value::UInt(v.into()),
            ScalarValue::UInt32(Some(v)) => Value::UInt(v.into()),
            ScalarValue::UInt64(Some(v)) => Value::UInt(v),
            ScalarValue::Float16(Some(v)) => Value::Float(v.to_f64()),
            ScalarValue::Float32(Some(v)) => Value::Float(v.into()),
            ScalarValue::Float64(Some(v)) => Value::Float(v),
            ScalarValue::Utf8(Some(v))
            | ScalarValue::LargeUtf8(Some(v))
            | ScalarValue::Utf8View(Some(v)) => Value::Utf8(v),
            ScalarValue::Binary(Some(v))
            | ScalarValue::LargeBinary(Some(v))
            | ScalarValue::BinaryView(Some(v))
            | ScalarValue::FixedSizeBinary(_, Some(v)) => Value::Binary(v),
            // Decimals are read as floats
            ScalarValue::Decimal128(Some(v), _, scale) => {
                Value::Float(v as f64 / 10f64.powi(i32::from(scale)))
            }
            ScalarValue::List(array) => Value::from_array(&*array, 0)?,
            ScalarValue::LargeList(array) => Value::from_array(&*array, 0)?,
            ScalarValue::FixedSizeList(array) => Value::from_array(&*array, 0)?,
            ScalarValue::Struct(array) => Value::from_array(&*array, 0)?,
            ScalarValue::Map(array) => Value::from_array(&*array, 0)?,
            ScalarValue::Date32(Some(v)) => Value::Int(v.into()),
            ScalarValue::Date64(Some(v))
            | ScalarValue::TimestampSecond(Some(v), _)
            | ScalarValue::TimestampMillisecond(Some(v), _)
            | ScalarValue::TimestampMicrosecond(Some(v), _)
            | ScalarValue::TimestampNanosecond(Some(v), _) => Value::Int(v),
            other => {
                return Err(Error::UnsupportedType(format!(
                    "column type {} is not supported",
                    other.data_type()
                )))
            }
        };
        Ok(value)
    }
}

/// One row, with fields in projection order
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    fields: Vec<(String, Value)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        match self.fields.iter_mut().find(|(field, _)| *field == name) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
    }

    /// Remove a field, returning its value
    pub fn take(&mut self, name: &str) -> Option<Value> {
        let idx = self.fields.iter().position(|(field, _)| field == name)?;
        Some(self.fields.remove(idx).1)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Convert every row of `batch` into a record
    pub fn from_batch(batch: &RecordBatch) -> Result<Vec<Record>> {
        let schema = batch.schema();
        (0..batch.num_rows())
            .map(|row| Record::from_columns(schema.fields(), batch.columns(), row))
            .collect()
    }

    fn from_columns(fields: &Fields, columns: &[ArrayRef], row: usize) -> Result<Record> {
        let mut record = Record {
            fields: Vec::with_capacity(columns.len()),
        };
        for (field, column) in fields.iter().zip(columns) {
            record
                .fields
                .push((field.name().clone(), Value::from_array(column.as_ref(), row)?));
        }
        Ok(record)
    }
}

impl FromIterator<(String, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (name, value) in iter {
            record.insert(name, value);
        }
        record
    }
}
