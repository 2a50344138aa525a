//! Packing typed values into raw records

use super::{FieldType, OutputError, RecordDescriptor};

/// A typed value for one data field of a record
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue {
    /// Unsigned 8-bit
    U8(u8),
    /// Unsigned 16-bit
    U16(u16),
    /// Unsigned 32-bit
    U32(u32),
    /// Unsigned 64-bit
    U64(u64),
    /// Signed 8-bit
    I8(i8),
    /// Signed 16-bit
    I16(i16),
    /// Signed 32-bit
    I32(i32),
    /// Signed 64-bit
    I64(i64),
    /// 32-bit float
    F32(f32),
    /// 64-bit float
    F64(f64),
    /// Three 32-bit floats
    Vec3F32([f32; 3]),
}

impl FieldValue {
    const fn field_type(&self) -> FieldType {
        match self {
            Self::U8(_) => FieldType::U8,
            Self::U16(_) => FieldType::U16,
            Self::U32(_) => FieldType::U32,
            Self::U64(_) => FieldType::U64,
            Self::I8(_) => FieldType::I8,
            Self::I16(_) => FieldType::I16,
            Self::I32(_) => FieldType::I32,
            Self::I64(_) => FieldType::I64,
            Self::F32(_) => FieldType::F32,
            Self::F64(_) => FieldType::F64,
            Self::Vec3F32(_) => FieldType::Vec3F32,
        }
    }

    fn write_le(&self, out: &mut Vec<u8>) {
        match *self {
            Self::U8(v) => out.push(v),
            Self::U16(v) => out.extend_from_slice(&v.to_le_bytes()),
            Self::U32(v) => out.extend_from_slice(&v.to_le_bytes()),
            Self::U64(v) => out.extend_from_slice(&v.to_le_bytes()),
            Self::I8(v) => out.extend_from_slice(&v.to_le_bytes()),
            Self::I16(v) => out.extend_from_slice(&v.to_le_bytes()),
            Self::I32(v) => out.extend_from_slice(&v.to_le_bytes()),
            Self::I64(v) => out.extend_from_slice(&v.to_le_bytes()),
            Self::F32(v) => out.extend_from_slice(&v.to_le_bytes()),
            Self::F64(v) => out.extend_from_slice(&v.to_le_bytes()),
            Self::Vec3F32(v) => v.iter().for_each(|c| out.extend_from_slice(&c.to_le_bytes())),
        }
    }
}

/// Writes records with a fixed layout into a byte buffer
///
/// Values are given for data fields only, in declared order; padding is
/// zero-filled.
#[derive(Debug)]
pub struct RecordWriter {
    record: RecordDescriptor,
    bytes: Vec<u8>,
    count: usize,
}

impl RecordWriter {
    /// Create a writer for the given layout
    pub fn new(record: &RecordDescriptor) -> Self {
        Self {
            record: record.clone(),
            bytes: Vec::new(),
            count: 0,
        }
    }

    /// Append one record
    ///
    /// On error nothing is written.
    pub fn push(&mut self, values: &[FieldValue]) -> Result<(), OutputError> {
        let expected = self.record.data_fields().count();
        if values.len() != expected {
            return Err(OutputError::ValueCountMismatch {
                expected,
                actual: values.len(),
            });
        }

        let start = self.bytes.len();
        let mut values = values.iter();
        for spec in &self.record.fields {
            if spec.field.is_padding() {
                self.bytes.resize(self.bytes.len() + spec.width, 0);
                continue;
            }
            // counted above, one value per data field
            let Some(value) = values.next() else { break };
            if value.field_type() != spec.field.field_type() {
                self.bytes.truncate(start);
                return Err(OutputError::ValueTypeMismatch { field: spec.field });
            }
            value.write_le(&mut self.bytes);
        }

        self.count += 1;
        Ok(())
    }

    /// Number of records written
    pub const fn len(&self) -> usize {
        self.count
    }

    /// Whether nothing was written yet
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Raw bytes written so far
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Take the raw bytes
    pub fn finish(self) -> Vec<u8> {
        self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::OutputField;

    fn xyzi_record() -> RecordDescriptor {
        RecordDescriptor::from_fields(&[
            OutputField::XyzVec3F32,
            OutputField::Padding32,
            OutputField::IntensityF32,
            OutputField::RingIdU16,
            OutputField::Padding16,
        ])
    }

    #[test]
    fn test_little_endian_with_zeroed_padding() {
        let mut writer = RecordWriter::new(&xyzi_record());
        writer
            .push(&[
                FieldValue::Vec3F32([1.0, 2.0, 3.0]),
                FieldValue::F32(0.5),
                FieldValue::U16(0x0102),
            ])
            .unwrap();

        let bytes = writer.finish();
        assert_eq!(bytes.len(), 24);
        assert_eq!(&bytes[0..4], &1.0f32.to_le_bytes());
        assert_eq!(&bytes[8..12], &3.0f32.to_le_bytes());
        assert_eq!(&bytes[12..16], &[0, 0, 0, 0]);
        assert_eq!(&bytes[16..20], &0.5f32.to_le_bytes());
        assert_eq!(&bytes[20..22], &[0x02, 0x01]);
        assert_eq!(&bytes[22..24], &[0, 0]);
    }

    #[test]
    fn test_wrong_type_leaves_buffer_untouched() {
        let mut writer = RecordWriter::new(&xyzi_record());
        let result = writer.push(&[
            FieldValue::Vec3F32([0.0; 3]),
            FieldValue::F64(0.5),
            FieldValue::U16(1),
        ]);

        assert!(matches!(
            result,
            Err(OutputError::ValueTypeMismatch {
                field: OutputField::IntensityF32
            })
        ));
        assert!(writer.is_empty());
        assert!(writer.as_bytes().is_empty());
    }

    #[test]
    fn test_wrong_value_count() {
        let mut writer = RecordWriter::new(&xyzi_record());
        assert!(matches!(
            writer.push(&[FieldValue::F32(1.0)]),
            Err(OutputError::ValueCountMismatch { expected: 3, actual: 1 })
        ));
    }
}
