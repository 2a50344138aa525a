//! Output field catalogue and record layout

use serde::{Deserialize, Serialize};

use crate::sensor::SensorKind;

/// Primitive encoding of a field in a binary record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    /// Unsigned 8-bit integer
    U8,
    /// Unsigned 16-bit integer
    U16,
    /// Unsigned 32-bit integer
    U32,
    /// Unsigned 64-bit integer
    U64,
    /// Signed 8-bit integer
    I8,
    /// Signed 16-bit integer
    I16,
    /// Signed 32-bit integer
    I32,
    /// Signed 64-bit integer
    I64,
    /// 32-bit float
    F32,
    /// 64-bit float
    F64,
    /// Three consecutive 32-bit floats
    Vec3F32,
    /// Unused bytes
    Padding,
}

/// A semantic field a sensor can write into its output records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutputField {
    /// Hit position in the sensor frame
    XyzVec3F32,
    /// Return intensity
    IntensityF32,
    /// Laser ring (channel) index
    RingIdU16,
    /// Azimuth angle of the ray
    AzimuthF32,
    /// Elevation angle of the ray
    ElevationF32,
    /// Distance to hit
    DistanceF32,
    /// Return type (first, last, strongest, ...)
    ReturnTypeU8,
    /// Sample time stamp
    TimeStampF64,
    /// Entity id of the instance that was hit
    EntityIdI32,
    /// Linear acceleration
    AccelerationVec3F32,
    /// Angular velocity
    AngularVelocityVec3F32,
    /// Magnetic field
    MagneticFieldVec3F32,
    /// Constraint position (angle or displacement)
    PositionF64,
    /// Constraint speed
    SpeedF64,
    /// Distance travelled by an odometer wheel
    DistanceF64,
    /// One byte of padding
    #[serde(rename = "PADDING_8")]
    Padding8,
    /// Two bytes of padding
    #[serde(rename = "PADDING_16")]
    Padding16,
    /// Four bytes of padding
    #[serde(rename = "PADDING_32")]
    Padding32,
}

impl OutputField {
    /// Every field, in declaration order
    pub const ALL: [Self; 18] = [
        Self::XyzVec3F32,
        Self::IntensityF32,
        Self::RingIdU16,
        Self::AzimuthF32,
        Self::ElevationF32,
        Self::DistanceF32,
        Self::ReturnTypeU8,
        Self::TimeStampF64,
        Self::EntityIdI32,
        Self::AccelerationVec3F32,
        Self::AngularVelocityVec3F32,
        Self::MagneticFieldVec3F32,
        Self::PositionF64,
        Self::SpeedF64,
        Self::DistanceF64,
        Self::Padding8,
        Self::Padding16,
        Self::Padding32,
    ];

    /// Encoding of the field
    pub const fn field_type(self) -> FieldType {
        match self {
            Self::XyzVec3F32
            | Self::AccelerationVec3F32
            | Self::AngularVelocityVec3F32
            | Self::MagneticFieldVec3F32 => FieldType::Vec3F32,
            Self::IntensityF32 | Self::AzimuthF32 | Self::ElevationF32 | Self::DistanceF32 => FieldType::F32,
            Self::RingIdU16 => FieldType::U16,
            Self::ReturnTypeU8 => FieldType::U8,
            Self::TimeStampF64 | Self::PositionF64 | Self::SpeedF64 | Self::DistanceF64 => FieldType::F64,
            Self::EntityIdI32 => FieldType::I32,
            Self::Padding8 | Self::Padding16 | Self::Padding32 => FieldType::Padding,
        }
    }

    /// Width of the field in bytes
    pub const fn width(self) -> usize {
        match self {
            Self::XyzVec3F32
            | Self::AccelerationVec3F32
            | Self::AngularVelocityVec3F32
            | Self::MagneticFieldVec3F32 => 12,
            Self::TimeStampF64 | Self::PositionF64 | Self::SpeedF64 | Self::DistanceF64 => 8,
            Self::IntensityF32
            | Self::AzimuthF32
            | Self::ElevationF32
            | Self::DistanceF32
            | Self::EntityIdI32
            | Self::Padding32 => 4,
            Self::RingIdU16 | Self::Padding16 => 2,
            Self::ReturnTypeU8 | Self::Padding8 => 1,
        }
    }

    /// Whether the field only reserves space
    pub const fn is_padding(self) -> bool {
        matches!(self, Self::Padding8 | Self::Padding16 | Self::Padding32)
    }

    /// Canonical name, as used in configuration files
    pub const fn name(self) -> &'static str {
        match self {
            Self::XyzVec3F32 => "XYZ_VEC3_F32",
            Self::IntensityF32 => "INTENSITY_F32",
            Self::RingIdU16 => "RING_ID_U16",
            Self::AzimuthF32 => "AZIMUTH_F32",
            Self::ElevationF32 => "ELEVATION_F32",
            Self::DistanceF32 => "DISTANCE_F32",
            Self::ReturnTypeU8 => "RETURN_TYPE_U8",
            Self::TimeStampF64 => "TIME_STAMP_F64",
            Self::EntityIdI32 => "ENTITY_ID_I32",
            Self::AccelerationVec3F32 => "ACCELERATION_VEC3_F32",
            Self::AngularVelocityVec3F32 => "ANGULAR_VELOCITY_VEC3_F32",
            Self::MagneticFieldVec3F32 => "MAGNETIC_FIELD_VEC3_F32",
            Self::PositionF64 => "POSITION_F64",
            Self::SpeedF64 => "SPEED_F64",
            Self::DistanceF64 => "DISTANCE_F64",
            Self::Padding8 => "PADDING_8",
            Self::Padding16 => "PADDING_16",
            Self::Padding32 => "PADDING_32",
        }
    }

    /// Whether a sensor of the given kind can write this field
    ///
    /// Padding is accepted by every kind.
    pub const fn supported_by(self, kind: SensorKind) -> bool {
        if self.is_padding() {
            return true;
        }
        match kind {
            SensorKind::Lidar => matches!(
                self,
                Self::XyzVec3F32
                    | Self::IntensityF32
                    | Self::RingIdU16
                    | Self::AzimuthF32
                    | Self::ElevationF32
                    | Self::DistanceF32
                    | Self::ReturnTypeU8
                    | Self::TimeStampF64
                    | Self::EntityIdI32
            ),
            SensorKind::Imu => matches!(
                self,
                Self::AccelerationVec3F32 | Self::AngularVelocityVec3F32 | Self::MagneticFieldVec3F32
            ),
            SensorKind::Encoder => matches!(self, Self::PositionF64 | Self::SpeedF64),
            SensorKind::Odometer => matches!(self, Self::DistanceF64),
        }
    }
}

impl std::fmt::Display for OutputField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A field placed at its byte offset within a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    /// Semantic tag
    pub field: OutputField,
    /// Width in bytes
    pub width: usize,
    /// Offset from the start of the record
    pub offset: usize,
}

/// Backend-native description of one output record
///
/// Fields are laid out back to back in declared order. Nothing is aligned or
/// padded implicitly.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RecordDescriptor {
    /// Fields in byte order
    pub fields: Vec<FieldSpec>,
    /// Total record size in bytes
    pub size: usize,
}

impl RecordDescriptor {
    /// Lay out fields in the order given
    pub fn from_fields(fields: &[OutputField]) -> Self {
        let mut offset = 0;
        let specs = fields
            .iter()
            .map(|&field| {
                let spec = FieldSpec {
                    field,
                    width: field.width(),
                    offset,
                };
                offset += spec.width;
                spec
            })
            .collect();
        Self { fields: specs, size: offset }
    }

    /// Offsets of every field, in declared order
    pub fn offsets(&self) -> Vec<usize> {
        self.fields.iter().map(|spec| spec.offset).collect()
    }

    /// First spec of the given field
    pub fn find(&self, field: OutputField) -> Option<&FieldSpec> {
        self.fields.iter().find(|spec| spec.field == field)
    }

    /// Fields carrying data, skipping padding
    pub fn data_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(|spec| !spec.field.is_padding())
    }
}
