//! Sensor output records
//!
//! An [`OutputComposer`] describes the byte layout of one output channel as an
//! ordered list of [`OutputField`]s. Binding it allocates a [`ChannelId`] from
//! the [`SensorRegistry`] and registers the [`RecordDescriptor`] with the
//! sensor on the backend. All multi-byte values are little-endian.

pub mod composer;
pub mod field;
pub mod records;
pub mod registry;
pub mod writer;

pub use composer::OutputComposer;
pub use field::{FieldSpec, FieldType, OutputField, RecordDescriptor};
pub use records::{EntityIdPoint, PointXyzir, PointXyzirAdt};
pub use registry::{ChannelId, SensorRegistry};
pub use writer::{FieldValue, RecordWriter};

use crate::sensor::SensorKind;
use thiserror::Error;

/// Output composition and binding errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OutputError {
    /// Composer is already bound to another sensor
    #[error("Output already bound as {channel}")]
    AlreadyBound {
        /// Existing channel
        channel: ChannelId,
    },

    /// Nothing to bind
    #[error("Output has no fields")]
    NoFields,

    /// Field cannot be produced by the sensor
    #[error("Field {field} is not supported by {kind:?} sensors")]
    UnsupportedField {
        /// Offending field
        field: OutputField,
        /// Sensor kind
        kind: SensorKind,
    },

    /// The 32-bit channel id space is used up
    #[error("Channel ids exhausted")]
    ChannelsExhausted,

    /// Backend refused to register the output
    #[error("Backend rejected output {0}")]
    RegistrationRejected(ChannelId),

    /// View type does not match the record size
    #[error("View type is {type_size} bytes but records are {record_size} bytes")]
    ViewSizeMismatch {
        /// `size_of` the view type
        type_size: usize,
        /// Record size of the channel
        record_size: usize,
    },

    /// Wrong number of values for a record
    #[error("Expected {expected} values, got {actual}")]
    ValueCountMismatch {
        /// Data fields in the record
        expected: usize,
        /// Values given
        actual: usize,
    },

    /// Value type does not match the field
    #[error("Value for {field} has the wrong type")]
    ValueTypeMismatch {
        /// Field the value was meant for
        field: OutputField,
    },
}
