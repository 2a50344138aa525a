//! Output composer: the record layout of one sensor output channel

use bytemuck::Pod;

use super::{ChannelId, OutputError, OutputField, RecordDescriptor, SensorRegistry};
use crate::backend::{RayTraceBackend, SensorHandle};
use crate::sensor::SensorKind;

#[derive(Debug, Clone)]
struct Binding {
    sensor: SensorHandle,
    channel: ChannelId,
    record: RecordDescriptor,
}

/// Ordered field list that becomes a sensor output channel once bound
///
/// Fields may only be changed before [`bind`](Self::bind). Declared order is
/// byte order; nothing is padded implicitly, so alignment padding must be
/// declared with the `Padding*` fields.
#[derive(Debug, Clone, Default)]
pub struct OutputComposer {
    fields: Vec<OutputField>,
    binding: Option<Binding>,
}

impl OutputComposer {
    /// Create an empty composer
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a composer with the given fields
    pub fn with_fields(fields: &[OutputField]) -> Self {
        Self {
            fields: fields.to_vec(),
            binding: None,
        }
    }

    /// 24-byte point: position, intensity and ring
    pub fn point_cloud_24() -> Self {
        Self::with_fields(&[
            OutputField::XyzVec3F32,
            OutputField::Padding32,
            OutputField::IntensityF32,
            OutputField::RingIdU16,
            OutputField::Padding16,
        ])
    }

    /// 48-byte point with angles, distance, return type and time stamp
    pub fn point_cloud_48() -> Self {
        Self::with_fields(&[
            OutputField::XyzVec3F32,
            OutputField::Padding32,
            OutputField::IntensityF32,
            OutputField::RingIdU16,
            OutputField::Padding16,
            OutputField::AzimuthF32,
            OutputField::DistanceF32,
            OutputField::ReturnTypeU8,
            OutputField::Padding8,
            OutputField::Padding16,
            OutputField::Padding32,
            OutputField::TimeStampF64,
        ])
    }

    /// 20-byte point tagged with the entity id that was hit
    pub fn entity_id_20() -> Self {
        Self::with_fields(&[OutputField::XyzVec3F32, OutputField::EntityIdI32, OutputField::IntensityF32])
    }

    /// Append a field
    ///
    /// Returns `false` and leaves the layout unchanged once bound.
    pub fn add_field(&mut self, field: OutputField) -> bool {
        if let Some(binding) = &self.binding {
            log::error!("Cannot add {field} to output already bound as {}", binding.channel);
            return false;
        }
        self.fields.push(field);
        true
    }

    /// Remove the first occurrence of a field
    ///
    /// Returns `false` if the field is absent or the composer is bound.
    pub fn remove_field(&mut self, field: OutputField) -> bool {
        if let Some(binding) = &self.binding {
            log::error!("Cannot remove {field} from output already bound as {}", binding.channel);
            return false;
        }
        match self.fields.iter().position(|&f| f == field) {
            Some(index) => {
                self.fields.remove(index);
                true
            }
            None => false,
        }
    }

    /// Declared fields in order
    pub fn fields(&self) -> &[OutputField] {
        &self.fields
    }

    /// Byte layout of one record
    pub fn layout(&self) -> RecordDescriptor {
        self.binding
            .as_ref()
            .map_or_else(|| RecordDescriptor::from_fields(&self.fields), |b| b.record.clone())
    }

    /// Whether the composer is bound to a sensor
    pub const fn is_bound(&self) -> bool {
        self.binding.is_some()
    }

    /// Bound channel id
    pub fn channel(&self) -> Option<ChannelId> {
        self.binding.as_ref().map(|b| b.channel)
    }

    /// Sensor the composer is bound to
    pub fn sensor(&self) -> Option<SensorHandle> {
        self.binding.as_ref().map(|b| b.sensor)
    }

    /// Register the layout with a sensor's output handler
    ///
    /// Binding again to the same sensor returns the existing channel without
    /// touching the backend. A channel id consumed by a rejected registration
    /// is not handed out again.
    ///
    /// # Arguments
    /// * `registry` - Source of channel ids
    /// * `backend` - Backend owning the sensor
    /// * `sensor` - Sensor to bind to
    /// * `kind` - Kind of that sensor, used to validate the fields
    pub fn bind<B: RayTraceBackend + ?Sized>(
        &mut self,
        registry: &mut SensorRegistry,
        backend: &mut B,
        sensor: SensorHandle,
        kind: SensorKind,
    ) -> Result<ChannelId, OutputError> {
        if let Some(binding) = &self.binding {
            if binding.sensor == sensor {
                return Ok(binding.channel);
            }
            log::error!(
                "Output {} is bound to {:?}, refusing to bind it to {sensor:?}",
                binding.channel,
                binding.sensor
            );
            return Err(OutputError::AlreadyBound {
                channel: binding.channel,
            });
        }

        if self.fields.is_empty() {
            log::error!("Output for {sensor:?} has no fields");
            return Err(OutputError::NoFields);
        }
        if let Some(&field) = self.fields.iter().find(|f| !f.supported_by(kind)) {
            log::error!("{kind:?} sensors cannot write {field}");
            return Err(OutputError::UnsupportedField { field, kind });
        }

        let channel = registry.next_channel_id()?;
        let record = RecordDescriptor::from_fields(&self.fields);
        if !backend.add_output(sensor, channel, &record) {
            log::error!("Backend rejected output {channel} on {sensor:?}");
            return Err(OutputError::RegistrationRejected(channel));
        }

        log::debug!("Bound {channel} ({} bytes per record) to {sensor:?}", record.size);
        self.binding = Some(Binding { sensor, channel, record });
        Ok(channel)
    }

    /// Remove the channel from the sensor's output handler
    ///
    /// The channel id is retired. Fields become editable again.
    pub fn unbind<B: RayTraceBackend + ?Sized>(&mut self, backend: &mut B) -> Option<ChannelId> {
        let Some(binding) = self.binding.take() else {
            log::warn!("Unbinding an output that is not bound");
            return None;
        };
        backend.remove_output(binding.sensor, binding.channel);
        Some(binding.channel)
    }

    /// Latest raw records of the channel
    pub fn raw<B: RayTraceBackend + ?Sized>(&self, backend: &B) -> Vec<u8> {
        let Some(binding) = &self.binding else {
            log::warn!("Reading an output that is not bound");
            return Vec::new();
        };
        backend.read_output(binding.sensor, binding.channel).unwrap_or_default()
    }

    /// Latest records reinterpreted as `T`
    ///
    /// `T` must be exactly one record wide. An unbound composer yields no records.
    pub fn view<T: Pod, B: RayTraceBackend + ?Sized>(&self, backend: &B) -> Result<Vec<T>, OutputError> {
        let Some(binding) = &self.binding else {
            log::warn!("Viewing an output that is not bound");
            return Ok(Vec::new());
        };
        let record_size = binding.record.size;
        let type_size = std::mem::size_of::<T>();
        if type_size != record_size {
            return Err(OutputError::ViewSizeMismatch { type_size, record_size });
        }

        let bytes = backend.read_output(binding.sensor, binding.channel).unwrap_or_default();
        let chunks = bytes.chunks_exact(record_size);
        if !chunks.remainder().is_empty() {
            log::warn!(
                "{} trailing bytes on {} ignored",
                chunks.remainder().len(),
                binding.channel
            );
        }
        Ok(chunks.map(bytemuck::pod_read_unaligned).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendCall, RecordingBackend};
    use crate::output::records::{EntityIdPoint, PointXyzir, PointXyzirAdt};
    use crate::output::{FieldValue, RecordWriter};
    use crate::sensor::{LidarModel, SensorDescriptor};

    fn lidar(backend: &mut RecordingBackend) -> SensorHandle {
        backend
            .create_sensor(&SensorDescriptor::lidar(LidarModel::default()))
            .unwrap()
    }

    #[test]
    fn test_presets_match_record_types() {
        assert_eq!(OutputComposer::point_cloud_24().layout().size, std::mem::size_of::<PointXyzir>());
        assert_eq!(OutputComposer::point_cloud_48().layout().size, std::mem::size_of::<PointXyzirAdt>());
        assert_eq!(OutputComposer::entity_id_20().layout().size, std::mem::size_of::<EntityIdPoint>());
        assert_eq!(
            OutputComposer::point_cloud_48()
                .layout()
                .find(OutputField::TimeStampF64)
                .map(|s| s.offset),
            Some(40)
        );
    }

    #[test]
    fn test_point_cloud_48_layout() {
        let layout = OutputComposer::point_cloud_48().layout();

        assert_eq!(layout.size, 48);
        assert_eq!(layout.offsets(), vec![0, 12, 16, 20, 22, 24, 28, 32, 33, 34, 36, 40]);
    }

    #[test]
    fn test_double_bind_registers_once() {
        let mut backend = RecordingBackend::new();
        let mut registry = SensorRegistry::new();
        let sensor = lidar(&mut backend);
        let mut composer = OutputComposer::point_cloud_24();

        let first = composer.bind(&mut registry, &mut backend, sensor, SensorKind::Lidar).unwrap();
        let second = composer.bind(&mut registry, &mut backend, sensor, SensorKind::Lidar).unwrap();

        assert_eq!(first, second);
        assert_eq!(backend.sensor_outputs(sensor).len(), 1);
        assert_eq!(backend.count_calls(|c| matches!(c, BackendCall::AddOutput(..))), 1);
        assert_eq!(registry.allocated(), 1);
    }

    #[test]
    fn test_fields_frozen_after_bind() {
        let mut backend = RecordingBackend::new();
        let mut registry = SensorRegistry::new();
        let sensor = lidar(&mut backend);
        let mut composer = OutputComposer::point_cloud_24();
        composer.bind(&mut registry, &mut backend, sensor, SensorKind::Lidar).unwrap();

        assert!(!composer.add_field(OutputField::DistanceF32));
        assert!(!composer.remove_field(OutputField::IntensityF32));
        assert_eq!(composer.fields().len(), 5);
        assert_eq!(composer.layout().size, 24);
    }

    #[test]
    fn test_remove_first_occurrence() {
        let mut composer = OutputComposer::with_fields(&[
            OutputField::Padding8,
            OutputField::IntensityF32,
            OutputField::Padding8,
        ]);

        assert!(composer.remove_field(OutputField::Padding8));
        assert_eq!(composer.fields(), &[OutputField::IntensityF32, OutputField::Padding8]);
        assert!(!composer.remove_field(OutputField::DistanceF32));
    }

    #[test]
    fn test_bind_to_other_sensor_is_rejected() {
        let mut backend = RecordingBackend::new();
        let mut registry = SensorRegistry::new();
        let a = lidar(&mut backend);
        let b = lidar(&mut backend);
        let mut composer = OutputComposer::point_cloud_24();
        let channel = composer.bind(&mut registry, &mut backend, a, SensorKind::Lidar).unwrap();

        let result = composer.bind(&mut registry, &mut backend, b, SensorKind::Lidar);

        assert!(matches!(result, Err(OutputError::AlreadyBound { channel: c }) if c == channel));
        assert!(backend.sensor_outputs(b).is_empty());
    }

    #[test]
    fn test_bind_validation() {
        let mut backend = RecordingBackend::new();
        let mut registry = SensorRegistry::new();
        let sensor = lidar(&mut backend);

        let mut empty = OutputComposer::new();
        assert!(matches!(
            empty.bind(&mut registry, &mut backend, sensor, SensorKind::Lidar),
            Err(OutputError::NoFields)
        ));

        let mut imu_fields = OutputComposer::with_fields(&[OutputField::AccelerationVec3F32]);
        assert!(matches!(
            imu_fields.bind(&mut registry, &mut backend, sensor, SensorKind::Lidar),
            Err(OutputError::UnsupportedField { .. })
        ));
        assert_eq!(registry.allocated(), 0);
    }

    #[test]
    fn test_view_reads_written_records() {
        let mut backend = RecordingBackend::new();
        let mut registry = SensorRegistry::new();
        let sensor = lidar(&mut backend);
        let mut composer = OutputComposer::point_cloud_24();
        let channel = composer.bind(&mut registry, &mut backend, sensor, SensorKind::Lidar).unwrap();

        let mut writer = RecordWriter::new(&composer.layout());
        for ring in 0..3u16 {
            writer
                .push(&[
                    FieldValue::Vec3F32([f32::from(ring), 0.0, 1.0]),
                    FieldValue::F32(0.25),
                    FieldValue::U16(ring),
                ])
                .unwrap();
        }
        backend.inject_output(sensor, channel, writer.finish());

        let points: Vec<PointXyzir> = composer.view(&backend).unwrap();
        assert_eq!(points.len(), 3);
        assert_eq!(points[2].ring, 2);
        assert_eq!(points[2].xyz, [2.0, 0.0, 1.0]);
        assert_eq!(points[1].intensity, 0.25);

        assert!(matches!(
            composer.view::<EntityIdPoint, _>(&backend),
            Err(OutputError::ViewSizeMismatch {
                type_size: 20,
                record_size: 24
            })
        ));
    }

    #[test]
    fn test_view_unbound_is_empty() {
        let backend = RecordingBackend::new();
        let composer = OutputComposer::point_cloud_24();

        let points: Vec<PointXyzir> = composer.view(&backend).unwrap();
        assert!(points.is_empty());
    }

    #[test]
    fn test_unbind_unbound_is_a_no_op() {
        let mut backend = RecordingBackend::new();
        let mut composer = OutputComposer::point_cloud_24();

        assert_eq!(composer.unbind(&mut backend), None);
        assert!(backend.calls().is_empty());
        assert_eq!(composer.fields().len(), 5);
    }

    #[test]
    fn test_unbind_retires_channel() {
        let mut backend = RecordingBackend::new();
        let mut registry = SensorRegistry::new();
        let sensor = lidar(&mut backend);
        let mut composer = OutputComposer::point_cloud_24();
        let first = composer.bind(&mut registry, &mut backend, sensor, SensorKind::Lidar).unwrap();

        assert_eq!(composer.unbind(&mut backend), Some(first));
        assert!(backend.sensor_outputs(sensor).is_empty());

        let second = composer.bind(&mut registry, &mut backend, sensor, SensorKind::Lidar).unwrap();
        assert!(second > first);
    }
}
