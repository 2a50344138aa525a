//! Lidar demo application
//!
//! Builds a small yard of crates, a terrain and a cable, mirrors it into a
//! recording backend and drives a spinning lidar, an IMU, a wheel encoder and
//! an odometer through a few hundred ticks while crates are hidden, shown and
//! destroyed. Halfway through, fog rolls in.

use std::sync::Arc;

use rand::Rng;
use sensor_mirror::backend::{NativeId, RecordingBackend};
use sensor_mirror::core::{Config, SensorEnvironmentConfig};
use sensor_mirror::foundation::logging;
use sensor_mirror::foundation::math::{Quat, Transform, Vec3};
use sensor_mirror::mirror::{AmbientMaterial, ExternalBody, SceneMirror, SurfaceMaterial};
use sensor_mirror::output::{FieldValue, OutputComposer, OutputField, PointXyzir, PointXyzirAdt, RecordWriter};
use sensor_mirror::scene::{BodyId, MaterialBinding, MeshData, NodeId, SceneGraph};
use sensor_mirror::sensor::{
    Constraint, ConstraintKind, EncoderSensor, ImuSensor, LidarSensor, OdometerSensor, SensorError,
};

const CONFIG_PATH: &str = "mirror.toml";
const NUM_CRATES: usize = 12;
const YARD_RADIUS: f32 = 20.0;
const TICKS: usize = 300;
const TOGGLE_EVERY: usize = 25;
const HITS_PER_TICK: usize = 64;
const SPIN_SPEED: f32 = 0.05;
const FOG_TICK: usize = TICKS / 2;
const FOG_VISIBILITY: f32 = 0.25;

#[derive(thiserror::Error, Debug)]
enum DemoError {
    #[error("configuration: {0}")]
    Config(#[from] sensor_mirror::core::ConfigError),

    #[error("mirror: {0}")]
    Mirror(#[from] sensor_mirror::mirror::MirrorError),

    #[error("sensor: {0}")]
    Sensor(#[from] SensorError),

    #[error("output: {0}")]
    Output(#[from] sensor_mirror::output::OutputError),
}

/// One simulated lidar return
struct Hit {
    xyz: [f32; 3],
    intensity: f32,
    ring: u16,
    azimuth: f32,
    distance: f32,
    time_stamp: f64,
}

impl Hit {
    fn value(&self, field: OutputField) -> FieldValue {
        match field {
            OutputField::XyzVec3F32 => FieldValue::Vec3F32(self.xyz),
            OutputField::IntensityF32 => FieldValue::F32(self.intensity),
            OutputField::RingIdU16 => FieldValue::U16(self.ring),
            OutputField::AzimuthF32 => FieldValue::F32(self.azimuth),
            OutputField::ElevationF32 => FieldValue::F32(self.xyz[1].atan2(self.distance)),
            OutputField::DistanceF32 => FieldValue::F32(self.distance),
            OutputField::ReturnTypeU8 => FieldValue::U8(0),
            OutputField::TimeStampF64 => FieldValue::F64(self.time_stamp),
            OutputField::EntityIdI32 => FieldValue::I32(0),
            OutputField::AccelerationVec3F32
            | OutputField::AngularVelocityVec3F32
            | OutputField::MagneticFieldVec3F32 => FieldValue::Vec3F32([0.0; 3]),
            OutputField::PositionF64 | OutputField::SpeedF64 | OutputField::DistanceF64 => FieldValue::F64(0.0),
            OutputField::Padding8 | OutputField::Padding16 | OutputField::Padding32 => FieldValue::U8(0),
        }
    }
}

struct LidarDemo {
    host: SceneGraph,
    mirror: SceneMirror<RecordingBackend>,
    lidar: LidarSensor,
    imu: ImuSensor,
    encoder: EncoderSensor,
    odometer: OdometerSensor,
    rig: NodeId,
    crates: Vec<NodeId>,
    cable: BodyId,
    compact_output: usize,
    extended_output: usize,
    tick: usize,
}

impl LidarDemo {
    fn new(config: SensorEnvironmentConfig) -> Self {
        log::info!("Building demo scene...");
        let mut host = SceneGraph::new();
        let mut rng = rand::thread_rng();

        let crate_mesh = Arc::new(MeshData::cube(0.5));
        let metal = Arc::new(SurfaceMaterial::ggx_and_oren_nayar());
        let yard = host.create_node("yard", None);
        host.set_surface_material(yard, Some(MaterialBinding::propagating(metal)));

        let crates = (0..NUM_CRATES)
            .map(|i| {
                let position = Vec3::new(
                    rng.gen_range(-YARD_RADIUS..YARD_RADIUS),
                    0.5,
                    rng.gen_range(-YARD_RADIUS..YARD_RADIUS),
                );
                host.create_mesh_node(
                    format!("crate_{i}"),
                    Some(yard),
                    crate_mesh.clone(),
                    Transform::from_position(position),
                )
            })
            .collect();

        host.attach_body(ExternalBody::Terrain(NativeId(1)), None);
        let cable = host.attach_body(ExternalBody::Cable(NativeId(2)), None);

        let rig = host.create_node("sensor_rig", None);
        host.set_local_transform(rig, Transform::from_position(Vec3::new(0.0, 1.8, 0.0)));

        let mirror = SceneMirror::new(RecordingBackend::new(), config.mirror);
        let lidar = LidarSensor::new(rig, config.lidar);
        let imu = ImuSensor::new(rig, NativeId(10), Transform::identity());
        let mut encoder = EncoderSensor::new(Constraint {
            id: NativeId(20),
            kind: ConstraintKind::Hinge,
        });
        encoder.output_speed = true;
        let mut odometer = OdometerSensor::new(Constraint {
            id: NativeId(20),
            kind: ConstraintKind::Hinge,
        });
        odometer.wheel_radius = 0.3;
        odometer.pulses_per_revolution = Some(1024);

        Self {
            host,
            mirror,
            lidar,
            imu,
            encoder,
            odometer,
            rig,
            crates,
            cable,
            compact_output: 0,
            extended_output: 0,
            tick: 0,
        }
    }

    fn initialize(&mut self) -> Result<(), DemoError> {
        log::info!("Initializing sensor environment...");
        let stats = self.mirror.initialize(&self.host)?;
        log::info!(
            "Mirrored {} instances from {} shapes, {} external bodies",
            stats.instances.created,
            self.mirror.shape_count(),
            stats.bodies.added
        );

        self.compact_output = self.lidar.add_output(&mut self.mirror, OutputComposer::point_cloud_24())?;
        self.extended_output = self.lidar.add_output(&mut self.mirror, OutputComposer::point_cloud_48())?;
        self.lidar.init(&mut self.mirror, &self.host)?;
        self.imu.init(&mut self.mirror, &self.host)?;
        self.encoder.init(&mut self.mirror)?;
        self.odometer.init(&mut self.mirror)?;
        log::info!(
            "Sensors ready: {} natives, lidar channels {:?}",
            self.mirror.sensor_count(),
            self.lidar.channels()
        );
        Ok(())
    }

    fn step(&mut self) -> Result<(), DemoError> {
        let angle = SPIN_SPEED * self.tick as f32;
        let spin = Quat::from_axis_angle(&Vec3::y_axis(), angle);
        self.host.set_local_transform(
            self.rig,
            Transform::from_position_rotation(Vec3::new(0.0, 1.8, 0.0), spin),
        );

        if self.tick > 0 && self.tick % TOGGLE_EVERY == 0 {
            self.toggle_scene();
        }
        if self.tick == FOG_TICK {
            log::info!("tick {}: fog rolling in", self.tick);
            self.mirror.set_ambient_material(Some(&AmbientMaterial::fog(FOG_VISIBILITY)))?;
        }

        let stats = self.mirror.synchronize(&self.host);
        if stats.instances.created + stats.instances.destroyed + stats.instances.pruned > 0 {
            log::debug!("tick {}: {:?}", self.tick, stats);
        }
        self.lidar.tick(&mut self.mirror, &self.host);
        self.imu.tick(&mut self.mirror, &self.host);

        self.simulate_ray_trace()?;
        self.tick += 1;
        Ok(())
    }

    fn toggle_scene(&mut self) {
        let round = self.tick / TOGGLE_EVERY;
        let index = ((round - 1) / 2) % self.crates.len();
        let node = self.crates[index];
        let active = round % 2 == 0;
        log::info!("tick {}: {} crate {}", self.tick, if active { "showing" } else { "hiding" }, index);
        self.host.set_active(node, active);
        self.host.set_body_active(self.cable, !active);

        if round == 5 {
            let doomed = self.crates.remove(0);
            log::info!("tick {}: destroying {:?}", self.tick, doomed);
            self.host.destroy_node(doomed);
        }
    }

    /// Stand-in for the backend's ray-trace pass: write fake hits to every bound output
    fn simulate_ray_trace(&mut self) -> Result<(), DemoError> {
        let Some(sensor) = self.lidar.native() else { return Ok(()) };
        let mut rng = rand::thread_rng();

        let mut writers: Vec<_> = self
            .lidar
            .outputs()
            .iter()
            .filter_map(|composer| {
                let layout = composer.layout();
                composer.channel().map(|channel| (channel, RecordWriter::new(&layout), layout))
            })
            .collect();

        for _ in 0..HITS_PER_TICK {
            let distance = rng.gen_range(1.0..YARD_RADIUS);
            let azimuth = rng.gen_range(0.0..std::f32::consts::TAU);
            let hit = Hit {
                xyz: [distance * azimuth.cos(), rng.gen_range(-1.0..1.0), distance * azimuth.sin()],
                intensity: rng.gen_range(0.0..1.0),
                ring: rng.gen_range(0..64),
                azimuth,
                distance,
                time_stamp: self.tick as f64 * 0.1,
            };
            for (_, writer, layout) in &mut writers {
                let values: Vec<_> = layout.data_fields().map(|spec| hit.value(spec.field)).collect();
                writer.push(&values)?;
            }
        }

        let backend = self.mirror.backend_mut();
        for (channel, writer, _) in writers {
            backend.inject_output(sensor, channel, writer.finish());
        }
        Ok(())
    }

    fn report(&self) -> Result<(), SensorError> {
        let compact: Vec<PointXyzir> = self.lidar.view(&self.mirror, self.compact_output)?;
        let extended: Vec<PointXyzirAdt> = self.lidar.view(&self.mirror, self.extended_output)?;
        let nearest = compact
            .iter()
            .map(|p| Vec3::from(p.xyz).norm())
            .fold(f32::INFINITY, f32::min);
        log::info!(
            "tick {}: {} instances, {} compact points, {} extended points, nearest hit {:.2} m",
            self.tick,
            self.mirror.instance_count(),
            compact.len(),
            extended.len(),
            nearest
        );
        if let Some(sample) = self.imu.latest(&self.mirror)? {
            log::info!("IMU acceleration {:?}", sample.acceleration());
        }
        let reading = self.encoder.read(&self.mirror)?;
        log::info!("Encoder position {:.3}, speed {:.3}", reading.position, reading.speed);
        log::info!("Odometer distance {:.3} m", self.odometer.read(&self.mirror)?);
        Ok(())
    }

    fn run(&mut self) -> Result<(), DemoError> {
        for _ in 0..TICKS {
            self.step()?;
            if self.tick % 50 == 0 {
                self.report()?;
            }
        }
        Ok(())
    }

    fn shutdown(&mut self) {
        self.lidar.destroy(&mut self.mirror);
        self.imu.destroy(&mut self.mirror);
        self.encoder.destroy(&mut self.mirror);
        self.odometer.destroy(&mut self.mirror);

        match self.mirror.shutdown() {
            Some(report) => log::info!("Sensor environment released: {report:?}"),
            None => log::warn!("Sensor environment was already released"),
        }
        let backend = self.mirror.backend();
        if !backend.violations().is_empty() {
            log::error!("Backend lifetime violations: {:?}", backend.violations());
        }
    }
}

fn load_config() -> Result<SensorEnvironmentConfig, DemoError> {
    Ok(SensorEnvironmentConfig::load_or_default(CONFIG_PATH)?)
}

fn main() {
    logging::init_with_filter("info");

    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            log::error!("Failed to load {CONFIG_PATH}: {e}");
            std::process::exit(1);
        }
    };

    let mut demo = LidarDemo::new(config);
    let result = demo.initialize().and_then(|()| demo.run());
    demo.shutdown();

    if let Err(e) = result {
        log::error!("Lidar demo failed: {e}");
        std::process::exit(1);
    }
    log::info!("Lidar demo finished after {} ticks", demo.tick);
}
