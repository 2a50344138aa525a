//! Surface materials and the backend material cache
//!
//! Every instance needs a backend material. Nodes without a surface material
//! binding get the default material; bound materials are created once per
//! distinct `Arc<SurfaceMaterial>` and shared.
//!
//! The scene may also carry one [`AmbientMaterial`], the medium lidar beams
//! travel through. It is owned by the cache and unset before it is disposed.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::backend::{BackendError, BackendHandle, BackendResult, MaterialHandle, RayTraceBackend, SceneHandle};

/// Lidar surface material definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SurfaceMaterial {
    /// Ideal diffuse reflector
    LambertianOpaque {
        /// Fraction of light reflected
        reflectivity: f32,
    },

    /// Microfacet specular (GGX) plus rough diffuse (Oren-Nayar)
    GgxAndOrenNayar {
        /// Real part of the refractive index
        refractive_index_real: f32,
        /// Imaginary part of the refractive index
        refractive_index_imaginary: f32,
        /// Beckmann roughness of the specular lobe
        beckmann_roughness: f32,
        /// Oren-Nayar roughness of the diffuse lobe
        oren_nayar_roughness: f32,
        /// Diffuse reflectivity
        diffuse_reflectivity: f32,
    },
}

impl SurfaceMaterial {
    /// Lambertian material with the given reflectivity
    pub const fn lambertian(reflectivity: f32) -> Self {
        Self::LambertianOpaque { reflectivity }
    }

    /// GGX and Oren-Nayar material with default parameters
    pub const fn ggx_and_oren_nayar() -> Self {
        Self::GgxAndOrenNayar {
            refractive_index_real: 1.4517,
            refractive_index_imaginary: 0.0,
            beckmann_roughness: 0.3,
            oren_nayar_roughness: 0.3,
            diffuse_reflectivity: 0.8,
        }
    }
}

impl Default for SurfaceMaterial {
    fn default() -> Self {
        Self::lambertian(0.8)
    }
}

/// Low-level propagation constants of an ambient medium
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AmbientConstants {
    /// Signal attenuation coefficient
    pub attenuation_coefficient: f32,
    /// Refractive index of the medium
    pub refractive_index: f32,
    /// Scale parameter of the atmospheric return gamma distribution
    pub return_gamma_scale: f32,
    /// Shape parameter of the atmospheric return gamma distribution
    pub return_gamma_shape: f32,
    /// Scaling of the atmospheric return probability, in `[0, 1]`
    pub return_probability_scaling: f32,
}

impl Default for AmbientConstants {
    /// Clear air
    fn default() -> Self {
        Self {
            attenuation_coefficient: 0.000_402_272,
            refractive_index: 1.000_273,
            return_gamma_scale: 0.52,
            return_gamma_shape: 9.5,
            return_probability_scaling: 1.588_99e-5,
        }
    }
}

/// Medium lidar beams travel through
///
/// The atmospheric variants let the backend derive the propagation constants;
/// `Manual` passes them as given.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AmbientMaterial {
    /// Clear or hazy air
    Air {
        /// Meteorological optical range in km
        visibility: f32,
    },

    /// Fog
    Fog {
        /// Meteorological optical range in km
        visibility: f32,
        /// Signal wavelength in nm
        wavelength: f32,
        /// 0 for fine continental fog, 1 for large droplet maritime fog
        maritimeness: f32,
    },

    /// Rain
    Rainfall {
        /// Precipitation rate in mm/h
        rate: f32,
        /// 0 for common rain, 1 for large drop tropical rain
        tropicalness: f32,
    },

    /// Snow
    Snowfall {
        /// Precipitation rate in mm/h
        rate: f32,
        /// Signal wavelength in nm
        wavelength: f32,
    },

    /// Constants set directly, ignoring any atmospheric model
    Manual(AmbientConstants),
}

impl AmbientMaterial {
    /// Default visibility in km
    pub const VISIBILITY: f32 = 7.447_03;
    /// Default signal wavelength in nm
    pub const WAVELENGTH: f32 = 905.0;

    /// Air with the default visibility
    pub const fn air() -> Self {
        Self::Air {
            visibility: Self::VISIBILITY,
        }
    }

    /// Continental fog at the default wavelength
    pub const fn fog(visibility: f32) -> Self {
        Self::Fog {
            visibility,
            wavelength: Self::WAVELENGTH,
            maritimeness: 0.0,
        }
    }

    /// Common rain
    pub const fn rainfall(rate: f32) -> Self {
        Self::Rainfall { rate, tropicalness: 0.0 }
    }

    /// Snow at the default wavelength
    pub const fn snowfall(rate: f32) -> Self {
        Self::Snowfall {
            rate,
            wavelength: Self::WAVELENGTH,
        }
    }

    /// Check every parameter is in range
    pub fn validate(&self) -> BackendResult<()> {
        let positive = |name: &str, value: f32| check(name, value, value > 0.0);
        let non_negative = |name: &str, value: f32| check(name, value, value >= 0.0);
        let unit = |name: &str, value: f32| check(name, value, (0.0..=1.0).contains(&value));
        match *self {
            Self::Air { visibility } => positive("visibility", visibility),
            Self::Fog {
                visibility,
                wavelength,
                maritimeness,
            } => {
                positive("visibility", visibility)?;
                positive("wavelength", wavelength)?;
                unit("maritimeness", maritimeness)
            }
            Self::Rainfall { rate, tropicalness } => {
                non_negative("rate", rate)?;
                unit("tropicalness", tropicalness)
            }
            Self::Snowfall { rate, wavelength } => {
                non_negative("rate", rate)?;
                positive("wavelength", wavelength)
            }
            Self::Manual(constants) => {
                non_negative("attenuation_coefficient", constants.attenuation_coefficient)?;
                positive("refractive_index", constants.refractive_index)?;
                positive("return_gamma_scale", constants.return_gamma_scale)?;
                positive("return_gamma_shape", constants.return_gamma_shape)?;
                unit("return_probability_scaling", constants.return_probability_scaling)
            }
        }
    }
}

impl Default for AmbientMaterial {
    fn default() -> Self {
        Self::air()
    }
}

fn check(name: &str, value: f32, valid: bool) -> BackendResult<()> {
    if valid {
        Ok(())
    } else {
        Err(BackendError::InvalidParameter(format!("{name} = {value}")))
    }
}

#[derive(Debug)]
struct CachedMaterial {
    /// Held so the pointer key cannot be reused while cached
    _material: Arc<SurfaceMaterial>,
    handle: MaterialHandle,
}

/// Backend materials for the default and every bound surface material
#[derive(Debug)]
pub struct MaterialCache {
    default_definition: SurfaceMaterial,
    default: Option<MaterialHandle>,
    custom: HashMap<usize, CachedMaterial>,
    ambient: Option<MaterialHandle>,
}

impl MaterialCache {
    /// Create a cache; nothing is created on the backend yet
    pub fn new(default_definition: SurfaceMaterial) -> Self {
        Self {
            default_definition,
            default: None,
            custom: HashMap::new(),
            ambient: None,
        }
    }

    /// Create the default material on the backend
    pub fn initialize<B: RayTraceBackend + ?Sized>(&mut self, backend: &mut B) -> BackendResult<MaterialHandle> {
        if let Some(handle) = self.default {
            return Ok(handle);
        }
        let handle = backend.create_material(&self.default_definition)?;
        self.default = Some(handle);
        Ok(handle)
    }

    /// Default material, once initialized
    pub const fn default_handle(&self) -> Option<MaterialHandle> {
        self.default
    }

    /// Backend material for a resolved binding
    ///
    /// `None` resolves to the default material. A bound material the backend
    /// refuses to create falls back to the default.
    pub fn resolve<B: RayTraceBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        material: Option<&Arc<SurfaceMaterial>>,
    ) -> BackendResult<MaterialHandle> {
        let default = self
            .default
            .ok_or_else(|| BackendError::InvalidHandle("default material not created".to_string()))?;
        let Some(material) = material else {
            return Ok(default);
        };

        let key = Arc::as_ptr(material) as usize;
        if let Some(cached) = self.custom.get(&key) {
            return Ok(cached.handle);
        }
        match backend.create_material(material) {
            Ok(handle) => {
                self.custom.insert(
                    key,
                    CachedMaterial {
                        _material: Arc::clone(material),
                        handle,
                    },
                );
                Ok(handle)
            }
            Err(e) => {
                log::warn!("Failed to create surface material {material:?}, using default: {e}");
                Ok(default)
            }
        }
    }

    /// Number of bound materials created on the backend
    pub fn custom_count(&self) -> usize {
        self.custom.len()
    }

    /// Replace the ambient material of `scene`; `None` clears it
    ///
    /// The new material is set before the previous one is disposed. On error
    /// the current ambient material is kept.
    pub fn set_ambient<B: RayTraceBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        scene: SceneHandle,
        material: Option<&AmbientMaterial>,
    ) -> BackendResult<Option<MaterialHandle>> {
        let created = match material {
            Some(material) => {
                material.validate()?;
                Some(backend.create_ambient_material(material)?)
            }
            None => None,
        };
        backend.set_ambient_material(scene, created);
        if let Some(previous) = std::mem::replace(&mut self.ambient, created) {
            backend.dispose(BackendHandle::Material(previous));
        }
        Ok(created)
    }

    /// Ambient material currently set on the scene
    pub const fn ambient_handle(&self) -> Option<MaterialHandle> {
        self.ambient
    }

    /// Dispose every material including the default
    ///
    /// The ambient material is unset from `scene` first. Returns the number
    /// of materials released.
    pub fn release_all<B: RayTraceBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        scene: Option<SceneHandle>,
    ) -> usize {
        let mut released = 0;
        if let Some(handle) = self.ambient.take() {
            if let Some(scene) = scene {
                backend.set_ambient_material(scene, None);
            }
            backend.dispose(BackendHandle::Material(handle));
            released += 1;
        }
        for (_, cached) in self.custom.drain() {
            backend.dispose(BackendHandle::Material(cached.handle));
            released += 1;
        }
        if let Some(handle) = self.default.take() {
            backend.dispose(BackendHandle::Material(handle));
            released += 1;
        }
        released
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RecordingBackend;

    #[test]
    fn test_same_arc_shares_backend_material() {
        let mut backend = RecordingBackend::new();
        let mut cache = MaterialCache::new(SurfaceMaterial::default());
        let default = cache.initialize(&mut backend).unwrap();
        let asphalt = Arc::new(SurfaceMaterial::lambertian(0.1));
        let copy = Arc::new(SurfaceMaterial::lambertian(0.1));

        let a = cache.resolve(&mut backend, Some(&asphalt)).unwrap();
        let b = cache.resolve(&mut backend, Some(&Arc::clone(&asphalt))).unwrap();
        let c = cache.resolve(&mut backend, Some(&copy)).unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, default);
        assert_eq!(cache.resolve(&mut backend, None).unwrap(), default);
        assert_eq!(backend.live_materials(), 3);
    }

    #[test]
    fn test_release_all_disposes_default_too() {
        let mut backend = RecordingBackend::new();
        let mut cache = MaterialCache::new(SurfaceMaterial::ggx_and_oren_nayar());
        cache.initialize(&mut backend).unwrap();
        cache
            .resolve(&mut backend, Some(&Arc::new(SurfaceMaterial::default())))
            .unwrap();

        assert_eq!(cache.release_all(&mut backend, None), 2);
        assert_eq!(backend.live_materials(), 0);
        assert!(cache.default_handle().is_none());
    }

    #[test]
    fn test_resolve_before_initialize_fails() {
        let mut backend = RecordingBackend::new();
        let mut cache = MaterialCache::new(SurfaceMaterial::default());

        assert!(cache.resolve(&mut backend, None).is_err());
    }

    #[test]
    fn test_material_round_trips_through_toml() {
        let text = "type = \"lambertian_opaque\"\nreflectivity = 0.5\n";
        let material: SurfaceMaterial = toml::from_str(text).unwrap();
        assert_eq!(material, SurfaceMaterial::lambertian(0.5));
    }

    #[test]
    fn test_ambient_replaced_then_released_unset_first() {
        let mut backend = RecordingBackend::new();
        let scene = backend.create_scene().unwrap();
        let mut cache = MaterialCache::new(SurfaceMaterial::default());
        cache.initialize(&mut backend).unwrap();

        let fog = cache
            .set_ambient(&mut backend, scene, Some(&AmbientMaterial::fog(0.3)))
            .unwrap()
            .unwrap();
        let rain = cache
            .set_ambient(&mut backend, scene, Some(&AmbientMaterial::rainfall(10.0)))
            .unwrap()
            .unwrap();
        assert_ne!(fog, rain);
        assert_eq!(backend.scene_ambient(scene), Some(rain));
        assert!(backend.ambient_material(fog).is_none());
        assert_eq!(backend.live_materials(), 2);

        assert_eq!(cache.release_all(&mut backend, Some(scene)), 2);
        assert_eq!(backend.scene_ambient(scene), None);
        assert_eq!(backend.live_materials(), 0);
        assert!(cache.ambient_handle().is_none());
        assert!(backend.violations().is_empty());
    }

    #[test]
    fn test_invalid_ambient_keeps_current() {
        let mut backend = RecordingBackend::new();
        let scene = backend.create_scene().unwrap();
        let mut cache = MaterialCache::new(SurfaceMaterial::default());
        let air = cache
            .set_ambient(&mut backend, scene, Some(&AmbientMaterial::air()))
            .unwrap();

        let foggy = AmbientMaterial::Fog {
            visibility: 1.0,
            wavelength: 905.0,
            maritimeness: 1.5,
        };
        assert!(matches!(
            cache.set_ambient(&mut backend, scene, Some(&foggy)),
            Err(BackendError::InvalidParameter(_))
        ));
        assert_eq!(cache.ambient_handle(), air);
        assert_eq!(backend.scene_ambient(scene), air);

        cache.set_ambient(&mut backend, scene, None).unwrap();
        assert_eq!(backend.scene_ambient(scene), None);
        assert_eq!(backend.live_materials(), 0);
    }

    #[test]
    fn test_ambient_validation() {
        assert!(AmbientMaterial::air().validate().is_ok());
        assert!(AmbientMaterial::rainfall(0.0).validate().is_ok());
        assert!(AmbientMaterial::Manual(AmbientConstants::default()).validate().is_ok());
        assert!(AmbientMaterial::Air { visibility: 0.0 }.validate().is_err());
        assert!(AmbientMaterial::snowfall(-1.0).validate().is_err());
        assert!(AmbientMaterial::Rainfall {
            rate: 1.0,
            tropicalness: -0.1
        }
        .validate()
        .is_err());
    }

    #[test]
    fn test_ambient_from_toml() {
        let text = "type = \"snowfall\"\nrate = 2.5\nwavelength = 1550.0\n";
        let material: AmbientMaterial = toml::from_str(text).unwrap();
        assert_eq!(
            material,
            AmbientMaterial::Snowfall {
                rate: 2.5,
                wavelength: 1550.0
            }
        );

        let text = "type = \"manual\"\nrefractive_index = 1.0003\n";
        let AmbientMaterial::Manual(constants) = toml::from_str(text).unwrap() else {
            panic!("expected manual constants");
        };
        assert_eq!(constants.refractive_index, 1.0003);
        assert_eq!(constants.return_gamma_shape, 9.5);
    }
}
