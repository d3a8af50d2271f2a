use anyhow::{Context, Result};
use log::warn;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::error::ConfigError;
use crate::mapping::PositionSpace;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub torso: TorsoConfig,
    #[serde(default)]
    pub solver: SolverConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub pose: PoseConfig,
    #[serde(default)]
    pub sink: SinkConfig,
    #[serde(default)]
    pub debug: DebugConfig,
    #[serde(default = "default_garments")]
    pub garments: Vec<GarmentEntry>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FilterConfig {
    /// Keypoints scoring below this are dropped for the frame
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,
    /// Keypoint blend factor; higher follows faster but jitters more
    #[serde(default = "default_keypoint_alpha")]
    pub alpha: f32,
    /// Frames a missing part is carried forward before it is forgotten.
    /// 0 forgets immediately, so a part returning after a gap is re-acquired unsmoothed.
    #[serde(default)]
    pub max_missed_frames: u32,
}

fn default_confidence_threshold() -> f32 { 0.5 }
fn default_keypoint_alpha() -> f32 { 0.5 }

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
            alpha: default_keypoint_alpha(),
            max_missed_frames: 0,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct TorsoConfig {
    /// Each shoulder and hip must score strictly above this
    #[serde(default = "default_confidence_floor")]
    pub confidence_floor: f32,
}

fn default_confidence_floor() -> f32 { 0.5 }

impl Default for TorsoConfig {
    fn default() -> Self {
        Self {
            confidence_floor: default_confidence_floor(),
        }
    }
}

/// Device class, for the sizing difference between phone and desktop viewports.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeviceProfile {
    #[default]
    Desktop,
    Mobile,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SolverConfig {
    /// Transform blend factor
    #[serde(default = "default_transform_alpha")]
    pub transform_alpha: f32,
    #[serde(default)]
    pub position_space: PositionSpace,
    /// Base depth of the overlay in front of the camera plane
    #[serde(default = "default_z_offset")]
    pub z_offset: f32,
    /// Depth pushed back per unit of relative shoulder width
    #[serde(default = "default_depth_coefficient")]
    pub depth_coefficient: f32,
    #[serde(default = "default_z_min")]
    pub z_min: f32,
    #[serde(default = "default_z_max")]
    pub z_max: f32,
    /// Multiplier from relative body size to overlay scale
    #[serde(default = "default_scale_calibration")]
    pub scale_calibration: f32,
    #[serde(default = "default_height_weight")]
    pub height_weight: f32,
    #[serde(default = "default_width_weight")]
    pub width_weight: f32,
    #[serde(default = "default_min_scale")]
    pub min_scale: f32,
    #[serde(default = "default_max_scale")]
    pub max_scale: f32,
    #[serde(default = "default_initial_scale")]
    pub initial_scale: f32,
    #[serde(default)]
    pub device: DeviceProfile,
    #[serde(default = "default_mobile_scale_factor")]
    pub mobile_scale_factor: f32,
    /// Adopt the first locked target directly instead of gliding from the initial transform
    #[serde(default)]
    pub snap_on_first_lock: bool,
}

fn default_transform_alpha() -> f32 { 0.15 }
fn default_z_offset() -> f32 { 0.1 }
fn default_depth_coefficient() -> f32 { 1.0 }
fn default_z_min() -> f32 { -2.0 }
fn default_z_max() -> f32 { 1.0 }
fn default_scale_calibration() -> f32 { 2.5 }
fn default_height_weight() -> f32 { 0.5 }
fn default_width_weight() -> f32 { 0.5 }
fn default_min_scale() -> f32 { 0.05 }
fn default_max_scale() -> f32 { 3.0 }
fn default_initial_scale() -> f32 { 1.0 }
fn default_mobile_scale_factor() -> f32 { 0.8 }

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            transform_alpha: default_transform_alpha(),
            position_space: PositionSpace::default(),
            z_offset: default_z_offset(),
            depth_coefficient: default_depth_coefficient(),
            z_min: default_z_min(),
            z_max: default_z_max(),
            scale_calibration: default_scale_calibration(),
            height_weight: default_height_weight(),
            width_weight: default_width_weight(),
            min_scale: default_min_scale(),
            max_scale: default_max_scale(),
            initial_scale: default_initial_scale(),
            device: DeviceProfile::default(),
            mobile_scale_factor: default_mobile_scale_factor(),
            snap_on_first_lock: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScheduleConfig {
    /// Minimum time between inference requests (ms)
    #[serde(default = "default_min_inference_interval_ms")]
    pub min_inference_interval_ms: u64,
    /// Loop tick rate, standing in for the display refresh
    #[serde(default = "default_refresh_hz")]
    pub refresh_hz: f64,
}

fn default_min_inference_interval_ms() -> u64 { 100 }
fn default_refresh_hz() -> f64 { 60.0 }

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            min_inference_interval_ms: default_min_inference_interval_ms(),
            refresh_hz: default_refresh_hz(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CameraConfig {
    #[serde(default)]
    pub index: i32,
    #[serde(default = "default_camera_width")]
    pub width: u32,
    #[serde(default = "default_camera_height")]
    pub height: u32,
    #[serde(default = "default_camera_fps")]
    pub fps: u32,
}

fn default_camera_width() -> u32 { 1280 }
fn default_camera_height() -> u32 { 720 }
fn default_camera_fps() -> u32 { 30 }

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            index: 0,
            width: default_camera_width(),
            height: default_camera_height(),
            fps: default_camera_fps(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PoseBackend {
    #[default]
    Local,
    Remote,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PoseConfig {
    #[serde(default)]
    pub backend: PoseBackend,
    #[serde(default = "default_model_path")]
    pub model_path: String,
    /// pose_server address used by the remote backend
    #[serde(default = "default_server_addr")]
    pub server_addr: String,
    /// Address pose_server listens on
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

fn default_model_path() -> String { "models/movenet_lightning.onnx".to_string() }
fn default_server_addr() -> String { "127.0.0.1:9100".to_string() }
fn default_listen_addr() -> String { "0.0.0.0:9100".to_string() }

impl Default for PoseConfig {
    fn default() -> Self {
        Self {
            backend: PoseBackend::default(),
            model_path: default_model_path(),
            server_addr: default_server_addr(),
            listen_addr: default_listen_addr(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SinkConfig {
    /// UDP target of the renderer's OSC listener
    #[serde(default = "default_sink_addr")]
    pub addr: String,
    /// Local UDP address; the renderer sends `/garment/viewport` reports here
    #[serde(default = "default_sink_listen_addr")]
    pub listen_addr: String,
    /// Viewport assumed until the renderer reports one
    #[serde(default = "default_viewport_width")]
    pub viewport_width: f32,
    #[serde(default = "default_viewport_height")]
    pub viewport_height: f32,
}

fn default_sink_addr() -> String { "127.0.0.1:39571".to_string() }
fn default_sink_listen_addr() -> String { "0.0.0.0:39572".to_string() }
fn default_viewport_width() -> f32 { 1280.0 }
fn default_viewport_height() -> f32 { 720.0 }

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            addr: default_sink_addr(),
            listen_addr: default_sink_listen_addr(),
            viewport_width: default_viewport_width(),
            viewport_height: default_viewport_height(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct DebugConfig {
    /// Show the keypoint / anchor debug window
    #[serde(default)]
    pub view: bool,
}

/// One selectable garment model.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct GarmentEntry {
    pub id: String,
    pub name: String,
    /// Asset path handed to the renderer
    pub model: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            filter: FilterConfig::default(),
            torso: TorsoConfig::default(),
            solver: SolverConfig::default(),
            schedule: ScheduleConfig::default(),
            camera: CameraConfig::default(),
            pose: PoseConfig::default(),
            sink: SinkConfig::default(),
            debug: DebugConfig::default(),
            garments: default_garments(),
        }
    }
}

const DEFAULT_GARMENT_NAMES: [&str; 5] = [
    "Supreme Shirt",
    "Smile Jeans",
    "Red Puffer",
    "Pleated Elegance",
    "Floral Elegance Shirt",
];

fn default_garments() -> Vec<GarmentEntry> {
    DEFAULT_GARMENT_NAMES
        .iter()
        .zip(1..)
        .map(|(name, i)| GarmentEntry {
            id: format!("model-{}", i),
            name: name.to_string(),
            model: format!("/3d/{}.glb", i),
        })
        .collect()
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Like `load`, but falls back to defaults when the file is missing or invalid.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(path.as_ref()) {
            Ok(config) => config,
            Err(e) => {
                warn!("config: {:#}; using defaults", e);
                Self::default()
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let blends = [
            ("filter.confidence_threshold", self.filter.confidence_threshold),
            ("filter.alpha", self.filter.alpha),
            ("torso.confidence_floor", self.torso.confidence_floor),
            ("solver.transform_alpha", self.solver.transform_alpha),
        ];
        for (name, value) in blends {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::BlendOutOfRange { name, value });
            }
        }

        let s = &self.solver;
        if !(s.min_scale > 0.0 && s.min_scale <= s.max_scale && s.max_scale.is_finite()) {
            return Err(ConfigError::ScaleBounds { min: s.min_scale, max: s.max_scale });
        }
        if !(s.z_min <= s.z_max) {
            return Err(ConfigError::DepthBounds { min: s.z_min, max: s.z_max });
        }
        let positives = [
            ("solver.initial_scale", s.initial_scale as f64),
            ("solver.scale_calibration", s.scale_calibration as f64),
            ("solver.mobile_scale_factor", s.mobile_scale_factor as f64),
            ("schedule.refresh_hz", self.schedule.refresh_hz),
            ("schedule.min_inference_interval_ms", self.schedule.min_inference_interval_ms as f64),
        ];
        for (name, value) in positives {
            if !(value > 0.0 && value.is_finite()) {
                return Err(ConfigError::NotPositive { name, value });
            }
        }

        let mut seen = HashSet::new();
        for garment in &self.garments {
            if !seen.insert(garment.id.as_str()) {
                return Err(ConfigError::DuplicateGarment(garment.id.clone()));
            }
        }
        Ok(())
    }
}
