use crate::recognizer::RecognizerKind;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};

/// Playback runs on millisecond ticks, so faster rates cannot be honored
pub const MAX_FRAME_RATE: u32 = 1000;

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct StopmoConfig {
    pub camera: CameraConfig,
    pub recognition: RecognitionConfig,
    pub color: ColorMatchConfig,
    pub playback: PlaybackConfig,
    pub effects: EffectsConfig,
    pub store: StoreConfig,
    pub export: ExportConfig,
    pub system: SystemConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CameraConfig {
    /// Preview resolution (width, height)
    #[serde(default = "default_camera_resolution")]
    pub resolution: (u32, u32),

    /// Preview frames per second fed to the recognizer
    #[serde(default = "default_camera_fps")]
    pub fps: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct RecognitionConfig {
    /// Active recognition technique
    #[serde(default = "default_technique")]
    pub technique: RecognizerKind,

    /// How long a capture code must stay away before the capture fires
    #[serde(default = "default_capture_delay_seconds")]
    pub capture_delay_seconds: f32,

    /// Delay before on-screen command text is cleared
    #[serde(default = "default_grace_delay_ms")]
    pub grace_delay_ms: u64,

    /// Delay before text is cleared after a capture fires
    #[serde(default = "default_post_capture_delay_ms")]
    pub post_capture_delay_ms: u64,

    /// Minimum time between two share uploads
    #[serde(default = "default_share_cooldown_ms")]
    pub share_cooldown_ms: u64,

    /// Consecutive frames without a detection before the target counts as lost
    #[serde(default = "default_lost_after_misses")]
    pub lost_after_misses: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ColorMatchConfig {
    /// Target color (r, g, b)
    #[serde(default = "default_color_target")]
    pub target: (u8, u8, u8),

    /// Maximum Euclidean RGB distance that still matches
    #[serde(default = "default_color_tolerance")]
    pub tolerance: f32,

    /// Side of the centered sample window as a fraction of the frame
    #[serde(default = "default_sample_fraction")]
    pub sample_fraction: f32,

    /// Command payload reported while the color is visible
    #[serde(default = "default_color_payload")]
    pub payload: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PlaybackConfig {
    /// Playback frames per second
    #[serde(default = "default_frame_rate")]
    pub frame_rate: u32,

    /// Start from the last frame and play backwards
    #[serde(default)]
    pub reverse: bool,

    /// Ping-pong instead of looping
    #[serde(default)]
    pub bounce: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct EffectsConfig {
    #[serde(default)]
    pub kaleidoscope: bool,

    /// Kaleidoscope rotation in degrees
    #[serde(default)]
    pub kaleidoscope_rotation: f32,

    #[serde(default)]
    pub invert: bool,

    /// Blend captures over the background image
    #[serde(default)]
    pub transparency: bool,

    #[serde(default = "default_transparency_alpha")]
    pub transparency_alpha: f32,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct StoreConfig {
    /// Maximum number of frames in one film
    #[serde(default = "default_store_capacity")]
    pub capacity: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ExportConfig {
    /// Directory for exported films
    #[serde(default = "default_export_path")]
    pub path: String,

    /// Rows removed from the top of each frame on export
    #[serde(default)]
    pub crop_top: u32,

    /// Rows removed from the bottom of each frame on export
    #[serde(default)]
    pub crop_bottom: u32,

    /// Upload URL used by the share command
    pub destination: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SystemConfig {
    /// Event bus capacity
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,

    /// Preview frames allowed to wait for the router before new ones are dropped
    #[serde(default = "default_max_queued_frames")]
    pub max_queued_frames: usize,
}

impl StopmoConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("stopmo.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default(
                "camera.resolution",
                vec![default_camera_resolution().0, default_camera_resolution().1],
            )?
            .set_default("camera.fps", default_camera_fps())?
            .set_default("recognition.technique", default_technique().as_str())?
            .set_default(
                "recognition.capture_delay_seconds",
                default_capture_delay_seconds() as f64,
            )?
            .set_default("recognition.grace_delay_ms", default_grace_delay_ms() as i64)?
            .set_default(
                "recognition.post_capture_delay_ms",
                default_post_capture_delay_ms() as i64,
            )?
            .set_default("recognition.share_cooldown_ms", default_share_cooldown_ms() as i64)?
            .set_default("recognition.lost_after_misses", default_lost_after_misses())?
            .set_default(
                "color.target",
                vec![
                    default_color_target().0 as i64,
                    default_color_target().1 as i64,
                    default_color_target().2 as i64,
                ],
            )?
            .set_default("color.tolerance", default_color_tolerance() as f64)?
            .set_default("color.sample_fraction", default_sample_fraction() as f64)?
            .set_default("color.payload", default_color_payload())?
            .set_default("playback.frame_rate", default_frame_rate())?
            .set_default("playback.reverse", false)?
            .set_default("playback.bounce", false)?
            .set_default("effects.kaleidoscope", false)?
            .set_default("effects.kaleidoscope_rotation", 0.0)?
            .set_default("effects.invert", false)?
            .set_default("effects.transparency", false)?
            .set_default(
                "effects.transparency_alpha",
                default_transparency_alpha() as f64,
            )?
            .set_default("store.capacity", default_store_capacity() as i64)?
            .set_default("export.path", default_export_path())?
            .set_default("export.crop_top", 0u32)?
            .set_default("export.crop_bottom", 0u32)?
            .set_default(
                "system.event_bus_capacity",
                default_event_bus_capacity() as i64,
            )?
            .set_default(
                "system.max_queued_frames",
                default_max_queued_frames() as i64,
            )?
            .add_source(File::with_name(&path_str).required(false))
            // STOPMO_PLAYBACK__FRAME_RATE=12 -> playback.frame_rate
            .add_source(Environment::with_prefix("STOPMO").separator("__"))
            .build()?;

        let config: StopmoConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.camera.resolution.0 == 0 || self.camera.resolution.1 == 0 {
            return Err(ConfigError::Message(
                "Camera resolution must be greater than 0".to_string(),
            ));
        }

        if self.camera.fps == 0 {
            return Err(ConfigError::Message(
                "Camera fps must be greater than 0".to_string(),
            ));
        }

        if !self.recognition.capture_delay_seconds.is_finite()
            || self.recognition.capture_delay_seconds < 0.0
        {
            return Err(ConfigError::Message(
                "Capture delay must be a non-negative number of seconds".to_string(),
            ));
        }

        if self.recognition.lost_after_misses == 0 {
            return Err(ConfigError::Message(
                "lost_after_misses must be at least 1".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.color.sample_fraction) || self.color.sample_fraction == 0.0
        {
            return Err(ConfigError::Message(
                "Color sample_fraction must be in (0, 1]".to_string(),
            ));
        }

        if self.playback.frame_rate == 0 {
            return Err(ConfigError::Message(
                "Playback frame rate must be greater than 0".to_string(),
            ));
        }

        if self.playback.frame_rate > MAX_FRAME_RATE {
            return Err(ConfigError::Message(format!(
                "Playback frame rate cannot exceed {} fps",
                MAX_FRAME_RATE
            )));
        }

        if self.store.capacity == 0 {
            return Err(ConfigError::Message(
                "Frame store capacity must be greater than 0".to_string(),
            ));
        }

        if self.export.crop_top + self.export.crop_bottom >= self.camera.resolution.1 {
            return Err(ConfigError::Message(
                "Export crop removes the whole frame".to_string(),
            ));
        }

        if self.system.event_bus_capacity == 0 {
            return Err(ConfigError::Message(
                "Event bus capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl RecognitionConfig {
    pub fn capture_delay(&self) -> Duration {
        Duration::from_secs_f32(self.capture_delay_seconds.max(0.0))
    }

    pub fn grace_delay(&self) -> Duration {
        Duration::from_millis(self.grace_delay_ms)
    }

    pub fn post_capture_delay(&self) -> Duration {
        Duration::from_millis(self.post_capture_delay_ms)
    }

    pub fn share_cooldown(&self) -> Duration {
        Duration::from_millis(self.share_cooldown_ms)
    }
}

impl PlaybackConfig {
    /// Interval between two playback frames
    pub fn frame_interval(&self) -> Duration {
        let millis = 1000 / self.frame_rate.clamp(1, MAX_FRAME_RATE) as u64;
        Duration::from_millis(millis.max(1))
    }
}

impl Default for StopmoConfig {
    fn default() -> Self {
        Self {
            camera: CameraConfig {
                resolution: default_camera_resolution(),
                fps: default_camera_fps(),
            },
            recognition: RecognitionConfig {
                technique: default_technique(),
                capture_delay_seconds: default_capture_delay_seconds(),
                grace_delay_ms: default_grace_delay_ms(),
                post_capture_delay_ms: default_post_capture_delay_ms(),
                share_cooldown_ms: default_share_cooldown_ms(),
                lost_after_misses: default_lost_after_misses(),
            },
            color: ColorMatchConfig {
                target: default_color_target(),
                tolerance: default_color_tolerance(),
                sample_fraction: default_sample_fraction(),
                payload: default_color_payload(),
            },
            playback: PlaybackConfig {
                frame_rate: default_frame_rate(),
                reverse: false,
                bounce: false,
            },
            effects: EffectsConfig {
                kaleidoscope: false,
                kaleidoscope_rotation: 0.0,
                invert: false,
                transparency: false,
                transparency_alpha: default_transparency_alpha(),
            },
            store: StoreConfig {
                capacity: default_store_capacity(),
            },
            export: ExportConfig {
                path: default_export_path(),
                crop_top: 0,
                crop_bottom: 0,
                destination: None,
            },
            system: SystemConfig {
                event_bus_capacity: default_event_bus_capacity(),
                max_queued_frames: default_max_queued_frames(),
            },
        }
    }
}

/// Live, observable settings shared by the router and the playback engine.
///
/// Writers call [`SettingsHandle::update`]; every subscriber is notified.
#[derive(Clone)]
pub struct SettingsHandle {
    sender: Arc<watch::Sender<StopmoConfig>>,
}

impl SettingsHandle {
    pub fn new(config: StopmoConfig) -> Self {
        let (sender, _) = watch::channel(config);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Clone of the current settings
    pub fn current(&self) -> StopmoConfig {
        self.sender.borrow().clone()
    }

    /// Read a value without cloning the whole config
    pub fn read<R>(&self, f: impl FnOnce(&StopmoConfig) -> R) -> R {
        f(&self.sender.borrow())
    }

    pub fn subscribe(&self) -> watch::Receiver<StopmoConfig> {
        self.sender.subscribe()
    }

    /// Modify settings in place and notify subscribers
    pub fn update(&self, f: impl FnOnce(&mut StopmoConfig)) {
        self.sender.send_modify(f);
    }
}

fn default_camera_resolution() -> (u32, u32) {
    (320, 240)
}
fn default_camera_fps() -> u32 {
    15
}

fn default_technique() -> RecognizerKind {
    RecognizerKind::Manual
}
fn default_capture_delay_seconds() -> f32 {
    1.0
}
fn default_grace_delay_ms() -> u64 {
    300
}
fn default_post_capture_delay_ms() -> u64 {
    500
}
fn default_share_cooldown_ms() -> u64 {
    2000
}
fn default_lost_after_misses() -> u32 {
    2
}

fn default_color_target() -> (u8, u8, u8) {
    (220, 30, 30)
}
fn default_color_tolerance() -> f32 {
    60.0
}
fn default_sample_fraction() -> f32 {
    0.2
}
fn default_color_payload() -> String {
    "snap".to_string()
}

fn default_frame_rate() -> u32 {
    10
}
fn default_transparency_alpha() -> f32 {
    0.5
}
fn default_store_capacity() -> usize {
    300
}
fn default_export_path() -> String {
    "./films".to_string()
}
fn default_event_bus_capacity() -> usize {
    100
}
fn default_max_queued_frames() -> usize {
    4
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = StopmoConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.store.capacity, 300);
        assert_eq!(config.recognition.technique, RecognizerKind::Manual);
    }

    #[test]
    fn test_config_validation() {
        let mut config = StopmoConfig::default();
        config.playback.frame_rate = 0;
        assert!(config.validate().is_err());

        config.playback.frame_rate = 12;
        config.recognition.capture_delay_seconds = -1.0;
        assert!(config.validate().is_err());

        config.recognition.capture_delay_seconds = 0.5;
        config.export.crop_top = 200;
        config.export.crop_bottom = 40;
        assert!(config.validate().is_err());

        config.export.crop_bottom = 10;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_frame_rate_upper_bound() {
        let mut config = StopmoConfig::default();
        config.playback.frame_rate = MAX_FRAME_RATE;
        assert!(config.validate().is_ok());
        assert_eq!(config.playback.frame_interval(), Duration::from_millis(1));

        config.playback.frame_rate = 5000;
        assert!(config.validate().is_err());
        assert_eq!(config.playback.frame_interval(), Duration::from_millis(1));
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[playback]\nframe_rate = 24\nbounce = true\n\n[recognition]\ntechnique = \"color_match\"\ncapture_delay_seconds = 2.5"
        )
        .unwrap();

        let config = StopmoConfig::load_from_file(file.path()).unwrap();

        assert_eq!(config.playback.frame_rate, 24);
        assert!(config.playback.bounce);
        assert_eq!(config.recognition.technique, RecognizerKind::ColorMatch);
        assert_eq!(config.recognition.capture_delay(), Duration::from_millis(2500));
        assert_eq!(config.store.capacity, 300);
    }

    #[test]
    fn test_frame_interval() {
        let mut playback = StopmoConfig::default().playback;
        playback.frame_rate = 4;
        assert_eq!(playback.frame_interval(), Duration::from_millis(250));
    }

    #[tokio::test]
    async fn test_settings_handle_notifies_subscribers() {
        let settings = SettingsHandle::new(StopmoConfig::default());
        let mut receiver = settings.subscribe();

        settings.update(|cfg| cfg.playback.frame_rate = 30);

        receiver.changed().await.unwrap();
        assert_eq!(receiver.borrow().playback.frame_rate, 30);
        assert_eq!(settings.read(|cfg| cfg.playback.frame_rate), 30);
    }
}
