use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialise configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// One demo session: window geometry, blit orientation, scene parameters and
/// how long to run.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SessionConfig {
    pub version: u32,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub blit: BlitConfig,
    #[serde(default)]
    pub scene: SceneConfig,
    #[serde(default)]
    pub run: RunConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DisplayConfig {
    /// Logical width; multiplied by `scale` for the physical target size.
    #[serde(default = "default_width")]
    pub width: f64,
    #[serde(default = "default_height")]
    pub height: f64,
    #[serde(default = "default_scale")]
    pub scale: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct BlitConfig {
    #[serde(default)]
    pub invert_y: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SceneConfig {
    #[serde(default = "default_clear_color")]
    pub clear_color: [f32; 4],
    /// Time for one full revolution of the demo triangle.
    #[serde(
        default = "default_spin",
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration"
    )]
    pub spin: Duration,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct RunConfig {
    /// Frames to render before exiting; 0 runs until the window is closed.
    #[serde(default)]
    pub frames: u64,
    /// PNG written from the last rendered frame.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capture: Option<PathBuf>,
}

fn default_width() -> f64 {
    800.0
}

fn default_height() -> f64 {
    600.0
}

fn default_scale() -> f64 {
    1.0
}

fn default_clear_color() -> [f32; 4] {
    [0.1, 0.1, 0.12, 1.0]
}

fn default_spin() -> Duration {
    Duration::from_secs(4)
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            scale: default_scale(),
        }
    }
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            clear_color: default_clear_color(),
            spin: default_spin(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            version: 1,
            display: DisplayConfig::default(),
            blit: BlitConfig::default(),
            scene: SceneConfig::default(),
            run: RunConfig::default(),
        }
    }
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = Duration;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a duration as number of seconds or human-readable string")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            humantime::parse_duration(v)
                .map_err(|err| E::custom(format!("invalid duration '{v}': {err}")))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Duration::from_secs(v))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v < 0 {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Duration::from_secs(v as u64))
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v.is_nan() || v.is_sign_negative() {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Duration::from_secs_f64(v))
        }
    }

    deserializer.deserialize_any(Visitor)
}

fn serialize_duration<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.collect_str(&humantime::format_duration(*duration))
}

impl SessionConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: SessionConfig = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let input = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&input)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != 1 {
            return Err(ConfigError::Invalid(format!(
                "unsupported config version {}; expected 1",
                self.version
            )));
        }

        let display = &self.display;
        for (name, value) in [
            ("width", display.width),
            ("height", display.height),
            ("scale", display.scale),
        ] {
            if value <= 0.0 || !value.is_finite() {
                return Err(ConfigError::Invalid(format!(
                    "display.{name} must be a positive number (got {value})"
                )));
            }
        }

        if let Some(component) = self
            .scene
            .clear_color
            .iter()
            .find(|component| !(0.0..=1.0).contains(*component))
        {
            return Err(ConfigError::Invalid(format!(
                "scene.clear_color components must lie in [0, 1] (got {component})"
            )));
        }

        if self.scene.spin.is_zero() {
            return Err(ConfigError::Invalid(
                "scene.spin must be greater than zero".into(),
            ));
        }

        if let Some(path) = &self.run.capture {
            if path.as_os_str().is_empty() {
                return Err(ConfigError::Invalid("run.capture may not be empty".into()));
            }
        }

        Ok(())
    }
}
