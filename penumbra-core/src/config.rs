/// Renderer settings, loadable from TOML. Every field has a default so a
/// config file only needs to name what it changes.
use std::path::{Path, PathBuf};

use serde::Deserialize;

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height.max(1) as f32
    }

    /// Shrink each axis that exceeds `limit`.
    pub fn fit_within(self, limit: Resolution) -> Resolution {
        Resolution::new(self.width.min(limit.width), self.height.min(limit.height))
    }
}

/// First-person camera tuning. Speeds are distance per unit of movement input.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub sensitivity: f32,
    pub walk_speed: f32,
    pub sprint_speed: f32,
    pub fov_degrees: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            sensitivity: 0.03,
            walk_speed: 0.005,
            sprint_speed: 0.05,
            fov_degrees: 45.0,
            near: 0.01,
            far: 100.0,
        }
    }
}

/// Initial light placement.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LightConfig {
    pub direction: [f32; 3],
    pub position: [f32; 3],
    pub colour: [f32; 3],
}

impl Default for LightConfig {
    fn default() -> Self {
        Self {
            direction: [0.1, -0.81, -0.61],
            position: [2.0, 6.0, 7.0],
            colour: [1.0, 1.0, 1.0],
        }
    }
}

/// Orthographic volume the shadow map covers, in light view space.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct LightProjection {
    pub extent: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for LightProjection {
    fn default() -> Self {
        Self {
            extent: 10.0,
            near: 1.0,
            far: 70.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Largest colour target the frontend may render to.
    pub screen: Resolution,
    /// Shadow map size, independent of the screen.
    pub shadow: Resolution,
    pub clear_colour: [f32; 4],
    pub camera: CameraConfig,
    pub light: LightConfig,
    pub light_projection: LightProjection,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            screen: Resolution::new(1920, 1080),
            shadow: Resolution::new(2048, 2048),
            clear_colour: [0.9, 0.9, 0.9, 1.0],
            camera: CameraConfig::default(),
            light: LightConfig::default(),
            light_projection: LightProjection::default(),
        }
    }
}

impl RendererConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        log::info!("Loaded config from {}", path.display());
        Self::from_toml_str(&source)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (name, resolution) in [("screen", self.screen), ("shadow", self.shadow)] {
            if resolution.width == 0 || resolution.height == 0 {
                return Err(ConfigError::Invalid(format!("{} resolution must be non-zero", name)));
            }
        }
        if self.camera.near <= 0.0 || self.camera.far <= self.camera.near {
            return Err(ConfigError::Invalid(
                "camera clip planes must satisfy 0 < near < far".to_string(),
            ));
        }
        if self.light_projection.far <= self.light_projection.near {
            return Err(ConfigError::Invalid(
                "light projection far plane must lie beyond near".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = RendererConfig::from_toml_str("").unwrap();
        assert_eq!(config, RendererConfig::default());
        assert_eq!(config.camera.sensitivity, 0.03);
        assert_eq!(config.light_projection.far, 70.5);
    }

    #[test]
    fn test_partial_override() {
        let config = RendererConfig::from_toml_str(
            r#"
            shadow = { width = 4096, height = 1024 }

            [camera]
            sprint_speed = 0.5
            "#,
        )
        .unwrap();

        assert_eq!(config.shadow, Resolution::new(4096, 1024));
        assert_eq!(config.screen, Resolution::new(1920, 1080));
        assert_eq!(config.camera.sprint_speed, 0.5);
        assert_eq!(config.camera.walk_speed, 0.005);
    }

    #[test]
    fn test_fit_within_caps_each_axis() {
        let limit = Resolution::new(320, 180);
        assert_eq!(Resolution::new(400, 100).fit_within(limit), Resolution::new(320, 100));
        assert_eq!(Resolution::new(80, 46).fit_within(limit), Resolution::new(80, 46));
        assert_eq!(Resolution::new(1000, 1000).fit_within(limit), limit);
    }

    #[test]
    fn test_rejects_zero_shadow_map() {
        let error =
            RendererConfig::from_toml_str("shadow = { width = 0, height = 512 }").unwrap_err();
        assert!(matches!(error, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_rejects_malformed_toml() {
        assert!(matches!(
            RendererConfig::from_toml_str("camera = 3"),
            Err(ConfigError::Parse(_))
        ));
    }
}
