use std::collections::BTreeMap;
use std::path::Path;

use glam::Vec3;
use netscope_common::WorldBounds;
use netscope_locations::{DEFAULT_MAX_NET_CULL_DISTANCE, LocationConfig};
use serde::{Deserialize, Serialize};

use crate::profile::{DEFAULT_PROFILE_NAME, FilterProfile, FilterProfileTable, MAX_PROFILES};

/// Default cap on the number of cells a single radius query may enumerate.
pub const DEFAULT_MAX_CELLS_PER_QUERY: usize = 4096;

/// Errors from loading or validating relevancy configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported config format: {0}")]
    UnsupportedFormat(String),
    #[error("invalid world bounds: min {min:?} must not exceed max {max:?}")]
    InvalidBounds { min: Vec3, max: Vec3 },
    #[error("invalid filter profile '{name}': {reason}")]
    InvalidProfile { name: String, reason: String },
    #[error("invalid limit: {0}")]
    InvalidLimit(String),
}

/// Process-wide relevancy settings: world bounds, diagnostic ceilings and
/// the filter profile table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RelevancyConfig {
    pub world_bounds: WorldBounds,
    /// Soft cap used only for diagnostics.
    pub max_net_cull_distance: f32,
    /// Cell enumeration cap per radius query.
    pub max_cells_per_query: usize,
    /// Profile used when an object names none or an unknown one.
    pub default_profile: FilterProfile,
    pub profiles: BTreeMap<String, FilterProfile>,
}

impl Default for RelevancyConfig {
    fn default() -> Self {
        Self {
            world_bounds: WorldBounds::default(),
            max_net_cull_distance: DEFAULT_MAX_NET_CULL_DISTANCE,
            max_cells_per_query: DEFAULT_MAX_CELLS_PER_QUERY,
            default_profile: FilterProfile::default(),
            profiles: BTreeMap::new(),
        }
    }
}

impl RelevancyConfig {
    /// Load and validate a config file. The format follows the extension:
    /// `.yaml`/`.yml` or `.json`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);
        let config = match extension.as_deref() {
            Some("yaml" | "yml") => Self::from_yaml_str(&contents)?,
            Some("json") => Self::from_json_str(&contents)?,
            _ => return Err(ConfigError::UnsupportedFormat(path.display().to_string())),
        };
        tracing::debug!(path = %path.display(), profiles = config.profiles.len(), "relevancy config loaded");
        Ok(config)
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_yaml_string(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.world_bounds.is_valid() {
            return Err(ConfigError::InvalidBounds {
                min: self.world_bounds.min,
                max: self.world_bounds.max,
            });
        }
        if self.max_net_cull_distance.is_nan() || self.max_net_cull_distance <= 0.0 {
            return Err(ConfigError::InvalidLimit(
                "max_net_cull_distance must be positive".into(),
            ));
        }
        if self.max_cells_per_query == 0 {
            return Err(ConfigError::InvalidLimit(
                "max_cells_per_query must be at least 1".into(),
            ));
        }
        if self.profiles.len() >= MAX_PROFILES {
            return Err(ConfigError::InvalidLimit(format!(
                "at most {} named profiles are supported",
                MAX_PROFILES - 1
            )));
        }
        self.default_profile.validate(DEFAULT_PROFILE_NAME)?;
        for (name, profile) in &self.profiles {
            profile.validate(name)?;
        }
        Ok(())
    }

    /// Store settings derived from this config.
    pub fn location_config(&self) -> LocationConfig {
        LocationConfig {
            bounds: self.world_bounds,
            max_net_cull_distance: self.max_net_cull_distance,
        }
    }

    /// Profile table with the default profile plus every named profile.
    pub fn profile_table(&self) -> FilterProfileTable {
        let mut table = FilterProfileTable::new(self.default_profile);
        for (name, profile) in &self.profiles {
            table.add(name.clone(), *profile);
        }
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
world_bounds:
  min: [-50000.0, -50000.0, -10000.0]
  max: [50000.0, 50000.0, 10000.0]
max_net_cull_distance: 30000.0
default_profile:
  cell_size_x: 5000.0
  cell_size_y: 5000.0
profiles:
  Immediate:
    frame_count_before_culling: 1
  Coarse:
    cell_size_x: 40000.0
    cell_size_y: 40000.0
    view_pos_relevancy_frame_count: 8
"#;

    #[test]
    fn defaults_are_valid() {
        assert!(RelevancyConfig::default().validate().is_ok());
    }

    #[test]
    fn yaml_fills_missing_fields_with_defaults() {
        let config = RelevancyConfig::from_yaml_str(SAMPLE).unwrap();
        assert_eq!(config.max_cells_per_query, DEFAULT_MAX_CELLS_PER_QUERY);
        assert_eq!(config.default_profile.cell_size_x, 5000.0);
        assert_eq!(config.default_profile.frame_count_before_culling, 4);

        let table = config.profile_table();
        assert_eq!(table.len(), 3);
        assert_eq!(table.lookup("Immediate").frame_count_before_culling, 1);
        assert_eq!(table.lookup("Coarse").view_pos_relevancy_frame_count, 8);
        assert_eq!(table.lookup("Nope"), table.default_profile());
    }

    #[test]
    fn json_round_trips_through_yaml_shape() {
        let config = RelevancyConfig::from_yaml_str(SAMPLE).unwrap();
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(RelevancyConfig::from_json_str(&json).unwrap(), config);
    }

    #[test]
    fn location_config_carries_bounds() {
        let config = RelevancyConfig::from_yaml_str(SAMPLE).unwrap();
        let location = config.location_config();
        assert_eq!(location.bounds.max, Vec3::new(50000.0, 50000.0, 10000.0));
        assert_eq!(location.max_net_cull_distance, 30000.0);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = RelevancyConfig::from_yaml_str("cell_size: 10.0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Yaml(_)));
    }

    #[test]
    fn inverted_bounds_are_rejected() {
        let yaml = "world_bounds:\n  min: [10.0, 0.0, 0.0]\n  max: [0.0, 0.0, 0.0]\n";
        let err = RelevancyConfig::from_yaml_str(yaml).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidBounds { .. }));
    }

    #[test]
    fn bad_profile_names_the_profile() {
        let yaml = "profiles:\n  Broken:\n    frame_count_before_culling: 0\n";
        match RelevancyConfig::from_yaml_str(yaml) {
            Err(ConfigError::InvalidProfile { name, .. }) => assert_eq!(name, "Broken"),
            other => panic!("expected InvalidProfile, got {other:?}"),
        }
    }

    #[test]
    fn too_many_profiles_are_rejected() {
        let mut config = RelevancyConfig::default();
        for i in 0..MAX_PROFILES {
            config.profiles.insert(format!("P{i}"), FilterProfile::default());
        }
        assert!(matches!(config.validate(), Err(ConfigError::InvalidLimit(_))));
        config.profiles.remove("P0");
        assert!(config.validate().is_ok());
        assert_eq!(config.profile_table().len(), MAX_PROFILES);
    }

    #[test]
    fn unsupported_extension_is_rejected() {
        let dir = std::env::temp_dir().join("netscope-config-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("relevancy.ini");
        std::fs::write(&path, "x").unwrap();
        assert!(matches!(
            RelevancyConfig::load(&path),
            Err(ConfigError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn load_reads_yaml_file() {
        let dir = std::env::temp_dir().join("netscope-config-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("relevancy.yaml");
        std::fs::write(&path, SAMPLE).unwrap();
        let config = RelevancyConfig::load(&path).unwrap();
        assert_eq!(config.profiles.len(), 2);
    }
}
