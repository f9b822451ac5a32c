use std::collections::HashMap;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

/// Name under which the default profile is listed.
pub const DEFAULT_PROFILE_NAME: &str = "Default";

/// Capacity of a profile table, the default profile included.
pub const MAX_PROFILES: usize = u16::MAX as usize + 1;

/// Named bundle of grid and hysteresis tunables.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FilterProfile {
    /// Grid granularity along X.
    pub cell_size_x: f32,
    /// Grid granularity along Y.
    pub cell_size_y: f32,
    /// Consecutive failing evaluations before a relevant object is culled.
    /// A value of 1 disables hysteresis.
    pub frame_count_before_culling: u32,
    /// Ticks between full re-evaluations of a connection's view.
    pub view_pos_relevancy_frame_count: u32,
}

impl Default for FilterProfile {
    fn default() -> Self {
        Self {
            cell_size_x: 20_000.0,
            cell_size_y: 20_000.0,
            frame_count_before_culling: 4,
            view_pos_relevancy_frame_count: 2,
        }
    }
}

impl FilterProfile {
    pub fn cell_size(&self) -> Vec2 {
        Vec2::new(self.cell_size_x, self.cell_size_y)
    }

    /// Check the profile's tunables; `name` is used for error reporting.
    pub fn validate(&self, name: &str) -> Result<(), ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidProfile {
            name: name.to_string(),
            reason: reason.to_string(),
        };
        let cell = self.cell_size();
        if !cell.is_finite() || cell.x <= 0.0 || cell.y <= 0.0 {
            return Err(invalid("cell sizes must be finite and positive"));
        }
        if self.frame_count_before_culling == 0 {
            return Err(invalid("frame_count_before_culling must be at least 1"));
        }
        if self.view_pos_relevancy_frame_count == 0 {
            return Err(invalid("view_pos_relevancy_frame_count must be at least 1"));
        }
        Ok(())
    }
}

/// Dense id of a profile inside a [`FilterProfileTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProfileId(pub u16);

impl ProfileId {
    pub const DEFAULT: Self = Self(0);

    pub fn index(self) -> usize {
        usize::from(self.0)
    }
}

/// Profiles by name. Unknown names resolve to the default profile.
#[derive(Debug, Clone)]
pub struct FilterProfileTable {
    entries: Vec<(String, FilterProfile)>,
    by_name: HashMap<String, ProfileId>,
}

impl Default for FilterProfileTable {
    fn default() -> Self {
        Self::new(FilterProfile::default())
    }
}

impl FilterProfileTable {
    /// Table holding only the default profile.
    pub fn new(default_profile: FilterProfile) -> Self {
        let mut by_name = HashMap::new();
        by_name.insert(DEFAULT_PROFILE_NAME.to_string(), ProfileId::DEFAULT);
        Self {
            entries: vec![(DEFAULT_PROFILE_NAME.to_string(), default_profile)],
            by_name,
        }
    }

    /// Add or replace a named profile. Adding under the default name
    /// replaces the default profile. Returns `None` when the table already
    /// holds `MAX_PROFILES` entries.
    pub fn add(&mut self, name: impl Into<String>, profile: FilterProfile) -> Option<ProfileId> {
        let name = name.into();
        if let Some(&id) = self.by_name.get(&name) {
            self.entries[id.index()].1 = profile;
            return Some(id);
        }
        let Ok(index) = u16::try_from(self.entries.len()) else {
            tracing::warn!(profile = %name, "filter profile table is full");
            return None;
        };
        let id = ProfileId(index);
        self.by_name.insert(name.clone(), id);
        self.entries.push((name, profile));
        Some(id)
    }

    /// Resolve an optional profile name. Missing or unknown names map to
    /// the default profile.
    pub fn resolve(&self, name: Option<&str>) -> ProfileId {
        let Some(name) = name else {
            return ProfileId::DEFAULT;
        };
        match self.by_name.get(name) {
            Some(&id) => id,
            None => {
                tracing::debug!(profile = name, "unknown filter profile, using default");
                ProfileId::DEFAULT
            }
        }
    }

    /// Profile by id; out-of-range ids read as the default profile.
    pub fn get(&self, id: ProfileId) -> &FilterProfile {
        self.entries
            .get(id.index())
            .map_or(&self.entries[0].1, |(_, profile)| profile)
    }

    /// Profile by name; unknown names read as the default profile.
    pub fn lookup(&self, name: &str) -> &FilterProfile {
        self.get(self.resolve(Some(name)))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn default_profile(&self) -> &FilterProfile {
        &self.entries[0].1
    }

    pub fn name(&self, id: ProfileId) -> &str {
        self.entries
            .get(id.index())
            .map_or(DEFAULT_PROFILE_NAME, |(name, _)| name.as_str())
    }

    /// Number of profiles, the default included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ProfileId, &str, &FilterProfile)> {
        self.entries
            .iter()
            .zip(0..=u16::MAX)
            .map(|((name, profile), i)| (ProfileId(i), name.as_str(), profile))
    }
}
