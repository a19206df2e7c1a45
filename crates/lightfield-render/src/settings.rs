//! Runtime settings, read by the frame loop every frame

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

/// Octahedral atlas shown by the debug overlay
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AtlasChannel {
    #[default]
    Radiance,
    DistanceHigh,
    DistanceLow,
    Normals,
}

impl AtlasChannel {
    pub const ALL: [AtlasChannel; 4] = [
        AtlasChannel::Radiance,
        AtlasChannel::DistanceHigh,
        AtlasChannel::DistanceLow,
        AtlasChannel::Normals,
    ];

    pub fn name(self) -> &'static str {
        match self {
            AtlasChannel::Radiance => "radiance",
            AtlasChannel::DistanceHigh => "distanceHigh",
            AtlasChannel::DistanceLow => "distanceLow",
            AtlasChannel::Normals => "normals",
        }
    }

    /// Distances are scalar and need rescaling to be visible
    pub fn is_distance(self) -> bool {
        matches!(self, AtlasChannel::DistanceHigh | AtlasChannel::DistanceLow)
    }
}

impl FromStr for AtlasChannel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.name() == s)
            .ok_or_else(|| Error::Config(format!("unknown atlas channel '{}'", s)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    pub target_fps: f32,
    pub environment_brightness: f32,
    pub debug_show_probe: bool,
    pub debug_probe_index: usize,
    pub debug_probe_map: AtlasChannel,
    pub ambient_color: [f32; 3],
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            target_fps: 60.0,
            environment_brightness: 1.5,
            debug_show_probe: false,
            debug_probe_index: 0,
            debug_probe_map: AtlasChannel::Radiance,
            ambient_color: [0.15, 0.15, 0.15],
        }
    }
}

impl Settings {
    /// Defaults overridden by whatever fields `json` sets
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&text)
    }

    /// File named by `env_var`, or defaults when the variable is unset
    pub fn from_env(env_var: &str) -> Result<Self> {
        match std::env::var_os(env_var) {
            Some(path) => {
                log::info!("Loading settings from {:?}", path);
                Self::from_json_file(path)
            }
            None => Ok(Self::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_gives_defaults() {
        assert_eq!(Settings::from_json_str("{}").unwrap(), Settings::default());
    }

    #[test]
    fn partial_override() {
        let s = Settings::from_json_str(
            r#"{ "targetFps": 30, "debugShowProbe": true, "debugProbeMap": "distanceLow" }"#,
        )
        .unwrap();
        assert_eq!(s.target_fps, 30.0);
        assert!(s.debug_show_probe);
        assert_eq!(s.debug_probe_map, AtlasChannel::DistanceLow);
        assert_eq!(s.environment_brightness, 1.5);
    }

    #[test]
    fn unknown_channel_is_a_config_error() {
        let err = Settings::from_json_str(r#"{ "debugProbeMap": "albedo" }"#).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!("albedo".parse::<AtlasChannel>().is_err());
    }

    #[test]
    fn channel_names_parse_back() {
        for channel in AtlasChannel::ALL {
            assert_eq!(channel.name().parse::<AtlasChannel>().unwrap(), channel);
        }
        assert!(AtlasChannel::DistanceHigh.is_distance());
        assert!(!AtlasChannel::Normals.is_distance());
    }
}
