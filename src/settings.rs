//! Source settings and module configuration
//!
//! Per-source settings come from the host as JSON. The module configuration
//! is an XML file in the user's config directory.

use std::fs;
use std::path::{Path, PathBuf};

use quick_xml::de::from_str;
use quick_xml::se::to_string;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::network::wire::DEFAULT_MAX_FRAME_BYTES;
use crate::network::ChannelDirectory;
use crate::telemetry::LogConfig;
use crate::video::CodecLimits;

/// Settings of one pipe source, as stored by the host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSettings {
    /// Channel to subscribe to
    #[serde(rename = "pipe_name", default)]
    pub channel_name: String,
    /// Stop receiving and free the texture while hidden
    #[serde(rename = "unload", default)]
    pub unload_when_hidden: bool,
    /// Incoming alpha was premultiplied in linear space
    #[serde(rename = "linear_alpha", default)]
    pub linear_alpha: bool,
}

impl SourceSettings {
    pub fn from_json(json: &str) -> Result<Self, SettingsError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, SettingsError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Whether frames are received even while the source is hidden.
    pub fn persistent(&self) -> bool {
        !self.unload_when_hidden
    }

    /// Editable properties shown by the host.
    pub fn properties() -> Vec<PropertyDesc> {
        vec![
            PropertyDesc {
                key: "pipe_name",
                label: "Pipe name",
                kind: PropertyKind::Text,
            },
            PropertyDesc {
                key: "unload",
                label: "Unload when not showing",
                kind: PropertyKind::Bool,
            },
            PropertyDesc {
                key: "linear_alpha",
                label: "Linear alpha",
                kind: PropertyKind::Bool,
            },
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyKind {
    Text,
    Bool,
}

/// One host UI property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyDesc {
    /// Settings key the property edits
    pub key: &'static str,
    pub label: &'static str,
    pub kind: PropertyKind,
}

/// Process-wide configuration (stored in config directory)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename = "PipeSourceConfig")]
pub struct ModuleConfig {
    #[serde(rename = "logging", default)]
    pub log: LogConfig,

    /// Named channels and their publisher addresses
    #[serde(rename = "channels", default)]
    pub channels: ChannelDirectory,

    #[serde(rename = "codecLimits", default)]
    pub codec_limits: CodecLimits,

    /// Largest accepted wire payload in bytes
    #[serde(rename = "maxFrameBytes", default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
}

fn default_max_frame_bytes() -> usize {
    DEFAULT_MAX_FRAME_BYTES
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self {
            log: LogConfig::default(),
            channels: ChannelDirectory::default(),
            codec_limits: CodecLimits::default(),
            max_frame_bytes: default_max_frame_bytes(),
        }
    }
}

impl ModuleConfig {
    /// Get the config file path
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|mut p| {
            p.push("PipeSource");
            p.push("config.xml");
            p
        })
    }

    /// Load from the config directory, falling back to defaults.
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };

        if !path.exists() {
            return Self::default();
        }

        match Self::load_from_file(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Ignoring config at {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn load_from_file(path: &Path) -> Result<Self, SettingsError> {
        let contents = fs::read_to_string(path)?;
        let mut config: Self = from_str(&contents)?;
        config.max_frame_bytes = config.max_frame_bytes.max(1);
        Ok(config)
    }

    /// Save to the config directory.
    pub fn save(&self) -> Result<(), SettingsError> {
        let path = Self::config_path().ok_or(SettingsError::NoConfigDir)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        self.save_to_file(&path)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<(), SettingsError> {
        let xml = to_string(self)?;
        let formatted = format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{}", xml);
        fs::write(path, formatted)?;
        Ok(())
    }
}

/// Settings-related errors
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("XML parse error: {0}")]
    XmlParse(#[from] quick_xml::DeError),
    #[error("XML write error: {0}")]
    XmlWrite(#[from] quick_xml::SeError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Could not find config directory")]
    NoConfigDir,
}
