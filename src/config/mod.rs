//! Configuration module for vcgraph
//!
//! A pipeline configuration names the components to create, the links
//! between their ports, and which ports to capture from. Files may be TOML
//! or JSON; the format is chosen by extension (`.toml`, anything else is
//! JSON).
//!
//! # App Data Location
//!
//! The default configuration lives in the platform data directory:
//! - **Linux**: `~/.local/share/dev.hxyulin.vcgraph/`
//! - **macOS**: `~/Library/Application Support/dev.hxyulin.vcgraph/`
//! - **Windows**: `%APPDATA%\dev.hxyulin.vcgraph\`
//!
//! # Example
//!
//! ```toml
//! [[components]]
//! alias = "camera"
//! name = "vc.ril.camera"
//!
//! [[components]]
//! alias = "encoder"
//! name = "vc.ril.video_encode"
//!
//! [[links]]
//! from = "camera:out:1"
//! to = "encoder:in:0"
//!
//! [[captures]]
//! port = "encoder:out:0"
//! path = "capture.h264"
//! ```

pub mod settings;

pub use settings::*;

use crate::engine::MediaEngine;
use crate::error::{Result, ResultExt, VcError};
use crate::pipeline::{Pipeline, PortId, PortKind};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

/// Application identifier for data directories
pub const APP_ID: &str = "dev.hxyulin.vcgraph";

/// Default configuration filename
pub const CONFIG_FILE: &str = "pipeline.toml";

// ==================== App Data Directory ====================

/// Get the application data directory path
pub fn app_data_dir() -> Option<PathBuf> {
    dirs_next::data_dir().map(|p| p.join(APP_ID))
}

/// Get the path to the default configuration file
pub fn default_config_path() -> Option<PathBuf> {
    app_data_dir().map(|p| p.join(CONFIG_FILE))
}

// ==================== Port Addresses ====================

/// `<alias>:<kind>:<index>`, e.g. `camera:out:1`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PortAddress {
    pub component: String,
    pub kind: PortKind,
    pub index: usize,
}

impl PortAddress {
    pub fn parse(address: &str) -> Result<Self> {
        let invalid = |reason: &str| VcError::PortAddress {
            address: address.to_string(),
            reason: reason.to_string(),
        };

        let mut parts = address.split(':');
        let (Some(component), Some(kind), Some(index), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid("expected <component>:<kind>:<index>"));
        };
        if component.is_empty() {
            return Err(invalid("empty component alias"));
        }
        let kind = PortKind::from_str(kind).map_err(|e| invalid(e.as_str()))?;
        let index = index
            .parse::<usize>()
            .map_err(|_| invalid("port index is not a number"))?;

        Ok(Self {
            component: component.to_string(),
            kind,
            index,
        })
    }
}

impl FromStr for PortAddress {
    type Err = VcError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for PortAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.component, self.kind, self.index)
    }
}

// ==================== Pipeline Description ====================

/// A component to create
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentConfig {
    /// Name used in port addresses
    pub alias: String,
    /// Engine component name, e.g. `vc.ril.camera`
    pub name: String,
}

impl ComponentConfig {
    pub fn new(alias: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            name: name.into(),
        }
    }
}

/// A connection from an output port to an input port
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkConfig {
    pub from: String,
    pub to: String,
}

impl LinkConfig {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }

    pub fn endpoints(&self) -> Result<(PortAddress, PortAddress)> {
        Ok((PortAddress::parse(&self.from)?, PortAddress::parse(&self.to)?))
    }
}

/// A port whose buffers are handed to a capture handler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureConfig {
    pub port: String,
    /// File to write payloads to; kept in memory when absent
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Complete pipeline configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Config file version for migration
    #[serde(default = "default_config_version")]
    pub version: u32,

    #[serde(default)]
    pub logging: LoggingSettings,

    #[serde(default)]
    pub pool: PoolSettings,

    #[serde(default)]
    pub dispatch: DispatchSettings,

    #[serde(default)]
    pub run: RunSettings,

    #[serde(default)]
    pub components: Vec<ComponentConfig>,

    #[serde(default)]
    pub links: Vec<LinkConfig>,

    #[serde(default)]
    pub captures: Vec<CaptureConfig>,
}

fn default_config_version() -> u32 {
    1
}

impl Default for PipelineConfig {
    /// Camera video output into an H.264 encoder, preview into a null sink,
    /// capturing the encoder output in memory.
    fn default() -> Self {
        Self {
            version: default_config_version(),
            logging: LoggingSettings::default(),
            pool: PoolSettings::default(),
            dispatch: DispatchSettings::default(),
            run: RunSettings::default(),
            components: vec![
                ComponentConfig::new("camera", "vc.ril.camera"),
                ComponentConfig::new("encoder", "vc.ril.video_encode"),
                ComponentConfig::new("preview", "vc.null_sink"),
            ],
            links: vec![
                LinkConfig::new("camera:out:1", "encoder:in:0"),
                LinkConfig::new("camera:out:0", "preview:in:0"),
            ],
            captures: vec![CaptureConfig {
                port: "encoder:out:0".to_string(),
                path: None,
            }],
        }
    }
}

impl PipelineConfig {
    /// Load a configuration file, TOML or JSON by extension
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            VcError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let config: Self = if is_toml(path) {
            toml::from_str(&content).map_err(|e| {
                VcError::Config(format!("Failed to parse config file {:?}: {}", path, e))
            })?
        } else {
            serde_json::from_str(&content).map_err(|e| {
                VcError::Config(format!("Failed to parse config file {:?}: {}", path, e))
            })?
        };
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file, returning defaults if any error occurs
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Using default pipeline config: {}", e);
                Self::default()
            }
        }
    }

    /// Save the configuration, TOML or JSON by extension
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                VcError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = if is_toml(path) {
            toml::to_string_pretty(self)
                .map_err(|e| VcError::Serialization(format!("Failed to serialize config: {}", e)))?
        } else {
            serde_json::to_string_pretty(self)
                .map_err(|e| VcError::Serialization(format!("Failed to serialize config: {}", e)))?
        };

        std::fs::write(path, content).map_err(|e| {
            VcError::Config(format!("Failed to write config file {:?}: {}", path, e))
        })
    }

    /// Check aliases are unique and every address refers to a known alias.
    pub fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for component in &self.components {
            if !seen.insert(component.alias.as_str()) {
                return Err(VcError::Config(format!(
                    "Duplicate component alias '{}'",
                    component.alias
                )));
            }
        }

        let check = |address: &PortAddress| {
            if seen.contains(address.component.as_str()) {
                Ok(())
            } else {
                Err(VcError::Config(format!(
                    "'{}' refers to unknown component '{}'",
                    address, address.component
                )))
            }
        };
        for link in &self.links {
            let (from, to) = link.endpoints()?;
            check(&from)?;
            check(&to)?;
        }
        for capture in &self.captures {
            check(&PortAddress::parse(&capture.port)?)?;
        }

        let capacity = self.dispatch.queue_capacity;
        if let Some(count) = self.pool.buffer_count {
            let needed = count as usize * self.captures.len();
            if capacity > 0 && needed > capacity {
                return Err(VcError::Config(format!(
                    "{} captures of {} buffers need a callback queue of {}, not {}",
                    self.captures.len(),
                    count,
                    needed,
                    capacity
                )));
            }
        }
        Ok(())
    }
}

impl PipelineConfig {
    /// Create every component and link on `engine`. Captures are left to the
    /// caller; see [`resolve_port`].
    pub fn build(&self, engine: Arc<dyn MediaEngine>) -> Result<Pipeline> {
        self.validate()?;
        let mut pipeline = Pipeline::with_settings(engine, self.pool, self.dispatch)
            .context("Initialising engine")?;

        for component in &self.components {
            pipeline
                .create_named(&component.alias, &component.name)
                .with_context(|| {
                    format!("Creating '{}' ({})", component.alias, component.name)
                })?;
        }
        for link in &self.links {
            let (from, to) = link.endpoints()?;
            let source = resolve_port(&pipeline, &from)?;
            let target = resolve_port(&pipeline, &to)?;
            pipeline
                .connect(source, target)
                .with_context(|| format!("Linking {} -> {}", from, to))?;
        }
        Ok(pipeline)
    }
}

/// Find the port an address names in a pipeline built from this config.
pub fn resolve_port(pipeline: &Pipeline, address: &PortAddress) -> Result<PortId> {
    let component = pipeline.lookup(&address.component).ok_or_else(|| {
        VcError::Config(format!("Unknown component '{}'", address.component))
    })?;
    pipeline
        .port_id(component, address.kind, address.index)
        .ok_or_else(|| VcError::PortAddress {
            address: address.to_string(),
            reason: "no such port on this component".to_string(),
        })
}

fn is_toml(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_address_parse() {
        let address = PortAddress::parse("camera:out:1").unwrap();
        assert_eq!(address.component, "camera");
        assert_eq!(address.kind, PortKind::Output);
        assert_eq!(address.index, 1);
        assert_eq!(address.to_string(), "camera:out:1");
    }

    #[test]
    fn test_port_address_errors() {
        for bad in ["camera", "camera:out", ":out:0", "camera:up:0", "camera:in:x", "a:in:0:1"] {
            assert!(
                matches!(PortAddress::parse(bad), Err(VcError::PortAddress { .. })),
                "{} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = PipelineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.components.len(), 3);
    }

    #[test]
    fn test_validate_rejects_unknown_alias() {
        let mut config = PipelineConfig::default();
        config.links.push(LinkConfig::new("camera:out:2", "nowhere:in:0"));
        assert!(matches!(config.validate(), Err(VcError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_small_callback_queue() {
        let mut config = PipelineConfig::default();
        config.pool.buffer_count = Some(3);
        config.dispatch.queue_capacity = 2;
        config.captures.truncate(1);
        assert!(matches!(config.validate(), Err(VcError::Config(_))));

        config.dispatch.queue_capacity = 3;
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_duplicate_alias() {
        let mut config = PipelineConfig::default();
        config
            .components
            .push(ComponentConfig::new("camera", "vc.ril.camera"));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("pipeline.toml");
        let mut config = PipelineConfig::default();
        config.pool.buffer_count = Some(4);
        config.dispatch.poll_timeout_ms = 10;
        config.save(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("[[components]]"));
        assert_eq!(PipelineConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_json_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.json");
        let config = PipelineConfig::default();
        config.save(&path).unwrap();
        assert_eq!(PipelineConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_minimal_toml_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("min.toml");
        std::fs::write(
            &path,
            "[[components]]\nalias = \"sink\"\nname = \"vc.null_sink\"\n",
        )
        .unwrap();
        let config = PipelineConfig::load(&path).unwrap();
        assert_eq!(config.version, 1);
        assert_eq!(config.dispatch, DispatchSettings::default());
        assert!(config.links.is_empty());
    }

    #[test]
    fn test_build_default_pipeline() {
        let engine = Arc::new(crate::engine::MockEngine::new());
        let config = PipelineConfig::default();
        let mut pipeline = config.build(engine.clone()).unwrap();
        assert_eq!(pipeline.components().count(), 3);
        assert_eq!(engine.live_connections(), 2);

        let camera = pipeline.lookup("camera").unwrap();
        assert_eq!(pipeline.heads(), vec![camera]);
        let capture = PortAddress::parse(&config.captures[0].port).unwrap();
        let port = resolve_port(&pipeline, &capture).unwrap();
        assert_eq!(pipeline.port(port).unwrap().name(), "vc.ril.video_encode:out:0");
        pipeline.shutdown().unwrap();
    }

    #[test]
    fn test_build_reports_missing_port() {
        let engine = Arc::new(crate::engine::MockEngine::new());
        let mut config = PipelineConfig::default();
        config.links.push(LinkConfig::new("camera:out:7", "preview:in:0"));
        let err = config.build(engine).err().unwrap();
        assert!(matches!(err, VcError::PortAddress { .. }));
    }

    #[test]
    fn test_load_or_default_on_missing_file() {
        let config = PipelineConfig::load_or_default("/nonexistent/vcgraph.toml");
        assert_eq!(config, PipelineConfig::default());
    }
}
