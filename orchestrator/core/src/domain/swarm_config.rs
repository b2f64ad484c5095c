// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Swarm Configuration Types
//
// Defines the configuration manifest for a widthswarm run:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - Swarm size, placement and seeding
// - Shared-object namespace
// - Timing of the reduction window
// - Logging verbosity

use crate::domain::consensus::DEFAULT_NEIGHBOR_RADIUS;
use crate::domain::geometry::Position;
use crate::domain::record::DEFAULT_EXIT_POSITION;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const API_VERSION: &str = "widthswarm/v1";
pub const KIND: &str = "SwarmConfig";

/// Swarm size when nothing else is configured.
pub const DEFAULT_SWARM_SIZE: u32 = 50;
/// Well-known string every shared object name is derived from.
pub const DEFAULT_NAMESPACE: &str = "widthswarm";
/// Wall-clock window agents wait out before reducing.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write config file {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level Kubernetes-style swarm configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwarmConfigManifest {
    /// API version (must be "widthswarm/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "SwarmConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    #[serde(default)]
    pub spec: SwarmSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    /// Human-readable run name
    pub name: String,
}

/// Swarm configuration specification (content under spec:)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwarmSpec {
    /// Number of agents to launch
    #[serde(default = "default_agents")]
    pub agents: u32,

    /// Prefix of every shared-memory and semaphore name
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Run-wide seed; when set, the exit width, placements and every agent's
    /// noise draw are reproducible
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,

    /// Time agents wait, measured from their own start, before reducing
    #[serde(default = "default_window", with = "humantime_serde")]
    pub window: Duration,

    /// Neighbourhood radius for the consensus step (inclusive)
    #[serde(default = "default_radius")]
    pub neighbor_radius: i32,

    #[serde(default)]
    pub exit: ExitSpec,

    /// Fixed agent positions, one per agent; random when empty
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub placements: Vec<Position>,

    /// Agent verbosity (0 = silent ... 3 = per-peer tracing)
    #[serde(default)]
    pub verbosity: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExitSpec {
    #[serde(default = "default_exit_position")]
    pub position: Position,
}

impl Default for ExitSpec {
    fn default() -> Self {
        Self {
            position: DEFAULT_EXIT_POSITION,
        }
    }
}

impl Default for SwarmSpec {
    fn default() -> Self {
        Self {
            agents: DEFAULT_SWARM_SIZE,
            namespace: default_namespace(),
            seed: None,
            window: DEFAULT_WINDOW,
            neighbor_radius: DEFAULT_NEIGHBOR_RADIUS,
            exit: ExitSpec::default(),
            placements: Vec::new(),
            verbosity: 0,
        }
    }
}

impl Default for SwarmConfigManifest {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: "exit-room".to_string(),
            },
            spec: SwarmSpec::default(),
        }
    }
}

impl SwarmConfigManifest {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&content)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Discover configuration file using precedence order
    /// 1. WIDTHSWARM_CONFIG_PATH environment variable
    /// 2. ./widthswarm.yaml (working directory)
    /// 3. ~/.widthswarm/config.yaml (user home)
    /// 4. /etc/widthswarm/config.yaml
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("WIDTHSWARM_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./widthswarm.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".widthswarm").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        let system_config = PathBuf::from("/etc/widthswarm/config.yaml");
        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        // An explicit path must exist and parse.
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path)?;
            config.apply_env_overrides();
            return Ok(config);
        }

        let mut config = match Self::discover_config() {
            Some(path) => {
                tracing::info!("Loading configuration from discovered path: {:?}", path);
                Self::from_yaml_file(path)?
            }
            None => {
                tracing::debug!("No configuration file found, using defaults");
                Self::default()
            }
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("WIDTHSWARM_AGENTS") {
            match val.parse() {
                Ok(agents) => {
                    tracing::info!("Environment override: WIDTHSWARM_AGENTS={}", agents);
                    self.spec.agents = agents;
                }
                Err(_) => tracing::warn!(
                    "Invalid value for WIDTHSWARM_AGENTS: '{}'. Expected a count. Ignoring.",
                    val
                ),
            }
        }

        if let Ok(val) = std::env::var("WIDTHSWARM_SEED") {
            match val.parse() {
                Ok(seed) => {
                    tracing::info!("Environment override: WIDTHSWARM_SEED={}", seed);
                    self.spec.seed = Some(seed);
                }
                Err(_) => tracing::warn!(
                    "Invalid value for WIDTHSWARM_SEED: '{}'. Expected an integer. Ignoring.",
                    val
                ),
            }
        }

        if let Ok(val) = std::env::var("WIDTHSWARM_WINDOW") {
            match humantime::parse_duration(&val) {
                Ok(window) => {
                    tracing::info!("Environment override: WIDTHSWARM_WINDOW={}", val);
                    self.spec.window = window;
                }
                Err(_) => tracing::warn!(
                    "Invalid value for WIDTHSWARM_WINDOW: '{}'. Expected a duration like '10s'. Ignoring.",
                    val
                ),
            }
        }

        if let Ok(val) = std::env::var("WIDTHSWARM_NAMESPACE") {
            tracing::info!("Environment override: WIDTHSWARM_NAMESPACE={}", val);
            self.spec.namespace = val;
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_version != API_VERSION {
            return Err(ConfigError::Invalid(format!(
                "apiVersion '{}' must be '{}'",
                self.api_version, API_VERSION
            )));
        }

        if self.kind != KIND {
            return Err(ConfigError::Invalid(format!(
                "kind '{}' must be '{}'",
                self.kind, KIND
            )));
        }

        let spec = &self.spec;
        if spec.agents == 0 {
            return Err(ConfigError::Invalid("spec.agents must be at least 1".into()));
        }

        if spec.namespace.is_empty()
            || !spec
                .namespace
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(ConfigError::Invalid(format!(
                "spec.namespace '{}' must be non-empty and contain only [A-Za-z0-9_-]",
                spec.namespace
            )));
        }

        if spec.neighbor_radius < 0 {
            return Err(ConfigError::Invalid(
                "spec.neighbor_radius cannot be negative".into(),
            ));
        }

        if !spec.exit.position.is_on_grid() {
            return Err(ConfigError::Invalid(format!(
                "spec.exit.position {} is outside the grid",
                spec.exit.position
            )));
        }

        if !spec.placements.is_empty() {
            if spec.placements.len() != spec.agents as usize {
                return Err(ConfigError::Invalid(format!(
                    "spec.placements has {} entries but spec.agents is {}",
                    spec.placements.len(),
                    spec.agents
                )));
            }
            if let Some(bad) = spec.placements.iter().find(|p| !p.is_on_grid()) {
                return Err(ConfigError::Invalid(format!(
                    "placement {} is outside the grid",
                    bad
                )));
            }
        }

        if spec.verbosity > 3 {
            return Err(ConfigError::Invalid(format!(
                "spec.verbosity {} must be between 0 and 3",
                spec.verbosity
            )));
        }

        Ok(())
    }
}

fn default_agents() -> u32 {
    DEFAULT_SWARM_SIZE
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

fn default_window() -> Duration {
    DEFAULT_WINDOW
}

fn default_radius() -> i32 {
    DEFAULT_NEIGHBOR_RADIUS
}

fn default_exit_position() -> Position {
    DEFAULT_EXIT_POSITION
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_manifest() {
        let manifest = SwarmConfigManifest::default();
        assert_eq!(manifest.api_version, "widthswarm/v1");
        assert_eq!(manifest.kind, "SwarmConfig");
        assert_eq!(manifest.spec.agents, 50);
        assert_eq!(manifest.spec.window, Duration::from_secs(10));
        assert_eq!(manifest.spec.exit.position, Position::new(99, 50));
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_minimal_yaml_fills_defaults() {
        let yaml = r#"
apiVersion: widthswarm/v1
kind: SwarmConfig
metadata:
  name: lab
spec:
  agents: 4
  window: 250ms
  seed: 1234
  placements:
    - { x: 10, y: 10 }
    - { x: 12, y: 13 }
    - { x: 80, y: 80 }
    - { x: 83, y: 84 }
"#;
        let manifest = SwarmConfigManifest::from_yaml_str(yaml).unwrap();

        assert_eq!(manifest.metadata.name, "lab");
        assert_eq!(manifest.spec.agents, 4);
        assert_eq!(manifest.spec.window, Duration::from_millis(250));
        assert_eq!(manifest.spec.seed, Some(1234));
        assert_eq!(manifest.spec.namespace, "widthswarm");
        assert_eq!(manifest.spec.neighbor_radius, 5);
        assert_eq!(manifest.spec.placements[3], Position::new(83, 84));
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_yaml_file_roundtrip() {
        let mut manifest = SwarmConfigManifest::default();
        manifest.spec.agents = 7;
        manifest.spec.seed = Some(99);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("widthswarm.yaml");
        manifest.to_yaml_file(&path).unwrap();

        let parsed = SwarmConfigManifest::from_yaml_file(&path).unwrap();
        assert_eq!(parsed.spec.agents, 7);
        assert_eq!(parsed.spec.seed, Some(99));
        assert_eq!(parsed.spec.window, DEFAULT_WINDOW);
    }

    #[test]
    fn test_explicit_path_must_parse() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "apiVersion: [not, a, string").unwrap();

        let result = SwarmConfigManifest::load_or_default(Some(file.path().to_path_buf()));
        assert!(matches!(result, Err(ConfigError::Parse(_))));

        let missing = SwarmConfigManifest::load_or_default(Some(PathBuf::from(
            "/definitely/not/here.yaml",
        )));
        assert!(matches!(missing, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_validation() {
        let mut manifest = SwarmConfigManifest::default();
        assert!(manifest.validate().is_ok());

        manifest.api_version = "wrong/v1".to_string();
        assert!(manifest.validate().is_err());
        manifest.api_version = API_VERSION.to_string();

        manifest.spec.agents = 0;
        assert!(manifest.validate().is_err());
        manifest.spec.agents = 2;

        manifest.spec.namespace = "bad/name".to_string();
        assert!(manifest.validate().is_err());
        manifest.spec.namespace = "ok-name_1".to_string();
        assert!(manifest.validate().is_ok());

        manifest.spec.placements = vec![Position::new(1, 1)];
        assert!(manifest.validate().is_err());
        manifest.spec.placements.push(Position::new(100, 1));
        assert!(manifest.validate().is_err());
        manifest.spec.placements[1] = Position::new(99, 99);
        assert!(manifest.validate().is_ok());

        manifest.spec.verbosity = 4;
        assert!(manifest.validate().is_err());
    }
}
