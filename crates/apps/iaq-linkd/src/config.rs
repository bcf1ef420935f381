use iaq_link::{DeliveryConfig, HandlerConfig, MeshLocalPrefix, SensorKind, SensorStatus};
use serde::Deserialize;
use std::fs;
use std::path::Path;

pub const DEFAULT_MESH_PREFIX: &str = "fdde:ad00:beef:0000";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid mesh prefix {0:?}")]
    MeshPrefix(String),

    #[error("node.message_pool must be at least 1")]
    EmptyMessagePool,

    #[error("node.sample_interval_secs must be at least 1")]
    ZeroInterval,

    #[error("sensor {0} listed more than once")]
    DuplicateSensor(SensorKind),

    #[error("sensor {0}: fail_every must be at least 1")]
    ZeroFailEvery(SensorKind),

    #[error(transparent)]
    Delivery(#[from] iaq_link::ConfigError),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LinkdConfig {
    #[serde(default)]
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub handler: HandlerConfig,
    #[serde(default)]
    pub node: NodeConfig,
    #[serde(default = "default_sensors")]
    pub sensors: Vec<SensorConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub sample_interval_secs: u64,
    pub mesh_prefix: String,
    pub message_pool: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SensorConfig {
    pub kind: SensorKind,
    #[serde(default = "ready")]
    pub status: SensorStatus,
    /// Every n-th sample fails with a driver error.
    pub fail_every: Option<u32>,
}

fn ready() -> SensorStatus {
    SensorStatus::Ready
}

fn default_sensors() -> Vec<SensorConfig> {
    SensorKind::ALL
        .into_iter()
        .map(|kind| SensorConfig { kind, status: SensorStatus::Ready, fail_every: None })
        .collect()
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            sample_interval_secs: 30,
            mesh_prefix: DEFAULT_MESH_PREFIX.to_string(),
            message_pool: 8,
        }
    }
}

impl Default for LinkdConfig {
    fn default() -> Self {
        Self {
            delivery: DeliveryConfig::default(),
            handler: HandlerConfig::default(),
            node: NodeConfig::default(),
            sensors: default_sensors(),
        }
    }
}

impl NodeConfig {
    pub fn mesh_prefix(&self) -> Result<MeshLocalPrefix, ConfigError> {
        MeshLocalPrefix::parse(&self.mesh_prefix)
            .ok_or_else(|| ConfigError::MeshPrefix(self.mesh_prefix.clone()))
    }
}

impl LinkdConfig {
    pub fn from_toml(input: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.delivery.validate()?;
        self.node.mesh_prefix()?;
        if self.node.message_pool == 0 {
            return Err(ConfigError::EmptyMessagePool);
        }
        if self.node.sample_interval_secs == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        for (index, sensor) in self.sensors.iter().enumerate() {
            if self.sensors[..index].iter().any(|earlier| earlier.kind == sensor.kind) {
                return Err(ConfigError::DuplicateSensor(sensor.kind));
            }
            if sensor.fail_every == Some(0) {
                return Err(ConfigError::ZeroFailEvery(sensor.kind));
            }
        }
        Ok(())
    }
}
