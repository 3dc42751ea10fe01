use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

fn default_tlb_size() -> usize {
    32
}
fn default_page_size() -> u64 {
    4096
}
fn default_miss_latency() -> u64 {
    50
}
fn default_walkers() -> usize {
    1
}
fn default_max_pending() -> usize {
    16
}
fn default_latency() -> u64 {
    10
}
fn default_max_inflight() -> usize {
    8
}
fn default_count() -> u64 {
    1000
}
fn default_seed() -> u64 {
    0xcafebabedeadbeef
}
fn default_max_address() -> u64 {
    64 * 1024 * 1024
}
fn default_length() -> u64 {
    8
}
fn default_write_percentage() -> u32 {
    50
}
fn default_interval() -> u64 {
    1
}

#[derive(Serialize, Deserialize, Debug, Default)]
pub struct Config {
    #[serde(default)]
    pub tlb: TlbConfig,

    #[serde(default)]
    pub memory: LoadStoreConfig,

    #[serde(default)]
    pub generator: GeneratorConfig,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TlbConfig {
    /// Number of entries. Zero disables translation modelling, making every access a hit.
    #[serde(default = "default_tlb_size")]
    pub size: usize,

    /// Page size in bytes. Must be a power of two.
    #[serde(default = "default_page_size")]
    pub page_size: u64,

    /// Latency of a page walk, in ns.
    #[serde(default = "default_miss_latency")]
    pub miss_latency: u64,

    /// Maximum number of page walks in flight.
    #[serde(default = "default_walkers")]
    pub walkers: usize,

    /// Loads the TLB may hold before blocking its requester.
    #[serde(default = "default_max_pending")]
    pub max_loads: usize,

    /// Stores the TLB may hold before blocking its requester.
    #[serde(default = "default_max_pending")]
    pub max_stores: usize,
}

impl Default for TlbConfig {
    fn default() -> Self {
        TlbConfig {
            size: default_tlb_size(),
            page_size: default_page_size(),
            miss_latency: default_miss_latency(),
            walkers: default_walkers(),
            max_loads: default_max_pending(),
            max_stores: default_max_pending(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LoadStoreConfig {
    /// Time from accepting a request to its completion, in ns.
    #[serde(default = "default_latency")]
    pub latency: u64,

    /// Loads in flight before the unit refuses more.
    #[serde(default = "default_max_inflight")]
    pub max_loads: usize,

    /// Stores in flight before the unit refuses more.
    #[serde(default = "default_max_inflight")]
    pub max_stores: usize,
}

impl Default for LoadStoreConfig {
    fn default() -> Self {
        LoadStoreConfig {
            latency: default_latency(),
            max_loads: default_max_inflight(),
            max_stores: default_max_inflight(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct GeneratorConfig {
    /// Process identifier stamped on every request.
    #[serde(default)]
    pub pid: u32,

    /// Number of requests to issue.
    #[serde(default = "default_count")]
    pub count: u64,

    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Addresses are drawn from `0..max_address`.
    #[serde(default = "default_max_address")]
    pub max_address: u64,

    /// Request length in bytes. Addresses are aligned to it.
    #[serde(default = "default_length")]
    pub length: u64,

    /// Percentage of requests that are stores.
    #[serde(default = "default_write_percentage")]
    pub write_percentage: u32,

    /// Time between two issued requests, in ns.
    #[serde(default = "default_interval")]
    pub interval: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        GeneratorConfig {
            pid: 0,
            count: default_count(),
            seed: default_seed(),
            max_address: default_max_address(),
            length: default_length(),
            write_percentage: default_write_percentage(),
            interval: default_interval(),
        }
    }
}

fn invalid(msg: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(msg.into())
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        text.parse()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let tlb = &self.tlb;
        if !tlb.page_size.is_power_of_two() {
            return Err(invalid(format!("tlb.page_size {} is not a power of two", tlb.page_size)));
        }
        if tlb.size != 0 && tlb.walkers == 0 {
            return Err(invalid("tlb.walkers must be non-zero when the TLB is enabled"));
        }
        if tlb.max_loads == 0 || tlb.max_stores == 0 {
            return Err(invalid("tlb.max_loads and tlb.max_stores must be non-zero"));
        }
        if self.memory.max_loads == 0 || self.memory.max_stores == 0 {
            return Err(invalid("memory.max_loads and memory.max_stores must be non-zero"));
        }
        let generator = &self.generator;
        if generator.length == 0 {
            return Err(invalid("generator.length must be non-zero"));
        }
        if generator.max_address < generator.length {
            return Err(invalid("generator.max_address must be at least generator.length"));
        }
        if generator.write_percentage > 100 {
            return Err(invalid("generator.write_percentage must be at most 100"));
        }
        Ok(())
    }
}

impl std::str::FromStr for Config {
    type Err = ConfigError;

    fn from_str(text: &str) -> Result<Config, ConfigError> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }
}
