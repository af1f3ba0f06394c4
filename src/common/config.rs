//! Configuration file handling

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::paths::config_path;
use super::Result;

/// Main configuration structure
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Kernel corpus location
    #[serde(default)]
    pub corpus: CorpusConfig,

    /// Hypervisor lookup and launch parameters
    #[serde(default)]
    pub hypervisor: HypervisorConfig,

    /// Introspection tool settings
    #[serde(default)]
    pub tool: ToolConfig,

    /// Console watch settings
    #[serde(default)]
    pub watch: WatchConfig,

    /// Timeout settings
    #[serde(default)]
    pub timeouts: Timeouts,
}

/// Corpus settings
#[derive(Debug, Deserialize, Clone)]
pub struct CorpusConfig {
    /// Directory holding one subdirectory per kernel build
    #[serde(default = "default_corpus_root")]
    pub root: PathBuf,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            root: default_corpus_root(),
        }
    }
}

fn default_corpus_root() -> PathBuf {
    PathBuf::from("kvm-dmesg-ci/kernels")
}

/// Hypervisor settings
#[derive(Debug, Deserialize, Clone)]
pub struct HypervisorConfig {
    /// Explicit executable, skips the search when set
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Well-known locations checked in order
    #[serde(default = "default_search_paths")]
    pub search_paths: Vec<PathBuf>,

    /// Binary names looked up on PATH after the well-known locations
    #[serde(default = "default_fallback_names")]
    pub fallback_names: Vec<String>,

    /// Acceleration is requested only when this device exists
    #[serde(default = "default_accel_device")]
    pub accel_device: PathBuf,

    /// Guest memory size
    #[serde(default = "default_memory")]
    pub memory: String,

    /// Guest CPU count
    #[serde(default = "default_smp")]
    pub smp: u32,

    /// Kernel command line
    #[serde(default = "default_append")]
    pub append: String,

    /// Additional arguments appended after the fixed ones
    #[serde(default)]
    pub extra_args: Vec<String>,
}

impl Default for HypervisorConfig {
    fn default() -> Self {
        Self {
            path: None,
            search_paths: default_search_paths(),
            fallback_names: default_fallback_names(),
            accel_device: default_accel_device(),
            memory: default_memory(),
            smp: default_smp(),
            append: default_append(),
            extra_args: Vec::new(),
        }
    }
}

fn default_search_paths() -> Vec<PathBuf> {
    [
        "/bin/qemu-system-x86_64",
        "/usr/bin/qemu-system-x86_64",
        "/usr/local/bin/qemu-system-x86_64",
        "/usr/libexec/qemu-kvm",
    ]
    .into_iter()
    .map(PathBuf::from)
    .collect()
}

fn default_fallback_names() -> Vec<String> {
    vec!["qemu-system-x86_64".to_string(), "qemu-kvm".to_string()]
}

fn default_accel_device() -> PathBuf {
    PathBuf::from("/dev/kvm")
}

fn default_memory() -> String {
    "1G".to_string()
}

fn default_smp() -> u32 {
    1
}

fn default_append() -> String {
    "console=ttyS0".to_string()
}

/// Introspection tool settings
#[derive(Debug, Deserialize, Clone)]
pub struct ToolConfig {
    /// Path to the kvm-dmesg executable
    #[serde(default = "default_tool_path")]
    pub path: PathBuf,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            path: default_tool_path(),
        }
    }
}

fn default_tool_path() -> PathBuf {
    PathBuf::from("../kvm-dmesg")
}

/// What counts as a successful boot in captured output
#[derive(Debug, Deserialize, Clone)]
pub struct WatchConfig {
    /// Substring that marks success
    #[serde(default = "default_marker")]
    pub marker: String,

    /// Lines read before giving up
    #[serde(default = "default_max_lines")]
    pub max_lines: usize,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            marker: default_marker(),
            max_lines: default_max_lines(),
        }
    }
}

fn default_marker() -> String {
    " Linux version ".to_string()
}

fn default_max_lines() -> usize {
    30
}

/// Timeout settings in seconds
#[derive(Debug, Deserialize, Clone)]
pub struct Timeouts {
    /// Wall-clock budget for the boot marker
    #[serde(default = "default_boot")]
    pub boot_secs: u64,

    /// Wall-clock budget for the introspection marker
    #[serde(default = "default_inspect")]
    pub inspect_secs: u64,

    /// Pause between boot and introspection so the log buffer fills
    #[serde(default = "default_grace")]
    pub grace_secs: u64,

    /// How long the monitor connection stays open after `quit`
    #[serde(default = "default_shutdown_linger")]
    pub shutdown_linger_secs: u64,

    /// How long to wait for the hypervisor to exit after shutdown
    #[serde(default = "default_exit_wait")]
    pub exit_wait_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            boot_secs: default_boot(),
            inspect_secs: default_inspect(),
            grace_secs: default_grace(),
            shutdown_linger_secs: default_shutdown_linger(),
            exit_wait_secs: default_exit_wait(),
        }
    }
}

fn default_boot() -> u64 {
    30
}
fn default_inspect() -> u64 {
    30
}
fn default_grace() -> u64 {
    10
}
fn default_shutdown_linger() -> u64 {
    1
}
fn default_exit_wait() -> u64 {
    5
}

impl Timeouts {
    pub fn boot(&self) -> Duration {
        Duration::from_secs(self.boot_secs)
    }

    pub fn inspect(&self) -> Duration {
        Duration::from_secs(self.inspect_secs)
    }

    pub fn grace(&self) -> Duration {
        Duration::from_secs(self.grace_secs)
    }

    pub fn shutdown_linger(&self) -> Duration {
        Duration::from_secs(self.shutdown_linger_secs)
    }

    pub fn exit_wait(&self) -> Duration {
        Duration::from_secs(self.exit_wait_secs)
    }
}

impl Config {
    /// Load configuration from `path`, or from the default config file
    ///
    /// Returns default configuration if no file exists. An explicit path that
    /// does not exist is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::from_file(path);
        }
        if let Some(path) = config_path() {
            if path.exists() {
                return Self::from_file(&path);
            }
        }
        Ok(Self::default())
    }

    /// Parse a configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| super::Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        let config: Self =
            toml::from_str(&content).map_err(|e| super::Error::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make every watch fail
    pub fn validate(&self) -> Result<()> {
        if self.watch.marker.is_empty() {
            return Err(super::Error::Config("watch.marker must not be empty".into()));
        }
        if self.watch.max_lines == 0 {
            return Err(super::Error::Config(
                "watch.max_lines must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
