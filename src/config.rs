//! Runtime configuration.
//!
//! A `Config` value is threaded explicitly through every component; there is
//! no process-wide state. Values come from defaults, an optional TOML file,
//! and CLI overrides, in that order.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::host;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Repository locators, in priority order.
    pub repositories: Vec<String>,
    /// Host architecture used for candidate filtering.
    pub arch: String,
    /// Host binary type used for candidate filtering.
    #[serde(rename = "type")]
    pub dist_type: String,
    /// Deploy relative symlinks into `dists/` instead of copies.
    pub link: bool,
    /// Root for scratch directories and the fetch cache.
    pub temp_dir: PathBuf,
    /// Fetch cache lifetime in seconds; `None` disables the cache.
    pub cache_ttl: Option<u64>,
    /// Network timeout in seconds.
    pub timeout: u64,
    /// Optional HTTP(S) proxy URL.
    pub proxy: Option<String>,
    /// Verify TLS peers. Disable only for legacy repositories.
    pub verify_tls: bool,
    /// Keep all scratch state (unpack trees, build dirs) for inspection.
    pub debug: bool,
    /// Variables handed to the build driver through its cache file.
    pub variables: BTreeMap<String, String>,
    /// Dists assumed present on the host, as `name-version` strings.
    pub provides: Vec<String>,
    /// Build-configuration driver command line.
    pub cmake: String,
    /// Build tool command line.
    pub make: String,
    /// Debug variant of the build-configuration driver.
    pub debug_cmake: String,
    /// Debug variant of the build tool.
    pub debug_make: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            repositories: Vec::new(),
            arch: host::arch().to_string(),
            dist_type: host::dist_type().to_string(),
            link: true,
            temp_dir: std::env::temp_dir(),
            cache_ttl: Some(3 * 60 * 60),
            timeout: 60,
            proxy: None,
            verify_tls: true,
            debug: false,
            variables: BTreeMap::new(),
            provides: Vec::new(),
            cmake: "cmake".to_string(),
            make: "make install".to_string(),
            debug_cmake: "cmake -DCMAKE_BUILD_TYPE=Debug".to_string(),
            debug_make: "make install VERBOSE=1".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))
    }

    /// Directory holding the URL-keyed fetch cache.
    pub fn cache_dir(&self) -> PathBuf {
        self.temp_dir.join("luadist_cache")
    }

    /// Build driver and build tool command lines for the active mode.
    pub fn build_commands(&self) -> (&str, &str) {
        if self.debug {
            (&self.debug_cmake, &self.debug_make)
        } else {
            (&self.cmake, &self.make)
        }
    }
}
