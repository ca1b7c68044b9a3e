//! Service worker options and the optional JSON file they can be loaded from.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::{OfflineError, Result};

/// File name looked up by [`ServiceWorkerOptions::discover`].
pub const DEFAULT_CONFIG_FILE: &str = "offline.config.json";

/// Options controlling the generated bootstrap script and service worker.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServiceWorkerOptions {
  /// Name of the browser cache the service worker fills.
  pub cache_name: String,
  /// URL the bootstrap script registers, relative to the page or absolute.
  pub service_worker_url: String,
  /// Extra entries appended to the cache list ahead of the discovered assets.
  pub cache_urls: Vec<String>,
  /// How long the generated worker waits on the network before using the cache.
  pub network_timeout_ms: u64,
  /// Embed a generation timestamp in both generated scripts.
  pub timestamp: bool,
}

impl Default for ServiceWorkerOptions {
  fn default() -> Self {
    Self {
      cache_name: "network-or-cache".into(),
      service_worker_url: "sw.js".into(),
      cache_urls: Vec::new(),
      network_timeout_ms: 400,
      timestamp: true,
    }
  }
}

impl ServiceWorkerOptions {
  /// Attempt to load options from the provided directory.
  ///
  /// When the configuration file does not exist or fails to parse we fall back to the
  /// defaults so batch callers can keep going.
  pub fn discover(dir: &Path) -> Self {
    let candidate = dir.join(DEFAULT_CONFIG_FILE);
    match Self::load(&candidate) {
      Ok(options) => options,
      Err(err) => {
        if candidate.exists() {
          log::warn!("ignoring {}: {err}", candidate.display());
        }
        Self::default()
      }
    }
  }

  /// Read options from a specific JSON file.
  pub fn load(path: &Path) -> Result<Self> {
    let content = fs::read_to_string(path)
      .map_err(|err| OfflineError::io(format!("failed to read {}", path.display()), err))?;
    let options: Self = serde_json::from_str(&content).map_err(|err| {
      OfflineError::InvalidConfig(format!("failed to parse {}: {err}", path.display()))
    })?;
    options.validate()?;
    Ok(options)
  }

  /// Reject options that cannot produce a usable service worker.
  pub fn validate(&self) -> Result<()> {
    if self.cache_name.is_empty() {
      return Err(OfflineError::InvalidConfig("cache name is empty".into()));
    }
    if self.service_worker_url.is_empty() {
      return Err(OfflineError::InvalidConfig(
        "service worker URL is empty".into(),
      ));
    }
    Ok(())
  }
}
