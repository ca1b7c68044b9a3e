//! Include/exclude rules for which documents a directory walk picks up.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Trait describing which documents a batch run should process.
pub trait PathInclusion {
  /// Returns `true` when the document at `relative_path` (forward slashes, relative to the
  /// walk root) should be processed.
  fn is_included(&self, relative_path: &str) -> bool;
}

/// Accepts every path.
#[derive(Debug, Clone, Copy, Default)]
pub struct IncludeAll;

impl PathInclusion for IncludeAll {
  fn is_included(&self, _relative_path: &str) -> bool {
    true
  }
}

/// File layout for a selection file.
#[derive(Debug, Default, Deserialize)]
struct PathSelectionFile {
  #[serde(default)]
  include: Vec<String>,
  #[serde(default)]
  exclude: Vec<String>,
}

/// Selection loaded from a JSON file of path scopes.
///
/// A scope matches itself and everything below it, so `"drafts"` covers
/// `drafts/index.html`. Exclusions win over inclusions; with no inclusions everything not
/// excluded is selected.
#[derive(Debug, Clone, Default)]
pub struct PathSelection {
  include: Option<BTreeSet<String>>,
  exclude: BTreeSet<String>,
}

/// Errors that can occur while loading a selection file.
#[derive(Debug)]
pub enum PathSelectionError {
  /// Failed to read the selection file from disk.
  Io {
    /// Path that caused the error.
    path: PathBuf,
    /// Source I/O error.
    source: std::io::Error,
  },
  /// Failed to parse the JSON selection file.
  Parse {
    /// Path that caused the error.
    path: PathBuf,
    /// Source parse error.
    source: serde_json::Error,
  },
}

impl PathSelection {
  /// Load the selection file; a missing file selects everything.
  pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, PathSelectionError> {
    let path = path.as_ref();
    let contents = match fs::read_to_string(path) {
      Ok(contents) => contents,
      Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
        return Ok(Self::default());
      }
      Err(err) => {
        return Err(PathSelectionError::Io {
          path: path.to_path_buf(),
          source: err,
        });
      }
    };

    let file: PathSelectionFile =
      serde_json::from_str(&contents).map_err(|err| PathSelectionError::Parse {
        path: path.to_path_buf(),
        source: err,
      })?;
    Ok(Self::from(file))
  }

  /// Determine whether a document should be processed.
  pub fn is_included(&self, relative_path: &str) -> bool {
    let candidate = relative_path.trim_matches('/');
    if self
      .exclude
      .iter()
      .any(|value| scope_matches(value, candidate))
    {
      return false;
    }

    match &self.include {
      Some(include) => include.iter().any(|value| scope_matches(value, candidate)),
      None => true,
    }
  }
}

impl PathInclusion for PathSelection {
  fn is_included(&self, relative_path: &str) -> bool {
    PathSelection::is_included(self, relative_path)
  }
}

impl From<PathSelectionFile> for PathSelection {
  fn from(file: PathSelectionFile) -> Self {
    let include = normalise_list(file.include);
    let exclude = normalise_list(file.exclude);

    Self {
      include: (!include.is_empty()).then_some(include),
      exclude,
    }
  }
}

impl std::fmt::Display for PathSelectionError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Self::Io { path, source } => {
        write!(f, "failed to read {}: {}", path.display(), source)
      }
      Self::Parse { path, source } => {
        write!(f, "failed to parse {}: {}", path.display(), source)
      }
    }
  }
}

impl std::error::Error for PathSelectionError {
  fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
    match self {
      Self::Io { source, .. } => Some(source),
      Self::Parse { source, .. } => Some(source),
    }
  }
}

/// Trim whitespace and surrounding slashes, drop empties and duplicates.
fn normalise_list(values: impl IntoIterator<Item = String>) -> BTreeSet<String> {
  values
    .into_iter()
    .map(|value| value.trim().trim_matches('/').to_string())
    .filter(|value| !value.is_empty())
    .collect()
}

fn scope_matches(rule: &str, candidate: &str) -> bool {
  if candidate == rule {
    return true;
  }

  candidate
    .strip_prefix(rule)
    .is_some_and(|suffix| suffix.starts_with('/'))
}
