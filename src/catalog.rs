//! Batch processing over many documents: files, directory trees or URLs.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use reqwest::Client;

use crate::config::ServiceWorkerOptions;
use crate::error::{OfflineError, Result};
use crate::file::cache_list_from_file;
use crate::remote::cache_list_from_url;
use crate::selection::PathInclusion;

/// How command-line inputs are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputMode {
  /// Each input is an HTML file.
  #[default]
  File,
  /// Each input is a directory searched recursively for `.html` files.
  Directory,
  /// Each input is a URL fetched over HTTP.
  Url,
}

impl FromStr for InputMode {
  type Err = OfflineError;

  fn from_str(value: &str) -> Result<Self> {
    match value {
      "file" | "files" => Ok(Self::File),
      "directory" => Ok(Self::Directory),
      "url" => Ok(Self::Url),
      other => Err(OfflineError::InvalidConfig(format!("invalid mode `{other}`"))),
    }
  }
}

/// Cache lists gathered per source.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
  lists: BTreeMap<String, Vec<String>>,
  failures: usize,
}

impl Catalog {
  /// Record the cache list of one source, replacing any earlier entry for it.
  pub fn insert(&mut self, source: impl Into<String>, cache_list: Vec<String>) {
    self.lists.insert(source.into(), cache_list);
  }

  /// Count a source that could not be processed.
  pub fn record_failure(&mut self) {
    self.failures += 1;
  }

  /// Sources that failed.
  pub fn failures(&self) -> usize {
    self.failures
  }

  /// Per-source cache lists, ordered by source.
  pub fn sources(&self) -> impl Iterator<Item = (&str, &[String])> {
    self
      .lists
      .iter()
      .map(|(source, list)| (source.as_str(), list.as_slice()))
  }

  /// Every URL across all sources, sorted and de-duplicated.
  pub fn union(&self) -> BTreeSet<&str> {
    self
      .lists
      .values()
      .flatten()
      .map(String::as_str)
      .collect()
  }
}

/// Every regular `.html` file under `root`, sorted, skipping dot-entries and anything the
/// selection rejects.
pub fn collect_html_files<S: PathInclusion>(root: &Path, selection: &S) -> Result<Vec<PathBuf>> {
  let mut found = Vec::new();
  walk_html_files(root, Path::new(""), selection, &mut found)?;
  found.sort();
  Ok(found)
}

fn walk_html_files<S: PathInclusion>(
  root: &Path,
  relative: &Path,
  selection: &S,
  found: &mut Vec<PathBuf>,
) -> Result<()> {
  let current_path = if relative.as_os_str().is_empty() {
    root.to_path_buf()
  } else {
    root.join(relative)
  };

  let entries = match fs::read_dir(&current_path) {
    Ok(entries) => entries,
    Err(err) if err.kind() == ErrorKind::NotFound && !relative.as_os_str().is_empty() => {
      return Ok(());
    }
    Err(err) => {
      return Err(OfflineError::io(
        format!("failed to read {}", current_path.display()),
        err,
      ));
    }
  };

  for entry in entries {
    let entry = entry
      .map_err(|err| OfflineError::io(format!("failed to read {}", current_path.display()), err))?;
    let file_name = entry.file_name();
    if file_name.to_string_lossy().starts_with('.') {
      continue;
    }

    let child_relative = relative.join(&file_name);
    let file_type = entry
      .file_type()
      .map_err(|err| OfflineError::io(format!("failed to stat {}", entry.path().display()), err))?;

    if file_type.is_dir() {
      walk_html_files(root, &child_relative, selection, found)?;
    } else if file_type.is_file() && file_name.to_string_lossy().ends_with(".html") {
      let relative_str = child_relative.to_string_lossy().replace('\\', "/");
      if selection.is_included(&relative_str) {
        found.push(entry.path());
      } else {
        log::debug!("skipping {relative_str}: not selected");
      }
    }
  }

  Ok(())
}

/// Expand the inputs into the list of documents to process.
///
/// A directory that cannot be walked is logged, counted on the catalog and skipped.
pub fn expand_inputs<S: PathInclusion>(
  inputs: &[String],
  mode: InputMode,
  selection: &S,
  catalog: &mut Catalog,
) -> Vec<String> {
  match mode {
    InputMode::File | InputMode::Url => inputs.to_vec(),
    InputMode::Directory => {
      let mut documents = Vec::new();
      for input in inputs {
        match collect_html_files(Path::new(input), selection) {
          Ok(files) => documents.extend(
            files
              .into_iter()
              .map(|path| path.to_string_lossy().into_owned()),
          ),
          Err(err) => {
            log::error!("{input}: {err}");
            catalog.record_failure();
          }
        }
      }
      documents
    }
  }
}

/// Build the catalog for `inputs`, continuing past sources that fail.
///
/// `client` is only used in [`InputMode::Url`] mode.
pub async fn build_catalog<S: PathInclusion>(
  inputs: &[String],
  mode: InputMode,
  selection: &S,
  opts: &ServiceWorkerOptions,
  client: &Client,
) -> Catalog {
  let mut catalog = Catalog::default();
  let documents = expand_inputs(inputs, mode, selection, &mut catalog);

  for document in documents {
    let listed = match mode {
      InputMode::Url => cache_list_from_url(client, &document, opts).await,
      InputMode::File | InputMode::Directory => cache_list_from_file(Path::new(&document), opts),
    };

    match listed {
      Ok(list) => {
        log::info!("{document}: {} cache entries", list.len());
        catalog.insert(document, list);
      }
      Err(err) => {
        log::error!("{document}: {err}");
        catalog.record_failure();
      }
    }
  }

  catalog
}
