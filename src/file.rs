//! Rewrite HTML files in place, with the service worker written alongside them.

use std::fs::{self, File, Permissions};
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};

use same_file::is_same_file;
use tempfile::NamedTempFile;

use crate::config::ServiceWorkerOptions;
use crate::error::{OfflineError, Result};
use crate::rewrite::{self, Transformed};

/// Where a file rewrite landed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewrittenFile {
  /// Absolute path of the rewritten HTML document.
  pub html_path: PathBuf,
  /// Absolute path of the generated service worker.
  pub service_worker_path: PathBuf,
  /// Normalized cache list written into the service worker.
  pub cache_list: Vec<String>,
}

/// Path of the service worker generated for `html_path`: a sibling of the document at
/// the configured service worker URL.
pub fn service_worker_path(html_path: &Path, opts: &ServiceWorkerOptions) -> Result<PathBuf> {
  let url = &opts.service_worker_url;
  if url.contains("://") {
    return Err(OfflineError::InvalidConfig(format!(
      "service worker URL {url} cannot be written next to {}",
      html_path.display()
    )));
  }

  let root = html_path.parent().unwrap_or_else(|| Path::new("/"));
  Ok(root.join(url.trim_start_matches('/')))
}

/// Rewrite the HTML file at `path` and write its service worker next to it.
///
/// Both outputs are staged as temporary files in their destination directories and only
/// moved into place once everything has rendered; on failure the staged files are
/// deleted and the originals stay untouched. The worker is replaced before the page; the
/// two renames are not one atomic step.
pub fn add_service_worker_to_file(path: &Path, opts: &ServiceWorkerOptions) -> Result<RewrittenFile> {
  let html_path = fs::canonicalize(path)
    .map_err(|err| OfflineError::io(format!("failed to resolve {}", path.display()), err))?;
  let sw_path = service_worker_path(&html_path, opts)?;

  if sw_path.exists()
    && is_same_file(&html_path, &sw_path)
      .map_err(|err| OfflineError::io(format!("failed to compare {}", sw_path.display()), err))?
  {
    return Err(OfflineError::InvalidConfig(format!(
      "service worker path {} is the HTML document itself",
      sw_path.display()
    )));
  }

  let source = File::open(&html_path)
    .map_err(|err| OfflineError::io(format!("failed to open {}", html_path.display()), err))?;
  let html_permissions = source
    .metadata()
    .map_err(|err| OfflineError::io(format!("failed to stat {}", html_path.display()), err))?
    .permissions();

  let Transformed {
    html,
    service_worker,
    cache_list,
  } = rewrite::transform(BufReader::new(source), opts)?;

  let sw_permissions = service_worker_permissions(&html_permissions);
  let staged_html = stage(&html_path, &html, html_permissions)?;
  let staged_sw = stage(&sw_path, service_worker.as_bytes(), sw_permissions)?;

  commit(staged_sw, &sw_path)?;
  commit(staged_html, &html_path)?;

  log::info!(
    "rewrote {} ({} cache entries, service worker at {})",
    html_path.display(),
    cache_list.len(),
    sw_path.display()
  );

  Ok(RewrittenFile {
    html_path,
    service_worker_path: sw_path,
    cache_list,
  })
}

/// Normalized cache list for the HTML file at `path`; nothing is written.
pub fn cache_list_from_file(path: &Path, opts: &ServiceWorkerOptions) -> Result<Vec<String>> {
  let source = File::open(path)
    .map_err(|err| OfflineError::io(format!("failed to open {}", path.display()), err))?;
  rewrite::cache_list(BufReader::new(source), opts)
}

fn stage(target: &Path, contents: &[u8], permissions: Permissions) -> Result<NamedTempFile> {
  let dir = target.parent().unwrap_or_else(|| Path::new("."));
  let context = || format!("failed to stage {}", target.display());

  let mut staged =
    NamedTempFile::new_in(dir).map_err(|err| OfflineError::io(context(), err))?;
  staged
    .write_all(contents)
    .and_then(|()| staged.flush())
    .map_err(|err| OfflineError::io(context(), err))?;
  fs::set_permissions(staged.path(), permissions).map_err(|err| OfflineError::io(context(), err))?;
  Ok(staged)
}

fn commit(staged: NamedTempFile, target: &Path) -> Result<()> {
  staged
    .persist(target)
    .map(|_| ())
    .map_err(|err| OfflineError::io(format!("failed to replace {}", target.display()), err.error))
}

#[cfg(unix)]
fn service_worker_permissions(_html: &Permissions) -> Permissions {
  use std::os::unix::fs::PermissionsExt;
  Permissions::from_mode(0o644)
}

#[cfg(not(unix))]
fn service_worker_permissions(html: &Permissions) -> Permissions {
  let mut permissions = html.clone();
  permissions.set_readonly(false);
  permissions
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::tempdir;

  const PAGE: &str = r#"<html><head><title>t</title></head><body><img src="logo.png"></body></html>"#;

  fn options() -> ServiceWorkerOptions {
    ServiceWorkerOptions {
      cache_name: "v1".into(),
      timestamp: false,
      ..ServiceWorkerOptions::default()
    }
  }

  #[test]
  fn rewrites_document_and_writes_sibling_worker() {
    let dir = tempdir().unwrap();
    let index = dir.path().join("index.html");
    fs::write(&index, PAGE).unwrap();

    let result = add_service_worker_to_file(&index, &options()).unwrap();

    assert_eq!(result.service_worker_path, fs::canonicalize(dir.path()).unwrap().join("sw.js"));
    assert_eq!(result.cache_list, vec!["./", "./index.html", "./logo.png"]);

    let html = fs::read_to_string(&index).unwrap();
    assert!(html.contains(r#"x-service-worker="true""#));
    let sw = fs::read_to_string(dir.path().join("sw.js")).unwrap();
    assert!(sw.contains("var CACHE = \"v1\";"));
    assert!(sw.contains("\"./logo.png\","));
  }

  #[test]
  fn rewriting_twice_is_stable() {
    let dir = tempdir().unwrap();
    let index = dir.path().join("index.html");
    fs::write(&index, PAGE).unwrap();

    add_service_worker_to_file(&index, &options()).unwrap();
    let first = fs::read_to_string(&index).unwrap();
    add_service_worker_to_file(&index, &options()).unwrap();
    let second = fs::read_to_string(&index).unwrap();

    assert_eq!(first, second);
    assert_eq!(second.matches("x-service-worker").count(), 1);
  }

  #[test]
  fn absolute_worker_url_stays_beside_the_document() {
    let opts = ServiceWorkerOptions {
      service_worker_url: "/sw.js".into(),
      ..options()
    };
    let path = service_worker_path(Path::new("/srv/site/index.html"), &opts).unwrap();
    assert_eq!(path, PathBuf::from("/srv/site/sw.js"));
  }

  #[test]
  fn remote_worker_url_is_rejected() {
    let opts = ServiceWorkerOptions {
      service_worker_url: "https://cdn.example.com/sw.js".into(),
      ..options()
    };
    let err = service_worker_path(Path::new("/srv/site/index.html"), &opts).unwrap_err();
    assert!(matches!(err, OfflineError::InvalidConfig(_)));
  }

  #[test]
  fn failed_staging_leaves_originals_untouched() {
    let dir = tempdir().unwrap();
    let index = dir.path().join("index.html");
    fs::write(&index, PAGE).unwrap();
    let opts = ServiceWorkerOptions {
      service_worker_url: "missing/sw.js".into(),
      ..options()
    };

    let err = add_service_worker_to_file(&index, &opts).unwrap_err();

    assert!(matches!(err, OfflineError::Io { .. }));
    assert_eq!(fs::read_to_string(&index).unwrap(), PAGE);
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
  }

  #[test]
  fn failed_worker_replacement_keeps_the_old_document() {
    let dir = tempdir().unwrap();
    let index = dir.path().join("index.html");
    fs::write(&index, PAGE).unwrap();
    fs::create_dir(dir.path().join("sw.js")).unwrap();

    let err = add_service_worker_to_file(&index, &options()).unwrap_err();

    assert!(matches!(err, OfflineError::Io { .. }));
    assert_eq!(fs::read_to_string(&index).unwrap(), PAGE);
    assert!(dir.path().join("sw.js").is_dir());
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 2);
  }

  #[test]
  fn worker_path_colliding_with_document_is_rejected() {
    let dir = tempdir().unwrap();
    let index = dir.path().join("index.html");
    fs::write(&index, PAGE).unwrap();
    let opts = ServiceWorkerOptions {
      service_worker_url: "index.html".into(),
      ..options()
    };

    let err = add_service_worker_to_file(&index, &opts).unwrap_err();

    assert!(matches!(err, OfflineError::InvalidConfig(_)));
    assert_eq!(fs::read_to_string(&index).unwrap(), PAGE);
  }

  #[test]
  fn missing_document_is_an_io_error() {
    let dir = tempdir().unwrap();
    let err = add_service_worker_to_file(&dir.path().join("nope.html"), &options()).unwrap_err();
    assert!(matches!(err, OfflineError::Io { .. }));
  }

  #[test]
  fn cache_list_from_file_does_not_modify_the_document() {
    let dir = tempdir().unwrap();
    let index = dir.path().join("index.html");
    fs::write(&index, PAGE).unwrap();

    let list = cache_list_from_file(&index, &options()).unwrap();

    assert_eq!(list, vec!["./", "./index.html", "./logo.png"]);
    assert_eq!(fs::read_to_string(&index).unwrap(), PAGE);
    assert!(!dir.path().join("sw.js").exists());
  }
}
