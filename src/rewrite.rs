//! Core transformation: inject the bootstrap script and render the service worker.

use std::io::{Read, Write};

use crate::cache_list::CacheList;
use crate::collector::ResourceCollector;
use crate::config::ServiceWorkerOptions;
use crate::dom;
use crate::error::{OfflineError, Result};
use crate::templates::{self, BootstrapVars, ServiceWorkerVars};

/// Everything one transformation produces, held in memory until the caller commits it.
#[derive(Debug, Clone)]
pub struct Transformed {
  /// The rewritten HTML document.
  pub html: Vec<u8>,
  /// The generated service worker script.
  pub service_worker: String,
  /// Normalized cache list baked into the service worker.
  pub cache_list: Vec<String>,
}

/// Parse `input`, swap in a fresh bootstrap script and render both outputs.
///
/// Nothing is written anywhere; a failure at any step leaves no trace.
pub fn transform<R: Read>(mut input: R, opts: &ServiceWorkerOptions) -> Result<Transformed> {
  let bootstrap = templates::render_bootstrap(&BootstrapVars {
    service_worker_url: &opts.service_worker_url,
    generated_at: templates::generated_at(opts.timestamp),
  })?;

  let mut document = dom::parse_html(&mut input)?;
  let seeded = CacheList::seeded(opts.cache_urls.iter().cloned());
  let cache_list = ResourceCollector::new(&bootstrap, seeded)
    .collect(&mut document)
    .into_normalized();

  let service_worker = templates::render_service_worker(&ServiceWorkerVars {
    cache_name: &opts.cache_name,
    to_cache: &cache_list,
    network_timeout_ms: opts.network_timeout_ms,
    generated_at: templates::generated_at(opts.timestamp),
  })?;

  let mut html = Vec::new();
  dom::serialize_html(&document, &mut html)?;

  log::debug!(
    "rendered service worker `{}` with {} cache entries",
    opts.cache_name,
    cache_list.len()
  );

  Ok(Transformed {
    html,
    service_worker,
    cache_list,
  })
}

/// Transform `input` and write the rewritten HTML and service worker to their sinks.
///
/// Both outputs are rendered completely before either sink is touched, so a parse or
/// template failure leaves both sinks as they were.
pub fn add_service_worker<R, H, S>(
  input: R,
  mut html_out: H,
  mut service_worker_out: S,
  opts: &ServiceWorkerOptions,
) -> Result<()>
where
  R: Read,
  H: Write,
  S: Write,
{
  let Transformed {
    html,
    service_worker,
    ..
  } = transform(input, opts)?;

  service_worker_out
    .write_all(service_worker.as_bytes())
    .and_then(|()| service_worker_out.flush())
    .map_err(|err| OfflineError::io("failed to write service worker", err))?;
  html_out
    .write_all(&html)
    .and_then(|()| html_out.flush())
    .map_err(|err| OfflineError::io("failed to write HTML", err))?;

  Ok(())
}

/// Normalized cache list for `input`, without rendering anything.
pub fn cache_list<R: Read>(mut input: R, opts: &ServiceWorkerOptions) -> Result<Vec<String>> {
  let mut document = dom::parse_html(&mut input)?;
  let list = ResourceCollector::list_only(CacheList::seeded(opts.cache_urls.iter().cloned()))
    .collect(&mut document);
  Ok(list.into_normalized())
}
