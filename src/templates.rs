//! The two fixed script templates and their render variables.
//!
//! Templates are plain text with `{{ name }}` placeholders. Each one is compiled the first
//! time it is used and then shared for the life of the process.

use std::sync::LazyLock;

use chrono::{Local, SecondsFormat};

use crate::error::TemplateError;

const SERVICE_WORKER_TEMPLATE: &str = r#"{{ banner }}

var CACHE = {{ cache_name }};
var NETWORK_TIMEOUT = {{ network_timeout_ms }};

self.addEventListener('install', function (evt) {
  console.log('The service worker is being installed.');
  evt.waitUntil(precache());
});

self.addEventListener('fetch', function (evt) {
  console.log('The service worker is serving the asset.');
  evt.respondWith(fromNetwork(evt.request, NETWORK_TIMEOUT).catch(function () {
    return fromCache(evt.request);
  }));
});

function precache() {
  return caches.open(CACHE).then(function (cache) {
    return cache.addAll([
{{ to_cache }}
    ]);
  });
}

function fromNetwork(request, timeout) {
  return new Promise(function (fulfill, reject) {
    var timeoutId = setTimeout(reject, timeout);
    fetch(request).then(function (response) {
      clearTimeout(timeoutId);
      fulfill(response);
    }, reject);
  });
}

function fromCache(request) {
  return caches.open(CACHE).then(function (cache) {
    return cache.match(request).then(function (matching) {
      if (!matching) {
        return Promise.reject('no-match');
      }
      return matching;
    });
  });
}
"#;

const BOOTSTRAP_TEMPLATE: &str = r#"
{{ banner }}

window.addEventListener("load", function load(event) {
  if ('serviceWorker' in navigator) {
    navigator.serviceWorker.register({{ service_worker_url }}).then(function (registration) {
      console.log('Service worker registration succeeded:', registration);
    }, function (error) {
      console.log('Service worker registration failed:', error);
    });
  } else {
    console.log('Service workers are not supported.');
  }
}, false);
"#;

static SERVICE_WORKER: LazyLock<Result<Template, TemplateError>> =
  LazyLock::new(|| Template::compile("service-worker", SERVICE_WORKER_TEMPLATE));

static BOOTSTRAP: LazyLock<Result<Template, TemplateError>> =
  LazyLock::new(|| Template::compile("service-worker-init", BOOTSTRAP_TEMPLATE));

/// Source of placeholder values for [`Template::render`].
pub trait TemplateVars {
  /// Rendered text for the named placeholder, `None` when it is unknown.
  fn value(&self, name: &str) -> Option<String>;
}

/// Variables for the generated service worker.
#[derive(Debug, Clone)]
pub struct ServiceWorkerVars<'a> {
  /// Name of the cache opened by the worker.
  pub cache_name: &'a str,
  /// Normalized cache list, in collection order.
  pub to_cache: &'a [String],
  /// Network-first timeout in milliseconds.
  pub network_timeout_ms: u64,
  /// Optional RFC 3339 generation timestamp.
  pub generated_at: Option<String>,
}

impl TemplateVars for ServiceWorkerVars<'_> {
  fn value(&self, name: &str) -> Option<String> {
    match name {
      "banner" => Some(banner("file", self.generated_at.as_deref())),
      "cache_name" => Some(js_string(self.cache_name)),
      "network_timeout_ms" => Some(self.network_timeout_ms.to_string()),
      "to_cache" => Some(
        self
          .to_cache
          .iter()
          .map(|uri| format!("      {},", js_string(uri)))
          .collect::<Vec<_>>()
          .join("\n"),
      ),
      _ => None,
    }
  }
}

/// Variables for the bootstrap script injected into `<head>`.
#[derive(Debug, Clone)]
pub struct BootstrapVars<'a> {
  /// URL registered as the page's service worker.
  pub service_worker_url: &'a str,
  /// Optional RFC 3339 generation timestamp.
  pub generated_at: Option<String>,
}

impl TemplateVars for BootstrapVars<'_> {
  fn value(&self, name: &str) -> Option<String> {
    match name {
      "banner" => Some(banner("code", self.generated_at.as_deref())),
      "service_worker_url" => Some(js_string(self.service_worker_url)),
      _ => None,
    }
  }
}

/// Render the service worker script.
pub fn render_service_worker(vars: &ServiceWorkerVars<'_>) -> Result<String, TemplateError> {
  SERVICE_WORKER.as_ref().map_err(Clone::clone)?.render(vars)
}

/// Render the bootstrap script body.
pub fn render_bootstrap(vars: &BootstrapVars<'_>) -> Result<String, TemplateError> {
  BOOTSTRAP.as_ref().map_err(Clone::clone)?.render(vars)
}

/// Current local time for the generated banners, when requested.
pub fn generated_at(enabled: bool) -> Option<String> {
  enabled.then(|| Local::now().to_rfc3339_opts(SecondsFormat::Secs, true))
}

fn banner(kind: &str, generated_at: Option<&str>) -> String {
  match generated_at {
    Some(date) => format!("// this {kind} was generated by html-offline on {date}"),
    None => format!("// this {kind} was generated by html-offline"),
  }
}

/// Quote a value as a JavaScript string literal that is also safe inside `<script>`.
pub fn js_string(value: &str) -> String {
  serde_json::Value::from(value)
    .to_string()
    .replace("</", "<\\/")
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
  Text(&'static str),
  Value(&'static str),
}

/// A compiled template.
#[derive(Debug, Clone)]
pub struct Template {
  name: &'static str,
  segments: Vec<Segment>,
}

impl Template {
  /// Split `source` into literal text and `{{ name }}` placeholders.
  pub fn compile(name: &'static str, source: &'static str) -> Result<Self, TemplateError> {
    let mut segments = Vec::new();
    let mut rest = source;
    let mut offset = 0;

    while let Some(start) = rest.find("{{") {
      if start > 0 {
        segments.push(Segment::Text(&rest[..start]));
      }
      let after_open = &rest[start + 2..];
      let Some(end) = after_open.find("}}") else {
        return Err(TemplateError::Unclosed {
          template: name.to_string(),
          offset: offset + start,
        });
      };
      let key = after_open[..end].trim();
      if key.is_empty() {
        return Err(TemplateError::EmptyPlaceholder {
          template: name.to_string(),
          offset: offset + start,
        });
      }
      segments.push(Segment::Value(key));

      let consumed = start + 2 + end + 2;
      offset += consumed;
      rest = &rest[consumed..];
    }

    if !rest.is_empty() {
      segments.push(Segment::Text(rest));
    }

    Ok(Self { name, segments })
  }

  /// Names of the placeholders in order of appearance.
  pub fn placeholders(&self) -> impl Iterator<Item = &'static str> + '_ {
    self.segments.iter().filter_map(|segment| match segment {
      Segment::Value(key) => Some(*key),
      Segment::Text(_) => None,
    })
  }

  /// Substitute every placeholder; an unknown name fails the whole render.
  pub fn render(&self, vars: &dyn TemplateVars) -> Result<String, TemplateError> {
    let mut out = String::new();
    for segment in &self.segments {
      match segment {
        Segment::Text(text) => out.push_str(text),
        Segment::Value(key) => {
          let value = vars.value(key).ok_or_else(|| TemplateError::MissingValue {
            template: self.name.to_string(),
            name: key.to_string(),
          })?;
          out.push_str(&value);
        }
      }
    }
    Ok(out)
  }
}
