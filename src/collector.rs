//! Single-pass walk that swaps the bootstrap script and gathers cacheable assets.

use markup5ever_rcdom::{Handle, RcDom};

use crate::cache_list::CacheList;
use crate::dom;

/// Walks a parsed document once, depth-first, in document order.
///
/// Every `<head>` loses its stale bootstrap scripts and gains a fresh one as its last
/// child. `<img>`, `<link rel="stylesheet">`, `<script type="text/javascript">` and
/// `<source>` references are appended to the cache list as they are met.
pub struct ResourceCollector<'a> {
  bootstrap: Option<&'a str>,
  cache: CacheList,
}

impl<'a> ResourceCollector<'a> {
  /// Collector that injects `bootstrap` into every `<head>` it visits.
  pub fn new(bootstrap: &'a str, cache: CacheList) -> Self {
    Self {
      bootstrap: Some(bootstrap),
      cache,
    }
  }

  /// Collector that only gathers assets and leaves the tree untouched.
  pub fn list_only(cache: CacheList) -> Self {
    Self {
      bootstrap: None,
      cache,
    }
  }

  /// Walk the whole document and hand back the collected list.
  pub fn collect(mut self, dom: &mut RcDom) -> CacheList {
    let root = dom.document.clone();
    self.visit(dom, &root);
    self.cache
  }

  fn visit(&mut self, dom: &mut RcDom, node: &Handle) {
    let name = dom::element_name(node);

    if name.as_deref() == Some("head") {
      if let Some(code) = self.bootstrap {
        for child in dom::children(node) {
          if dom::is_bootstrap_script(&child) {
            dom::detach(dom, &child);
          }
        }
        // Recurse over the surviving children before appending, so the new script is
        // never visited.
        for child in dom::children(node) {
          self.visit(dom, &child);
        }
        let script = dom::bootstrap_script(dom, code);
        dom::append_child(dom, node, script);
        log::debug!("injected bootstrap script into <head>");
        return;
      }
    } else if let Some(tag) = name.as_deref() {
      self.collect_from_element(tag, node);
    }

    for child in dom::children(node) {
      self.visit(dom, &child);
    }
    if let Some(contents) = dom::template_contents(node) {
      self.visit(dom, &contents);
    }
  }

  fn collect_from_element(&mut self, tag: &str, node: &Handle) {
    let attrs = dom::attributes(node);
    let attr = |key: &str| attrs.get(key).map(String::as_str);

    match tag {
      "img" => {
        if let Some(src) = attr("src") {
          self.record(tag, src);
        }
      }
      "link" => {
        if let (Some("stylesheet"), Some(href)) = (attr("rel"), attr("href")) {
          self.record(tag, href);
        }
      }
      "script" => {
        if let (Some("text/javascript"), Some(src)) = (attr("type"), attr("src")) {
          self.record(tag, src);
        }
      }
      // <picture> uses srcset, <video> and <audio> use src; either or both may appear.
      "source" => {
        if let Some(srcset) = attr("srcset") {
          self.record(tag, srcset);
        }
        if let Some(src) = attr("src") {
          self.record(tag, src);
        }
      }
      _ => {}
    }
  }

  fn record(&mut self, tag: &str, uri: &str) {
    log::debug!("<{tag}> references {uri}");
    self.cache.push(uri);
  }
}
