//! The ordered list of URLs a generated service worker pre-caches.

/// Entries every cache list starts with: the page root and its index document.
pub const SEED_ENTRIES: [&str; 2] = ["", "index.html"];

/// Ordered, non-deduplicated cache list built while walking a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheList {
  entries: Vec<String>,
}

impl CacheList {
  /// Start a list from the seed entries followed by `extra` in order.
  pub fn seeded<I, S>(extra: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    let mut entries: Vec<String> = SEED_ENTRIES.iter().map(|seed| seed.to_string()).collect();
    entries.extend(extra.into_iter().map(Into::into));
    Self { entries }
  }

  /// Record a discovered asset reference. Repeats are kept.
  pub fn push(&mut self, entry: impl Into<String>) {
    self.entries.push(entry.into());
  }

  /// Entries as collected, before normalization.
  pub fn raw(&self) -> &[String] {
    &self.entries
  }

  /// Finish the list, applying [`normalize_entry`] to every entry.
  pub fn into_normalized(self) -> Vec<String> {
    self
      .entries
      .into_iter()
      .map(|entry| normalize_entry(&entry))
      .collect()
  }
}

/// Prefix an entry with `./` unless it is an absolute path.
///
/// Anything not starting with `/` gets the prefix, including absolute URLs and the empty
/// seed, which becomes `./`.
pub fn normalize_entry(entry: &str) -> String {
  if entry.starts_with('/') {
    entry.to_string()
  } else {
    format!("./{entry}")
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn seeds_normalize_to_root_and_index() {
    let list = CacheList::seeded(Vec::<String>::new());
    assert_eq!(list.into_normalized(), vec!["./", "./index.html"]);
  }

  #[test]
  fn extra_entries_follow_seeds() {
    let mut list = CacheList::seeded(["/fonts/a.woff2"]);
    list.push("img/y.png");
    assert_eq!(list.raw(), ["", "index.html", "/fonts/a.woff2", "img/y.png"]);
    assert_eq!(
      list.into_normalized(),
      vec!["./", "./index.html", "/fonts/a.woff2", "./img/y.png"]
    );
  }

  #[test]
  fn absolute_paths_are_left_alone() {
    assert_eq!(normalize_entry("/assets/x.png"), "/assets/x.png");
    assert_eq!(normalize_entry("img/y.png"), "./img/y.png");
  }

  #[test]
  fn repeated_entries_are_kept() {
    let mut list = CacheList::seeded(Vec::<String>::new());
    list.push("a.png");
    list.push("a.png");
    assert_eq!(list.raw().len(), 4);
    assert_eq!(
      list.into_normalized(),
      vec!["./", "./index.html", "./a.png", "./a.png"]
    );
  }
}
