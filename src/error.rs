//! Error types for the html-offline library.

use std::io;

use thiserror::Error;

/// Errors raised while compiling or rendering one of the fixed templates.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
  /// A `{{` marker was never closed.
  #[error("template `{template}`: unclosed placeholder at byte {offset}")]
  Unclosed {
    /// Name of the template being compiled.
    template: String,
    /// Byte offset of the opening marker.
    offset: usize,
  },

  /// A placeholder has no name between its markers.
  #[error("template `{template}`: empty placeholder at byte {offset}")]
  EmptyPlaceholder {
    /// Name of the template being compiled.
    template: String,
    /// Byte offset of the opening marker.
    offset: usize,
  },

  /// The render variables do not provide a value for a placeholder.
  #[error("template `{template}`: no value for `{name}`")]
  MissingValue {
    /// Name of the template being rendered.
    template: String,
    /// Placeholder that could not be resolved.
    name: String,
  },
}

/// Errors that can occur while rewriting a document for offline use.
#[derive(Error, Debug)]
pub enum OfflineError {
  /// The HTML input could not be read or parsed.
  #[error("failed to parse HTML: {0}")]
  Parse(#[source] io::Error),

  /// A template failed to compile or render.
  #[error(transparent)]
  Template(#[from] TemplateError),

  /// A source could not be read, or an output could not be staged or committed.
  #[error("{context}: {source}")]
  Io {
    /// What was being attempted.
    context: String,
    /// Underlying I/O error.
    #[source]
    source: io::Error,
  },

  /// A remote fetch failed or answered with a non-success status.
  #[error("upstream request for {url} failed: {reason}")]
  Upstream {
    /// The URL that was requested.
    url: String,
    /// Transport error message or response status.
    reason: String,
  },

  /// Options or server settings are missing or unusable.
  #[error("invalid configuration: {0}")]
  InvalidConfig(String),

  /// HTTP client construction error.
  #[error("HTTP error: {0}")]
  Http(#[from] reqwest::Error),
}

impl OfflineError {
  /// Wrap an I/O error with a short description of the failed step.
  pub fn io(context: impl Into<String>, source: io::Error) -> Self {
    Self::Io {
      context: context.into(),
      source,
    }
  }
}

/// A specialized `Result` type for html-offline operations.
pub type Result<T> = std::result::Result<T, OfflineError>;
