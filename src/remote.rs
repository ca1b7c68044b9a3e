//! Fetching documents over HTTP and checking that cached URLs resolve.

use std::collections::BTreeSet;
use std::time::Duration;

use bytes::Bytes;
use futures::future::join_all;
use reqwest::{Client, StatusCode};
use url::Url;

use crate::config::ServiceWorkerOptions;
use crate::error::{OfflineError, Result};
use crate::rewrite;

/// Build the HTTP client used for upstream fetches and validation.
pub fn build_http_client(timeout: Duration) -> Result<Client> {
  Ok(
    Client::builder()
      .timeout(timeout)
      .pool_idle_timeout(Duration::from_secs(60))
      .user_agent(concat!("html-offline/", env!("CARGO_PKG_VERSION")))
      .build()?,
  )
}

/// GET `url` and return its body; transport errors and non-2xx answers are upstream
/// failures.
pub async fn fetch_document(client: &Client, url: &str) -> Result<Bytes> {
  let upstream = |reason: String| OfflineError::Upstream {
    url: url.to_string(),
    reason,
  };

  let response = client
    .get(url)
    .send()
    .await
    .map_err(|err| upstream(err.to_string()))?;
  let status = response.status();
  if !status.is_success() {
    return Err(upstream(status.to_string()));
  }
  response.bytes().await.map_err(|err| upstream(err.to_string()))
}

/// Normalized cache list for the document served at `url`.
pub async fn cache_list_from_url(
  client: &Client,
  url: &str,
  opts: &ServiceWorkerOptions,
) -> Result<Vec<String>> {
  let body = fetch_document(client, url).await?;
  rewrite::cache_list(body.as_ref(), opts)
}

/// Outcome of checking one cached URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validation {
  /// The URL that was checked.
  pub url: String,
  /// Status on success, otherwise the reason it failed.
  pub outcome: std::result::Result<StatusCode, String>,
}

impl Validation {
  /// True when the URL answered `200 OK`.
  pub fn is_ok(&self) -> bool {
    self.outcome.is_ok()
  }
}

/// HEAD every distinct absolute `http(s)` entry concurrently, sorted by URL.
///
/// Entries may be raw or normalized; the `./` prefix normalization puts in front of
/// absolute URLs is ignored. Relative entries cannot be checked without a base and are
/// skipped.
pub async fn validate_cache_urls<'a, I>(client: &Client, entries: I) -> Vec<Validation>
where
  I: IntoIterator<Item = &'a String>,
{
  let targets: BTreeSet<&str> = entries
    .into_iter()
    .filter_map(|entry| absolute_http_url(entry))
    .collect();

  join_all(targets.into_iter().map(|url| async move {
    let outcome = match client.head(url).send().await {
      Ok(response) if response.status() == StatusCode::OK => Ok(response.status()),
      Ok(response) => Err(response.status().to_string()),
      Err(err) => Err(err.to_string()),
    };
    Validation {
      url: url.to_string(),
      outcome,
    }
  }))
  .await
}

fn absolute_http_url(entry: &str) -> Option<&str> {
  let candidate = entry.strip_prefix("./").unwrap_or(entry);
  let url = Url::parse(candidate).ok()?;
  matches!(url.scheme(), "http" | "https").then_some(candidate)
}

#[cfg(test)]
mod tests {
  use super::*;
  use axum::Router;
  use axum::http::StatusCode as AxumStatus;
  use axum::routing::get;
  use tokio::net::TcpListener;

  async fn spawn(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
      axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
  }

  fn client() -> Client {
    build_http_client(Duration::from_secs(5)).unwrap()
  }

  fn options() -> ServiceWorkerOptions {
    ServiceWorkerOptions {
      timestamp: false,
      ..ServiceWorkerOptions::default()
    }
  }

  #[tokio::test]
  async fn lists_cache_entries_of_remote_page() {
    let base = spawn(Router::new().route(
      "/page.html",
      get(|| async { r#"<html><body><img src="/img/a.png"><img src="b.png"></body></html>"# }),
    ))
    .await;

    let list = cache_list_from_url(&client(), &format!("{base}/page.html"), &options())
      .await
      .unwrap();
    assert_eq!(list, vec!["./", "./index.html", "/img/a.png", "./b.png"]);
  }

  #[tokio::test]
  async fn non_success_status_is_an_upstream_failure() {
    let base = spawn(Router::new()).await;

    let err = fetch_document(&client(), &format!("{base}/missing.html"))
      .await
      .unwrap_err();
    match err {
      OfflineError::Upstream { reason, .. } => assert!(reason.contains("404")),
      other => panic!("unexpected error: {other}"),
    }
  }

  #[tokio::test]
  async fn validates_only_absolute_urls_once_each() {
    let base = spawn(
      Router::new()
        .route("/ok.png", get(|| async { "png" }))
        .route("/gone.png", get(|| async { AxumStatus::GONE })),
    )
    .await;
    let ok = format!("{base}/ok.png");
    let gone = format!("{base}/gone.png");
    let entries = vec![
      "./".to_string(),
      "./local.png".to_string(),
      ok.clone(),
      gone.clone(),
      ok.clone(),
    ];

    let report = validate_cache_urls(&client(), &entries).await;

    assert_eq!(report.len(), 2);
    let by_url = |url: &str| report.iter().find(|v| v.url == url).unwrap().clone();
    assert!(by_url(&ok).is_ok());
    assert_eq!(by_url(&gone).outcome, Err("410 Gone".to_string()));
  }

  #[tokio::test]
  async fn validates_absolute_urls_from_a_normalized_cache_list() {
    let base = spawn(
      Router::new()
        .route("/a.png", get(|| async { "png" }))
        .route("/extra.js", get(|| async { "js" })),
    )
    .await;
    let opts = ServiceWorkerOptions {
      cache_urls: vec![format!("{base}/extra.js")],
      ..options()
    };
    let html = format!(r#"<img src="{base}/a.png"><img src="local.png">"#);

    let list = rewrite::cache_list(html.as_bytes(), &opts).unwrap();
    assert!(list.contains(&format!("./{base}/a.png")));

    let report = validate_cache_urls(&client(), &list).await;

    let urls: Vec<&str> = report.iter().map(|check| check.url.as_str()).collect();
    assert_eq!(urls, vec![format!("{base}/a.png"), format!("{base}/extra.js")]);
    assert!(report.iter().all(Validation::is_ok));
  }

  #[test]
  fn only_http_urls_are_checkable() {
    assert_eq!(
      absolute_http_url("./https://cdn.example.com/a.png"),
      Some("https://cdn.example.com/a.png")
    );
    assert_eq!(absolute_http_url("http://cdn.example.com/"), Some("http://cdn.example.com/"));
    assert_eq!(absolute_http_url("./img/a.png"), None);
    assert_eq!(absolute_http_url("/img/a.png"), None);
    assert_eq!(absolute_http_url("./data:image/png;base64,AAAA"), None);
  }
}
