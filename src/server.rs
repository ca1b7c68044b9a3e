//! HTTP endpoint that renders the service worker for any upstream page.

use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderValue, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use reqwest::Client;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, CorsLayer};
use url::Url;

use crate::config::ServiceWorkerOptions;
use crate::error::{OfflineError, Result};
use crate::remote::fetch_document;
use crate::rewrite;

/// Settings for the inventory endpoint.
#[derive(Debug, Clone)]
pub struct InventoryOptions {
  /// Scheme, host and port upstream requests are sent to.
  pub root: Url,
  /// Path prefix the endpoint is mounted under; always starts and ends with `/`.
  pub path: String,
  /// Value for `Access-Control-Allow-Origin`, when set.
  pub cors: Option<String>,
  /// Log every upstream fetch.
  pub logging: bool,
}

impl InventoryOptions {
  /// Validate the upstream root and normalise the mount path.
  pub fn new(root: &str, path: &str, cors: Option<String>, logging: bool) -> Result<Self> {
    if root.is_empty() {
      return Err(OfflineError::InvalidConfig("missing upstream root".into()));
    }
    let root = Url::parse(root)
      .map_err(|err| OfflineError::InvalidConfig(format!("invalid upstream root {root}: {err}")))?;
    if !root.has_host() {
      return Err(OfflineError::InvalidConfig(format!(
        "upstream root {root} has no host"
      )));
    }

    let trimmed = path.trim_matches('/');
    let path = if trimmed.is_empty() {
      "/".to_string()
    } else {
      format!("/{trimmed}/")
    };

    Ok(Self {
      root,
      path,
      cors: cors.filter(|value| !value.is_empty()),
      logging,
    })
  }

  /// Upstream URL for an inbound request, or `None` when it lies outside the mount path.
  ///
  /// The mount path is stripped once and the remainder is requested from the root's scheme
  /// and authority; the query string is passed through.
  pub fn upstream_url(&self, uri: &Uri) -> Option<Url> {
    let rest = uri.path().strip_prefix(self.path.as_str())?;
    let mut upstream = self.root.clone();
    upstream.set_path(&format!("/{rest}"));
    upstream.set_query(uri.query());
    upstream.set_fragment(None);
    Some(upstream)
  }
}

/// How the server is exposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Listener {
  /// Plain HTTP on a TCP socket.
  Http,
  /// Serverless function invocation.
  Lambda,
}

impl FromStr for Listener {
  type Err = OfflineError;

  fn from_str(value: &str) -> Result<Self> {
    match value.to_ascii_lowercase().as_str() {
      "http" => Ok(Self::Http),
      "lambda" => Ok(Self::Lambda),
      other => Err(OfflineError::InvalidConfig(format!(
        "invalid server protocol `{other}`"
      ))),
    }
  }
}

#[derive(Clone)]
struct AppState {
  inventory: Arc<InventoryOptions>,
  worker: Arc<ServiceWorkerOptions>,
  client: Client,
}

impl IntoResponse for OfflineError {
  fn into_response(self) -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()).into_response()
  }
}

async fn ping() -> impl IntoResponse {
  ([(header::CONTENT_TYPE, "text/plain")], "PONG")
}

async fn inventory_handler(State(state): State<AppState>, uri: Uri) -> Response {
  let Some(upstream) = state.inventory.upstream_url(&uri) else {
    return StatusCode::NOT_FOUND.into_response();
  };

  match render_for(&state, upstream.as_str()).await {
    Ok(service_worker) => {
      let length = service_worker.len();
      (
        [
          (header::CONTENT_TYPE, HeaderValue::from_static("text/javascript")),
          (header::CONTENT_LENGTH, HeaderValue::from(length)),
        ],
        Body::from(service_worker),
      )
        .into_response()
    }
    Err(err) => {
      log::error!("{upstream}: {err}");
      err.into_response()
    }
  }
}

async fn render_for(state: &AppState, upstream: &str) -> Result<String> {
  if state.inventory.logging {
    log::info!("Fetch '{upstream}'");
  }
  let body = fetch_document(&state.client, upstream).await?;
  let mut service_worker = Vec::new();
  rewrite::add_service_worker(body.as_ref(), std::io::sink(), &mut service_worker, &state.worker)?;
  String::from_utf8(service_worker).map_err(|err| {
    OfflineError::io(
      "service worker is not UTF-8",
      std::io::Error::new(std::io::ErrorKind::InvalidData, err),
    )
  })
}

/// Router serving `/ping` and the inventory endpoint.
pub fn router(
  inventory: InventoryOptions,
  worker: ServiceWorkerOptions,
  client: Client,
) -> Result<Router> {
  let cors = match &inventory.cors {
    Some(origin) => Some(
      HeaderValue::from_str(origin)
        .map_err(|err| OfflineError::InvalidConfig(format!("invalid CORS value {origin}: {err}")))?,
    ),
    None => None,
  };

  let state = AppState {
    inventory: Arc::new(inventory),
    worker: Arc::new(worker),
    client,
  };

  let app = Router::new()
    .route("/ping", get(ping))
    .fallback(inventory_handler)
    .with_state(state);

  Ok(match cors {
    Some(origin) => app.layer(CorsLayer::new().allow_origin(AllowOrigin::exact(origin))),
    None => app,
  })
}

/// Bind `addr` with the chosen listener and serve `app` until the process stops.
pub async fn serve(listener: Listener, addr: SocketAddr, app: Router) -> Result<()> {
  match listener {
    Listener::Http => {
      let socket = TcpListener::bind(addr)
        .await
        .map_err(|err| OfflineError::io(format!("failed to bind {addr}"), err))?;
      log::info!("Listening on http://{addr}");
      axum::serve(socket, app)
        .await
        .map_err(|err| OfflineError::io("server error", err))
    }
    Listener::Lambda => Err(OfflineError::InvalidConfig(
      "the lambda listener is not available in this build".into(),
    )),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::time::Duration;

  const PAGE: &str = r#"<html><head></head><body><img src="logo.png"><img src="/a/b.png"></body></html>"#;

  async fn spawn(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
      axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
  }

  async fn upstream() -> String {
    spawn(
      Router::new()
        .route("/page.html", get(|| async { PAGE }))
        .route(
          "/search",
          get(|uri: Uri| async move {
            format!("<img src=\"{}.png\">", uri.query().unwrap_or("none"))
          }),
        ),
    )
    .await
  }

  fn client() -> Client {
    crate::remote::build_http_client(Duration::from_secs(5)).unwrap()
  }

  async fn proxy(root: &str, path: &str, cors: Option<&str>) -> String {
    let inventory = InventoryOptions::new(root, path, cors.map(str::to_string), true).unwrap();
    let worker = ServiceWorkerOptions {
      cache_name: "inventory".into(),
      timestamp: false,
      ..ServiceWorkerOptions::default()
    };
    spawn(router(inventory, worker, client()).unwrap()).await
  }

  #[test]
  fn normalises_mount_path() {
    let root = "http://example.com";
    assert_eq!(InventoryOptions::new(root, "", None, false).unwrap().path, "/");
    assert_eq!(InventoryOptions::new(root, "/", None, false).unwrap().path, "/");
    assert_eq!(InventoryOptions::new(root, "sw", None, false).unwrap().path, "/sw/");
    assert_eq!(InventoryOptions::new(root, "/sw/", None, false).unwrap().path, "/sw/");
  }

  #[test]
  fn rejects_missing_or_invalid_root() {
    assert!(matches!(
      InventoryOptions::new("", "/", None, false),
      Err(OfflineError::InvalidConfig(_))
    ));
    assert!(matches!(
      InventoryOptions::new("not a url", "/", None, false),
      Err(OfflineError::InvalidConfig(_))
    ));
  }

  #[test]
  fn maps_requests_onto_upstream_root() {
    let options = InventoryOptions::new("https://example.com:8443/ignored", "/sw", None, false).unwrap();

    let uri: Uri = "/sw/blog/post.html?page=2".parse().unwrap();
    assert_eq!(
      options.upstream_url(&uri).unwrap().as_str(),
      "https://example.com:8443/blog/post.html?page=2"
    );

    let outside: Uri = "/other/post.html".parse().unwrap();
    assert!(options.upstream_url(&outside).is_none());
  }

  #[test]
  fn parses_listener_schemes() {
    assert_eq!("HTTP".parse::<Listener>().unwrap(), Listener::Http);
    assert_eq!("lambda".parse::<Listener>().unwrap(), Listener::Lambda);
    assert!("ftp".parse::<Listener>().is_err());
  }

  #[tokio::test]
  async fn lambda_listener_is_rejected() {
    let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
    let err = serve(Listener::Lambda, addr, Router::new()).await.unwrap_err();
    assert!(matches!(err, OfflineError::InvalidConfig(_)));
  }

  #[tokio::test]
  async fn ping_answers_independently_of_upstream() {
    let base = proxy("http://127.0.0.1:9", "/", None).await;

    let response = reqwest::get(format!("{base}/ping")).await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "PONG");
  }

  #[tokio::test]
  async fn renders_service_worker_for_upstream_page() {
    let root = upstream().await;
    let base = proxy(&root, "/sw", Some("*")).await;

    let response = reqwest::Client::new()
      .get(format!("{base}/sw/page.html"))
      .header("Origin", "https://example.org")
      .send()
      .await
      .unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let headers = response.headers().clone();
    assert_eq!(headers[reqwest::header::CONTENT_TYPE], "text/javascript");
    assert_eq!(headers[reqwest::header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    let body = response.text().await.unwrap();
    assert_eq!(
      headers[reqwest::header::CONTENT_LENGTH].to_str().unwrap(),
      body.len().to_string()
    );
    assert!(body.contains("var CACHE = \"inventory\";"));
    assert!(body.contains("\"./logo.png\","));
    assert!(body.contains("\"/a/b.png\","));
    assert!(!body.contains("<html"));
  }

  #[tokio::test]
  async fn passes_query_string_upstream() {
    let root = upstream().await;
    let base = proxy(&root, "/", None).await;

    let body = reqwest::get(format!("{base}/search?q")).await.unwrap().text().await.unwrap();
    assert!(body.contains("\"./q.png\","));
  }

  #[tokio::test]
  async fn omits_cors_header_unless_configured() {
    let root = upstream().await;
    let base = proxy(&root, "/", None).await;

    let response = reqwest::get(format!("{base}/page.html")).await.unwrap();
    assert!(!response.headers().contains_key(reqwest::header::ACCESS_CONTROL_ALLOW_ORIGIN));
  }

  #[tokio::test]
  async fn upstream_failure_is_a_server_error() {
    let root = upstream().await;
    let base = proxy(&root, "/", None).await;

    let response = reqwest::get(format!("{base}/missing.html")).await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);
    assert!(response.text().await.unwrap().contains("404"));
  }

  #[tokio::test]
  async fn requests_outside_mount_path_are_not_found() {
    let root = upstream().await;
    let base = proxy(&root, "/sw", None).await;

    let response = reqwest::get(format!("{base}/page.html")).await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
  }
}
