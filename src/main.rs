use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use clap::{Args, Parser, Subcommand};

use html_offline::catalog::{self, InputMode};
use html_offline::remote::{build_http_client, validate_cache_urls};
use html_offline::server::{self, InventoryOptions, Listener};
use html_offline::{PathSelection, ServiceWorkerOptions, add_service_worker_to_file};

/// Make HTML documents available offline with a generated service worker.
#[derive(Debug, Parser)]
#[command(name = "html-offline", version, about)]
struct Cli {
  /// JSON file with service worker options (defaults to ./offline.config.json if present).
  #[arg(long, global = true)]
  config: Option<PathBuf>,

  /// Log every collected resource.
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Debug, Args)]
struct WorkerArgs {
  /// The name for your browser/service worker cache.
  #[arg(long)]
  cache_name: Option<String>,

  /// The URI of the JavaScript service worker.
  #[arg(long, alias = "server-worker-url")]
  service_worker_url: Option<String>,

  /// Milliseconds the worker waits on the network before answering from the cache.
  #[arg(long)]
  network_timeout_ms: Option<u64>,

  /// Leave the generation timestamp out of the generated scripts.
  #[arg(long)]
  no_timestamp: bool,
}

#[derive(Debug, Args)]
struct InputArgs {
  /// How inputs are interpreted: file, directory or url.
  #[arg(long, default_value = "file")]
  mode: InputMode,

  /// JSON file with include/exclude path scopes for directory mode.
  #[arg(long)]
  selection: Option<PathBuf>,

  /// Seconds to wait for remote documents.
  #[arg(long, default_value_t = 10)]
  timeout: u64,

  /// Files, directories or URLs to process.
  #[arg(required = true)]
  inputs: Vec<String>,
}

#[derive(Debug, Subcommand)]
enum Command {
  /// Inject the bootstrap script and write the service worker next to each document.
  Add {
    #[command(flatten)]
    worker: WorkerArgs,
    #[command(flatten)]
    input: InputArgs,
  },
  /// Print the cache list of each document.
  List {
    #[command(flatten)]
    worker: WorkerArgs,
    #[command(flatten)]
    input: InputArgs,
    /// One or more URLs to append to the service worker cache list.
    #[arg(long = "url")]
    urls: Vec<String>,
    /// Issue a HEAD request against every absolute URL in the cache lists.
    #[arg(long)]
    validate: bool,
  },
  /// Print the sorted union of every cached URL across the inputs.
  Catalog {
    #[command(flatten)]
    worker: WorkerArgs,
    #[command(flatten)]
    input: InputArgs,
  },
  /// Serve generated service workers for pages fetched from an upstream site.
  Serve {
    #[command(flatten)]
    worker: WorkerArgs,
    /// Listener: http or lambda.
    #[arg(long, env = "INVENTORYD_SCHEME", default_value = "http")]
    scheme: Listener,
    /// The hostname to listen for requests on.
    #[arg(long, env = "INVENTORYD_HOST", default_value = "localhost")]
    host: String,
    /// The port number to listen for requests on.
    #[arg(long, env = "INVENTORYD_PORT", default_value_t = 8080)]
    port: u16,
    /// A valid URL to fetch subrequests from.
    #[arg(long, env = "INVENTORYD_ROOT", default_value = "")]
    root: String,
    /// The path (URL) for handling requests.
    #[arg(long, env = "INVENTORYD_PATH", default_value = "/")]
    path: String,
    /// Set the following CORS access-control header.
    #[arg(long, env = "INVENTORYD_CORS")]
    cors: Option<String>,
    /// Log requests.
    #[arg(long, env = "INVENTORYD_LOGGING")]
    logging: bool,
    /// Seconds to wait for the upstream site.
    #[arg(long, env = "INVENTORYD_UPSTREAM_TIMEOUT", default_value_t = 10)]
    upstream_timeout: u64,
  },
}

#[tokio::main]
async fn main() -> Result<()> {
  let cli = Cli::parse();
  init_logging(cli.verbose);

  match cli.command {
    Command::Add { worker, input } => {
      let opts = resolve_options(cli.config.as_deref(), &worker, &[])?;
      run_add(&opts, &input)
    }
    Command::List {
      worker,
      input,
      urls,
      validate,
    } => {
      let opts = resolve_options(cli.config.as_deref(), &worker, &urls)?;
      run_list(&opts, &input, validate).await
    }
    Command::Catalog { worker, input } => {
      let opts = resolve_options(cli.config.as_deref(), &worker, &[])?;
      run_catalog(&opts, &input).await
    }
    Command::Serve {
      worker,
      scheme,
      host,
      port,
      root,
      path,
      cors,
      logging,
      upstream_timeout,
    } => {
      let opts = resolve_options(cli.config.as_deref(), &worker, &[])?;
      let inventory = InventoryOptions::new(&root, &path, cors, logging)?;
      let client = build_http_client(Duration::from_secs(upstream_timeout))?;
      let app = server::router(inventory, opts, client)?;
      let addr = tokio::net::lookup_host((host.as_str(), port))
        .await
        .with_context(|| format!("failed to resolve {host}:{port}"))?
        .next()
        .ok_or_else(|| anyhow!("no address for {host}:{port}"))?;
      server::serve(scheme, addr, app).await?;
      Ok(())
    }
  }
}

fn init_logging(verbose: bool) {
  let default_filter = if verbose { "debug" } else { "info" };
  env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
    .init();
}

fn resolve_options(
  config: Option<&Path>,
  worker: &WorkerArgs,
  extra_urls: &[String],
) -> Result<ServiceWorkerOptions> {
  let mut opts = match config {
    Some(path) => ServiceWorkerOptions::load(path)
      .with_context(|| format!("failed to load options from {}", path.display()))?,
    None => ServiceWorkerOptions::discover(Path::new(".")),
  };

  if let Some(cache_name) = &worker.cache_name {
    opts.cache_name = cache_name.clone();
  }
  if let Some(url) = &worker.service_worker_url {
    opts.service_worker_url = url.clone();
  }
  if let Some(timeout) = worker.network_timeout_ms {
    opts.network_timeout_ms = timeout;
  }
  if worker.no_timestamp {
    opts.timestamp = false;
  }
  opts.cache_urls.extend(extra_urls.iter().cloned());

  opts.validate()?;
  Ok(opts)
}

fn load_selection(path: Option<&Path>) -> Result<PathSelection> {
  match path {
    Some(path) => Ok(PathSelection::load_from_path(path)?),
    None => Ok(PathSelection::default()),
  }
}

fn run_add(opts: &ServiceWorkerOptions, input: &InputArgs) -> Result<()> {
  match input.mode {
    InputMode::File => {
      for path in &input.inputs {
        add_service_worker_to_file(Path::new(path), opts)
          .with_context(|| format!("failed to add service worker to {path}"))?;
      }
      Ok(())
    }
    InputMode::Directory => {
      let selection = load_selection(input.selection.as_deref())?;
      let mut failures = 0;
      for root in &input.inputs {
        let files = match catalog::collect_html_files(Path::new(root), &selection) {
          Ok(files) => files,
          Err(err) => {
            log::error!("{root}: {err}");
            failures += 1;
            continue;
          }
        };
        for file in files {
          if let Err(err) = add_service_worker_to_file(&file, opts) {
            log::error!("{}: {err}", file.display());
            failures += 1;
          }
        }
      }
      if failures > 0 {
        bail!("{failures} input(s) could not be rewritten");
      }
      Ok(())
    }
    InputMode::Url => bail!("remote documents cannot be rewritten in place"),
  }
}

async fn run_list(opts: &ServiceWorkerOptions, input: &InputArgs, validate: bool) -> Result<()> {
  let selection = load_selection(input.selection.as_deref())?;
  let client = build_http_client(Duration::from_secs(input.timeout))?;
  let catalog = catalog::build_catalog(&input.inputs, input.mode, &selection, opts, &client).await;

  for (source, list) in catalog.sources() {
    println!("{source}");
    for entry in list {
      println!("{entry}");
    }
  }

  if validate {
    let entries = catalog.sources().flat_map(|(_, list)| list.iter());
    for check in validate_cache_urls(&client, entries).await {
      match check.outcome {
        Ok(_) => println!("OK {}", check.url),
        Err(reason) => println!("ERROR {} {reason}", check.url),
      }
    }
  }

  finish(catalog.failures())
}

async fn run_catalog(opts: &ServiceWorkerOptions, input: &InputArgs) -> Result<()> {
  let selection = load_selection(input.selection.as_deref())?;
  let client = build_http_client(Duration::from_secs(input.timeout))?;
  let catalog = catalog::build_catalog(&input.inputs, input.mode, &selection, opts, &client).await;

  for url in catalog.union() {
    println!("{url}");
  }

  finish(catalog.failures())
}

fn finish(failures: usize) -> Result<()> {
  if failures > 0 {
    bail!("{failures} input(s) could not be processed");
  }
  Ok(())
}
