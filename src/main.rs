//! Mock Responder - CLI Entry Point
//!
//! Loads an environment and replays requests against one of its routes,
//! printing each rendered response.

use anyhow::{Context, Result};
use clap::Parser;
use mock_responder::{Environment, MockRequest, Responder};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

const DEFAULT_ENVIRONMENT: &str = include_str!("../demos/default-environment.yaml");

#[derive(Parser, Debug)]
#[command(
    name = "mock-responder",
    about = "Rule-based mock responses with templated bodies",
    version
)]
struct Args {
    /// Path to environment file (YAML or JSON)
    #[arg(short, long, default_value = "environment.yaml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'L', long, default_value = "info")]
    log_level: Level,

    /// Print the bundled demo environment and exit
    #[arg(long)]
    print_config: bool,

    /// Validate the environment and exit
    #[arg(long)]
    validate: bool,

    /// Route uuid or endpoint (defaults to the first route)
    #[arg(short, long)]
    route: Option<String>,

    /// Request method
    #[arg(short, long, default_value = "GET")]
    method: String,

    /// Request header, as `Name: value`
    #[arg(short = 'H', long = "header", value_parser = parse_header)]
    headers: Vec<(String, String)>,

    /// Raw query string
    #[arg(short, long)]
    query: Option<String>,

    /// Path parameter, as `name=value`
    #[arg(short, long = "param", value_parser = parse_param)]
    params: Vec<(String, String)>,

    /// Request body
    #[arg(short, long)]
    body: Option<String>,

    /// Number of requests to send
    #[arg(short = 'n', long, default_value_t = 1)]
    requests: u32,
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected `Name: value`, got {raw:?}"))?;
    Ok((name.trim().to_string(), value.trim().to_string()))
}

fn parse_param(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected `name=value`, got {raw:?}"))?;
    Ok((name.to_string(), value.to_string()))
}

impl Args {
    fn request(&self) -> MockRequest {
        let mut request = MockRequest::new(&self.method);
        for (name, value) in &self.headers {
            request = request.with_header(name, value);
        }
        for (name, value) in &self.params {
            request = request.with_param(name, value);
        }
        if let Some(query) = &self.query {
            request = request.with_query_string(query);
        }
        if let Some(body) = &self.body {
            request = request.with_body(body.as_str());
        }
        request
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if args.print_config {
        println!("{}", DEFAULT_ENVIRONMENT);
        return Ok(());
    }

    // Load environment
    let environment = if args.config.exists() {
        info!(path = ?args.config, "Loading environment");
        Environment::from_file(&args.config)
            .with_context(|| format!("Failed to load {}", args.config.display()))?
    } else if args.validate {
        anyhow::bail!("Environment file not found: {:?}", args.config);
    } else {
        info!("Environment file not found, using the demo environment");
        let environment = Environment::from_yaml(DEFAULT_ENVIRONMENT)?;
        environment.validate()?;
        environment
    };

    if args.validate {
        environment.validate()?;
        println!(
            "Environment is valid ({} routes defined)",
            environment.routes.len()
        );
        return Ok(());
    }

    let route_id = match &args.route {
        Some(id) => id.clone(),
        None => environment
            .routes
            .first()
            .map(|route| route.uuid.clone())
            .context("Environment has no routes")?,
    };

    let request = args.request();
    let responder = Responder::new(environment);

    for n in 1..=args.requests {
        let response = responder.respond(&route_id, &request).await?;
        if args.requests > 1 {
            println!("--- request {n}");
        }
        println!("HTTP {}", response.status);
        for header in &response.headers {
            println!("{}: {}", header.key, header.value);
        }
        println!();
        println!("{}", response.body);
    }

    info!(
        requests = responder.total_requests(),
        rendered = responder.total_rendered(),
        failures = responder.total_render_failures(),
        "Done"
    );

    Ok(())
}
