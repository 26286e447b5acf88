use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use dotenvy::dotenv;
use tracing_subscriber::EnvFilter;

use hoopflow::clients::{
    Collaborators, HttpAnswerClient, HttpComplaintClient, HttpDocumentClient, HttpSearchClient,
};
use hoopflow::config::Config;
use hoopflow::engine::{Engine, RetryPolicy, RunOptions, RunStatus};
use hoopflow::events::{HttpMessageSink, MessageSink, NoopSink};
use hoopflow::hoops::Registry;
use hoopflow::metrics::Metrics;
use hoopflow::render::JsonMap;
use hoopflow::{flow, metrics};

#[derive(Parser)]
#[command(name = "hoopflow", about = "Deterministic flow executor")]
enum Cli {
    /// Load a flow file, execute it, and print the terminal output
    Run {
        /// Flow file, absolute or relative to the configured flows directory
        path: PathBuf,
        /// Caller input as a JSON object, merged into the flow context
        #[arg(long)]
        input: Option<String>,
        /// Treat the path as a compiled flow (a .json path is compiled first)
        #[arg(long)]
        compiled: bool,
        /// Whole-flow deadline in seconds
        #[arg(long)]
        deadline_secs: Option<u64>,
    },
    /// Compile a textual flow into its wire form
    Compile { input: PathBuf, output: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli {
        Cli::Compile { input, output } => {
            flow::wire::compile(&input, &output)?;
            println!("Compiled {} -> {}", input.display(), output.display());
            Ok(())
        }
        Cli::Run {
            path,
            input,
            compiled,
            deadline_secs,
        } => run(&config, path, input, compiled, deadline_secs).await,
    }
}

async fn run(
    config: &Config,
    path: PathBuf,
    input: Option<String>,
    compiled: bool,
    deadline_secs: Option<u64>,
) -> Result<()> {
    let input = parse_input(input)?;

    let shared_metrics = Arc::new(Metrics::new());
    if let Some(port) = config.metrics_port {
        let shared_metrics = shared_metrics.clone();
        tokio::spawn(async move {
            if let Err(e) = metrics::serve(shared_metrics, port).await {
                tracing::error!(error = %e, "Metrics listener failed");
            }
        });
    }

    let engine = build_engine(config, shared_metrics)?;

    let resolved = config.resolve_flow_path(&path, compiled);
    let options = RunOptions {
        flow_deadline: deadline_secs.map(Duration::from_secs),
    };

    let flow = if compiled {
        flow::wire::load_or_compile(&resolved)?
    } else {
        flow::loader::from_json_file(&resolved)?
    };
    let report = engine.run_with_options(&flow, input, options).await;

    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::Value::Object(report.output.clone()))?
    );

    if report.status == RunStatus::Fail {
        if let Some(failure) = &report.failure {
            eprintln!(
                "flow failed at node `{}` ({}): {}",
                failure.node_id, failure.kind, failure.message
            );
        }
        std::process::exit(1);
    }
    Ok(())
}

fn build_engine(config: &Config, metrics: Arc<Metrics>) -> Result<Engine> {
    let http_client = Arc::new(
        reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()
            .context("failed to build HTTP client")?,
    );

    let sink: Arc<dyn MessageSink> = if config.event_brokers.is_empty() {
        tracing::info!("No event brokers configured, publishing disabled");
        Arc::new(NoopSink)
    } else {
        tracing::info!(brokers = ?config.event_brokers, "Publishing execution events");
        Arc::new(HttpMessageSink::new(
            http_client.clone(),
            config.event_brokers.clone(),
        ))
    };

    let registry = Registry::builtin(Collaborators {
        search: Arc::new(HttpSearchClient::new(
            http_client.clone(),
            config.search_url.clone(),
        )),
        answer: Arc::new(HttpAnswerClient::new(
            http_client.clone(),
            config.answer_url.clone(),
        )),
        complaints: Arc::new(HttpComplaintClient::new(
            http_client.clone(),
            config.complaint_url.clone(),
        )),
        documents: Arc::new(HttpDocumentClient::new(
            http_client.clone(),
            config.document_url.clone(),
        )),
        notifier: sink.clone(),
    });

    let mut engine = Engine::new(registry, sink, metrics);
    if let Some(timeout) = config.hoop_timeout {
        engine = engine.with_hoop_timeout(timeout);
    }
    if let Some(max_attempts) = config.retry_max_attempts {
        engine = engine.with_retry_policy(RetryPolicy {
            max_attempts,
            ..RetryPolicy::default()
        });
    }
    Ok(engine)
}

fn parse_input(input: Option<String>) -> Result<JsonMap> {
    let Some(raw) = input else {
        return Ok(JsonMap::new());
    };
    let value: serde_json::Value =
        serde_json::from_str(&raw).context("--input must be valid JSON")?;
    value
        .as_object()
        .cloned()
        .context("--input must be a JSON object")
}
