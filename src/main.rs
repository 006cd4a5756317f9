//! CLI entry point for the liveops incident tool.
//!
//! Provides subcommands for dataset KPIs, incident detection with response
//! planning, and free-text questions over the order data.

use anyhow::Result;
use clap::{Parser, Subcommand};
use liveops::{
    config::Settings,
    dataset::{CsvDatasetProvider, DatasetProvider},
    detection::IncidentDetector,
    infra::gemini::GeminiClient,
    output::{DetectionReport, print_json, write_incidents, write_plans},
    planner::ResponsePlanner,
    retrieval::{AnswerGenerator, RetrievalIndex},
    stats::DatasetStats,
};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "liveops")]
#[command(about = "Detect delivery incidents and query order data", long_about = None)]
struct Cli {
    /// JSON settings file
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Directory holding the CSV exports
    #[arg(short, long, global = true, default_value = "data")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log headline KPIs for the dataset
    Stats,
    /// Flag incidents and plan a response for each
    Detect {
        /// Days late beyond which an order is a delivery delay
        #[arg(long)]
        delay_threshold: Option<f64>,

        /// CSV file to write incidents to
        #[arg(long, default_value = "output/incidents.csv")]
        incidents: PathBuf,

        /// CSV file to write response plans to
        #[arg(long, default_value = "output/response_plans.csv")]
        plans: PathBuf,

        /// Also log the full run as a JSON report
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Ask a question about the orders
    Ask {
        #[arg(value_name = "QUERY")]
        query: String,

        /// Number of matching orders to use
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Answer from the local summary only
        #[arg(long, default_value_t = false)]
        no_llm: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/liveops.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("liveops.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    }
    .with_env()?;

    let provider = CsvDatasetProvider::new(&cli.data_dir);

    match cli.command {
        Commands::Stats => {
            let dataset = provider.load_orders()?;
            let stats = DatasetStats::from_dataset(&dataset, settings.detection.low_rating_max);

            info!(
                total_orders = stats.total_orders,
                low_rating_orders = stats.low_rating_orders,
                low_rating_pct = %format!("{:.1}", stats.low_rating_pct()),
                delayed_orders = stats.delayed_orders,
                delayed_pct = %format!("{:.1}", stats.delayed_pct()),
                avg_total_cost = %format!("{:.2}", stats.avg_total_cost),
                "Dataset KPIs"
            );
        }
        Commands::Detect {
            delay_threshold,
            incidents,
            plans,
            json,
        } => {
            let mut detection = settings.detection;
            if let Some(threshold) = delay_threshold {
                detection.delay_threshold_days = threshold;
            }

            let dataset = provider.load_orders()?;
            let fleet = provider.load_fleet()?;

            let mut detector = IncidentDetector::new(&dataset, detection);
            let flagged = detector.run().as_slice().to_vec();
            let response_plans = ResponsePlanner::new(&fleet).plan_response(&flagged);

            write_incidents(&incidents, &flagged)?;
            write_plans(&plans, &response_plans)?;
            info!(
                incidents = flagged.len(),
                plans = response_plans.len(),
                incidents_path = %incidents.display(),
                plans_path = %plans.display(),
                "Detection run written"
            );

            if json {
                let stats = DatasetStats::from_dataset(&dataset, detection.low_rating_max);
                print_json(&DetectionReport::new(&stats, &flagged, &response_plans))?;
            }
        }
        Commands::Ask {
            query,
            top_k,
            no_llm,
        } => {
            let dataset = provider.load_orders()?;
            let index = RetrievalIndex::build(&dataset, &settings.retrieval);
            let retrieved = index.retrieve(&query, top_k.unwrap_or(settings.retrieval.top_k));

            for hit in &retrieved {
                info!(
                    order_id = %hit.order.order_id,
                    score = %format!("{:.3}", hit.score),
                    "Match"
                );
            }

            let generator =
                answer_generator(&settings).with_preview_chars(settings.retrieval.preview_chars);
            let answer = generator.generate_answer(&query, &retrieved, !no_llm).await;

            info!(used_llm = answer.used_llm, "Answer ready");
            println!("{}", answer.text);
        }
    }

    Ok(())
}

/// Uses Gemini when an API key is configured, otherwise the local summary.
fn answer_generator(settings: &Settings) -> AnswerGenerator {
    match GeminiClient::from_config(&settings.synthesis) {
        Ok(Some(client)) => AnswerGenerator::new(Box::new(client), settings.synthesis.timeout()),
        Ok(None) => {
            info!("GEMINI_API_KEY not set, answering locally");
            AnswerGenerator::local_only()
        }
        Err(e) => {
            warn!(error = %e, "Could not build Gemini client, answering locally");
            AnswerGenerator::local_only()
        }
    }
}
