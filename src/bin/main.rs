//! kafkascope CLI - inspect catalog templates and built queries
//!
//! Usage:
//!   kafkascope catalog [--provider <provider>]
//!   kafkascope query --provider <provider> --metric <metric> [--cluster <name>]...
//!
//! Examples:
//!   kafkascope catalog --provider aws-msk
//!   kafkascope query --provider confluent --metric cluster-health --cluster lkc-1
//!   kafkascope query --provider aws-msk --metric bytes-in-per-sec --since 6h
//!
//! Nothing is executed: the CLI prints NRQL only.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use kafkascope::builder::build;
use kafkascope::catalog::{Catalog, MetricId, Template};
use kafkascope::config::Settings;
use kafkascope::filter::{transform, FilterRegistry, QueryPurpose, Selections};
use kafkascope::nrql::TimeWindow;
use kafkascope::schema::Provider;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "kafkascope")]
#[command(about = "kafkascope - Kafka health queries for AWS MSK and Confluent Cloud")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List catalog templates
    Catalog {
        /// Only list this provider's templates
        #[arg(short, long)]
        provider: Option<Provider>,

        /// Print each template's NRQL
        #[arg(short, long)]
        verbose: bool,
    },

    /// Build the query for one metric
    Query {
        /// Telemetry provider (aws-msk, confluent-cloud)
        #[arg(short, long)]
        provider: Provider,

        /// Catalog metric (e.g. cluster-health)
        #[arg(short, long)]
        metric: MetricId,

        /// Restrict to these clusters
        #[arg(long = "cluster")]
        clusters: Vec<String>,

        /// Restrict to these topics
        #[arg(long = "topic")]
        topics: Vec<String>,

        /// Free-text entity search
        #[arg(long)]
        search: Option<String>,

        /// Time window such as 30m or 6h
        #[arg(long)]
        since: Option<TimeWindow>,

        /// Bound subqueries to this page size instead of LIMIT MAX
        #[arg(long)]
        display: Option<u64>,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let settings = match Settings::load() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Commands::Catalog { provider, verbose } => cmd_catalog(provider, verbose),
        Commands::Query {
            provider,
            metric,
            clusters,
            topics,
            search,
            since,
            display,
        } => {
            let selections = Selections {
                provider: Some(provider),
                clusters,
                topics,
                search,
                ..Default::default()
            };
            let purpose = match display {
                Some(page_size) => QueryPurpose::Display { page_size },
                None => QueryPurpose::Aggregation,
            };
            let window = since.unwrap_or_else(|| settings.query.default_window());
            cmd_query(provider, metric, &selections, purpose, window)
        }
    }
}

fn cmd_catalog(provider: Option<Provider>, verbose: bool) -> ExitCode {
    let catalog = Catalog::standard();
    let providers = match provider {
        Some(p) => vec![p],
        None => Provider::ALL.to_vec(),
    };

    for provider in providers {
        println!("{}:", provider);
        for metric in catalog.metrics(provider) {
            let Ok(template) = catalog.build_template(provider, metric) else {
                continue;
            };
            print_template(template, verbose);
        }
        println!();
    }
    ExitCode::SUCCESS
}

fn print_template(template: &Template, verbose: bool) {
    println!(
        "  - {} ({}, {:?}, {:?}, nesting {})",
        template.metric,
        template.entity_type,
        template.shape,
        template.data_class,
        template.nesting
    );
    if verbose {
        println!("      {}", template.to_nrql());
    }
}

fn cmd_query(
    provider: Provider,
    metric: MetricId,
    selections: &Selections,
    purpose: QueryPurpose,
    window: TimeWindow,
) -> ExitCode {
    let catalog = Catalog::standard();
    let template = match catalog.build_template(provider, metric) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let registry = FilterRegistry::standard();
    let normalized = registry.normalize(&selections.to_raw());
    for warning in &normalized.warnings {
        eprintln!("warning: {}", warning);
    }

    let predicates = match transform(&normalized.specs, provider, template.entity_type, purpose) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Filter error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match build(template, &predicates, None, Some(window)) {
        Ok(built) => {
            println!("{}", built.nrql);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Build error: {}", e);
            ExitCode::FAILURE
        }
    }
}
