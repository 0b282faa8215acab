mod args;
mod config;

use std::io;

use args::Command;
use router_app::{LedgerSnapshot, RouterApp};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let args = args::parse_args().map_err(|err| {
        eprintln!("{err}");
        args::print_help();
        io::Error::new(io::ErrorKind::InvalidInput, "invalid arguments")
    })?;

    let loaded = config::load(args.config)?;
    match &loaded.file {
        Some(file) => tracing::debug!(config = %file.display(), "loaded config"),
        None => tracing::debug!("no config file found, using defaults"),
    }

    let app = RouterApp::open(loaded.config)?;
    tracing::debug!(ledger = %app.ledger_path.display(), "ledger opened");
    let service = app.ledger_service();

    match args.command {
        Command::Status { json } => {
            let snapshot = service.snapshot()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&snapshot)?);
            } else {
                print_status(&app, &snapshot);
            }
        }
        Command::Candidates { workflow, hint } => {
            for candidate in app.candidates(&workflow, hint.as_deref()) {
                let model = candidate?;
                println!(
                    "{}\t{}\t{}\tweight={}",
                    model.name,
                    model.provider,
                    model.model_id,
                    model.routing_for(&workflow).weight
                );
            }
        }
        Command::ResetSpend { model } => {
            let cleared = service.reset_spend(model.as_deref())?;
            println!("Cleared spend for {cleared} model(s).");
        }
        Command::ResetLatency { model } => {
            let cleared = service.reset_latency(model.as_deref())?;
            println!("Cleared latency for {cleared} model(s).");
        }
        Command::ClearCache => {
            let cleared = service.clear_cache()?;
            println!("Removed {cleared} cache entries.");
        }
        Command::ClearInflight { cache_key } => {
            let cleared = service.clear_inflight(cache_key.as_deref())?;
            println!("Removed {cleared} inflight entries.");
        }
    }

    Ok(())
}

fn print_status(app: &RouterApp, snapshot: &LedgerSnapshot) {
    println!("Ledger: {}", app.ledger_path.display());
    if snapshot.models.is_empty() {
        println!("No models configured.");
    }
    for status in &snapshot.models {
        println!(
            "{:<24} spend {:>10} latency {:>12} cache {:>6} {}",
            status.name,
            format_limit(Some(status.spend), status.spend_ceiling, 4),
            format_limit(status.last_latency_ms, status.latency_threshold_ms, 0),
            status.cache_entries,
            if status.eligible { "eligible" } else { "excluded" }
        );
    }
    println!(
        "Cache entries: {}  Inflight: {}",
        snapshot.cache_entries,
        snapshot.inflight.len()
    );
}

fn format_limit(value: Option<f64>, limit: Option<f64>, precision: usize) -> String {
    let value = value.map_or_else(|| "-".to_string(), |value| format!("{value:.precision$}"));
    match limit {
        Some(limit) => format!("{value}/{limit:.precision$}"),
        None => value,
    }
}
