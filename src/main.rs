//! Salvor - forensic file recovery for block storage devices.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use humansize::{format_size, BINARY};
use tracing_subscriber::EnvFilter;

use salvor::cli::{
    carving_mode_override, records_from_manifest, Cli, Commands, ProgressReporter,
};
use salvor::{Extractor, Orchestrator, RawDevice, ScanOptions, SignatureRegistry, Strategy};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.debug {
        "salvor=debug"
    } else if cli.verbose {
        "salvor=info"
    } else {
        "salvor=warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .init();

    match cli.command {
        Commands::Scan {
            device,
            output,
            strategy,
            preset,
            types,
            index_only,
            write,
        } => {
            let strategy = strategy.to_strategy(preset, types);
            let options = ScanOptions {
                output_dir: output,
                carving_mode: carving_mode_override(index_only, write),
                ..Default::default()
            };
            run_scan(&device, strategy, options).await?;
        }

        Commands::Recover {
            manifest,
            output,
            types,
            flat,
            no_verify,
        } => {
            run_recover(&manifest, &output, types, flat, no_verify)?;
        }

        Commands::ListSignatures => list_signatures(),

        Commands::Info { device } => show_device_info(&device)?,
    }

    Ok(())
}

async fn run_scan(device: &str, strategy: Strategy, options: ScanOptions) -> Result<()> {
    println!("\nSalvor File Recovery\n");
    println!("Target:   {device}");
    println!("Strategy: {}", strategy.name());
    println!("Output:   {}\n", options.output_dir.display());

    let orchestrator = Orchestrator::new();
    let reporter = ProgressReporter::for_scan();
    orchestrator.subscribe(reporter.event_callback());

    let job_id = orchestrator.start_scan(device, strategy, options);

    // Ctrl+C requests cancellation; the job winds down at its next yield
    // point and keeps its partial results.
    {
        let orchestrator = orchestrator.clone();
        let job_id = job_id.clone();
        ctrlc::set_handler(move || {
            eprintln!("\nStopping scan (partial results are kept)...");
            let _ = orchestrator.cancel(&job_id);
        })
        .context("failed to install Ctrl+C handler")?;
    }

    let snapshot = orchestrator.wait(&job_id).await?;
    reporter.set_position(snapshot.progress_percent as u64);
    reporter.finish("Scan finished");

    let records = orchestrator.results(&job_id)?;
    let result = orchestrator.result(&job_id)?;

    println!("\nStatus:      {:?}", snapshot.status);
    if let Some(error) = &snapshot.error {
        println!("Error:       {error}");
    }
    if let Some(result) = result {
        println!("Duration:    {:.1}s", result.duration_seconds);
        println!("Scanned:     {}", format_size(result.bytes_scanned, BINARY));
        println!(
            "Files found: {} ({} partial)",
            result.total_files, result.partial_files
        );
        for (extension, count) in &result.per_extension {
            println!("  {extension:>8}: {count}");
        }
    }
    if records.is_empty() {
        println!("\nNo recoverable files were found.");
    }

    Ok(())
}

fn run_recover(
    manifest_path: &std::path::Path,
    output: &std::path::Path,
    types: Option<Vec<String>>,
    flat: bool,
    no_verify: bool,
) -> Result<()> {
    let raw = std::fs::read(manifest_path)
        .with_context(|| format!("cannot read manifest {}", manifest_path.display()))?;
    let manifest: serde_json::Value =
        serde_json::from_slice(&raw).context("manifest is not valid JSON")?;

    let mut records = records_from_manifest(&manifest);
    if let Some(types) = types {
        let wanted: Vec<String> = types.iter().map(|t| t.to_ascii_lowercase()).collect();
        records.retain(|r| wanted.contains(&r.extension));
    }
    if records.is_empty() {
        println!("Nothing to recover.");
        return Ok(());
    }

    println!(
        "\nRecovering {} files to {}\n",
        records.len(),
        output.display()
    );

    let reporter = ProgressReporter::for_recovery(records.len() as u64);
    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = Arc::clone(&cancel);
        ctrlc::set_handler(move || {
            eprintln!("\nStopping recovery...");
            cancel.store(true, std::sync::atomic::Ordering::SeqCst);
        })
        .context("failed to install Ctrl+C handler")?;
    }

    let extractor = Extractor::new(!flat, !no_verify);
    let outcome = extractor.recover(&records, output, &cancel, |done, _, _| {
        reporter.set_position(done as u64);
    });
    reporter.finish("Recovery finished");

    println!("\nRecovered: {}", outcome.recovered);
    println!("Failed:    {}", outcome.failed);
    println!("Bytes:     {}", format_size(outcome.total_bytes, BINARY));
    for failure in &outcome.failures {
        println!("  {} -> {}", failure.filename, failure.reason.as_str());
    }

    Ok(())
}

fn list_signatures() {
    println!("\nSupported file signatures\n");
    for sig in SignatureRegistry::global().entries() {
        let header = sig
            .header
            .map(hex::encode_upper)
            .unwrap_or_else(|| "-".to_string());
        let footer = sig
            .footer
            .map(hex::encode_upper)
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {:>8} .{:<5} header {:<24} footer {:<18} {}",
            sig.id,
            sig.extension,
            header,
            footer,
            if sig.important { "important" } else { "" }
        );
    }
}

fn show_device_info(device: &str) -> Result<()> {
    let handle =
        RawDevice::open(device).context("failed to open device (try elevated privileges)")?;

    println!("\nDevice information\n");
    println!("  Identifier: {}", handle.identifier());
    println!("  Raw path:   {}", handle.canonical_path());
    println!("  Mode:       {:?}", handle.mode());
    println!("  Sector:     {} bytes", handle.sector_size());
    match handle.size() {
        Some(size) => println!("  Size:       {} ({size} bytes)", format_size(size, BINARY)),
        None => println!("  Size:       unknown"),
    }
    Ok(())
}
