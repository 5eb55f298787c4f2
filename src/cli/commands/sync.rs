//! Sync command: fetch, extract, reconcile, commit.

use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;

use crate::cli::helpers::{confirm, open_gateway, truncate};
use crate::config::{Config, Settings};
use crate::http_client::ContentFetcher;
use crate::llm::{HttpBackendFactory, ModelId, PromptStore};
use crate::models::{DataFormat, Source};
use crate::repository::PersistenceGateway;
use crate::services::{
    Notifier, PipelineEvent, Preview, RecordReconciler, SourcePipeline, SourceStatus, SyncRunner,
};

pub struct SyncOptions {
    pub source_id: Option<i32>,
    pub model: Option<ModelId>,
    pub dry_run: bool,
    pub force: bool,
    pub yes: bool,
}

pub async fn cmd_sync(settings: &Settings, config: &Config, opts: SyncOptions) -> anyhow::Result<()> {
    let gateway = Arc::new(open_gateway(settings)?);

    let sources = match opts.source_id {
        Some(id) => {
            let source = gateway
                .get_source(id)
                .await?
                .ok_or_else(|| anyhow!("Source {} not found", id))?;
            println!("Source: {}", source.name);
            vec![source]
        }
        None => gateway.list_sources().await?,
    };

    let (sources, skipped) = partition_by_format(sources);
    for source in &skipped {
        println!(
            "{} Skipping {} ({} sources are not scraped as pages)",
            style("!").yellow(),
            source.name,
            source.data_format.as_str()
        );
    }
    if opts.source_id.is_none() {
        println!("Processing all sources: {}", sources.len());
    }

    if sources.is_empty() {
        if skipped.is_empty() {
            println!(
                "{} No sources configured. Add one with 'trailsync source add'.",
                style("!").yellow()
            );
        }
        return Ok(());
    }

    if opts.force && !opts.yes {
        println!(
            "{} --force re-extracts {} source(s) even if unchanged; every call is billed.",
            style("!").yellow(),
            sources.len()
        );
        if !confirm("Proceed?")? {
            println!("{} Cancelled", style("!").yellow());
            return Ok(());
        }
    }

    if opts.dry_run {
        println!(
            "{} Dry run: nothing will be written",
            style("!").yellow()
        );
    }

    let fetcher = Arc::new(ContentFetcher::new(
        settings.user_agent.as_deref(),
        Duration::from_secs(settings.request_timeout),
    )?);
    let backends = Arc::new(HttpBackendFactory::new(config.llm.clone())?);
    let prompts = PromptStore::new(&settings.prompts_dir);

    let (tx, rx) = mpsc::channel(64);
    let progress = tokio::spawn(show_progress(rx, sources.len() as u64));

    let results = SourcePipeline::new(fetcher, backends, prompts, config.llm.clone())
        .with_force(opts.force)
        .with_events(tx)
        .run(sources, opts.model)
        .await;
    let _ = progress.await;

    let notifier = Notifier::new(settings.webhook_url.clone());
    let mut runner = SyncRunner::new(gateway, RecordReconciler::new(config.reconcile.clone()))
        .with_dry_run(opts.dry_run);
    if !opts.dry_run {
        runner = runner.with_notifier(notifier);
    }
    let report = runner.apply(results).await;

    for preview in &report.previews {
        print_preview(preview);
    }

    println!("\n{}", "=".repeat(50));
    println!("{}", style("Summary").bold());
    println!("{}", "=".repeat(50));
    for entry in report.summary.reports() {
        let line = entry.to_string();
        match entry.status {
            SourceStatus::Success { .. } => println!("{}", style(line).green()),
            SourceStatus::Skipped { .. } => println!("{}", style(line).yellow()),
            SourceStatus::Error { .. } => println!("{}", style(line).red()),
        }
    }
    println!("\n{}", report.summary.totals());

    Ok(())
}

/// Split sources into those the page pipeline handles and the rest.
///
/// Only [`DataFormat::Web`] sources are fetched and extracted.
fn partition_by_format(sources: Vec<Source>) -> (Vec<Source>, Vec<Source>) {
    sources
        .into_iter()
        .partition(|source| source.data_format == DataFormat::Web)
}

async fn show_progress(mut rx: mpsc::Receiver<PipelineEvent>, total: u64) {
    let pb = ProgressBar::new(total);
    if let Ok(progress_style) =
        ProgressStyle::default_bar().template("{spinner:.green} [{bar:30.cyan/blue}] {pos}/{len} {wide_msg}")
    {
        pb.set_style(progress_style.progress_chars("█▓░"));
    }
    pb.enable_steady_tick(Duration::from_millis(120));

    while let Some(event) = rx.recv().await {
        match event {
            PipelineEvent::Started { name, .. } => pb.set_message(truncate(&name, 40)),
            PipelineEvent::Fetched { .. } => {}
            PipelineEvent::Finished { .. } => pb.inc(1),
        }
    }
    pb.finish_and_clear();
}

fn print_preview(preview: &Preview) {
    let rec = &preview.reconciliation;
    println!(
        "\n{} {}: {} update(s), {} create(s), {} unchanged",
        style("→").cyan(),
        preview.source.name,
        rec.to_update.len(),
        rec.to_create.len(),
        rec.unchanged_count()
    );
    for record in &rec.to_update {
        println!(
            "  {} #{} {} / {}: {} [{}]",
            style("~").yellow(),
            record.id.unwrap_or_default(),
            record.mountain_name_raw,
            record.trail_name,
            record.title,
            record.status.as_str()
        );
    }
    for record in &rec.to_create {
        println!(
            "  {} {} / {}: {} [{}]",
            style("+").green(),
            record.mountain_name_raw,
            record.trail_name,
            record.title,
            record.status.as_str()
        );
    }
    for dup in &rec.duplicate_warnings {
        println!(
            "  {} candidate {} also scored {:.3} against record {:?}",
            style("!").yellow(),
            dup.candidate_index,
            dup.score,
            dup.stored_id
        );
    }
}
