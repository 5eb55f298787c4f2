//! Source management commands.

use anyhow::{anyhow, bail};
use console::style;

use crate::cli::helpers::{open_gateway, truncate};
use crate::config::Settings;
use crate::llm::PromptStore;
use crate::models::{AreaName, DataFormat, OrganizationType, Source};
use crate::repository::PersistenceGateway;

pub struct NewSourceArgs {
    pub name: String,
    pub prompt_key: String,
    pub url: String,
    pub id: Option<i32>,
    pub url2: Option<String>,
    pub organization: Option<String>,
    pub format: Option<String>,
    pub area: Option<String>,
    pub description: String,
}

/// Register a new source.
pub async fn cmd_source_add(settings: &Settings, args: NewSourceArgs) -> anyhow::Result<()> {
    let gateway = open_gateway(settings)?;

    url::Url::parse(&args.url).map_err(|e| anyhow!("Invalid URL '{}': {}", args.url, e))?;
    if args.prompt_key.trim().is_empty() {
        bail!("Prompt key must not be empty");
    }

    let existing = gateway.list_sources().await?;
    if existing.iter().any(|s| s.prompt_key == args.prompt_key) {
        bail!("Prompt key '{}' is already used", args.prompt_key);
    }
    let id = match args.id {
        Some(id) => {
            if existing.iter().any(|s| s.id == id) {
                bail!("Source {} already exists", id);
            }
            id
        }
        None => existing.iter().map(|s| s.id).max().unwrap_or(0) + 1,
    };

    let mut source = Source::new(id, args.name, args.prompt_key, args.url);
    source.url2 = args.url2;
    source.description = args.description;
    if let Some(org) = args.organization {
        source.organization_type = OrganizationType::from_str(&org)
            .ok_or_else(|| anyhow!("Unknown organization type '{}'", org))?;
    }
    if let Some(format) = args.format {
        source.data_format = DataFormat::from_str(&format)
            .ok_or_else(|| anyhow!("Unknown data format '{}'", format))?;
    }
    if let Some(area) = args.area {
        source.area =
            Some(AreaName::from_str(&area).ok_or_else(|| anyhow!("Unknown area '{}'", area))?);
    }

    gateway.add_source(&source).await?;

    println!(
        "{} Added source {}: {}",
        style("✓").green(),
        source.id,
        source.name
    );
    let prompt_path = PromptStore::new(&settings.prompts_dir).site_path(&source);
    if !prompt_path.exists() {
        println!(
            "  {} Create {} before syncing this source",
            style("!").yellow(),
            prompt_path.display()
        );
    }

    Ok(())
}

/// List configured sources.
pub async fn cmd_source_list(settings: &Settings) -> anyhow::Result<()> {
    let gateway = open_gateway(settings)?;
    let sources = gateway.list_sources().await?;

    if sources.is_empty() {
        println!(
            "{} No sources configured. Add one with 'trailsync source add'.",
            style("!").yellow()
        );
        return Ok(());
    }

    println!("\n{}", style("Sources").bold());
    println!("{}", "-".repeat(72));
    println!(
        "{:<5} {:<26} {:<20} {:<8} Last Checked",
        "ID", "Name", "Prompt Key", "Format"
    );
    println!("{}", "-".repeat(72));

    for source in sources {
        let last_checked = source
            .last_checked_at
            .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "Never".to_string());

        println!(
            "{:<5} {:<26} {:<20} {:<8} {}",
            source.id,
            truncate(&source.name, 25),
            truncate(&source.prompt_key, 19),
            source.data_format.as_str(),
            last_checked
        );
    }

    Ok(())
}

/// Show one source with its stored record count.
pub async fn cmd_source_show(settings: &Settings, id: i32) -> anyhow::Result<()> {
    let gateway = open_gateway(settings)?;
    let Some(source) = gateway.get_source(id).await? else {
        println!("{} Source {} not found", style("✗").red(), id);
        return Ok(());
    };
    let records = gateway.load_records(id).await?;
    let prompt_path = PromptStore::new(&settings.prompts_dir).site_path(&source);

    let format_time = |dt: Option<chrono::DateTime<chrono::Utc>>| {
        dt.map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "Never".to_string())
    };

    println!("\n{} {}", style(source.id).bold(), style(&source.name).bold());
    println!("  Organization:  {}", source.organization_type.as_str());
    println!("  URL:           {}", source.url1);
    if let Some(ref url2) = source.url2 {
        println!("  URL 2:         {}", url2);
    }
    println!("  Format:        {}", source.data_format.as_str());
    if let Some(area) = source.area {
        println!("  Area:          {}", area.label());
    }
    println!(
        "  Prompt file:   {}{}",
        prompt_path.display(),
        if prompt_path.exists() { "" } else { " (missing)" }
    );
    println!(
        "  Content hash:  {}",
        source
            .content_hash
            .as_deref()
            .map(|h| &h[..h.len().min(16)])
            .unwrap_or("-")
    );
    println!("  Last scraped:  {}", format_time(source.last_scraped_at));
    println!("  Last checked:  {}", format_time(source.last_checked_at));
    println!("  Records:       {}", records.len());
    if !source.description.is_empty() {
        println!("\n  {}", source.description);
    }

    Ok(())
}
