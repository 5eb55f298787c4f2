//! Initialize command.

use console::style;

use crate::config::Settings;
use crate::llm::prompts::TEMPLATE_FILENAME;
use crate::repository::{run_migrations, AsyncSqlitePool};

/// Create the data directory and database schema.
pub async fn cmd_init(settings: &Settings) -> anyhow::Result<()> {
    settings.ensure_directories()?;

    let pool = AsyncSqlitePool::new(&settings.database_url());
    run_migrations(&pool).await?;

    let template = settings.prompts_dir.join(TEMPLATE_FILENAME);
    if !template.exists() {
        println!(
            "{} No {} in {}",
            style("!").yellow(),
            TEMPLATE_FILENAME,
            settings.prompts_dir.display()
        );
        println!("  Add a template prompt and one prompt file per source before syncing");
    }

    println!(
        "{} Initialized trailsync in {}",
        style("✓").green(),
        settings.data_dir.display()
    );

    Ok(())
}
