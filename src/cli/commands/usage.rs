//! LLM usage report.

use console::style;

use crate::cli::helpers::open_gateway;
use crate::config::Settings;
use crate::repository::PersistenceGateway;

pub async fn cmd_usage(settings: &Settings, source_id: Option<i32>, limit: i64) -> anyhow::Result<()> {
    let gateway = open_gateway(settings)?;
    let rows = gateway.list_usage(source_id, limit.max(0)).await?;

    if rows.is_empty() {
        println!("{} No usage recorded yet", style("!").yellow());
        return Ok(());
    }

    println!("\n{}", style("LLM Usage").bold());
    println!("{}", "-".repeat(86));
    println!(
        "{:<17} {:>4} {:<24} {:>9} {:>9} {:>9} {:>5} {:>9}",
        "When", "Src", "Model", "Input", "Thinking", "Output", "Recs", "Cost"
    );
    println!("{}", "-".repeat(86));

    let mut total_cost = 0.0;
    let mut total_tokens = 0i64;
    for row in &rows {
        total_cost += row.cost_usd;
        total_tokens += row.total_tokens();
        println!(
            "{:<17} {:>4} {:<24} {:>9} {:>9} {:>9} {:>5} {:>9}",
            row.created_at.format("%Y-%m-%d %H:%M").to_string(),
            row.source_id,
            row.model,
            row.prompt_tokens,
            row.thinking_tokens,
            row.output_tokens,
            row.conditions_extracted,
            format!("${:.4}", row.cost_usd)
        );
    }

    println!("{}", "-".repeat(86));
    println!(
        "{} call(s), {} tokens, total {}",
        rows.len(),
        total_tokens,
        style(format!("${:.4}", total_cost)).bold()
    );

    Ok(())
}
