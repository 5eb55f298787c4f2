//! Offline reconciliation preview against stored records.

use std::path::Path;

use anyhow::{anyhow, Context};
use chrono::Utc;
use console::style;

use crate::cli::helpers::{open_gateway, truncate};
use crate::config::{Config, Settings};
use crate::llm::schema::parse_response;
use crate::models::{CandidateRecord, GenerationConfig, Provenance};
use crate::repository::PersistenceGateway;
use crate::services::RecordReconciler;

/// Accepts the extraction response shape or a bare array of records.
fn load_candidates(text: &str) -> anyhow::Result<Vec<CandidateRecord>> {
    match parse_response(text) {
        Ok(records) => Ok(records),
        Err(wrapped_err) => serde_json::from_str::<Vec<CandidateRecord>>(text)
            .map_err(|_| anyhow!("Not a candidate file: {}", wrapped_err)),
    }
}

pub async fn cmd_match(
    settings: &Settings,
    config: &Config,
    source_id: i32,
    file: &Path,
) -> anyhow::Result<()> {
    let gateway = open_gateway(settings)?;
    let source = gateway
        .get_source(source_id)
        .await?
        .ok_or_else(|| anyhow!("Source {} not found", source_id))?;

    let text = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let candidates = load_candidates(&text)?;
    let stored = gateway.load_records(source_id).await?;

    let provenance = Provenance {
        ai_model: "manual".to_string(),
        prompt_file: file.display().to_string(),
        config: GenerationConfig::default(),
    };
    let mut reconciler = RecordReconciler::new(config.reconcile.clone());
    let result = reconciler.reconcile(&source, &stored, &candidates, &provenance, Utc::now());

    println!(
        "\n{} {} candidate(s) against {} stored record(s) of {} (threshold {:.2})",
        style("→").cyan(),
        candidates.len(),
        stored.len(),
        source.name,
        reconciler.config().threshold
    );

    for pair in &result.matches {
        let candidate = &candidates[pair.candidate_index];
        let record = &stored[pair.stored_index];
        let detail = reconciler.score(record, candidate);
        let marker = if pair.changed {
            style("~").yellow()
        } else {
            style("=").dim()
        };
        println!(
            "  {} [{}] → #{} {:.3} (mountain {:.2}, trail {:.2}, title {:.2}, description {})",
            marker,
            pair.candidate_index,
            pair.stored_id.unwrap_or_default(),
            pair.score,
            detail.mountain,
            detail.trail,
            detail.title,
            detail
                .description
                .map(|d| format!("{:.2}", d))
                .unwrap_or_else(|| "-".to_string())
        );
        println!(
            "      {} / {}: {}",
            candidate.mountain_name_raw,
            candidate.trail_name,
            truncate(&candidate.title, 40)
        );
    }

    for record in &result.to_create {
        println!(
            "  {} {} / {}: {}",
            style("+").green(),
            record.mountain_name_raw,
            record.trail_name,
            truncate(&record.title, 40)
        );
    }
    for dup in &result.duplicate_warnings {
        println!(
            "  {} [{}] also scored {:.3} against #{} (claimed by [{}])",
            style("!").yellow(),
            dup.candidate_index,
            dup.score,
            dup.stored_id.unwrap_or_default(),
            dup.claimed_by
        );
    }

    println!(
        "\n{} update(s), {} create(s), {} unchanged. Nothing was written.",
        result.to_update.len(),
        result.to_create.len(),
        result.unchanged_count()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_candidates_accepts_both_shapes() {
        let wrapped = r#"{"trail_condition_records": [
            {"trail_name": "鴨沢コース", "title": "通行止め", "status": "CLOSURE", "area": "OKUTAMA"}
        ]}"#;
        assert_eq!(load_candidates(wrapped).unwrap().len(), 1);

        let bare = r#"[
            {"trail_name": "鴨沢コース", "title": "通行止め", "status": "CLOSURE", "area": "OKUTAMA"},
            {"trail_name": "三条の湯コース", "title": "倒木", "status": "HAZARD", "area": "OKUTAMA"}
        ]"#;
        assert_eq!(load_candidates(bare).unwrap().len(), 2);

        assert!(load_candidates("{}").is_err());
    }
}
