//! End-of-run summary: one line per source plus aggregate totals.

use std::fmt;

/// What happened to one source during a run.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceStatus {
    Success {
        /// Records the model extracted.
        extracted: usize,
        updated: usize,
        created: usize,
        cost_usd: f64,
    },
    Skipped {
        reason: String,
    },
    Error {
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceReport {
    pub source_id: i32,
    pub source_name: String,
    pub status: SourceStatus,
}

/// Aggregate counts derived from the reports.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Totals {
    pub success: usize,
    pub skipped: usize,
    pub errors: usize,
    pub extracted: usize,
    pub updated: usize,
    pub created: usize,
    pub cost_usd: f64,
}

/// Collects per-source results in the order sources were processed.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    reports: Vec<SourceReport>,
}

impl RunSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn success(
        &mut self,
        source_id: i32,
        source_name: &str,
        extracted: usize,
        updated: usize,
        created: usize,
        cost_usd: f64,
    ) {
        self.push(
            source_id,
            source_name,
            SourceStatus::Success {
                extracted,
                updated,
                created,
                cost_usd,
            },
        );
    }

    pub fn skipped(&mut self, source_id: i32, source_name: &str, reason: impl Into<String>) {
        self.push(
            source_id,
            source_name,
            SourceStatus::Skipped {
                reason: reason.into(),
            },
        );
    }

    pub fn error(&mut self, source_id: i32, source_name: &str, message: impl Into<String>) {
        self.push(
            source_id,
            source_name,
            SourceStatus::Error {
                message: message.into(),
            },
        );
    }

    fn push(&mut self, source_id: i32, source_name: &str, status: SourceStatus) {
        // A source reported twice keeps only its latest status
        self.reports.retain(|r| r.source_id != source_id);
        self.reports.push(SourceReport {
            source_id,
            source_name: source_name.to_string(),
            status,
        });
    }

    pub fn reports(&self) -> &[SourceReport] {
        &self.reports
    }

    pub fn has_errors(&self) -> bool {
        self.reports
            .iter()
            .any(|r| matches!(r.status, SourceStatus::Error { .. }))
    }

    /// Totals computed from the per-source reports.
    pub fn totals(&self) -> Totals {
        self.reports
            .iter()
            .fold(Totals::default(), |mut totals, report| {
                match &report.status {
                    SourceStatus::Success {
                        extracted,
                        updated,
                        created,
                        cost_usd,
                    } => {
                        totals.success += 1;
                        totals.extracted += extracted;
                        totals.updated += updated;
                        totals.created += created;
                        totals.cost_usd += cost_usd;
                    }
                    SourceStatus::Skipped { .. } => totals.skipped += 1,
                    SourceStatus::Error { .. } => totals.errors += 1,
                }
                totals
            })
    }
}

impl fmt::Display for SourceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.status {
            SourceStatus::Success {
                extracted,
                updated,
                created,
                cost_usd,
            } => write!(
                f,
                "✅ {}: {} record(s), {} updated, {} created (${:.4})",
                self.source_name, extracted, updated, created, cost_usd
            ),
            SourceStatus::Skipped { reason } => {
                write!(f, "⏭️  {}: {}", self.source_name, reason)
            }
            SourceStatus::Error { message } => write!(f, "❌ {}: {}", self.source_name, message),
        }
    }
}

impl fmt::Display for Totals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Success: {}, skipped: {}, errors: {}\nExtracted: {}, updated: {}, created: {}, cost: ${:.4}",
            self.success,
            self.skipped,
            self.errors,
            self.extracted,
            self.updated,
            self.created,
            self.cost_usd
        )
    }
}
