//! Content-change gating for sources.

use tracing::debug;

/// Whether freshly hashed content differs from what was last seen.
///
/// An absent previous hash always counts as changed (first run).
pub fn has_changed(new_hash: &str, previous_hash: Option<&str>) -> bool {
    match previous_hash {
        None => true,
        Some(previous) => previous != new_hash,
    }
}

/// Outcome of comparing a page hash against a source checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeStatus {
    FirstSeen,
    Changed,
    Unchanged,
    /// Hash comparison bypassed by an operator.
    Forced,
}

impl ChangeStatus {
    /// Whether extraction has to run.
    pub fn needs_extraction(&self) -> bool {
        !matches!(self, Self::Unchanged)
    }

    /// Whether the content actually differs from the checkpoint.
    pub fn content_changed(&self) -> bool {
        matches!(self, Self::FirstSeen | Self::Changed)
    }
}

/// Decides per source whether downstream extraction is needed.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChangeDetector {
    force: bool,
}

impl ChangeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ignore stored hashes and always extract.
    pub fn forced() -> Self {
        Self { force: true }
    }

    pub fn is_forced(&self) -> bool {
        self.force
    }

    pub fn check(&self, new_hash: &str, previous_hash: Option<&str>) -> ChangeStatus {
        let status = match previous_hash {
            None => ChangeStatus::FirstSeen,
            Some(_) if has_changed(new_hash, previous_hash) => ChangeStatus::Changed,
            Some(_) if self.force => ChangeStatus::Forced,
            Some(_) => ChangeStatus::Unchanged,
        };

        match (status, previous_hash) {
            (ChangeStatus::FirstSeen, _) => {
                debug!("First check, hash {}", short(new_hash))
            }
            (ChangeStatus::Changed, Some(previous)) => debug!(
                "Content changed: {} -> {}",
                short(previous),
                short(new_hash)
            ),
            (ChangeStatus::Forced, _) => {
                debug!("Content unchanged ({}), extraction forced", short(new_hash))
            }
            _ => debug!("Content unchanged, hash {}", short(new_hash)),
        }
        status
    }
}

fn short(hash: &str) -> &str {
    hash.get(..8).unwrap_or(hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_previous_hash_is_changed() {
        assert!(has_changed("abc", None));
        assert!(has_changed("", None));
    }

    #[test]
    fn test_equal_hashes_are_unchanged() {
        assert!(!has_changed("abc", Some("abc")));
        assert!(has_changed("abc", Some("abd")));
    }

    #[test]
    fn test_detector_statuses() {
        let detector = ChangeDetector::new();
        assert_eq!(detector.check("h1", None), ChangeStatus::FirstSeen);
        assert_eq!(detector.check("h1", Some("h0")), ChangeStatus::Changed);
        assert_eq!(detector.check("h1", Some("h1")), ChangeStatus::Unchanged);
        assert!(!detector.check("h1", Some("h1")).needs_extraction());
    }

    #[test]
    fn test_forced_detector_extracts_unchanged_content() {
        let detector = ChangeDetector::forced();
        let status = detector.check("h1", Some("h1"));
        assert_eq!(status, ChangeStatus::Forced);
        assert!(status.needs_extraction());
        assert!(!status.content_changed());
        assert_eq!(detector.check("h2", Some("h1")), ChangeStatus::Changed);
    }
}
