//! Shared helper functions for CLI commands.

use std::io::{self, Write};

use anyhow::bail;

use crate::config::Settings;
use crate::repository::{AsyncSqlitePool, SqliteGateway};

/// Truncate a string to `max_chars` characters, adding an ellipsis.
pub fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let kept: String = s.chars().take(max_chars.saturating_sub(1)).collect();
    format!("{}…", kept)
}

/// Ask a yes/no question on stdin. Anything but "y" declines.
pub fn confirm(prompt: &str) -> io::Result<bool> {
    print!("\n{} [y/N] ", prompt);
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case("y"))
}

/// Open the database, refusing to create it implicitly.
pub fn open_gateway(settings: &Settings) -> anyhow::Result<SqliteGateway> {
    if !settings.database_exists() {
        bail!(
            "Database not found at {}. Run 'trailsync init' first.",
            settings.database_url()
        );
    }
    let pool = AsyncSqlitePool::new(&settings.database_url());
    Ok(SqliteGateway::new(pool))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_counts_chars() {
        assert_eq!(truncate("奥多摩ビジターセンター", 5), "奥多摩ビ…");
        assert_eq!(truncate("short", 10), "short");
    }
}
