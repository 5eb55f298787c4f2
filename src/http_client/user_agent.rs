//! User agent handling for HTTP requests.

pub const USER_AGENT: &str =
    "trailsync/0.4 (trail condition monitor; +https://github.com/trail-condition-portal/trailsync)";

/// Resolve user agent from config value.
/// - None or empty => default trailsync user agent
/// - other => custom user agent string
pub fn resolve_user_agent(config: Option<&str>) -> String {
    match config.map(str::trim) {
        None | Some("") => USER_AGENT.to_string(),
        Some(custom) => custom.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_user_agent_default() {
        assert!(resolve_user_agent(None).starts_with("trailsync/"));
        assert!(resolve_user_agent(Some("  ")).starts_with("trailsync/"));
    }

    #[test]
    fn test_resolve_user_agent_custom() {
        assert_eq!(resolve_user_agent(Some("MyBot/1.0")), "MyBot/1.0");
    }
}
