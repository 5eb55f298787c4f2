//! Source models for monitored trail-information sites.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::AreaName;

/// Kind of organization publishing a source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrganizationType {
    Municipality,
    PoliceFire,
    Government,
    OfficialDeps,
    #[default]
    Association,
    MountainHut,
    #[serde(rename = "SNS")]
    Sns,
    Other,
}

impl OrganizationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Municipality => "MUNICIPALITY",
            Self::PoliceFire => "POLICE_FIRE",
            Self::Government => "GOVERNMENT",
            Self::OfficialDeps => "OFFICIAL_DEPS",
            Self::Association => "ASSOCIATION",
            Self::MountainHut => "MOUNTAIN_HUT",
            Self::Sns => "SNS",
            Self::Other => "OTHER",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "MUNICIPALITY" => Some(Self::Municipality),
            "POLICE_FIRE" => Some(Self::PoliceFire),
            "GOVERNMENT" => Some(Self::Government),
            "OFFICIAL_DEPS" => Some(Self::OfficialDeps),
            "ASSOCIATION" => Some(Self::Association),
            "MOUNTAIN_HUT" => Some(Self::MountainHut),
            "SNS" => Some(Self::Sns),
            "OTHER" => Some(Self::Other),
            _ => None,
        }
    }
}

/// How a source publishes its information.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DataFormat {
    /// Regular web page, scraped as a whole.
    #[default]
    Web,
    /// Patrol blog.
    Blog,
}

impl DataFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Web => "WEB",
            Self::Blog => "BLOG",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "WEB" => Some(Self::Web),
            "BLOG" => Some(Self::Blog),
            _ => None,
        }
    }
}

/// A monitored information origin.
///
/// The identifier scopes reconciliation: stored records are only ever
/// matched against candidates extracted from the same source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    /// Stable numeric identifier.
    pub id: i32,
    /// Display name of the publishing organization.
    pub name: String,
    pub organization_type: OrganizationType,
    /// Selects the extraction prompt file (unique across sources).
    pub prompt_key: String,
    /// Primary URL that gets fetched.
    pub url1: String,
    /// Optional secondary URL (shown to readers, not fetched).
    pub url2: Option<String>,
    pub description: String,
    pub data_format: DataFormat,
    pub area: Option<AreaName>,
    /// Hash of the link-stripped readable text seen on the last change.
    pub content_hash: Option<String>,
    /// When content last changed and was extracted.
    pub last_scraped_at: Option<DateTime<Utc>>,
    /// When the site was last visited, changed or not.
    pub last_checked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Source {
    /// Create a new, never-checked source.
    pub fn new(id: i32, name: String, prompt_key: String, url1: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            name,
            organization_type: OrganizationType::default(),
            prompt_key,
            url1,
            url2: None,
            description: String::new(),
            data_format: DataFormat::default(),
            area: None,
            content_hash: None,
            last_scraped_at: None,
            last_checked_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Site-specific prompt filename: `{id:03}_{prompt_key}.yaml`.
    pub fn prompt_filename(&self) -> String {
        format!("{:03}_{}.yaml", self.id, self.prompt_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_filename_is_zero_padded() {
        let source = Source::new(
            7,
            "奥多摩ビジターセンター".to_string(),
            "okutama_vc".to_string(),
            "https://example.jp/".to_string(),
        );
        assert_eq!(source.prompt_filename(), "007_okutama_vc.yaml");

        let source = Source::new(123, "x".to_string(), "hut".to_string(), String::new());
        assert_eq!(source.prompt_filename(), "123_hut.yaml");
    }

    #[test]
    fn test_enum_round_trip_strings() {
        assert_eq!(
            OrganizationType::from_str("mountain_hut"),
            Some(OrganizationType::MountainHut)
        );
        assert_eq!(OrganizationType::Sns.as_str(), "SNS");
        assert_eq!(DataFormat::from_str("blog"), Some(DataFormat::Blog));
        assert_eq!(DataFormat::from_str("rss"), None);
    }
}
