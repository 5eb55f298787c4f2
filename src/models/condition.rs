//! Trail condition models: extracted candidates and stored records.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::Source;

/// Kind of condition being reported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusType {
    /// Trail closed to traffic.
    Closure,
    /// Dangerous section (collapse, fallen trees, damaged bridge).
    Hazard,
    Snow,
    Animal,
    Weather,
    Facility,
    Water,
    #[default]
    Other,
}

impl StatusType {
    pub const ALL: [StatusType; 8] = [
        Self::Closure,
        Self::Hazard,
        Self::Snow,
        Self::Animal,
        Self::Weather,
        Self::Facility,
        Self::Water,
        Self::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closure => "CLOSURE",
            Self::Hazard => "HAZARD",
            Self::Snow => "SNOW",
            Self::Animal => "ANIMAL",
            Self::Weather => "WEATHER",
            Self::Facility => "FACILITY",
            Self::Water => "WATER",
            Self::Other => "OTHER",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
    }

    /// Display label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Closure => "通行止め",
            Self::Hazard => "危険箇所",
            Self::Snow => "積雪",
            Self::Animal => "動物出没",
            Self::Weather => "気象",
            Self::Facility => "施設",
            Self::Water => "水場",
            Self::Other => "その他",
        }
    }
}

/// Mountain area classification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AreaName {
    Okutama,
    Chichibu,
    Tanzawa,
    Fuji,
    Yatsugatake,
    Nantaisan,
    Nikko,
    #[default]
    Other,
}

impl AreaName {
    pub const ALL: [AreaName; 8] = [
        Self::Okutama,
        Self::Chichibu,
        Self::Tanzawa,
        Self::Fuji,
        Self::Yatsugatake,
        Self::Nantaisan,
        Self::Nikko,
        Self::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Okutama => "OKUTAMA",
            Self::Chichibu => "CHICHIBU",
            Self::Tanzawa => "TANZAWA",
            Self::Fuji => "FUJI",
            Self::Yatsugatake => "YATSUGATAKE",
            Self::Nantaisan => "NANTAISAN",
            Self::Nikko => "NIKKO",
            Self::Other => "OTHER",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|area| area.as_str().eq_ignore_ascii_case(s))
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Okutama => "奥多摩",
            Self::Chichibu => "奥秩父",
            Self::Tanzawa => "丹沢",
            Self::Fuji => "富士山",
            Self::Yatsugatake => "八ヶ岳",
            Self::Nantaisan => "男体山",
            Self::Nikko => "日光",
            Self::Other => "その他",
        }
    }
}

/// Generation parameters an extraction ran with.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub temperature: f32,
    pub thinking_budget: i32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            thinking_budget: 5000,
        }
    }
}

/// Where a record came from: model, prompt file and generation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub ai_model: String,
    pub prompt_file: String,
    pub config: GenerationConfig,
}

/// A trail condition entry as extracted by the LLM. Transient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRecord {
    /// Trail or section name, verbatim.
    pub trail_name: String,
    /// Mountain name, verbatim or guessed; may be empty.
    #[serde(default)]
    pub mountain_name_raw: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub reported_at: Option<NaiveDate>,
    #[serde(default)]
    pub resolved_at: Option<NaiveDate>,
    pub status: StatusType,
    pub area: AreaName,
    #[serde(default, rename = "reference_URL")]
    pub reference_url: String,
    #[serde(default)]
    pub comment: String,
}

/// A persisted trail condition entry.
///
/// Identity is inferred by similarity, not a natural key; `id` is `None`
/// until the record has been inserted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: Option<i32>,
    pub source_id: i32,
    /// Page the record was extracted from.
    pub url1: String,
    pub trail_name: String,
    pub mountain_name_raw: String,
    pub title: String,
    pub description: String,
    pub reported_at: Option<NaiveDate>,
    pub resolved_at: Option<NaiveDate>,
    pub status: StatusType,
    pub area: AreaName,
    pub reference_url: String,
    pub comment: String,
    pub ai_model: String,
    pub prompt_file: String,
    pub ai_config: GenerationConfig,
    /// Assigned manually by an operator; never set by the pipeline.
    pub mountain_group_id: Option<i32>,
    /// Soft delete / manual override. Disabled rows are never matched.
    pub disabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StoredRecord {
    /// Build a new record from an unmatched candidate.
    ///
    /// Mountain and trail names are stored verbatim, not normalized.
    pub fn from_candidate(
        source: &Source,
        candidate: &CandidateRecord,
        provenance: &Provenance,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: None,
            source_id: source.id,
            url1: source.url1.clone(),
            trail_name: candidate.trail_name.clone(),
            mountain_name_raw: candidate.mountain_name_raw.clone(),
            title: candidate.title.clone(),
            description: candidate.description.clone(),
            reported_at: candidate.reported_at,
            resolved_at: candidate.resolved_at,
            status: candidate.status,
            area: candidate.area,
            reference_url: candidate.reference_url.clone(),
            comment: candidate.comment.clone(),
            ai_model: provenance.ai_model.clone(),
            prompt_file: provenance.prompt_file.clone(),
            ai_config: provenance.config,
            mountain_group_id: None,
            disabled: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether any mutable field differs from the candidate.
    pub fn differs_from(&self, candidate: &CandidateRecord) -> bool {
        self.title != candidate.title
            || self.description != candidate.description
            || self.status != candidate.status
            || self.reported_at != candidate.reported_at
            || self.resolved_at != candidate.resolved_at
    }

    /// Replace mutable fields with the candidate's values and refresh provenance.
    pub fn apply_update(
        &mut self,
        candidate: &CandidateRecord,
        provenance: &Provenance,
        now: DateTime<Utc>,
    ) {
        self.title = candidate.title.clone();
        self.description = candidate.description.clone();
        self.status = candidate.status;
        self.reported_at = candidate.reported_at;
        self.resolved_at = candidate.resolved_at;
        self.ai_model = provenance.ai_model.clone();
        self.prompt_file = provenance.prompt_file.clone();
        self.ai_config = provenance.config;
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate() -> CandidateRecord {
        CandidateRecord {
            trail_name: "鴨沢コース".to_string(),
            mountain_name_raw: "雲取山".to_string(),
            title: "崩落のため通行止め".to_string(),
            description: String::new(),
            reported_at: NaiveDate::from_ymd_opt(2025, 6, 1),
            resolved_at: None,
            status: StatusType::Closure,
            area: AreaName::Okutama,
            reference_url: String::new(),
            comment: String::new(),
        }
    }

    fn provenance(model: &str) -> Provenance {
        Provenance {
            ai_model: model.to_string(),
            prompt_file: "001_okutama_vc.yaml".to_string(),
            config: GenerationConfig::default(),
        }
    }

    #[test]
    fn test_candidate_defaults_from_json() {
        let json = r#"{
            "trail_name": "鴨沢コース",
            "title": "通行止め",
            "status": "CLOSURE",
            "area": "OKUTAMA"
        }"#;
        let parsed: CandidateRecord = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.mountain_name_raw, "");
        assert_eq!(parsed.description, "");
        assert_eq!(parsed.reference_url, "");
        assert!(parsed.reported_at.is_none());
        assert_eq!(parsed.status, StatusType::Closure);
    }

    #[test]
    fn test_reference_url_uses_wire_name() {
        let json = serde_json::to_value(candidate()).unwrap();
        assert!(json.get("reference_URL").is_some());
        assert!(json.get("reference_url").is_none());
    }

    #[test]
    fn test_from_candidate_keeps_raw_names() {
        let source = Source::new(
            1,
            "奥多摩VC".to_string(),
            "okutama_vc".to_string(),
            "https://example.jp/info".to_string(),
        );
        let mut c = candidate();
        c.mountain_name_raw = " 雲取山　".to_string();
        let record = StoredRecord::from_candidate(&source, &c, &provenance("deepseek-chat"), Utc::now());
        assert_eq!(record.mountain_name_raw, " 雲取山　");
        assert_eq!(record.url1, "https://example.jp/info");
        assert!(!record.disabled);
        assert!(record.id.is_none());
    }

    #[test]
    fn test_apply_update_refreshes_provenance() {
        let source = Source::new(1, "x".to_string(), "k".to_string(), String::new());
        let mut record =
            StoredRecord::from_candidate(&source, &candidate(), &provenance("deepseek-chat"), Utc::now());

        let mut changed = candidate();
        changed.status = StatusType::Other;
        changed.resolved_at = NaiveDate::from_ymd_opt(2025, 6, 20);
        assert!(record.differs_from(&changed));

        record.apply_update(&changed, &provenance("gemini-2.5-flash"), Utc::now());
        assert!(!record.differs_from(&changed));
        assert_eq!(record.ai_model, "gemini-2.5-flash");
        assert_eq!(record.status, StatusType::Other);
    }

    #[test]
    fn test_comment_changes_do_not_count_as_differences() {
        let source = Source::new(1, "x".to_string(), "k".to_string(), String::new());
        let record =
            StoredRecord::from_candidate(&source, &candidate(), &provenance("m"), Utc::now());
        let mut c = candidate();
        c.comment = "迂回路あり".to_string();
        c.reference_url = "https://example.jp/a.pdf".to_string();
        assert!(!record.differs_from(&c));
    }
}
