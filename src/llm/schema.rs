//! Structured-output contract for trail condition extraction.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::LlmError;
use crate::models::{AreaName, CandidateRecord, StatusType};

/// Maximum length of `reference_URL`, in characters.
pub const MAX_REFERENCE_URL_CHARS: usize = 500;

/// Top-level object the model must return.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionResponse {
    pub trail_condition_records: Vec<CandidateRecord>,
}

/// JSON schema of [`ExtractionResponse`], given to the model.
pub fn response_schema() -> Value {
    let statuses: Vec<&str> = StatusType::ALL.iter().map(|s| s.as_str()).collect();
    let areas: Vec<&str> = AreaName::ALL.iter().map(|a| a.as_str()).collect();

    json!({
        "type": "object",
        "properties": {
            "trail_condition_records": {
                "type": "array",
                "description": "登山道状況のリスト",
                "items": {
                    "type": "object",
                    "properties": {
                        "trail_name": {
                            "type": "string",
                            "description": "登山道名・区間（原文そのまま）"
                        },
                        "mountain_name_raw": {
                            "type": "string",
                            "description": "山名（原文そのまま / なければ妥当な山名を推測 / 推測不可能なら空文字）"
                        },
                        "title": {
                            "type": "string",
                            "description": "登山道状況タイトル（原文そのまま）"
                        },
                        "description": {
                            "type": "string",
                            "description": "状況詳細説明（原文そのまま / なければ空文字）"
                        },
                        "reported_at": {
                            "type": ["string", "null"],
                            "format": "date",
                            "description": "報告日（YYYY-MM-DD） / 不明ならnull"
                        },
                        "resolved_at": {
                            "type": ["string", "null"],
                            "format": "date",
                            "description": "解消日または解消予定日（YYYY-MM-DD） / なければnull"
                        },
                        "status": {
                            "type": "string",
                            "enum": statuses,
                            "description": "最も適する状況種別"
                        },
                        "area": {
                            "type": "string",
                            "enum": areas,
                            "description": "最も該当する山域"
                        },
                        "reference_URL": {
                            "type": "string",
                            "maxLength": MAX_REFERENCE_URL_CHARS,
                            "description": "補足URL（PDF等の参照先があれば）"
                        },
                        "comment": {
                            "type": "string",
                            "description": "備考 / 状況詳細から漏れる情報"
                        }
                    },
                    "required": ["trail_name", "title", "status", "area"]
                }
            }
        },
        "required": ["trail_condition_records"]
    })
}

/// Parse and validate a raw model response.
///
/// The whole response is rejected if any record fails the schema.
pub fn parse_response(text: &str) -> Result<Vec<CandidateRecord>, LlmError> {
    let body = strip_code_fence(text.trim());
    if body.is_empty() {
        return Err(LlmError::Validation("empty response".to_string()));
    }

    let response: ExtractionResponse =
        serde_json::from_str(body).map_err(|e| LlmError::Validation(e.to_string()))?;

    for (index, record) in response.trail_condition_records.iter().enumerate() {
        let url_chars = record.reference_url.chars().count();
        if url_chars > MAX_REFERENCE_URL_CHARS {
            return Err(LlmError::Validation(format!(
                "record {}: reference_URL has {} characters (max {})",
                index, url_chars, MAX_REFERENCE_URL_CHARS
            )));
        }
    }

    Ok(response.trail_condition_records)
}

/// Remove a surrounding Markdown code fence, if any.
fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"{
        "trail_condition_records": [
            {
                "trail_name": "鴨沢コース",
                "mountain_name_raw": "雲取山",
                "title": "崩落による通行止め",
                "description": "七ツ石小屋下で崩落",
                "reported_at": "2025-05-30",
                "resolved_at": null,
                "status": "CLOSURE",
                "area": "OKUTAMA",
                "reference_URL": "https://example.jp/closure.pdf",
                "comment": ""
            }
        ]
    }"#;

    #[test]
    fn test_parse_valid_response() {
        let records = parse_response(VALID).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, StatusType::Closure);
        assert_eq!(
            records[0].reported_at,
            chrono::NaiveDate::from_ymd_opt(2025, 5, 30)
        );
    }

    #[test]
    fn test_parse_empty_list_is_valid() {
        let records = parse_response(r#"{"trail_condition_records": []}"#).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_code_fence_is_tolerated() {
        let fenced = format!("```json\n{}\n```", VALID);
        assert_eq!(parse_response(&fenced).unwrap().len(), 1);
    }

    #[test]
    fn test_unknown_status_rejects_whole_response() {
        let bad = VALID.replace("\"CLOSURE\"", "\"CLOSED\"");
        assert!(matches!(parse_response(&bad), Err(LlmError::Validation(_))));
    }

    #[test]
    fn test_missing_wrapper_key_rejected() {
        let err = parse_response(r#"[{"trail_name": "x"}]"#).unwrap_err();
        assert!(matches!(err, LlmError::Validation(_)));
        assert!(parse_response("   ").is_err());
    }

    #[test]
    fn test_overlong_reference_url_rejected() {
        let long = format!("https://example.jp/{}", "a".repeat(500));
        let bad = VALID.replace("https://example.jp/closure.pdf", &long);
        let err = parse_response(&bad).unwrap_err();
        assert!(err.to_string().contains("reference_URL"));
    }

    #[test]
    fn test_schema_lists_enum_values() {
        let schema = response_schema();
        let status_enum = &schema["properties"]["trail_condition_records"]["items"]["properties"]
            ["status"]["enum"];
        assert_eq!(status_enum.as_array().unwrap().len(), StatusType::ALL.len());
        assert!(status_enum
            .as_array()
            .unwrap()
            .iter()
            .any(|v| v == "WATER"));
    }
}
