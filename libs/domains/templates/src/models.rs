use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;
use validator::Validate;

/// Delivery channel a template renders for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateType {
    Email,
    Push,
}

impl std::fmt::Display for TemplateType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TemplateType::Email => write!(f, "email"),
            TemplateType::Push => write!(f, "push"),
        }
    }
}

impl std::str::FromStr for TemplateType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email" => Ok(TemplateType::Email),
            "push" => Ok(TemplateType::Push),
            other => Err(format!("Unknown template type: {}", other)),
        }
    }
}

/// One immutable template version.
///
/// `content` maps field names (`subject`, `body`, `title`, ...) to
/// template strings with `{{ident}}` placeholders; every placeholder
/// must appear in `variables`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    pub id: Uuid,
    pub code: String,
    #[serde(rename = "type")]
    pub template_type: TemplateType,
    pub language: String,
    pub version: i32,
    pub content: BTreeMap<String, String>,
    pub variables: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Template {
    pub fn new(
        code: String,
        template_type: TemplateType,
        language: String,
        version: i32,
        content: BTreeMap<String, String>,
        variables: Vec<String>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            code,
            template_type,
            language,
            version,
            content,
            variables,
            created_at: Utc::now(),
        }
    }
}

fn default_language() -> String {
    "en".to_string()
}

/// DTO for creating a template (version 1 of a new `(code, language)`).
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateTemplate {
    #[validate(length(min = 1, max = 100))]
    pub code: String,
    #[serde(rename = "type")]
    pub template_type: TemplateType,
    #[serde(default = "default_language")]
    #[validate(length(min = 2, max = 16))]
    pub language: String,
    pub content: BTreeMap<String, String>,
    #[serde(default)]
    pub variables: Vec<String>,
}

/// DTO for updating a template: merged last-write-wins over the latest
/// version, then inserted as the next version.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateTemplate {
    #[serde(rename = "type")]
    pub template_type: Option<TemplateType>,
    #[serde(default = "default_language")]
    #[validate(length(min = 2, max = 16))]
    pub language: String,
    pub content: Option<BTreeMap<String, String>>,
    pub variables: Option<Vec<String>>,
}
