//! Label store models

use serde::{Deserialize, Serialize};

/// Coarse upstream category assigned before this pipeline runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OriginCategory {
    General,
    Artist,
    Copyright,
    Character,
    Meta,
}

impl OriginCategory {
    /// Numeric code as stored in `labels.origin_category`
    pub fn code(self) -> i64 {
        match self {
            OriginCategory::General => 0,
            OriginCategory::Artist => 1,
            OriginCategory::Copyright => 3,
            OriginCategory::Character => 4,
            OriginCategory::Meta => 5,
        }
    }

    /// Decode a stored code; unknown codes are treated as general labels
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => OriginCategory::Artist,
            3 => OriginCategory::Copyright,
            4 => OriginCategory::Character,
            5 => OriginCategory::Meta,
            _ => OriginCategory::General,
        }
    }
}

/// One row of the `labels` table
///
/// Classification columns are kept as raw strings: the store may hold legacy
/// sentinel values (`"null"`, `"N/A"`) until the sentinel repair pass runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Label {
    pub name: String,
    pub origin_category: i64,
    pub usage_count: i64,
    pub main_category: Option<String>,
    pub sub_category: Option<String>,
    pub classification_source: Option<String>,
    pub confidence: Option<f64>,
    pub reasoning: Option<String>,
    pub is_ambiguous: bool,
    pub note: Option<String>,
    pub classified_at: Option<String>,
}

impl Label {
    pub fn origin(&self) -> OriginCategory {
        OriginCategory::from_code(self.origin_category)
    }

    /// Whether the label still needs a primary classification
    pub fn is_unclassified(&self) -> bool {
        self.main_category.is_none()
    }
}

/// Label as supplied by ingestion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewLabel {
    pub name: String,
    pub origin: OriginCategory,
    pub usage_count: i64,
}

impl NewLabel {
    pub fn new(name: impl Into<String>, origin: OriginCategory, usage_count: i64) -> Self {
        Self {
            name: name.into(),
            origin,
            usage_count,
        }
    }
}

/// Literal strings that legacy writers used in place of a true null
pub const SENTINELS: [&str; 2] = ["null", "n/a"];

/// Whether a stored value is a null sentinel (case-insensitive, trimmed)
pub fn is_sentinel(value: &str) -> bool {
    let value = value.trim().to_ascii_lowercase();
    SENTINELS.contains(&value.as_str())
}
