//! Persisted entities.

use crate::block::Block;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryStatus {
    Draft,
    Published,
    Archived,
}

impl SummaryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SummaryStatus::Draft => "draft",
            SummaryStatus::Published => "published",
            SummaryStatus::Archived => "archived",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(SummaryStatus::Draft),
            "published" => Some(SummaryStatus::Published),
            "archived" => Some(SummaryStatus::Archived),
            _ => None,
        }
    }

    /// Allowed lifecycle moves. Archived summaries can only be restored to draft.
    pub fn can_transition_to(&self, next: SummaryStatus) -> bool {
        use SummaryStatus::*;
        matches!(
            (self, next),
            (Draft, Published) | (Draft, Archived) | (Published, Archived) | (Archived, Draft)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientSummary {
    pub id: String,
    /// User id of the clinician who owns the summary
    pub owner_id: String,
    pub patient_id: Option<String>,
    pub title: String,
    pub blocks: Vec<Block>,
    pub discharge_text: String,
    #[serde(default)]
    pub document_ids: Vec<String>,
    pub status: SummaryStatus,
    pub preferred_locale: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryTranslation {
    pub summary_id: String,
    pub locale: String,
    pub source_locale: String,
    pub blocks: Vec<Block>,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessRole {
    Patient,
    Caregiver,
}

impl AccessRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessRole::Patient => "patient",
            AccessRole::Caregiver => "caregiver",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "patient" => Some(AccessRole::Patient),
            "caregiver" => Some(AccessRole::Caregiver),
            _ => None,
        }
    }
}

/// Session-free access to one summary through a shared secret
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientAccessKey {
    pub id: String,
    pub summary_id: String,
    pub phone_number: String,
    pub role: AccessRole,
    pub token: String,
    pub is_active: bool,
    pub created_at: String,
    pub last_accessed_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: String,
    pub owner_id: String,
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: u64,
    pub file_url: String,
    pub full_text: Option<String>,
    pub created_at: String,
}

/// Path segment that separates the public base URL from the blob key in `file_url`
pub const FILES_PATH_SEGMENT: &str = "/files/";

impl Document {
    /// Blob key, when it can be recovered from `file_url`.
    pub fn blob_key(&self) -> Option<&str> {
        let (_, key) = self.file_url.split_once(FILES_PATH_SEGMENT)?;
        (!key.is_empty()).then_some(key)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snippet {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub content: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub date_of_birth: Option<String>,
    pub phone_number: Option<String>,
    pub mrn: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub user_id: String,
    pub display_name: Option<String>,
    pub specialty: Option<String>,
    pub institution: Option<String>,
    pub preferred_locale: String,
    pub created_at: String,
    pub updated_at: String,
}

impl UserProfile {
    pub fn new(user_id: impl Into<String>, now: &str) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: None,
            specialty: None,
            institution: None,
            preferred_locale: "en".to_string(),
            created_at: now.to_string(),
            updated_at: now.to_string(),
        }
    }
}
