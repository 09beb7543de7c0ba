//! Sessions: the persisted conversation and component history of one user.
//!
//! [`ledger`] holds the mutation rules, [`SessionStore`] the persistence and
//! [`SessionService`] the ownership-checked operations on top of both.

pub mod ledger;
mod service;
mod store;

pub use ledger::{ExportMetadata, ExportedMessage, SessionExport};
pub use service::{Lookup, SessionError, SessionService};
pub use store::{SessionFilter, SessionRepository, SessionStore, SessionStoreError};

use crate::error::ValidationError;
use crate::generate::{ComponentState, Framework, StyleFramework};
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const MAX_TITLE_CHARS: usize = 200;
pub const MAX_DESCRIPTION_CHARS: usize = 2000;
pub const MAX_TAGS: usize = 20;
pub const MAX_TAG_CHARS: usize = 50;
/// Largest accepted image upload, decoded.
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;
pub const DEFAULT_TITLE: &str = "Untitled Session";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Metadata of an uploaded image. The bytes themselves are not kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRef {
    pub name: String,
    pub media_type: String,
    pub size_bytes: u64,
    pub sha256: String,
}

impl ImageRef {
    /// Decode and check an upload. Accepts bare base64 or a `data:` URL.
    pub fn from_base64(
        name: &str,
        media_type: &str,
        data: &str,
    ) -> Result<(Self, Vec<u8>), ValidationError> {
        let mut err = ValidationError::new();

        let (media_type, encoded) = match data.strip_prefix("data:") {
            Some(rest) => match rest.split_once(";base64,") {
                Some((declared, encoded)) => (declared, encoded),
                None => {
                    return Err(ValidationError::field("image", "data URL must be base64"));
                }
            },
            None => (media_type, data),
        };

        if !media_type.starts_with("image/") {
            err.push("mediaType", "must be an image type");
        }

        let bytes = match base64::engine::general_purpose::STANDARD.decode(encoded.trim()) {
            Ok(bytes) if bytes.is_empty() => {
                err.push("image", "must not be empty");
                Vec::new()
            }
            Ok(bytes) => bytes,
            Err(_) => {
                err.push("image", "must be valid base64");
                Vec::new()
            }
        };

        if bytes.len() > MAX_IMAGE_BYTES {
            err.push("image", format!("must be at most {MAX_IMAGE_BYTES} bytes"));
        }

        err.into_result()?;

        let name = if name.trim().is_empty() { "image" } else { name.trim() };
        let image = ImageRef {
            name: name.to_string(),
            media_type: media_type.to_string(),
            size_bytes: bytes.len() as u64,
            sha256: format!("{:x}", Sha256::digest(&bytes)),
        };
        Ok((image, bytes))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MessageMetadata {
    /// Set only on assistant messages produced by generation or refinement.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generated_code: Option<ComponentState>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub is_refinement: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub has_image: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageRef>,
    /// Model id, `cache` or `mock`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: MessageMetadata,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
            metadata: MessageMetadata::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionSettings {
    pub framework: Framework,
    pub style_framework: StyleFramework,
    pub auto_save: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            framework: Framework::default(),
            style_framework: StyleFramework::default(),
            auto_save: true,
        }
    }
}

/// Derived counters. Only `exports_count` is not recomputable from history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionStats {
    pub messages_count: usize,
    pub generations_count: usize,
    pub exports_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub chat_history: Vec<ChatMessage>,
    #[serde(default)]
    pub current_component: ComponentState,
    /// Snapshots prior to `current_component`, oldest first.
    #[serde(default)]
    pub component_versions: Vec<ComponentState>,
    #[serde(default)]
    pub settings: SessionSettings,
    #[serde(default)]
    pub stats: SessionStats,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
}

impl Session {
    pub fn new(user_id: impl Into<String>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            title: title.into(),
            description: String::new(),
            tags: Vec::new(),
            chat_history: Vec::new(),
            current_component: ComponentState::default(),
            component_versions: Vec::new(),
            settings: SessionSettings::default(),
            stats: SessionStats::default(),
            is_active: true,
            created_at: now,
            updated_at: now,
            last_accessed: now,
        }
    }

    pub fn touch(&mut self) {
        self.last_accessed = Utc::now();
    }
}

/// Fields accepted when creating a session.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NewSession {
    pub title: Option<String>,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
    pub settings: Option<SessionSettings>,
}

/// Metadata update. Absent fields are left alone.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
    pub settings: Option<SessionSettings>,
}

impl SessionPatch {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut err = ValidationError::new();
        if let Some(title) = &self.title {
            validate_title(title, &mut err);
        }
        if let Some(description) = &self.description
            && description.chars().count() > MAX_DESCRIPTION_CHARS
        {
            err.push(
                "description",
                format!("must be at most {MAX_DESCRIPTION_CHARS} characters"),
            );
        }
        if let Some(tags) = &self.tags {
            validate_tags(tags, &mut err);
        }
        err.into_result()
    }

    pub fn apply(self, session: &mut Session) {
        if let Some(title) = self.title {
            session.title = title.trim().to_string();
        }
        if let Some(description) = self.description {
            session.description = description;
        }
        if let Some(tags) = self.tags {
            session.tags = tags.into_iter().map(|t| t.trim().to_string()).collect();
        }
        if let Some(settings) = self.settings {
            session.settings = settings;
        }
    }
}

impl From<NewSession> for SessionPatch {
    fn from(new: NewSession) -> Self {
        Self {
            title: new.title,
            description: new.description,
            tags: new.tags,
            settings: new.settings,
        }
    }
}

fn validate_title(title: &str, err: &mut ValidationError) {
    let len = title.trim().chars().count();
    if len == 0 {
        err.push("title", "must not be empty");
    } else if len > MAX_TITLE_CHARS {
        err.push("title", format!("must be at most {MAX_TITLE_CHARS} characters"));
    }
}

fn validate_tags(tags: &[String], err: &mut ValidationError) {
    if tags.len() > MAX_TAGS {
        err.push("tags", format!("must have at most {MAX_TAGS} entries"));
    }
    if tags
        .iter()
        .any(|t| t.trim().is_empty() || t.chars().count() > MAX_TAG_CHARS)
    {
        err.push(
            "tags",
            format!("entries must be 1 to {MAX_TAG_CHARS} characters"),
        );
    }
}

/// Partial overwrite of the current component from a local editor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ComponentEdit {
    pub jsx: Option<String>,
    pub css: Option<String>,
    pub typescript: Option<bool>,
}

impl ComponentEdit {
    pub fn is_empty(&self) -> bool {
        self.jsx.is_none() && self.css.is_none() && self.typescript.is_none()
    }
}
