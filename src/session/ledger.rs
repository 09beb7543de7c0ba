//! Mutation rules for a session's chat history, current component and
//! version history.
//!
//! Every operation validates its input first and only then touches the
//! session, so a rejected call leaves it unchanged. Generation-type
//! operations append exactly one user/assistant pair and overwrite the
//! current component through [`archive_and_replace`], which archives any
//! non-empty prior state. Iteration does not change that rule.

use super::{ChatMessage, ComponentEdit, ImageRef, MessageMetadata, Role, Session, SessionStats};
use crate::error::ValidationError;
use crate::generate::{ComponentState, GeneratedPayload, GenerationSource};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Longest accepted free-form chat message.
pub const MAX_MESSAGE_CHARS: usize = 10_000;

/// Record a generation: prompt, explanation, and the payload's code as the
/// new current component.
pub fn apply_generation(
    session: &mut Session,
    prompt: &str,
    payload: &GeneratedPayload,
    typescript: bool,
    source: &GenerationSource,
) -> Result<(), ValidationError> {
    validate_turn(prompt, payload)?;

    let code = payload.component(typescript);
    append_turn(session, ChatMessage::new(Role::User, prompt), payload, source, |meta| {
        meta.generated_code = Some(code.clone());
    });
    archive_and_replace(session, code);
    Ok(())
}

/// Record a refinement. The current `typescript` flag is kept.
pub fn apply_refinement(
    session: &mut Session,
    prompt: &str,
    payload: &GeneratedPayload,
    source: &GenerationSource,
) -> Result<(), ValidationError> {
    validate_turn(prompt, payload)?;

    let code = payload.component(session.current_component.typescript);
    let mut user = ChatMessage::new(Role::User, prompt);
    user.metadata.is_refinement = true;
    append_turn(session, user, payload, source, |meta| {
        meta.generated_code = Some(code.clone());
        meta.is_refinement = true;
    });
    archive_and_replace(session, code);
    Ok(())
}

/// Record a generation from an uploaded image. The image reference goes on
/// the user message.
pub fn apply_image_generation(
    session: &mut Session,
    prompt: &str,
    image: ImageRef,
    payload: &GeneratedPayload,
    typescript: bool,
    source: &GenerationSource,
) -> Result<(), ValidationError> {
    validate_turn(prompt, payload)?;

    let code = payload.component(typescript);
    let mut user = ChatMessage::new(Role::User, prompt);
    user.metadata.has_image = true;
    user.metadata.image = Some(image);
    append_turn(session, user, payload, source, |meta| {
        meta.generated_code = Some(code.clone());
    });
    archive_and_replace(session, code);
    Ok(())
}

/// Overwrite the provided fields of the current component. No archive, no
/// chat.
pub fn apply_manual_edit(session: &mut Session, edit: &ComponentEdit) -> Result<(), ValidationError> {
    if edit.is_empty() {
        return Err(ValidationError::field("edit", "must change jsx, css or typescript"));
    }

    let current = &mut session.current_component;
    if let Some(jsx) = &edit.jsx {
        current.jsx.clone_from(jsx);
    }
    if let Some(css) = &edit.css {
        current.css.clone_from(css);
    }
    if let Some(typescript) = edit.typescript {
        current.typescript = typescript;
    }
    session.touch();
    Ok(())
}

/// Append one plain chat message. Free-form messages never carry generated
/// code.
pub fn append_message(session: &mut Session, role: Role, content: &str) -> Result<(), ValidationError> {
    let len = content.trim().chars().count();
    if len == 0 {
        return Err(ValidationError::field("content", "must not be empty"));
    }
    if len > MAX_MESSAGE_CHARS {
        return Err(ValidationError::field(
            "content",
            format!("must be at most {MAX_MESSAGE_CHARS} characters"),
        ));
    }

    session.chat_history.push(ChatMessage::new(role, content));
    session.touch();
    Ok(())
}

/// Derive the history counters. `exports_count` is carried over.
pub fn recompute_stats(session: &mut Session) {
    let generations_count = session
        .chat_history
        .iter()
        .filter(|m| m.role == Role::Assistant && m.metadata.generated_code.is_some())
        .count();

    session.stats = SessionStats {
        messages_count: session.chat_history.len(),
        generations_count,
        exports_count: session.stats.exports_count,
    };
}

/// The single overwrite rule for the current component: archive it if it has
/// any code, then replace.
pub fn archive_and_replace(session: &mut Session, next: ComponentState) {
    let previous = std::mem::replace(&mut session.current_component, next);
    if !previous.is_empty() {
        session.component_versions.push(previous);
    }
}

fn validate_turn(prompt: &str, payload: &GeneratedPayload) -> Result<(), ValidationError> {
    let mut err = ValidationError::new();
    if prompt.trim().is_empty() {
        err.push("prompt", "must not be empty");
    }
    if !payload.is_valid() {
        err.push("jsx", "generated payload has no code");
    }
    err.into_result()
}

fn append_turn(
    session: &mut Session,
    user: ChatMessage,
    payload: &GeneratedPayload,
    source: &GenerationSource,
    annotate: impl FnOnce(&mut MessageMetadata),
) {
    let mut assistant = ChatMessage::new(Role::Assistant, payload.explanation.clone());
    assistant.metadata.source = Some(source.label().to_string());
    annotate(&mut assistant.metadata);

    session.chat_history.push(user);
    session.chat_history.push(assistant);
    session.touch();
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportMetadata {
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub stats: SessionStats,
}

/// Chat message without metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportedMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionExport {
    pub metadata: ExportMetadata,
    pub current_component: ComponentState,
    pub chat_history: Vec<ExportedMessage>,
    pub component_versions: Vec<ComponentState>,
}

/// Count the export and project the session. The caller persists the
/// session before handing out the projection.
pub fn export(session: &mut Session) -> SessionExport {
    session.stats.exports_count += 1;
    session.touch();

    SessionExport {
        metadata: ExportMetadata {
            title: session.title.clone(),
            description: session.description.clone(),
            tags: session.tags.clone(),
            created_at: session.created_at,
            stats: session.stats,
        },
        current_component: session.current_component.clone(),
        chat_history: session
            .chat_history
            .iter()
            .map(|m| ExportedMessage {
                role: m.role,
                content: m.content.clone(),
                timestamp: m.timestamp,
            })
            .collect(),
        component_versions: session.component_versions.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(jsx: &str, css: &str) -> GeneratedPayload {
        GeneratedPayload {
            jsx: jsx.into(),
            css: css.into(),
            explanation: format!("made {jsx}"),
            ..Default::default()
        }
    }

    fn model() -> GenerationSource {
        GenerationSource::Model("openai/gpt-4o-mini".into())
    }

    #[test]
    fn test_first_generation_archives_nothing() {
        let mut session = Session::new("u", "t");
        apply_generation(&mut session, "a div", &payload("<div/>", ""), false, &model()).unwrap();

        assert_eq!(session.current_component.jsx, "<div/>");
        assert!(session.component_versions.is_empty());
        assert_eq!(session.chat_history.len(), 2);
        assert_eq!(session.chat_history[0].role, Role::User);
        assert_eq!(session.chat_history[0].content, "a div");
        assert_eq!(session.chat_history[1].role, Role::Assistant);
        assert_eq!(session.chat_history[1].content, "made <div/>");
        assert_eq!(
            session.chat_history[1].metadata.generated_code,
            Some(ComponentState::new("<div/>", "", false))
        );
        assert_eq!(session.chat_history[1].metadata.source.as_deref(), Some("openai/gpt-4o-mini"));
    }

    #[test]
    fn test_refinement_archives_prior_and_keeps_typescript() {
        let mut session = Session::new("u", "t");
        apply_generation(&mut session, "a div", &payload("<div/>", ""), true, &model()).unwrap();
        apply_refinement(&mut session, "a span", &payload("<span/>", "x"), &model()).unwrap();

        assert_eq!(session.component_versions, vec![ComponentState::new("<div/>", "", true)]);
        assert_eq!(session.current_component, ComponentState::new("<span/>", "x", true));
        assert_eq!(session.chat_history.len(), 4);
        assert!(session.chat_history[2].metadata.is_refinement);
        assert!(session.chat_history[3].metadata.is_refinement);
    }

    #[test]
    fn test_second_generation_archives_previous() {
        let mut session = Session::new("u", "t");
        apply_generation(&mut session, "one", &payload("<A/>", ""), false, &model()).unwrap();
        apply_generation(&mut session, "two", &payload("<B/>", ""), false, &model()).unwrap();

        assert_eq!(session.component_versions.len(), 1);
        assert_eq!(session.component_versions[0].jsx, "<A/>");
        assert_eq!(session.current_component.jsx, "<B/>");
    }

    #[test]
    fn test_refinement_of_empty_session_archives_nothing() {
        let mut session = Session::new("u", "t");
        apply_refinement(&mut session, "make it", &payload("<A/>", ""), &model()).unwrap();
        assert!(session.component_versions.is_empty());
    }

    #[test]
    fn test_image_generation_records_image_on_user_message() {
        let mut session = Session::new("u", "t");
        apply_generation(&mut session, "first", &payload("<A/>", ""), false, &model()).unwrap();

        let image = ImageRef {
            name: "mock.png".into(),
            media_type: "image/png".into(),
            size_bytes: 3,
            sha256: "ab".repeat(32),
        };
        apply_image_generation(
            &mut session,
            "from screenshot",
            image.clone(),
            &payload("<B/>", ""),
            false,
            &GenerationSource::Mock,
        )
        .unwrap();

        let user = &session.chat_history[2];
        assert!(user.metadata.has_image);
        assert_eq!(user.metadata.image.as_ref(), Some(&image));
        assert_eq!(session.chat_history[3].metadata.source.as_deref(), Some("mock"));
        assert_eq!(session.component_versions.len(), 1);
        assert_eq!(session.current_component.jsx, "<B/>");
    }

    #[test]
    fn test_rejected_turn_changes_nothing() {
        let mut session = Session::new("u", "t");
        apply_generation(&mut session, "one", &payload("<A/>", ""), false, &model()).unwrap();
        let before = session.clone();

        let err = apply_refinement(&mut session, " ", &payload("", "x"), &model()).unwrap_err();
        assert_eq!(err.errors.len(), 2);
        assert_eq!(session, before);
    }

    #[test]
    fn test_manual_edit_overwrites_only_given_fields() {
        let mut session = Session::new("u", "t");
        apply_generation(&mut session, "one", &payload("<A/>", "a{}"), false, &model()).unwrap();

        let edit = ComponentEdit {
            css: Some("b{}".into()),
            ..Default::default()
        };
        apply_manual_edit(&mut session, &edit).unwrap();

        assert_eq!(session.current_component, ComponentState::new("<A/>", "b{}", false));
        assert!(session.component_versions.is_empty());
        assert_eq!(session.chat_history.len(), 2);
        assert!(apply_manual_edit(&mut session, &ComponentEdit::default()).is_err());
    }

    #[test]
    fn test_append_message_validates() {
        let mut session = Session::new("u", "t");
        append_message(&mut session, Role::User, "hello").unwrap();
        assert!(append_message(&mut session, Role::User, "  ").is_err());
        let long = "x".repeat(MAX_MESSAGE_CHARS + 1);
        assert!(append_message(&mut session, Role::User, &long).is_err());
        assert_eq!(session.chat_history.len(), 1);
        assert!(session.chat_history[0].metadata.generated_code.is_none());
    }

    #[test]
    fn test_pairing_and_monotonic_versions() {
        let mut session = Session::new("u", "t");
        let mut last_versions = 0;
        for n in 1..=6 {
            let jsx = format!("<C{n}/>");
            if n % 2 == 0 {
                apply_refinement(&mut session, "refine", &payload(&jsx, ""), &model()).unwrap();
            } else {
                apply_generation(&mut session, "gen", &payload(&jsx, ""), false, &model()).unwrap();
            }
            assert_eq!(session.chat_history.len(), 2 * n);
            assert!(session.component_versions.len() >= last_versions);
            last_versions = session.component_versions.len();

            let pairs = session.chat_history.chunks(2);
            assert!(pairs.into_iter().all(|p| p[0].role == Role::User && p[1].role == Role::Assistant));
        }
        assert_eq!(last_versions, 5);
    }

    #[test]
    fn test_stats_are_derived() {
        let mut session = Session::new("u", "t");
        session.stats.exports_count = 4;
        session.stats.generations_count = 99;
        apply_generation(&mut session, "one", &payload("<A/>", ""), false, &model()).unwrap();
        append_message(&mut session, Role::User, "thanks").unwrap();

        recompute_stats(&mut session);
        recompute_stats(&mut session);
        assert_eq!(
            session.stats,
            SessionStats {
                messages_count: 3,
                generations_count: 1,
                exports_count: 4,
            }
        );
    }

    #[test]
    fn test_export_counts_and_strips_metadata() {
        let mut session = Session::new("u", "Nav");
        apply_generation(&mut session, "one", &payload("<A/>", ""), false, &model()).unwrap();
        apply_generation(&mut session, "two", &payload("<B/>", ""), false, &model()).unwrap();
        recompute_stats(&mut session);
        let before = session.stats;

        let out = export(&mut session);

        assert_eq!(session.stats.exports_count, before.exports_count + 1);
        assert_eq!(out.metadata.stats, session.stats);
        assert_eq!(out.metadata.title, "Nav");
        assert_eq!(out.chat_history.len(), 4);
        assert_eq!(out.component_versions.len(), 1);
        assert_eq!(out.current_component.jsx, "<B/>");

        let json = serde_json::to_value(&out).unwrap();
        assert!(json["chatHistory"][1].get("metadata").is_none());
        assert_eq!(json["metadata"]["stats"]["exportsCount"], 1);
    }
}
