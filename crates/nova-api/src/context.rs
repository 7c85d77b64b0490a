//! Builds the ordered list of role-tagged entries sent to the provider for
//! one turn: persona (plus any document excerpts), prior turns, new message.

use nova_db::models::{DocumentRow, MessageRow};
use nova_types::models::{ContextEntry, Role};

pub const DEFAULT_PERSONA: &str = "You are a friendly and helpful AI assistant named Nova. Your primary goals are:
1. Provide warm, empathetic customer support while maintaining professionalism
2. Be a supportive companion who shows genuine interest in conversations
3. Give clear, actionable solutions to problems
4. Use a conversational, natural tone while being informative
5. Ask clarifying questions when needed to better understand the user's needs
Keep responses helpful but concise. Show emotional intelligence and adapt your tone to match the user's mood and needs.";

pub const DEFAULT_UPLOAD_MARKER: &str = "[Uploaded document]";
pub const DEFAULT_EXCERPT_CHARS: usize = 1000;

const EXCERPT_HEADING: &str = "Relevant document excerpts:";
const EXCERPT_DELIMITER: &str = "\n\n---\n\n";

#[derive(Debug, Clone)]
pub struct ContextConfig {
    pub persona: String,
    pub include_documents: bool,
    /// Excerpt length in characters, not bytes.
    pub excerpt_chars: usize,
    /// A chat whose messages start with this prefix is treated as having
    /// the user's documents attached.
    pub upload_marker: String,
    /// Fold adjacent entries with the same role into one, for providers
    /// that require strictly alternating turns.
    pub merge_consecutive_roles: bool,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            persona: DEFAULT_PERSONA.to_string(),
            include_documents: true,
            excerpt_chars: DEFAULT_EXCERPT_CHARS,
            upload_marker: DEFAULT_UPLOAD_MARKER.to_string(),
            merge_consecutive_roles: false,
        }
    }
}

/// Inputs for one turn, already loaded from the store.
pub struct TurnInputs<'a> {
    /// Prior messages in conversational order, not including the new one.
    pub history: &'a [MessageRow],
    pub documents: &'a [DocumentRow],
    pub user_message: &'a str,
    pub is_new_chat: bool,
}

pub fn assemble(config: &ContextConfig, inputs: &TurnInputs<'_>) -> Vec<ContextEntry> {
    let mut leading = config.persona.clone();
    if config.include_documents && !inputs.documents.is_empty() {
        leading.push_str("\n\n");
        leading.push_str(&document_section(inputs.documents, config.excerpt_chars));
    }

    let mut entries = Vec::with_capacity(inputs.history.len() + 2);
    entries.push(ContextEntry::new(Role::System, leading));

    if !inputs.is_new_chat {
        entries.extend(
            inputs
                .history
                .iter()
                .map(|m| ContextEntry::new(m.role, m.content.clone())),
        );
    }

    entries.push(ContextEntry::new(Role::User, inputs.user_message));

    if config.merge_consecutive_roles {
        merge_consecutive(entries)
    } else {
        entries
    }
}

fn merge_consecutive(entries: Vec<ContextEntry>) -> Vec<ContextEntry> {
    let mut merged: Vec<ContextEntry> = Vec::with_capacity(entries.len());
    for entry in entries {
        match merged.last_mut() {
            Some(last) if last.role == entry.role => {
                last.content.push_str("\n\n");
                last.content.push_str(&entry.content);
            }
            _ => merged.push(entry),
        }
    }
    merged
}

fn document_section(documents: &[DocumentRow], excerpt_chars: usize) -> String {
    let excerpts: Vec<String> = documents
        .iter()
        .map(|doc| format!("Document: {}\n{}", doc.filename, excerpt(&doc.content, excerpt_chars)))
        .collect();
    format!("{}\n\n{}", EXCERPT_HEADING, excerpts.join(EXCERPT_DELIMITER))
}

/// First `max_chars` characters of `text`, never splitting a character.
pub fn excerpt(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(id: i64, role: Role, content: &str) -> MessageRow {
        MessageRow {
            id,
            chat_id: "c1".into(),
            role,
            content: content.into(),
            timestamp: format!("2024-01-01T00:00:0{}.000000Z", id),
        }
    }

    fn document(filename: &str, content: &str) -> DocumentRow {
        DocumentRow {
            id: filename.into(),
            filename: filename.into(),
            content: content.into(),
            upload_date: "2024-01-01T00:00:00.000000Z".into(),
            user_id: "u1".into(),
        }
    }

    fn config() -> ContextConfig {
        ContextConfig {
            persona: "You are Nova.".into(),
            ..ContextConfig::default()
        }
    }

    #[test]
    fn empty_history_is_persona_plus_message() {
        let entries = assemble(
            &config(),
            &TurnInputs {
                history: &[],
                documents: &[],
                user_message: "Hello",
                is_new_chat: false,
            },
        );
        assert_eq!(
            entries,
            vec![
                ContextEntry::new(Role::System, "You are Nova."),
                ContextEntry::new(Role::User, "Hello"),
            ]
        );
    }

    #[test]
    fn history_keeps_roles_and_order() {
        let history = vec![
            message(1, Role::User, "Hello"),
            message(2, Role::Assistant, "Hi there"),
        ];
        let entries = assemble(
            &config(),
            &TurnInputs {
                history: &history,
                documents: &[],
                user_message: "What's new?",
                is_new_chat: false,
            },
        );
        let roles: Vec<Role> = entries.iter().map(|e| e.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant, Role::User]);
        assert_eq!(entries[1].content, "Hello");
        assert_eq!(entries[2].content, "Hi there");
        assert_eq!(entries[3].content, "What's new?");
    }

    #[test]
    fn new_chat_flag_skips_history() {
        let history = vec![message(1, Role::User, "old")];
        let entries = assemble(
            &config(),
            &TurnInputs {
                history: &history,
                documents: &[],
                user_message: "fresh",
                is_new_chat: true,
            },
        );
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].content, "fresh");
    }

    #[test]
    fn documents_are_truncated_into_leading_entry() {
        let mut cfg = config();
        cfg.excerpt_chars = 5;
        let docs = vec![document("a.pdf", "abcdefghij"), document("b.pdf", "xyz")];
        let entries = assemble(
            &cfg,
            &TurnInputs {
                history: &[],
                documents: &docs,
                user_message: "Summarise",
                is_new_chat: false,
            },
        );

        assert_eq!(entries.len(), 2);
        let leading = &entries[0].content;
        assert!(leading.starts_with("You are Nova.\n\nRelevant document excerpts:"));
        assert!(leading.contains("Document: a.pdf\nabcde\n\n---\n\nDocument: b.pdf\nxyz"));
        assert!(!leading.contains("abcdef"));
    }

    #[test]
    fn documents_ignored_when_disabled() {
        let mut cfg = config();
        cfg.include_documents = false;
        let docs = vec![document("a.pdf", "secret")];
        let entries = assemble(
            &cfg,
            &TurnInputs {
                history: &[],
                documents: &docs,
                user_message: "hi",
                is_new_chat: false,
            },
        );
        assert_eq!(entries[0].content, "You are Nova.");
    }

    #[test]
    fn excerpt_respects_char_boundaries() {
        assert_eq!(excerpt("héllo wörld", 4), "héll");
        assert_eq!(excerpt("short", 100), "short");
        assert_eq!(excerpt("", 3), "");
    }

    #[test]
    fn unanswered_turn_is_folded_when_merging() {
        // a failed provider call leaves a user turn without a reply
        let history = vec![
            message(1, Role::User, "Hello"),
            message(2, Role::System, "[Uploaded document] a.pdf"),
        ];
        let inputs = TurnInputs {
            history: &history,
            documents: &[],
            user_message: "Hello again",
            is_new_chat: false,
        };

        let verbatim = assemble(&config(), &inputs);
        assert_eq!(verbatim.len(), 4);

        let merging = ContextConfig {
            merge_consecutive_roles: true,
            ..config()
        };
        let entries = assemble(&merging, &inputs);
        let roles: Vec<Role> = entries.iter().map(|e| e.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::System, Role::User]);

        let history = vec![message(1, Role::User, "Hello")];
        let entries = assemble(
            &merging,
            &TurnInputs {
                history: &history,
                ..inputs
            },
        );
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].content, "Hello\n\nHello again");
    }
}
