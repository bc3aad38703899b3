//! Domain types for the session/progress graph.
//!
//! These are the shapes the store backends exchange with callers. Everything
//! here is backend-neutral: the Neo4j backend maps them to node properties,
//! the in-memory backend stores them directly.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::GraphError;

/// Display name given to sessions created without one.
pub const DEFAULT_SESSION_NAME: &str = "Unnamed session";

// ── Sessions ──────────────────────────────────────────────────────────────────

/// Session discriminant, stored on the node as `kind`.
///
/// An explicit field so lookups never branch on a numeric sentinel like
/// `question_count == 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionKind {
    Chat,
    Quiz,
}

impl SessionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionKind::Chat => "chat",
            SessionKind::Quiz => "quiz",
        }
    }
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionKind {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "chat" => Ok(SessionKind::Chat),
            "quiz" => Ok(SessionKind::Quiz),
            other => Err(GraphError::InvalidArgument(format!(
                "unknown session kind: {other}"
            ))),
        }
    }
}

/// Result of a get-or-create lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRef {
    pub session_id: String,
    /// `true` when this call created the session, `false` when an existing
    /// one was returned.
    pub created: bool,
}

/// A session node as read back from the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: String,
    pub kind: SessionKind,
    pub sname: String,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
    /// Number of questions a quiz was created with; `0` for chat sessions.
    pub question_count: i64,
    /// Progress cursor within a quiz.
    pub current_question_count: i64,
    pub score: i64,
    pub topics: Vec<String>,
    pub selected_pdfs: Vec<String>,
}

/// Caller-supplied fields for an explicit quiz-session create.
/// `None` fields fall back to `0` / empty / the name sentinel.
#[derive(Debug, Clone, Default)]
pub struct QuizSessionSpec {
    pub name: Option<String>,
    pub question_count: Option<i64>,
    pub topics: Option<Vec<String>>,
    pub selected_pdfs: Option<Vec<String>>,
}

/// Outcome of a cascading session delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteReport {
    /// `false` when the session did not exist (the call is still a success).
    pub deleted: bool,
    /// Session node plus every Question and Message removed with it.
    pub nodes_deleted: u64,
}

// ── Users & relationships ─────────────────────────────────────────────────────

/// Scalar property value on a User node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl From<&str> for AttrValue {
    fn from(v: &str) -> Self {
        AttrValue::Str(v.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(v: String) -> Self {
        AttrValue::Str(v)
    }
}

impl From<i64> for AttrValue {
    fn from(v: i64) -> Self {
        AttrValue::Int(v)
    }
}

impl From<f64> for AttrValue {
    fn from(v: f64) -> Self {
        AttrValue::Float(v)
    }
}

impl From<bool> for AttrValue {
    fn from(v: bool) -> Self {
        AttrValue::Bool(v)
    }
}

/// A User node with its scalar attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    pub attributes: BTreeMap<String, AttrValue>,
}

/// Attribute names become property names in `SET` clauses, so they are
/// restricted to identifier characters. Values are always bound as query
/// parameters; this check closes the remaining injection surface.
pub fn valid_attribute_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Typed user-to-user relationship. Closed set: anything else is rejected
/// at the parse boundary with [`GraphError::InvalidType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationshipKind {
    Follows,
    Friends,
    Blocks,
}

impl RelationshipKind {
    /// Relationship type token as it appears in Cypher. Safe to interpolate
    /// into query text because the set is closed.
    pub fn as_cypher(&self) -> &'static str {
        match self {
            RelationshipKind::Follows => "FOLLOWS",
            RelationshipKind::Friends => "FRIENDS",
            RelationshipKind::Blocks => "BLOCKS",
        }
    }
}

impl fmt::Display for RelationshipKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_cypher())
    }
}

impl FromStr for RelationshipKind {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "FOLLOWS" => Ok(RelationshipKind::Follows),
            "FRIENDS" => Ok(RelationshipKind::Friends),
            "BLOCKS" => Ok(RelationshipKind::Blocks),
            other => Err(GraphError::InvalidType(other.to_string())),
        }
    }
}

/// A directed relationship edge between two users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub from: String,
    pub to: String,
    pub kind: RelationshipKind,
}

// ── Question/answer ledger ────────────────────────────────────────────────────

/// An LLM-generated exercise to attach to a session. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewQuestion {
    pub id: String,
    pub text: String,
    pub difficulty: String,
    /// How complete the student's last attempt was, 0–100.
    pub completeness: i64,
    pub xp: i64,
}

/// An append-only record of a submitted answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerRecord {
    /// Snapshot of the question text at submission time.
    pub question: String,
    pub answer: String,
    pub is_correct: bool,
    pub created_at: String,
}

// ── Chat history ──────────────────────────────────────────────────────────────

/// Who produced a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }
}

impl fmt::Display for ChatRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChatRole {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(ChatRole::User),
            "assistant" => Ok(ChatRole::Assistant),
            other => Err(GraphError::InvalidArgument(format!(
                "unknown chat role: {other}"
            ))),
        }
    }
}

/// One conversation turn, in chronological position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_kind_round_trip() {
        assert_eq!("chat".parse::<SessionKind>().unwrap(), SessionKind::Chat);
        assert_eq!("quiz".parse::<SessionKind>().unwrap(), SessionKind::Quiz);
        assert_eq!(SessionKind::Quiz.to_string(), "quiz");
        assert!("exam".parse::<SessionKind>().is_err());
    }

    #[test]
    fn relationship_kind_closed_set() {
        assert_eq!(
            "FRIENDS".parse::<RelationshipKind>().unwrap(),
            RelationshipKind::Friends
        );
        let err = "ADMIN".parse::<RelationshipKind>().unwrap_err();
        assert!(matches!(err, GraphError::InvalidType(t) if t == "ADMIN"));
        // lowercase is not accepted, the wire token is exact
        assert!("friends".parse::<RelationshipKind>().is_err());
    }

    #[test]
    fn chat_role_round_trip() {
        assert_eq!("user".parse::<ChatRole>().unwrap(), ChatRole::User);
        assert_eq!(ChatRole::Assistant.as_str(), "assistant");
        assert!("system".parse::<ChatRole>().is_err());
    }

    #[test]
    fn attribute_name_validation() {
        assert!(valid_attribute_name("login"));
        assert!(valid_attribute_name("learning_level"));
        assert!(valid_attribute_name("_private"));
        assert!(valid_attribute_name("level2"));

        assert!(!valid_attribute_name(""));
        assert!(!valid_attribute_name("2fast"));
        assert!(!valid_attribute_name("name} SET u.admin = true //"));
        assert!(!valid_attribute_name("with space"));
        assert!(!valid_attribute_name("dash-ed"));
    }

    #[test]
    fn attr_value_from_impls() {
        assert_eq!(AttrValue::from(3i64), AttrValue::Int(3));
        assert_eq!(AttrValue::from(true), AttrValue::Bool(true));
        assert_eq!(AttrValue::from("x"), AttrValue::Str("x".into()));
    }

    #[test]
    fn attr_value_serializes_untagged() {
        let mut attrs = BTreeMap::new();
        attrs.insert("login".to_string(), AttrValue::Int(3));
        attrs.insert("name".to_string(), AttrValue::Str("Ada".into()));
        let record = UserRecord {
            id: "ada".into(),
            attributes: attrs,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["attributes"]["login"], 3);
        assert_eq!(json["attributes"]["name"], "Ada");

        let back: UserRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn quiz_spec_defaults_are_empty() {
        let spec = QuizSessionSpec::default();
        assert!(spec.name.is_none());
        assert!(spec.question_count.is_none());
        assert!(spec.topics.is_none());
        assert!(spec.selected_pdfs.is_none());
    }
}
