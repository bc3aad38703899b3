//! Session & progress graph store.
//!
//! Two backends behind one enum: [`Neo4jStore`] for production and
//! [`MemoryStore`] for tests and serverless local runs. Dispatch is a plain
//! match; the backend set is closed, so a trait object buys nothing here.

pub mod adapter;
pub mod memory;
pub mod neo4j;
pub mod types;

use std::collections::BTreeMap;

use tracing::info;

use crate::config::Config;
use crate::error::GraphError;
use adapter::GraphAdapter;
use memory::MemoryStore;
use neo4j::Neo4jStore;
use types::{
    AnswerRecord, AttrValue, ChatRole, ChatTurn, DeleteReport, NewQuestion, QuizSessionSpec,
    Relationship, RelationshipKind, SessionKind, SessionRef, SessionSummary, UserRecord,
};

#[derive(Debug)]
pub enum GraphStore {
    Neo4j(Neo4jStore),
    Memory(MemoryStore),
}

impl GraphStore {
    /// Build the backend named by `graph.backend` in the config.
    pub async fn connect(config: &Config) -> Result<Self, GraphError> {
        match config.graph.backend.as_str() {
            "neo4j" => {
                let password = config.graph.password.as_deref().unwrap_or("");
                let adapter =
                    GraphAdapter::connect(&config.graph.uri, &config.graph.username, password)
                        .await?;
                let store = Neo4jStore::new(adapter, config.history.default_depth);
                store.ensure_schema().await?;
                Ok(GraphStore::Neo4j(store))
            }
            "memory" => {
                info!("using in-memory graph store");
                Ok(GraphStore::Memory(MemoryStore::new(
                    config.history.default_depth,
                )))
            }
            other => Err(GraphError::Config(format!(
                "unknown graph backend: {other:?}"
            ))),
        }
    }

    // ── User & relationship manager ───────────────────────────────────────

    pub async fn upsert_user(
        &self,
        user_id: &str,
        attributes: &BTreeMap<String, AttrValue>,
    ) -> Result<(), GraphError> {
        match self {
            GraphStore::Neo4j(s) => s.upsert_user(user_id, attributes).await,
            GraphStore::Memory(s) => s.upsert_user(user_id, attributes).await,
        }
    }

    pub async fn get_user(&self, user_id: &str) -> Result<UserRecord, GraphError> {
        match self {
            GraphStore::Neo4j(s) => s.get_user(user_id).await,
            GraphStore::Memory(s) => s.get_user(user_id).await,
        }
    }

    pub async fn create_relationship(
        &self,
        from: &str,
        to: &str,
        kind: RelationshipKind,
    ) -> Result<Relationship, GraphError> {
        match self {
            GraphStore::Neo4j(s) => s.create_relationship(from, to, kind).await,
            GraphStore::Memory(s) => s.create_relationship(from, to, kind).await,
        }
    }

    pub async fn delete_relationship(
        &self,
        from: &str,
        to: &str,
        kind: RelationshipKind,
    ) -> Result<bool, GraphError> {
        match self {
            GraphStore::Neo4j(s) => s.delete_relationship(from, to, kind).await,
            GraphStore::Memory(s) => s.delete_relationship(from, to, kind).await,
        }
    }

    pub async fn list_relationships(
        &self,
        user_id: &str,
    ) -> Result<Vec<Relationship>, GraphError> {
        match self {
            GraphStore::Neo4j(s) => s.list_relationships(user_id).await,
            GraphStore::Memory(s) => s.list_relationships(user_id).await,
        }
    }

    // ── Session manager ───────────────────────────────────────────────────

    pub async fn get_or_create_session(
        &self,
        user_id: &str,
        kind: SessionKind,
    ) -> Result<SessionRef, GraphError> {
        match self {
            GraphStore::Neo4j(s) => s.get_or_create_session(user_id, kind).await,
            GraphStore::Memory(s) => s.get_or_create_session(user_id, kind).await,
        }
    }

    pub async fn get_or_create_chat_session(
        &self,
        user_id: &str,
    ) -> Result<SessionRef, GraphError> {
        self.get_or_create_session(user_id, SessionKind::Chat).await
    }

    pub async fn get_or_create_quiz_session(
        &self,
        user_id: &str,
    ) -> Result<SessionRef, GraphError> {
        self.get_or_create_session(user_id, SessionKind::Quiz).await
    }

    pub async fn create_quiz_session(
        &self,
        user_id: &str,
        spec: QuizSessionSpec,
    ) -> Result<SessionSummary, GraphError> {
        match self {
            GraphStore::Neo4j(s) => s.create_quiz_session(user_id, spec).await,
            GraphStore::Memory(s) => s.create_quiz_session(user_id, spec).await,
        }
    }

    pub async fn rename_session(
        &self,
        session_id: &str,
        new_name: &str,
    ) -> Result<bool, GraphError> {
        match self {
            GraphStore::Neo4j(s) => s.rename_session(session_id, new_name).await,
            GraphStore::Memory(s) => s.rename_session(session_id, new_name).await,
        }
    }

    pub async fn delete_session(&self, session_id: &str) -> Result<DeleteReport, GraphError> {
        match self {
            GraphStore::Neo4j(s) => s.delete_session(session_id).await,
            GraphStore::Memory(s) => s.delete_session(session_id).await,
        }
    }

    pub async fn update_question_cursor(
        &self,
        session_id: &str,
        current: i64,
    ) -> Result<(), GraphError> {
        match self {
            GraphStore::Neo4j(s) => s.update_question_cursor(session_id, current).await,
            GraphStore::Memory(s) => s.update_question_cursor(session_id, current).await,
        }
    }

    pub async fn list_quiz_sessions_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<SessionSummary>, GraphError> {
        match self {
            GraphStore::Neo4j(s) => s.list_quiz_sessions_for_user(user_id).await,
            GraphStore::Memory(s) => s.list_quiz_sessions_for_user(user_id).await,
        }
    }

    pub async fn get_quiz_session_by_id(
        &self,
        session_id: &str,
    ) -> Result<SessionSummary, GraphError> {
        match self {
            GraphStore::Neo4j(s) => s.get_quiz_session_by_id(session_id).await,
            GraphStore::Memory(s) => s.get_quiz_session_by_id(session_id).await,
        }
    }

    // ── Question/answer ledger ────────────────────────────────────────────

    pub async fn create_question(
        &self,
        session_id: &str,
        question: NewQuestion,
    ) -> Result<(), GraphError> {
        match self {
            GraphStore::Neo4j(s) => s.create_question(session_id, question).await,
            GraphStore::Memory(s) => s.create_question(session_id, question).await,
        }
    }

    pub async fn save_answer(
        &self,
        user_id: &str,
        question_text: &str,
        answer_text: &str,
        is_correct: bool,
    ) -> Result<(), GraphError> {
        match self {
            GraphStore::Neo4j(s) => {
                s.save_answer(user_id, question_text, answer_text, is_correct)
                    .await
            }
            GraphStore::Memory(s) => {
                s.save_answer(user_id, question_text, answer_text, is_correct)
                    .await
            }
        }
    }

    pub async fn list_answers_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<AnswerRecord>, GraphError> {
        match self {
            GraphStore::Neo4j(s) => s.list_answers_for_user(user_id).await,
            GraphStore::Memory(s) => s.list_answers_for_user(user_id).await,
        }
    }

    // ── Chat history chain ────────────────────────────────────────────────

    pub async fn append_message(
        &self,
        session_id: &str,
        role: ChatRole,
        content: &str,
    ) -> Result<i64, GraphError> {
        match self {
            GraphStore::Neo4j(s) => s.append_message(session_id, role, content).await,
            GraphStore::Memory(s) => s.append_message(session_id, role, content).await,
        }
    }

    pub async fn get_history(
        &self,
        session_id: &str,
        depth: Option<usize>,
    ) -> Result<Vec<ChatTurn>, GraphError> {
        match self {
            GraphStore::Neo4j(s) => s.get_history(session_id, depth).await,
            GraphStore::Memory(s) => s.get_history(session_id, depth).await,
        }
    }

    pub async fn get_history_for_user(
        &self,
        user_id: &str,
    ) -> Result<BTreeMap<String, Vec<ChatTurn>>, GraphError> {
        match self {
            GraphStore::Neo4j(s) => s.get_history_for_user(user_id).await,
            GraphStore::Memory(s) => s.get_history_for_user(user_id).await,
        }
    }

    pub async fn delete_history(&self, session_id: &str) -> Result<u64, GraphError> {
        match self {
            GraphStore::Neo4j(s) => s.delete_history(session_id).await,
            GraphStore::Memory(s) => s.delete_history(session_id).await,
        }
    }

    // ── Tutor-support reads ───────────────────────────────────────────────

    pub async fn get_user_preferences(
        &self,
        user_id: &str,
    ) -> Result<Option<(String, Vec<String>)>, GraphError> {
        match self {
            GraphStore::Neo4j(s) => s.get_user_preferences(user_id).await,
            GraphStore::Memory(s) => s.get_user_preferences(user_id).await,
        }
    }

    pub async fn fetch_bank_questions(
        &self,
        level: &str,
        preferences: &[String],
        limit: usize,
    ) -> Result<Vec<(String, String)>, GraphError> {
        match self {
            GraphStore::Neo4j(s) => s.fetch_bank_questions(level, preferences, limit).await,
            GraphStore::Memory(s) => s.fetch_bank_questions(level, preferences, limit).await,
        }
    }
}
