//! In-memory store backend.
//!
//! Used by unit and integration tests and by local development without a
//! Neo4j server. It is not a lookup-table fake: messages form a real linked
//! chain with a moving last-message anchor, session get-or-create converges
//! the same way, and deletes cascade over the same node sets the Neo4j
//! backend touches.

use std::collections::BTreeMap;

use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::GraphError;
use crate::graph::types::{
    AnswerRecord, AttrValue, ChatRole, ChatTurn, DEFAULT_SESSION_NAME, DeleteReport, NewQuestion,
    QuizSessionSpec, Relationship, RelationshipKind, SessionKind, SessionRef, SessionSummary,
    UserRecord, valid_attribute_name,
};

#[derive(Debug, Clone)]
struct MemSession {
    owner: String,
    summary: SessionSummary,
    /// Monotonic tiebreaker so "most recent" is exact even when two
    /// sessions share a timestamp.
    created_order: u64,
    questions: Vec<String>,
}

#[derive(Debug, Clone)]
struct MemMessage {
    session_id: String,
    role: ChatRole,
    content: String,
    seq: i64,
    /// The message this one links back to, the `NEXT` edge.
    next: Option<String>,
}

#[derive(Debug, Clone)]
struct BankQuestion {
    title: String,
    body: String,
    difficulty: String,
    score: i64,
    tags: Vec<String>,
}

#[derive(Debug, Default)]
struct MemGraph {
    users: BTreeMap<String, BTreeMap<String, AttrValue>>,
    sessions: BTreeMap<String, MemSession>,
    questions: BTreeMap<String, NewQuestion>,
    answers: BTreeMap<String, Vec<AnswerRecord>>,
    messages: BTreeMap<String, MemMessage>,
    /// session id → id of the chain head (`LAST_MESSAGE`).
    anchors: BTreeMap<String, String>,
    relationships: Vec<Relationship>,
    preferences: BTreeMap<String, (String, Vec<String>)>,
    bank: Vec<BankQuestion>,
    next_order: u64,
}

#[derive(Debug)]
pub struct MemoryStore {
    inner: RwLock<MemGraph>,
    default_depth: usize,
}

impl MemoryStore {
    pub fn new(default_depth: usize) -> Self {
        Self {
            inner: RwLock::new(MemGraph::default()),
            default_depth,
        }
    }

    // ── User & relationship manager ───────────────────────────────────────

    pub async fn upsert_user(
        &self,
        user_id: &str,
        attributes: &BTreeMap<String, AttrValue>,
    ) -> Result<(), GraphError> {
        require_id(user_id, "user id")?;
        for name in attributes.keys() {
            if !valid_attribute_name(name) {
                return Err(GraphError::InvalidArgument(format!(
                    "invalid attribute name: {name:?}"
                )));
            }
        }
        let mut g = self.inner.write().await;
        let existing = g.users.entry(user_id.to_string()).or_default();
        for (k, v) in attributes {
            existing.insert(k.clone(), v.clone());
        }
        Ok(())
    }

    pub async fn get_user(&self, user_id: &str) -> Result<UserRecord, GraphError> {
        require_id(user_id, "user id")?;
        let g = self.inner.read().await;
        let attributes = g
            .users
            .get(user_id)
            .cloned()
            .ok_or_else(|| GraphError::not_found(format!("user '{user_id}'")))?;
        Ok(UserRecord {
            id: user_id.to_string(),
            attributes,
        })
    }

    pub async fn create_relationship(
        &self,
        from: &str,
        to: &str,
        kind: RelationshipKind,
    ) -> Result<Relationship, GraphError> {
        require_id(from, "user id")?;
        require_id(to, "user id")?;
        let mut g = self.inner.write().await;
        if !g.users.contains_key(from) || !g.users.contains_key(to) {
            return Err(GraphError::not_found(format!("user '{from}' or '{to}'")));
        }
        let rel = Relationship {
            from: from.to_string(),
            to: to.to_string(),
            kind,
        };
        // merge semantics: at most one edge per (from, to, kind)
        if !g.relationships.contains(&rel) {
            g.relationships.push(rel.clone());
        }
        Ok(rel)
    }

    pub async fn delete_relationship(
        &self,
        from: &str,
        to: &str,
        kind: RelationshipKind,
    ) -> Result<bool, GraphError> {
        require_id(from, "user id")?;
        require_id(to, "user id")?;
        let mut g = self.inner.write().await;
        let before = g.relationships.len();
        g.relationships
            .retain(|r| !(r.from == from && r.to == to && r.kind == kind));
        Ok(g.relationships.len() < before)
    }

    pub async fn list_relationships(
        &self,
        user_id: &str,
    ) -> Result<Vec<Relationship>, GraphError> {
        require_id(user_id, "user id")?;
        let g = self.inner.read().await;
        let mut out: Vec<Relationship> = g
            .relationships
            .iter()
            .filter(|r| r.from == user_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| (&a.to, a.kind.as_cypher()).cmp(&(&b.to, b.kind.as_cypher())));
        Ok(out)
    }

    // ── Session manager ───────────────────────────────────────────────────

    pub async fn get_or_create_session(
        &self,
        user_id: &str,
        kind: SessionKind,
    ) -> Result<SessionRef, GraphError> {
        require_id(user_id, "user id")?;
        let mut g = self.inner.write().await;

        if let Some(existing) = g
            .sessions
            .values()
            .filter(|s| s.owner == user_id && s.summary.kind == kind)
            .max_by_key(|s| s.created_order)
        {
            return Ok(SessionRef {
                session_id: existing.summary.id.clone(),
                created: false,
            });
        }

        // lookup-then-insert under one write lock stands in for the
        // open_key constraint the Neo4j backend relies on
        g.users.entry(user_id.to_string()).or_default();
        let id = Uuid::new_v4().to_string();
        let order = g.next_order;
        g.next_order += 1;
        g.sessions.insert(
            id.clone(),
            MemSession {
                owner: user_id.to_string(),
                summary: SessionSummary {
                    id: id.clone(),
                    kind,
                    sname: DEFAULT_SESSION_NAME.to_string(),
                    created_at: Utc::now().to_rfc3339(),
                    question_count: 0,
                    current_question_count: 0,
                    score: 0,
                    topics: Vec::new(),
                    selected_pdfs: Vec::new(),
                },
                created_order: order,
                questions: Vec::new(),
            },
        );
        Ok(SessionRef {
            session_id: id,
            created: true,
        })
    }

    pub async fn create_quiz_session(
        &self,
        user_id: &str,
        spec: QuizSessionSpec,
    ) -> Result<SessionSummary, GraphError> {
        require_id(user_id, "user id")?;
        let mut g = self.inner.write().await;
        g.users.entry(user_id.to_string()).or_default();

        let sname = match spec.name {
            Some(name) if !name.trim().is_empty() => name,
            _ => DEFAULT_SESSION_NAME.to_string(),
        };
        let summary = SessionSummary {
            id: Uuid::new_v4().to_string(),
            kind: SessionKind::Quiz,
            sname,
            created_at: Utc::now().to_rfc3339(),
            question_count: spec.question_count.unwrap_or(0),
            current_question_count: 0,
            score: 0,
            topics: spec.topics.unwrap_or_default(),
            selected_pdfs: spec.selected_pdfs.unwrap_or_default(),
        };
        let order = g.next_order;
        g.next_order += 1;
        g.sessions.insert(
            summary.id.clone(),
            MemSession {
                owner: user_id.to_string(),
                summary: summary.clone(),
                created_order: order,
                questions: Vec::new(),
            },
        );
        Ok(summary)
    }

    pub async fn rename_session(
        &self,
        session_id: &str,
        new_name: &str,
    ) -> Result<bool, GraphError> {
        require_id(session_id, "session id")?;
        let mut g = self.inner.write().await;
        match g.sessions.get_mut(session_id) {
            Some(s) => {
                s.summary.sname = new_name.to_string();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub async fn delete_session(&self, session_id: &str) -> Result<DeleteReport, GraphError> {
        require_id(session_id, "session id")?;
        let mut g = self.inner.write().await;
        let Some(session) = g.sessions.remove(session_id) else {
            return Ok(DeleteReport {
                deleted: false,
                nodes_deleted: 0,
            });
        };
        let mut deleted = 1u64;
        for qid in &session.questions {
            if g.questions.remove(qid).is_some() {
                deleted += 1;
            }
        }
        let before = g.messages.len();
        g.messages.retain(|_, m| m.session_id != session_id);
        deleted += (before - g.messages.len()) as u64;
        g.anchors.remove(session_id);
        Ok(DeleteReport {
            deleted: true,
            nodes_deleted: deleted,
        })
    }

    pub async fn update_question_cursor(
        &self,
        session_id: &str,
        current: i64,
    ) -> Result<(), GraphError> {
        require_id(session_id, "session id")?;
        let mut g = self.inner.write().await;
        let session = g
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| GraphError::not_found(format!("session '{session_id}'")))?;
        session.summary.current_question_count = current;
        Ok(())
    }

    pub async fn list_quiz_sessions_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<SessionSummary>, GraphError> {
        require_id(user_id, "user id")?;
        let g = self.inner.read().await;
        let mut sessions: Vec<&MemSession> = g
            .sessions
            .values()
            .filter(|s| s.owner == user_id && s.summary.kind == SessionKind::Quiz)
            .collect();
        sessions.sort_by(|a, b| b.created_order.cmp(&a.created_order));
        Ok(sessions.into_iter().map(|s| s.summary.clone()).collect())
    }

    pub async fn get_quiz_session_by_id(
        &self,
        session_id: &str,
    ) -> Result<SessionSummary, GraphError> {
        require_id(session_id, "session id")?;
        let g = self.inner.read().await;
        g.sessions
            .get(session_id)
            .filter(|s| s.summary.kind == SessionKind::Quiz)
            .map(|s| s.summary.clone())
            .ok_or_else(|| GraphError::not_found(format!("quiz session '{session_id}'")))
    }

    // ── Question/answer ledger ────────────────────────────────────────────

    pub async fn create_question(
        &self,
        session_id: &str,
        question: NewQuestion,
    ) -> Result<(), GraphError> {
        require_id(session_id, "session id")?;
        require_id(&question.id, "question id")?;
        let mut g = self.inner.write().await;
        // missing session is a silent no-op, same as the MATCH-less CREATE
        let Some(session) = g.sessions.get_mut(session_id) else {
            return Ok(());
        };
        session.questions.push(question.id.clone());
        g.questions.insert(question.id.clone(), question);
        Ok(())
    }

    pub async fn save_answer(
        &self,
        user_id: &str,
        question_text: &str,
        answer_text: &str,
        is_correct: bool,
    ) -> Result<(), GraphError> {
        require_id(user_id, "user id")?;
        let mut g = self.inner.write().await;
        g.users.entry(user_id.to_string()).or_default();
        g.answers
            .entry(user_id.to_string())
            .or_default()
            .push(AnswerRecord {
                question: question_text.to_string(),
                answer: answer_text.to_string(),
                is_correct,
                created_at: Utc::now().to_rfc3339(),
            });
        Ok(())
    }

    pub async fn list_answers_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<AnswerRecord>, GraphError> {
        require_id(user_id, "user id")?;
        let g = self.inner.read().await;
        Ok(g.answers.get(user_id).cloned().unwrap_or_default())
    }

    // ── Chat history chain ────────────────────────────────────────────────

    pub async fn append_message(
        &self,
        session_id: &str,
        role: ChatRole,
        content: &str,
    ) -> Result<i64, GraphError> {
        require_id(session_id, "session id")?;
        let mut g = self.inner.write().await;
        if !g.sessions.contains_key(session_id) {
            return Err(GraphError::not_found(format!("session '{session_id}'")));
        }
        let prev_id = g.anchors.get(session_id).cloned();
        let seq = prev_id
            .as_ref()
            .and_then(|id| g.messages.get(id))
            .map(|m| m.seq + 1)
            .unwrap_or(1);
        let id = Uuid::new_v4().to_string();
        g.messages.insert(
            id.clone(),
            MemMessage {
                session_id: session_id.to_string(),
                role,
                content: content.to_string(),
                seq,
                next: prev_id,
            },
        );
        g.anchors.insert(session_id.to_string(), id);
        Ok(seq)
    }

    pub async fn get_history(
        &self,
        session_id: &str,
        depth: Option<usize>,
    ) -> Result<Vec<ChatTurn>, GraphError> {
        require_id(session_id, "session id")?;
        let depth = depth.unwrap_or(self.default_depth);
        let g = self.inner.read().await;
        Ok(walk_chain(&g, session_id, depth))
    }

    pub async fn get_history_for_user(
        &self,
        user_id: &str,
    ) -> Result<BTreeMap<String, Vec<ChatTurn>>, GraphError> {
        require_id(user_id, "user id")?;
        let g = self.inner.read().await;
        let mut grouped = BTreeMap::new();
        for session in g.sessions.values().filter(|s| s.owner == user_id) {
            let turns = walk_chain(&g, &session.summary.id, self.default_depth);
            if !turns.is_empty() {
                grouped.insert(session.summary.id.clone(), turns);
            }
        }
        Ok(grouped)
    }

    pub async fn delete_history(&self, session_id: &str) -> Result<u64, GraphError> {
        require_id(session_id, "session id")?;
        let mut g = self.inner.write().await;
        let before = g.messages.len();
        g.messages.retain(|_, m| m.session_id != session_id);
        g.anchors.remove(session_id);
        Ok((before - g.messages.len()) as u64)
    }

    // ── Tutor-support reads ───────────────────────────────────────────────

    pub async fn get_user_preferences(
        &self,
        user_id: &str,
    ) -> Result<Option<(String, Vec<String>)>, GraphError> {
        require_id(user_id, "user id")?;
        let g = self.inner.read().await;
        Ok(g.preferences.get(user_id).cloned())
    }

    pub async fn fetch_bank_questions(
        &self,
        level: &str,
        preferences: &[String],
        limit: usize,
    ) -> Result<Vec<(String, String)>, GraphError> {
        let g = self.inner.read().await;
        let mut matches: Vec<&BankQuestion> = g
            .bank
            .iter()
            .filter(|q| q.difficulty == level && q.tags.iter().any(|t| preferences.contains(t)))
            .collect();
        matches.sort_by(|a, b| b.score.cmp(&a.score));
        Ok(matches
            .into_iter()
            .take(limit)
            .map(|q| (q.title.clone(), q.body.clone()))
            .collect())
    }

    // ── Seeding helpers for tests and local development ───────────────────

    pub async fn seed_preferences(&self, user_id: &str, level: &str, preferences: Vec<String>) {
        let mut g = self.inner.write().await;
        g.users.entry(user_id.to_string()).or_default();
        g.preferences
            .insert(user_id.to_string(), (level.to_string(), preferences));
    }

    pub async fn seed_bank_question(
        &self,
        title: &str,
        body: &str,
        difficulty: &str,
        score: i64,
        tags: Vec<String>,
    ) {
        let mut g = self.inner.write().await;
        g.bank.push(BankQuestion {
            title: title.to_string(),
            body: body.to_string(),
            difficulty: difficulty.to_string(),
            score,
            tags,
        });
    }
}

/// Follow `NEXT` pointers back from the anchor, newest first, then put the
/// collected turns in chronological order.
fn walk_chain(g: &MemGraph, session_id: &str, depth: usize) -> Vec<ChatTurn> {
    let mut turns = Vec::new();
    let mut cursor = g.anchors.get(session_id).cloned();
    while let Some(id) = cursor {
        if turns.len() >= depth {
            break;
        }
        let Some(msg) = g.messages.get(&id) else {
            break;
        };
        turns.push(ChatTurn {
            role: msg.role,
            content: msg.content.clone(),
        });
        cursor = msg.next.clone();
    }
    turns.reverse();
    turns
}

fn require_id(id: &str, what: &str) -> Result<(), GraphError> {
    if id.trim().is_empty() {
        return Err(GraphError::InvalidArgument(format!(
            "{what} must not be empty"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> MemoryStore {
        MemoryStore::new(6)
    }

    #[tokio::test]
    async fn chain_walk_reverses_into_chronological_order() {
        let s = store();
        let sid = s
            .get_or_create_session("ada", SessionKind::Chat)
            .await
            .unwrap()
            .session_id;
        s.append_message(&sid, ChatRole::User, "m1").await.unwrap();
        s.append_message(&sid, ChatRole::Assistant, "m2").await.unwrap();
        s.append_message(&sid, ChatRole::User, "m3").await.unwrap();

        let turns = s.get_history(&sid, None).await.unwrap();
        let contents: Vec<&str> = turns.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["m1", "m2", "m3"]);
    }

    #[tokio::test]
    async fn seq_is_monotonic_from_one() {
        let s = store();
        let sid = s
            .get_or_create_session("ada", SessionKind::Chat)
            .await
            .unwrap()
            .session_id;
        assert_eq!(s.append_message(&sid, ChatRole::User, "a").await.unwrap(), 1);
        assert_eq!(s.append_message(&sid, ChatRole::Assistant, "b").await.unwrap(), 2);
        assert_eq!(s.append_message(&sid, ChatRole::User, "c").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn history_depth_bounds_result() {
        let s = store();
        let sid = s
            .get_or_create_session("ada", SessionKind::Chat)
            .await
            .unwrap()
            .session_id;
        for i in 0..10 {
            s.append_message(&sid, ChatRole::User, &format!("t{i}"))
                .await
                .unwrap();
        }
        let turns = s.get_history(&sid, Some(3)).await.unwrap();
        let contents: Vec<&str> = turns.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["t7", "t8", "t9"]);
    }

    #[tokio::test]
    async fn append_to_unknown_session_is_not_found() {
        let s = store();
        let err = s
            .append_message("nope", ChatRole::User, "x")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn bank_questions_filter_by_level_and_tags() {
        let s = store();
        s.seed_bank_question("q1", "b1", "beginner", 10, vec!["css".into()])
            .await;
        s.seed_bank_question("q2", "b2", "beginner", 20, vec!["rust".into()])
            .await;
        s.seed_bank_question("q3", "b3", "advanced", 30, vec!["css".into()])
            .await;

        let got = s
            .fetch_bank_questions("beginner", &["css".into()], 5)
            .await
            .unwrap();
        assert_eq!(got, vec![("q1".to_string(), "b1".to_string())]);
    }
}
