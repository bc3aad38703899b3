//! Neo4j store backend.
//!
//! Every operation is one parameterized Cypher statement pushed through the
//! [`GraphAdapter`]. Identifier-like values (relationship types, attribute
//! names) are either closed enums or validated before they reach query text;
//! everything else is bound as a parameter.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::Utc;
use neo4rs::{Query, query};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::GraphError;
use crate::graph::adapter::GraphAdapter;
use crate::graph::types::{
    AnswerRecord, AttrValue, ChatRole, ChatTurn, DEFAULT_SESSION_NAME, DeleteReport, NewQuestion,
    QuizSessionSpec, Relationship, RelationshipKind, SessionKind, SessionRef, SessionSummary,
    UserRecord, valid_attribute_name,
};

pub struct Neo4jStore {
    adapter: GraphAdapter,
    default_depth: usize,
}

impl Neo4jStore {
    pub fn new(adapter: GraphAdapter, default_depth: usize) -> Self {
        Self {
            adapter,
            default_depth,
        }
    }

    pub async fn ensure_schema(&self) -> Result<(), GraphError> {
        self.adapter.ensure_schema().await
    }

    // ── User & relationship manager ───────────────────────────────────────

    pub async fn upsert_user(
        &self,
        user_id: &str,
        attributes: &BTreeMap<String, AttrValue>,
    ) -> Result<(), GraphError> {
        require_id(user_id, "user id")?;

        let mut clauses = Vec::new();
        for (i, name) in attributes.keys().enumerate() {
            if !valid_attribute_name(name) {
                return Err(GraphError::InvalidArgument(format!(
                    "invalid attribute name: {name:?}"
                )));
            }
            clauses.push(format!("u.{name} = $v{i}"));
        }

        let cypher = if clauses.is_empty() {
            "MERGE (u:User {id: $id})".to_string()
        } else {
            format!("MERGE (u:User {{id: $id}}) SET {}", clauses.join(", "))
        };

        let mut q = query(&cypher).param("id", user_id);
        for (i, value) in attributes.values().enumerate() {
            q = bind_attr(q, &format!("v{i}"), value);
        }
        self.adapter.run(q).await?;

        debug!(user_id = %user_id, attrs = attributes.len(), "user upserted");
        Ok(())
    }

    pub async fn get_user(&self, user_id: &str) -> Result<UserRecord, GraphError> {
        require_id(user_id, "user id")?;

        let q = query("MATCH (u:User {id: $id}) RETURN u").param("id", user_id);
        let row = self
            .adapter
            .fetch_one(q)
            .await?
            .ok_or_else(|| GraphError::not_found(format!("user '{user_id}'")))?;

        let node: neo4rs::Node = row
            .get("u")
            .map_err(|e| GraphError::InvalidArgument(format!("malformed user node: {e}")))?;

        let mut attributes = BTreeMap::new();
        for key in node.keys() {
            if key == "id" {
                continue;
            }
            if let Some(value) = attr_from_node(&node, key) {
                attributes.insert(key.to_string(), value);
            }
        }
        Ok(UserRecord {
            id: user_id.to_string(),
            attributes,
        })
    }

    /// Both endpoints must already exist: creating missing users implicitly
    /// (a MERGE on both ends) is rejected by design.
    pub async fn create_relationship(
        &self,
        from: &str,
        to: &str,
        kind: RelationshipKind,
    ) -> Result<Relationship, GraphError> {
        require_id(from, "user id")?;
        require_id(to, "user id")?;

        let cypher = format!(
            "MATCH (a:User {{id: $from}}) \
             MATCH (b:User {{id: $to}}) \
             MERGE (a)-[r:{}]->(b) \
             RETURN type(r) AS kind",
            kind.as_cypher()
        );
        let q = query(&cypher).param("from", from).param("to", to);
        let row = self.adapter.fetch_one(q).await?.ok_or_else(|| {
            GraphError::not_found(format!("user '{from}' or '{to}'"))
        })?;

        let created: String = row
            .get("kind")
            .map_err(|e| GraphError::InvalidArgument(format!("malformed relationship: {e}")))?;
        info!(from = %from, to = %to, kind = %created, "relationship created");
        Ok(Relationship {
            from: from.to_string(),
            to: to.to_string(),
            kind,
        })
    }

    /// Idempotent: returns whether an edge was actually removed.
    pub async fn delete_relationship(
        &self,
        from: &str,
        to: &str,
        kind: RelationshipKind,
    ) -> Result<bool, GraphError> {
        require_id(from, "user id")?;
        require_id(to, "user id")?;

        let cypher = format!(
            "MATCH (a:User {{id: $from}})-[r:{}]->(b:User {{id: $to}}) \
             DELETE r \
             RETURN count(r) AS removed",
            kind.as_cypher()
        );
        let q = query(&cypher).param("from", from).param("to", to);
        let removed = match self.adapter.fetch_one(q).await? {
            Some(row) => row.get::<i64>("removed").unwrap_or(0),
            None => 0,
        };
        Ok(removed > 0)
    }

    pub async fn list_relationships(
        &self,
        user_id: &str,
    ) -> Result<Vec<Relationship>, GraphError> {
        require_id(user_id, "user id")?;

        let q = query(
            "MATCH (a:User {id: $id})-[r:FOLLOWS|FRIENDS|BLOCKS]->(b:User) \
             RETURN type(r) AS kind, b.id AS to \
             ORDER BY to, kind",
        )
        .param("id", user_id);

        let mut out = Vec::new();
        for row in self.adapter.fetch(q).await? {
            let kind: String = row.get("kind").unwrap_or_default();
            let to: String = row.get("to").unwrap_or_default();
            out.push(Relationship {
                from: user_id.to_string(),
                to,
                kind: RelationshipKind::from_str(&kind)?,
            });
        }
        Ok(out)
    }

    // ── Session manager ───────────────────────────────────────────────────

    pub async fn get_or_create_session(
        &self,
        user_id: &str,
        kind: SessionKind,
    ) -> Result<SessionRef, GraphError> {
        require_id(user_id, "user id")?;

        // Fast path: newest qualifying session wins deterministically.
        let lookup = query(
            "MATCH (u:User {id: $uid})-[:HAS_SESSION]->(s:Session {kind: $kind}) \
             RETURN s.id AS id ORDER BY s.created_at DESC LIMIT 1",
        )
        .param("uid", user_id)
        .param("kind", kind.as_str());
        if let Some(row) = self.adapter.fetch_one(lookup).await? {
            let id: String = row
                .get("id")
                .map_err(|e| GraphError::InvalidArgument(format!("malformed session: {e}")))?;
            return Ok(SessionRef {
                session_id: id,
                created: false,
            });
        }

        // Slow path: MERGE on the composite open key. Two concurrent misses
        // converge on the same node instead of creating duplicates; the
        // uniqueness constraint on open_key backs this up server-side.
        let session_id = Uuid::new_v4().to_string();
        let open_key = format!("{user_id}:{}", kind.as_str());
        let q = query(
            "MERGE (u:User {id: $uid}) \
             MERGE (u)-[:HAS_SESSION]->(s:Session {open_key: $key}) \
             ON CREATE SET s.id = $sid, s.kind = $kind, s.sname = $sname, \
                           s.created_at = $now, s.question_count = 0, \
                           s.current_question_count = 0, s.score = 0, \
                           s.topics = [], s.selected_pdfs = [] \
             RETURN s.id AS id",
        )
        .param("uid", user_id)
        .param("key", open_key)
        .param("sid", session_id.clone())
        .param("kind", kind.as_str())
        .param("sname", DEFAULT_SESSION_NAME)
        .param("now", Utc::now().to_rfc3339());

        let row = self
            .adapter
            .fetch_one(q)
            .await?
            .ok_or_else(|| GraphError::not_found(format!("user '{user_id}'")))?;
        let id: String = row
            .get("id")
            .map_err(|e| GraphError::InvalidArgument(format!("malformed session: {e}")))?;

        let created = id == session_id;
        if created {
            info!(user_id = %user_id, session_id = %id, kind = %kind, "session created");
        }
        Ok(SessionRef {
            session_id: id,
            created,
        })
    }

    /// Always creates a fresh quiz session: no dedup, no open key.
    pub async fn create_quiz_session(
        &self,
        user_id: &str,
        spec: QuizSessionSpec,
    ) -> Result<SessionSummary, GraphError> {
        require_id(user_id, "user id")?;

        let id = Uuid::new_v4().to_string();
        let sname = match spec.name {
            Some(name) if !name.trim().is_empty() => name,
            _ => DEFAULT_SESSION_NAME.to_string(),
        };
        let now = Utc::now().to_rfc3339();
        let question_count = spec.question_count.unwrap_or(0);
        let topics = spec.topics.unwrap_or_default();
        let selected_pdfs = spec.selected_pdfs.unwrap_or_default();

        let q = query(
            "MERGE (u:User {id: $uid}) \
             CREATE (u)-[:HAS_SESSION]->(s:Session {id: $sid, kind: 'quiz', \
                 sname: $sname, created_at: $now, question_count: $qc, \
                 current_question_count: 0, score: 0, topics: $topics, \
                 selected_pdfs: $pdfs})",
        )
        .param("uid", user_id)
        .param("sid", id.clone())
        .param("sname", sname.clone())
        .param("now", now.clone())
        .param("qc", question_count)
        .param("topics", topics.clone())
        .param("pdfs", selected_pdfs.clone());
        self.adapter.run(q).await?;

        info!(user_id = %user_id, session_id = %id, question_count, "quiz session created");
        Ok(SessionSummary {
            id,
            kind: SessionKind::Quiz,
            sname,
            created_at: now,
            question_count,
            current_question_count: 0,
            score: 0,
            topics,
            selected_pdfs,
        })
    }

    /// Returns `false` when the session does not exist.
    pub async fn rename_session(
        &self,
        session_id: &str,
        new_name: &str,
    ) -> Result<bool, GraphError> {
        require_id(session_id, "session id")?;

        let q = query(
            "MATCH (s:Session {id: $sid}) SET s.sname = $name RETURN count(s) AS n",
        )
        .param("sid", session_id)
        .param("name", new_name);
        let n = match self.adapter.fetch_one(q).await? {
            Some(row) => row.get::<i64>("n").unwrap_or(0),
            None => 0,
        };
        Ok(n > 0)
    }

    /// Cascading delete: the session, its Questions, and its Messages go in
    /// one statement. Absent session is a no-op success.
    pub async fn delete_session(&self, session_id: &str) -> Result<DeleteReport, GraphError> {
        require_id(session_id, "session id")?;

        let q = query(
            "MATCH (s:Session {id: $sid}) \
             OPTIONAL MATCH (s)-[:CONTAINS]->(q:Question) \
             OPTIONAL MATCH (m:Message {session_id: $sid}) \
             WITH s, collect(DISTINCT q) AS questions, collect(DISTINCT m) AS messages \
             FOREACH (q IN questions | DETACH DELETE q) \
             FOREACH (m IN messages | DETACH DELETE m) \
             DETACH DELETE s \
             RETURN 1 + size(questions) + size(messages) AS deleted",
        )
        .param("sid", session_id);

        let report = match self.adapter.fetch_one(q).await? {
            Some(row) => DeleteReport {
                deleted: true,
                nodes_deleted: row.get::<i64>("deleted").unwrap_or(0).max(0) as u64,
            },
            None => DeleteReport {
                deleted: false,
                nodes_deleted: 0,
            },
        };
        info!(session_id = %session_id, nodes = report.nodes_deleted, "session deleted");
        Ok(report)
    }

    pub async fn update_question_cursor(
        &self,
        session_id: &str,
        current: i64,
    ) -> Result<(), GraphError> {
        require_id(session_id, "session id")?;

        let q = query(
            "MATCH (s:Session {id: $sid}) \
             SET s.current_question_count = $current \
             RETURN count(s) AS n",
        )
        .param("sid", session_id)
        .param("current", current);
        let n = match self.adapter.fetch_one(q).await? {
            Some(row) => row.get::<i64>("n").unwrap_or(0),
            None => 0,
        };
        if n == 0 {
            return Err(GraphError::not_found(format!("session '{session_id}'")));
        }
        Ok(())
    }

    pub async fn list_quiz_sessions_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<SessionSummary>, GraphError> {
        require_id(user_id, "user id")?;

        let q = query(&format!(
            "MATCH (u:User {{id: $uid}})-[:HAS_SESSION]->(s:Session {{kind: 'quiz'}}) \
             RETURN {} ORDER BY s.created_at DESC",
            SESSION_COLUMNS
        ))
        .param("uid", user_id);

        self.adapter
            .fetch(q)
            .await?
            .iter()
            .map(session_from_row)
            .collect()
    }

    pub async fn get_quiz_session_by_id(
        &self,
        session_id: &str,
    ) -> Result<SessionSummary, GraphError> {
        require_id(session_id, "session id")?;

        let q = query(&format!(
            "MATCH (s:Session {{id: $sid, kind: 'quiz'}}) RETURN {}",
            SESSION_COLUMNS
        ))
        .param("sid", session_id);
        match self.adapter.fetch_one(q).await? {
            Some(row) => session_from_row(&row),
            None => Err(GraphError::not_found(format!(
                "quiz session '{session_id}'"
            ))),
        }
    }

    // ── Question/answer ledger ────────────────────────────────────────────

    /// Attach a generated question to its session. A non-resolving session
    /// id makes this a silent no-op; the generation pipeline retries above
    /// this layer.
    pub async fn create_question(
        &self,
        session_id: &str,
        question: NewQuestion,
    ) -> Result<(), GraphError> {
        require_id(session_id, "session id")?;
        require_id(&question.id, "question id")?;

        let q = query(
            "MATCH (s:Session {id: $sid}) \
             CREATE (s)-[:CONTAINS]->(q:Question {id: $qid, text: $text, \
                 difficulty: $difficulty, completeness: $completeness, \
                 xp: $xp, created_at: $now})",
        )
        .param("sid", session_id)
        .param("qid", question.id.clone())
        .param("text", question.text)
        .param("difficulty", question.difficulty)
        .param("completeness", question.completeness)
        .param("xp", question.xp)
        .param("now", Utc::now().to_rfc3339());
        self.adapter.run(q).await?;

        debug!(session_id = %session_id, question_id = %question.id, "question attached");
        Ok(())
    }

    /// Append-only; merge-creates the user when absent.
    pub async fn save_answer(
        &self,
        user_id: &str,
        question_text: &str,
        answer_text: &str,
        is_correct: bool,
    ) -> Result<(), GraphError> {
        require_id(user_id, "user id")?;

        let q = query(
            "MERGE (u:User {id: $uid}) \
             CREATE (u)-[:SUBMITTED]->(a:Answer {question: $question, \
                 answer: $answer, is_correct: $correct, created_at: $now})",
        )
        .param("uid", user_id)
        .param("question", question_text)
        .param("answer", answer_text)
        .param("correct", is_correct)
        .param("now", Utc::now().to_rfc3339());
        self.adapter.run(q).await?;

        debug!(user_id = %user_id, is_correct, "answer recorded");
        Ok(())
    }

    pub async fn list_answers_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<AnswerRecord>, GraphError> {
        require_id(user_id, "user id")?;

        let q = query(
            "MATCH (u:User {id: $uid})-[:SUBMITTED]->(a:Answer) \
             RETURN a.question AS question, a.answer AS answer, \
                    a.is_correct AS is_correct, a.created_at AS created_at \
             ORDER BY a.created_at",
        )
        .param("uid", user_id);

        let mut out = Vec::new();
        for row in self.adapter.fetch(q).await? {
            out.push(AnswerRecord {
                question: row.get("question").unwrap_or_default(),
                answer: row.get("answer").unwrap_or_default(),
                is_correct: row.get("is_correct").unwrap_or(false),
                created_at: row.get("created_at").unwrap_or_default(),
            });
        }
        Ok(out)
    }

    // ── Chat history chain ────────────────────────────────────────────────

    /// Append a turn: create the Message with the next `seq`, move the
    /// `LAST_MESSAGE` anchor, link the new head to the previous one via
    /// `NEXT`. One statement, so the anchor can never point at a half-linked
    /// chain.
    pub async fn append_message(
        &self,
        session_id: &str,
        role: ChatRole,
        content: &str,
    ) -> Result<i64, GraphError> {
        require_id(session_id, "session id")?;

        let q = query(
            "MATCH (s:Session {id: $sid}) \
             OPTIONAL MATCH (s)-[anchor:LAST_MESSAGE]->(prev:Message) \
             CREATE (m:Message {id: $mid, session_id: $sid, role: $role, \
                 content: $content, seq: coalesce(prev.seq, 0) + 1, \
                 created_at: $now}) \
             CREATE (s)-[:LAST_MESSAGE]->(m) \
             FOREACH (p IN CASE WHEN prev IS NULL THEN [] ELSE [prev] END | \
                 CREATE (m)-[:NEXT]->(p)) \
             DELETE anchor \
             RETURN m.seq AS seq",
        )
        .param("sid", session_id)
        .param("mid", Uuid::new_v4().to_string())
        .param("role", role.as_str())
        .param("content", content)
        .param("now", Utc::now().to_rfc3339());

        let row = self
            .adapter
            .fetch_one(q)
            .await?
            .ok_or_else(|| GraphError::not_found(format!("session '{session_id}'")))?;
        row.get::<i64>("seq")
            .map_err(|e| GraphError::InvalidArgument(format!("malformed message: {e}")))
    }

    /// Most recent turns in chronological order. No messages (or no such
    /// session) yields an empty list, not an error.
    pub async fn get_history(
        &self,
        session_id: &str,
        depth: Option<usize>,
    ) -> Result<Vec<ChatTurn>, GraphError> {
        require_id(session_id, "session id")?;
        let depth = depth.unwrap_or(self.default_depth);

        let q = query(
            "MATCH (m:Message {session_id: $sid}) \
             RETURN m.role AS role, m.content AS content \
             ORDER BY m.seq DESC LIMIT $depth",
        )
        .param("sid", session_id)
        .param("depth", depth as i64);

        let mut turns = Vec::new();
        for row in self.adapter.fetch(q).await? {
            let role: String = row.get("role").unwrap_or_default();
            turns.push(ChatTurn {
                role: ChatRole::from_str(&role)?,
                content: row.get("content").unwrap_or_default(),
            });
        }
        turns.reverse();
        Ok(turns)
    }

    /// Recent history for every session the user owns, grouped by session
    /// id. Sessions without messages are omitted.
    pub async fn get_history_for_user(
        &self,
        user_id: &str,
    ) -> Result<BTreeMap<String, Vec<ChatTurn>>, GraphError> {
        require_id(user_id, "user id")?;

        let q = query(
            "MATCH (u:User {id: $uid})-[:HAS_SESSION]->(s:Session) \
             MATCH (m:Message {session_id: s.id}) \
             RETURN s.id AS sid, m.role AS role, m.content AS content, m.seq AS seq \
             ORDER BY sid, seq",
        )
        .param("uid", user_id);

        let mut grouped: BTreeMap<String, Vec<ChatTurn>> = BTreeMap::new();
        for row in self.adapter.fetch(q).await? {
            let sid: String = row.get("sid").unwrap_or_default();
            let role: String = row.get("role").unwrap_or_default();
            grouped.entry(sid).or_default().push(ChatTurn {
                role: ChatRole::from_str(&role)?,
                content: row.get("content").unwrap_or_default(),
            });
        }
        // Trim each chain to the configured recent-history bound.
        for turns in grouped.values_mut() {
            if turns.len() > self.default_depth {
                turns.drain(..turns.len() - self.default_depth);
            }
        }
        Ok(grouped)
    }

    /// Delete the whole chain for a session. Idempotent: a session with no
    /// history reports zero deletions and succeeds.
    pub async fn delete_history(&self, session_id: &str) -> Result<u64, GraphError> {
        require_id(session_id, "session id")?;

        let q = query(
            "MATCH (m:Message {session_id: $sid}) \
             WITH collect(m) AS messages \
             FOREACH (m IN messages | DETACH DELETE m) \
             RETURN size(messages) AS deleted",
        )
        .param("sid", session_id);

        let deleted = match self.adapter.fetch_one(q).await? {
            Some(row) => row.get::<i64>("deleted").unwrap_or(0).max(0) as u64,
            None => 0,
        };
        info!(session_id = %session_id, deleted, "chat history deleted");
        Ok(deleted)
    }

    // ── Tutor-support reads ───────────────────────────────────────────────

    /// Learning level and topic preferences stored on the user node, used by
    /// the task-generation layer. `None` when either is missing.
    pub async fn get_user_preferences(
        &self,
        user_id: &str,
    ) -> Result<Option<(String, Vec<String>)>, GraphError> {
        require_id(user_id, "user id")?;

        let q = query(
            "MATCH (u:User {id: $uid}) \
             RETURN u.learning_level AS level, u.preferences AS preferences",
        )
        .param("uid", user_id);
        let Some(row) = self.adapter.fetch_one(q).await? else {
            return Ok(None);
        };
        let level: Option<String> = row.get("level").ok();
        let preferences: Option<Vec<String>> = row.get("preferences").ok();
        Ok(level.zip(preferences))
    }

    /// Question-bank lookup for the generation prompt: best-scored questions
    /// matching the student's level and tag preferences.
    pub async fn fetch_bank_questions(
        &self,
        level: &str,
        preferences: &[String],
        limit: usize,
    ) -> Result<Vec<(String, String)>, GraphError> {
        let q = query(
            "MATCH (q:Question)-[:TAGGED]->(t:Tag) \
             WHERE q.difficulty = $level AND t.name IN $preferences \
             RETURN q.title AS title, q.body AS body \
             ORDER BY q.score DESC LIMIT $limit",
        )
        .param("level", level)
        .param("preferences", preferences.to_vec())
        .param("limit", limit as i64);

        let mut out = Vec::new();
        for row in self.adapter.fetch(q).await? {
            out.push((
                row.get("title").unwrap_or_default(),
                row.get("body").unwrap_or_default(),
            ));
        }
        Ok(out)
    }
}

impl std::fmt::Debug for Neo4jStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Neo4jStore")
            .field("default_depth", &self.default_depth)
            .finish_non_exhaustive()
    }
}

// ── Row/parameter helpers ─────────────────────────────────────────────────────

const SESSION_COLUMNS: &str = "s.id AS id, s.kind AS kind, s.sname AS sname, \
     s.created_at AS created_at, s.question_count AS question_count, \
     s.current_question_count AS current_question_count, s.score AS score, \
     s.topics AS topics, s.selected_pdfs AS selected_pdfs";

fn session_from_row(row: &neo4rs::Row) -> Result<SessionSummary, GraphError> {
    let kind: String = row.get("kind").unwrap_or_default();
    Ok(SessionSummary {
        id: row
            .get("id")
            .map_err(|e| GraphError::InvalidArgument(format!("malformed session: {e}")))?,
        kind: SessionKind::from_str(&kind)?,
        sname: row.get("sname").unwrap_or_default(),
        created_at: row.get("created_at").unwrap_or_default(),
        question_count: row.get("question_count").unwrap_or(0),
        current_question_count: row.get("current_question_count").unwrap_or(0),
        score: row.get("score").unwrap_or(0),
        topics: row.get("topics").unwrap_or_default(),
        selected_pdfs: row.get("selected_pdfs").unwrap_or_default(),
    })
}

fn bind_attr(q: Query, name: &str, value: &AttrValue) -> Query {
    match value {
        AttrValue::Bool(v) => q.param(name, *v),
        AttrValue::Int(v) => q.param(name, *v),
        AttrValue::Float(v) => q.param(name, *v),
        AttrValue::Str(v) => q.param(name, v.clone()),
    }
}

fn attr_from_node(node: &neo4rs::Node, key: &str) -> Option<AttrValue> {
    if let Ok(v) = node.get::<bool>(key) {
        return Some(AttrValue::Bool(v));
    }
    if let Ok(v) = node.get::<i64>(key) {
        return Some(AttrValue::Int(v));
    }
    if let Ok(v) = node.get::<f64>(key) {
        return Some(AttrValue::Float(v));
    }
    node.get::<String>(key).ok().map(AttrValue::Str)
}

fn require_id(id: &str, what: &str) -> Result<(), GraphError> {
    if id.trim().is_empty() {
        return Err(GraphError::InvalidArgument(format!(
            "{what} must not be empty"
        )));
    }
    Ok(())
}
