//! Store semantics exercised end to end against the in-memory backend.
//!
//! These cover the behavior both backends promise: session get-or-create
//! convergence, quiz creation, cascading deletes, the message chain, the
//! answer ledger, and the relationship set.

use std::collections::BTreeMap;

use tutorgraph::error::GraphError;
use tutorgraph::graph::GraphStore;
use tutorgraph::graph::memory::MemoryStore;
use tutorgraph::graph::types::{
    AttrValue, ChatRole, DEFAULT_SESSION_NAME, NewQuestion, QuizSessionSpec, RelationshipKind,
    SessionKind,
};

fn store() -> GraphStore {
    GraphStore::Memory(MemoryStore::new(6))
}

fn question(id: &str) -> NewQuestion {
    NewQuestion {
        id: id.to_string(),
        text: "What does `mut` mean?".to_string(),
        difficulty: "beginner".to_string(),
        completeness: 0,
        xp: 10,
    }
}

// ── Users & relationships ─────────────────────────────────────────────────────

#[tokio::test]
async fn upsert_converges_on_one_user() {
    let s = store();
    let mut first = BTreeMap::new();
    first.insert("login".to_string(), AttrValue::Int(0));
    s.upsert_user("ada", &first).await.unwrap();

    let mut second = BTreeMap::new();
    second.insert("login".to_string(), AttrValue::Int(1));
    second.insert("name".to_string(), AttrValue::from("Ada"));
    s.upsert_user("ada", &second).await.unwrap();

    let user = s.get_user("ada").await.unwrap();
    assert_eq!(user.attributes.get("login"), Some(&AttrValue::Int(1)));
    assert_eq!(user.attributes.get("name"), Some(&AttrValue::from("Ada")));
}

#[tokio::test]
async fn invalid_attribute_name_is_rejected() {
    let s = store();
    let mut attrs = BTreeMap::new();
    attrs.insert(
        "name} SET u.admin = true //".to_string(),
        AttrValue::from("x"),
    );
    let err = s.upsert_user("ada", &attrs).await.unwrap_err();
    assert!(matches!(err, GraphError::InvalidArgument(_)));
}

#[tokio::test]
async fn unknown_user_is_not_found() {
    let s = store();
    assert!(s.get_user("ghost").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn relationship_requires_both_endpoints() {
    let s = store();
    s.upsert_user("ada", &BTreeMap::new()).await.unwrap();
    let err = s
        .create_relationship("ada", "ghost", RelationshipKind::Follows)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn relationship_round_trip_and_delete() {
    let s = store();
    s.upsert_user("ada", &BTreeMap::new()).await.unwrap();
    s.upsert_user("brian", &BTreeMap::new()).await.unwrap();

    s.create_relationship("ada", "brian", RelationshipKind::Friends)
        .await
        .unwrap();
    // merge semantics: second create is a no-op
    s.create_relationship("ada", "brian", RelationshipKind::Friends)
        .await
        .unwrap();

    let rels = s.list_relationships("ada").await.unwrap();
    assert_eq!(rels.len(), 1);
    assert_eq!(rels[0].to, "brian");
    assert_eq!(rels[0].kind, RelationshipKind::Friends);

    assert!(
        s.delete_relationship("ada", "brian", RelationshipKind::Friends)
            .await
            .unwrap()
    );
    // deleting again reports nothing removed
    assert!(
        !s.delete_relationship("ada", "brian", RelationshipKind::Friends)
            .await
            .unwrap()
    );
}

// ── Sessions ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn get_or_create_is_stable_across_calls() {
    let s = store();
    let first = s
        .get_or_create_session("ada", SessionKind::Chat)
        .await
        .unwrap();
    assert!(first.created);

    let second = s
        .get_or_create_session("ada", SessionKind::Chat)
        .await
        .unwrap();
    assert!(!second.created);
    assert_eq!(first.session_id, second.session_id);
}

#[tokio::test]
async fn chat_and_quiz_sessions_do_not_collide() {
    let s = store();
    let chat = s.get_or_create_chat_session("ada").await.unwrap();
    let quiz = s.get_or_create_quiz_session("ada").await.unwrap();
    assert!(quiz.created);
    assert_ne!(chat.session_id, quiz.session_id);

    // explicit quiz creates never satisfy the chat lookup
    let chat_again = s.get_or_create_chat_session("ada").await.unwrap();
    assert_eq!(chat_again.session_id, chat.session_id);
}

#[tokio::test]
async fn quiz_session_carries_its_spec() {
    let s = store();
    let summary = s
        .create_quiz_session(
            "ada",
            QuizSessionSpec {
                name: Some("CSS basics".to_string()),
                question_count: Some(5),
                topics: Some(vec!["css".to_string()]),
                selected_pdfs: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(summary.sname, "CSS basics");
    assert_eq!(summary.question_count, 5);
    assert_eq!(summary.current_question_count, 0);
    assert_eq!(summary.score, 0);
    assert_eq!(summary.topics, vec!["css".to_string()]);
    assert!(summary.selected_pdfs.is_empty());

    let fetched = s.get_quiz_session_by_id(&summary.id).await.unwrap();
    assert_eq!(fetched, summary);
}

#[tokio::test]
async fn blank_quiz_name_falls_back_to_sentinel() {
    let s = store();
    let summary = s
        .create_quiz_session(
            "ada",
            QuizSessionSpec {
                name: Some("   ".to_string()),
                ..QuizSessionSpec::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(summary.sname, DEFAULT_SESSION_NAME);
}

#[tokio::test]
async fn explicit_quiz_creates_never_dedupe() {
    let s = store();
    let a = s
        .create_quiz_session("ada", QuizSessionSpec::default())
        .await
        .unwrap();
    let b = s
        .create_quiz_session("ada", QuizSessionSpec::default())
        .await
        .unwrap();
    assert_ne!(a.id, b.id);

    let listed = s.list_quiz_sessions_for_user("ada").await.unwrap();
    assert_eq!(listed.len(), 2);
    // newest first
    assert_eq!(listed[0].id, b.id);
}

#[tokio::test]
async fn question_cursor_updates_in_place() {
    let s = store();
    let quiz = s
        .create_quiz_session(
            "ada",
            QuizSessionSpec {
                question_count: Some(3),
                ..QuizSessionSpec::default()
            },
        )
        .await
        .unwrap();
    s.update_question_cursor(&quiz.id, 2).await.unwrap();
    let fetched = s.get_quiz_session_by_id(&quiz.id).await.unwrap();
    assert_eq!(fetched.current_question_count, 2);

    let err = s.update_question_cursor("nope", 1).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn empty_session_id_is_invalid_argument() {
    let s = store();
    let err = s.delete_session("").await.unwrap_err();
    assert!(matches!(err, GraphError::InvalidArgument(_)));
    let err = s.get_history("  ", None).await.unwrap_err();
    assert!(matches!(err, GraphError::InvalidArgument(_)));
}

// ── Cascading delete ──────────────────────────────────────────────────────────

#[tokio::test]
async fn delete_session_cascades_over_questions_and_messages() {
    let s = store();
    let quiz = s
        .create_quiz_session("ada", QuizSessionSpec::default())
        .await
        .unwrap();
    s.create_question(&quiz.id, question("q1")).await.unwrap();
    s.create_question(&quiz.id, question("q2")).await.unwrap();
    s.append_message(&quiz.id, ChatRole::User, "hi")
        .await
        .unwrap();

    let report = s.delete_session(&quiz.id).await.unwrap();
    assert!(report.deleted);
    // session + 2 questions + 1 message
    assert_eq!(report.nodes_deleted, 4);

    assert!(
        s.get_quiz_session_by_id(&quiz.id)
            .await
            .unwrap_err()
            .is_not_found()
    );
    assert!(s.get_history(&quiz.id, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn deleting_absent_session_is_a_no_op_success() {
    let s = store();
    let report = s.delete_session("never-existed").await.unwrap();
    assert!(!report.deleted);
    assert_eq!(report.nodes_deleted, 0);
}

// ── Question/answer ledger ────────────────────────────────────────────────────

#[tokio::test]
async fn answers_are_append_only_and_ordered() {
    let s = store();
    s.save_answer("ada", "Q1", "A1", true).await.unwrap();
    s.save_answer("ada", "Q1", "A1 again", false).await.unwrap();
    s.save_answer("ada", "Q2", "A2", true).await.unwrap();

    let answers = s.list_answers_for_user("ada").await.unwrap();
    assert_eq!(answers.len(), 3);
    assert_eq!(answers[0].question, "Q1");
    assert!(answers[0].is_correct);
    assert_eq!(answers[1].answer, "A1 again");
    assert!(!answers[1].is_correct);
    assert_eq!(answers[2].question, "Q2");
}

#[tokio::test]
async fn question_attach_to_unknown_session_is_silent() {
    let s = store();
    // mirrors the MATCH that finds nothing: no error, no node
    s.create_question("ghost-session", question("q1"))
        .await
        .unwrap();
}

// ── Chat history chain ────────────────────────────────────────────────────────

#[tokio::test]
async fn history_returns_chronological_order() {
    let s = store();
    let sid = s
        .get_or_create_session("ada", SessionKind::Chat)
        .await
        .unwrap()
        .session_id;
    s.append_message(&sid, ChatRole::User, "m1").await.unwrap();
    s.append_message(&sid, ChatRole::Assistant, "m2")
        .await
        .unwrap();
    s.append_message(&sid, ChatRole::User, "m3").await.unwrap();

    let turns = s.get_history(&sid, None).await.unwrap();
    let contents: Vec<&str> = turns.iter().map(|t| t.content.as_str()).collect();
    assert_eq!(contents, vec!["m1", "m2", "m3"]);
    assert_eq!(turns[0].role, ChatRole::User);
    assert_eq!(turns[1].role, ChatRole::Assistant);
}

#[tokio::test]
async fn history_depth_keeps_only_most_recent() {
    let s = store();
    let sid = s
        .get_or_create_session("ada", SessionKind::Chat)
        .await
        .unwrap()
        .session_id;
    for i in 0..8 {
        s.append_message(&sid, ChatRole::User, &format!("t{i}"))
            .await
            .unwrap();
    }
    // default depth is 6
    let turns = s.get_history(&sid, None).await.unwrap();
    let contents: Vec<&str> = turns.iter().map(|t| t.content.as_str()).collect();
    assert_eq!(contents, vec!["t2", "t3", "t4", "t5", "t6", "t7"]);

    let two = s.get_history(&sid, Some(2)).await.unwrap();
    assert_eq!(two.len(), 2);
    assert_eq!(two[1].content, "t7");
}

#[tokio::test]
async fn history_groups_by_session_per_user() {
    let s = store();
    let chat = s
        .get_or_create_session("ada", SessionKind::Chat)
        .await
        .unwrap()
        .session_id;
    let quiz = s
        .create_quiz_session("ada", QuizSessionSpec::default())
        .await
        .unwrap()
        .id;
    s.append_message(&chat, ChatRole::User, "in chat")
        .await
        .unwrap();
    s.append_message(&quiz, ChatRole::User, "in quiz")
        .await
        .unwrap();

    let grouped = s.get_history_for_user("ada").await.unwrap();
    assert_eq!(grouped.len(), 2);
    assert_eq!(grouped[&chat][0].content, "in chat");
    assert_eq!(grouped[&quiz][0].content, "in quiz");
}

#[tokio::test]
async fn delete_history_is_idempotent() {
    let s = store();
    let sid = s
        .get_or_create_session("ada", SessionKind::Chat)
        .await
        .unwrap()
        .session_id;
    s.append_message(&sid, ChatRole::User, "m1").await.unwrap();
    s.append_message(&sid, ChatRole::Assistant, "m2")
        .await
        .unwrap();

    assert_eq!(s.delete_history(&sid).await.unwrap(), 2);
    assert!(s.get_history(&sid, None).await.unwrap().is_empty());
    // second delete finds nothing and still succeeds
    assert_eq!(s.delete_history(&sid).await.unwrap(), 0);
}

#[tokio::test]
async fn chain_restarts_cleanly_after_history_delete() {
    let s = store();
    let sid = s
        .get_or_create_session("ada", SessionKind::Chat)
        .await
        .unwrap()
        .session_id;
    s.append_message(&sid, ChatRole::User, "old").await.unwrap();
    s.delete_history(&sid).await.unwrap();

    let seq = s
        .append_message(&sid, ChatRole::User, "fresh")
        .await
        .unwrap();
    assert_eq!(seq, 1);
    let turns = s.get_history(&sid, None).await.unwrap();
    assert_eq!(turns.len(), 1);
    assert_eq!(turns[0].content, "fresh");
}
