//! End-to-end coverage of the dual-write memory path: local store plus
//! best-effort graph mirroring, dedup, and first-person restatement.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use persag::coordinator::{restate, MemoryCoordinator};
use persag::graph::GraphClient;
use persag::memory::{MemoryStore, SqliteMemoryStore};
use std::sync::Arc;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn store() -> Arc<dyn MemoryStore> {
    Arc::new(SqliteMemoryStore::in_memory().expect("open in-memory store"))
}

// ============================================================
// Store + recall (SPEC_FULL §8 scenario 1)
// ============================================================

#[tokio::test]
async fn store_then_recall_round_trips_through_local_and_graph_legs() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/documents/text"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "success"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "response": "alice loves Python programming."
        })))
        .expect(1)
        .mount(&server)
        .await;

    let coordinator = MemoryCoordinator::new(store(), GraphClient::new(server.uri()));

    let (outcome, leg) = coordinator
        .store_user_memory("alice", "I love Python", None)
        .await
        .expect("store succeeds");
    assert!(outcome.accepted);
    assert_eq!(leg.graph_ok, Some(true));

    let answer = coordinator
        .check_entity_exists("Python")
        .await
        .expect("graph query succeeds");
    assert!(answer, "graph response should mention the ingested entity");

    server.verify().await;
}

#[tokio::test]
async fn restated_text_sent_to_the_graph_names_the_user_in_third_person() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/documents/text"))
        .and(body_string_contains("alice loves Python"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "success"})))
        .expect(1)
        .mount(&server)
        .await;

    let coordinator = MemoryCoordinator::new(store(), GraphClient::new(server.uri()));
    coordinator
        .store_user_memory("alice", "I love Python", None)
        .await
        .expect("store succeeds");

    server.verify().await;
}

// ============================================================
// Dedup (SPEC_FULL §8 scenario 2)
// ============================================================

#[tokio::test]
async fn storing_a_near_duplicate_skips_the_graph_leg_and_keeps_one_record() {
    let coordinator = MemoryCoordinator::new(store(), GraphClient::new("http://127.0.0.1:1"));

    let (first, leg1) = coordinator
        .store_user_memory("alice", "I live in Paris.", None)
        .await
        .expect("first store succeeds");
    assert!(first.accepted);
    assert_eq!(leg1.graph_ok, Some(false)); // unreachable graph endpoint in this test

    let (second, leg2) = coordinator
        .store_user_memory("alice", "I live in Paris", None)
        .await
        .expect("second store succeeds");
    assert!(!second.accepted, "near-duplicate must be rejected");
    assert_eq!(second.id, first.id);
    assert_eq!(leg2.graph_ok, None, "duplicate writes never attempt the graph leg");
}

// ============================================================
// Restatement idempotence (SPEC_FULL §8 testable properties)
// ============================================================

#[test]
fn restate_is_idempotent_across_several_first_person_forms() {
    for text in [
        "I am a software engineer.",
        "My favorite color is blue.",
        "I have two cats.",
        "I love hiking.",
        "Paris is the capital of France.",
    ] {
        let once = restate(text, "alice");
        let twice = restate(&once, "alice");
        assert_eq!(once, twice, "restate should be a no-op on its own output for {text:?}");
    }
}

// ============================================================
// Topic auto-classification feeding into memory tool usage
// ============================================================

#[tokio::test]
async fn memories_remain_scoped_per_user_end_to_end() {
    let shared = store();
    let coordinator = MemoryCoordinator::new(shared.clone(), GraphClient::new("http://127.0.0.1:1"));
    coordinator
        .store_user_memory("alice", "I love hiking with my family", None)
        .await
        .expect("alice store succeeds");
    coordinator
        .store_user_memory("bob", "I love hiking with my family", None)
        .await
        .expect("bob store succeeds");

    assert_eq!(shared.get_all_memories("alice").unwrap().len(), 1);
    assert_eq!(shared.get_all_memories("bob").unwrap().len(), 1);
}
