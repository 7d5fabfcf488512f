//! Upload lifecycle: new, duplicate, update, zero-chunk rejection.

mod common;

use audit_rag_gateway::domain::document::DocType;
use audit_rag_gateway::domain::ingestion::{ChunkerMode, IngestOptions};
use audit_rag_gateway::infrastructure::services::FileOutcome;

use common::{build_env, txt_file};

fn regulation_options() -> IngestOptions {
    IngestOptions::new(ChunkerMode::Regulation, DocType::InternalRegulation)
}

#[tokio::test]
async fn upload_regulation_produces_two_chunks() {
    let env = build_env(None, None);
    let report = env
        .state
        .ingestion
        .ingest(
            vec![txt_file("regs.txt", "第一条 A内容。第二条 B内容。")],
            regulation_options(),
        )
        .await;

    assert_eq!(report.processed, 1);
    assert_eq!(report.skipped, 0);
    assert_eq!(report.updated, 0);
    assert_eq!(report.total_chunks, 2);

    let FileOutcome::New { doc_id, chunks, .. } = &report.results[0] else {
        panic!("expected New outcome, got {:?}", report.results[0]);
    };
    assert_eq!(*chunks, 2);
    assert_eq!(doc_id.len(), 16);

    let stored = env.state.ingestion.get_document_chunks(doc_id).await.unwrap();
    assert_eq!(stored[0].header, "第一条 A内容。");
    assert_eq!(stored[1].header, "第二条 B内容。");
    assert_eq!(stored[0].chunk_id, format!("{doc_id}:0"));
    assert_eq!(stored[0].doc_type, DocType::InternalRegulation);

    let stats = env.state.ingestion.stats().await;
    assert_eq!(stats.active_documents, 1);
    assert_eq!(stats.total_chunks, 2);

    env.state.ingestion.verify_consistency().await.unwrap();
}

#[tokio::test]
async fn identical_reupload_is_skipped_and_state_unchanged() {
    let env = build_env(None, None);
    let content = "第一条 A内容。第二条 B内容。";
    env.state
        .ingestion
        .ingest(vec![txt_file("regs.txt", content)], regulation_options())
        .await;

    let registry_before = std::fs::read(env.data_root.join("registry.json")).unwrap();
    let vectors_before = env.state.stores.vectors.read().await.len();

    let report = env
        .state
        .ingestion
        .ingest(vec![txt_file("regs.txt", content)], regulation_options())
        .await;

    assert_eq!(report.processed, 0);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.updated, 0);
    assert!(matches!(report.results[0], FileOutcome::Skipped { .. }));

    assert_eq!(env.state.stores.vectors.read().await.len(), vectors_before);
    let registry_after = std::fs::read(env.data_root.join("registry.json")).unwrap();
    assert_eq!(registry_before, registry_after);
}

#[tokio::test]
async fn modified_reupload_updates_version_and_replaces_chunks() {
    let env = build_env(None, None);
    env.state
        .ingestion
        .ingest(
            vec![txt_file("regs.txt", "第一条 A内容。第二条 B内容。")],
            regulation_options(),
        )
        .await;

    let report = env
        .state
        .ingestion
        .ingest(
            vec![txt_file(
                "regs.txt",
                "第一条 A内容。第二条 B修改。第三条 C新增。",
            )],
            regulation_options(),
        )
        .await;

    assert_eq!(report.updated, 1);
    assert_eq!(report.skipped, 0);
    assert_eq!(report.processed, 0);

    let FileOutcome::Updated {
        doc_id, version, ..
    } = &report.results[0]
    else {
        panic!("expected Updated outcome");
    };
    assert_eq!(*version, 2);

    // No residual old chunks in the vector store.
    let vectors = env.state.stores.vectors.read().await;
    assert_eq!(vectors.len(), 3);
    assert_eq!(vectors.count_for_doc(doc_id), 3);
    drop(vectors);

    let record = env.state.ingestion.get_document(doc_id).await.unwrap();
    assert_eq!(record.version, 2);
    assert_eq!(record.chunk_count, 3);

    env.state.ingestion.verify_consistency().await.unwrap();
}

#[tokio::test]
async fn zero_chunk_document_is_rejected() {
    let env = build_env(None, None);
    let report = env
        .state
        .ingestion
        .ingest(vec![txt_file("empty.txt", "   \n  \n")], regulation_options())
        .await;

    assert_eq!(report.failed, 1);
    assert_eq!(report.processed, 0);
    let FileOutcome::Failed { kind, .. } = &report.results[0] else {
        panic!("expected Failed outcome");
    };
    assert!(kind == "parse_error" || kind == "chunk_error");

    // Nothing was written to any store.
    assert_eq!(env.state.ingestion.stats().await.total_documents, 0);
    assert!(env.state.stores.vectors.read().await.is_empty());
}

#[tokio::test]
async fn batch_reports_outcomes_in_submission_order() {
    let env = build_env(None, None);
    let report = env
        .state
        .ingestion
        .ingest(
            vec![
                txt_file("a.txt", "第一条 甲规定。"),
                txt_file("bad.xlsx", "unsupported"),
                txt_file("b.txt", "第一条 乙规定。"),
            ],
            regulation_options(),
        )
        .await;

    assert_eq!(report.results.len(), 3);
    assert!(matches!(report.results[0], FileOutcome::New { .. }));
    assert!(matches!(report.results[1], FileOutcome::Failed { .. }));
    assert!(matches!(report.results[2], FileOutcome::New { .. }));
    // One failure does not fail the batch.
    assert_eq!(report.processed, 2);
    assert_eq!(report.failed, 1);
}

#[tokio::test]
async fn stores_survive_restart() {
    let env = build_env(None, None);
    env.state
        .ingestion
        .ingest(
            vec![txt_file("regs.txt", "第一条 A内容。第二条 B内容。")],
            regulation_options(),
        )
        .await;

    let reopened = common::reopen_env(&env, None);
    assert_eq!(reopened.stores.vectors.read().await.len(), 2);
    assert_eq!(reopened.ingestion.stats().await.active_documents, 1);
    assert!(!reopened.stores.graph.read().await.is_empty());
    reopened.ingestion.verify_consistency().await.unwrap();
}
