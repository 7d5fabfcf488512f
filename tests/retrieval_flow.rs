//! Retrieval: vector search, hybrid endpoints, intent routing, rerank
//! degradation.

mod common;

use std::sync::Arc;

use audit_rag_gateway::domain::document::DocType;
use audit_rag_gateway::domain::ingestion::{ChunkerMode, IngestOptions};
use audit_rag_gateway::domain::retrieval::{RetrievalMode, RetrievalOptions, RetrievalOverrides};

use common::{build_env, txt_file, BrokenRerank};

async fn seed_regulations(env: &common::TestEnv) {
    env.state
        .ingestion
        .ingest(
            vec![txt_file(
                "regs.txt",
                "第一条 A内容。第二条 B修改。第三条 C新增。",
            )],
            IngestOptions::new(ChunkerMode::Regulation, DocType::InternalRegulation),
        )
        .await;
}

#[tokio::test]
async fn vector_search_finds_modified_clause() {
    let env = build_env(None, None);
    seed_regulations(&env).await;

    let options = RetrievalOptions {
        mode: RetrievalMode::Vector,
        top_k: 1,
        use_rerank: false,
        ..Default::default()
    };
    let outcome = env.state.ask.search("B的规定", &options).await.unwrap();

    assert_eq!(outcome.hits.len(), 1);
    assert_eq!(outcome.hits[0].chunk.header, "第二条 B修改。");
    assert!(outcome.hits[0].score > 0.0);
    assert!(!outcome.rerank_applied);
}

#[tokio::test]
async fn hybrid_alpha_one_matches_pure_vector() {
    let env = build_env(None, None);
    seed_regulations(&env).await;

    let vector_options = RetrievalOptions {
        mode: RetrievalMode::Vector,
        top_k: 3,
        use_rerank: false,
        ..Default::default()
    };
    let hybrid_options = RetrievalOptions {
        mode: RetrievalMode::Hybrid,
        alpha: 1.0,
        top_k: 3,
        use_rerank: false,
        ..Default::default()
    };

    let pure = env.state.ask.search("B的规定", &vector_options).await.unwrap();
    let hybrid = env.state.ask.search("B的规定", &hybrid_options).await.unwrap();

    assert_eq!(pure.hits.len(), hybrid.hits.len());
    for (a, b) in pure.hits.iter().zip(hybrid.hits.iter()) {
        assert_eq!(a.chunk.chunk_id, b.chunk.chunk_id);
        assert!((a.score - b.score).abs() < 1e-6);
    }
}

#[tokio::test]
async fn hybrid_alpha_zero_matches_pure_graph() {
    let env = build_env(None, None);
    env.state
        .ingestion
        .ingest(
            vec![txt_file(
                "issues.txt",
                "问题序号: 1\n部门单位: 财政部\n问题摘要: 预算执行违规问题整改\n整改情况: 已整改",
            )],
            IngestOptions::new(ChunkerMode::AuditIssue, DocType::AuditIssue),
        )
        .await;

    let graph_options = RetrievalOptions {
        mode: RetrievalMode::Graph,
        top_k: 5,
        use_rerank: false,
        ..Default::default()
    };
    let hybrid_options = RetrievalOptions {
        mode: RetrievalMode::Hybrid,
        alpha: 0.0,
        top_k: 5,
        use_rerank: false,
        ..Default::default()
    };

    let pure = env.state.ask.search("财政部", &graph_options).await.unwrap();
    let hybrid = env.state.ask.search("财政部", &hybrid_options).await.unwrap();

    assert!(!pure.hits.is_empty());
    assert_eq!(pure.hits.len(), hybrid.hits.len());
    for (a, b) in pure.hits.iter().zip(hybrid.hits.iter()) {
        assert_eq!(a.chunk.chunk_id, b.chunk.chunk_id);
        assert!((a.score - b.score).abs() < 1e-6);
    }
}

#[tokio::test]
async fn intent_search_filters_doc_types() {
    let env = build_env(None, None);
    seed_regulations(&env).await;
    env.state
        .ingestion
        .ingest(
            vec![txt_file(
                "issues.txt",
                "问题序号: 1\n部门单位: 财政部\n问题摘要: B相关违规问题\n整改情况: 已整改",
            )],
            IngestOptions::new(ChunkerMode::AuditIssue, DocType::AuditIssue),
        )
        .await;

    // 条款 routes to regulation_query, restricting to regulations.
    let result = env
        .state
        .ask
        .search_with_intent("B条款的规定", &RetrievalOverrides::default())
        .await
        .unwrap();

    assert_eq!(result.route.intent.as_str(), "regulation_query");
    assert!(result
        .outcome
        .hits
        .iter()
        .all(|h| h.chunk.doc_type.is_regulation()));
}

#[tokio::test]
async fn rerank_failure_degrades_to_fused_order() {
    let env = build_env(None, Some(Arc::new(BrokenRerank)));
    seed_regulations(&env).await;

    let options = RetrievalOptions {
        mode: RetrievalMode::Vector,
        top_k: 2,
        use_rerank: true,
        ..Default::default()
    };
    let outcome = env.state.ask.search("B的规定", &options).await.unwrap();

    assert!(!outcome.rerank_applied);
    assert!(!outcome.hits.is_empty());
    assert_eq!(outcome.hits[0].chunk.header, "第二条 B修改。");
}

#[tokio::test]
async fn graph_mode_fetches_metadata_lazily() {
    let env = build_env(None, None);
    env.state
        .ingestion
        .ingest(
            vec![txt_file(
                "issues.txt",
                "问题序号: 1\n部门单位: 教育部\n问题摘要: 资金使用不规范问题\n整改情况: 整改中",
            )],
            IngestOptions::new(ChunkerMode::AuditIssue, DocType::AuditIssue),
        )
        .await;

    let options = RetrievalOptions {
        mode: RetrievalMode::Graph,
        top_k: 5,
        use_rerank: false,
        ..Default::default()
    };
    let outcome = env.state.ask.search("教育部", &options).await.unwrap();

    assert!(!outcome.hits.is_empty());
    let hit = &outcome.hits[0];
    // Metadata came from the vector store sidecar, not the graph.
    assert!(hit.chunk.text.contains("资金使用不规范"));
    assert!(hit.graph_score.is_some());
    assert!(hit.vector_score.is_none());
}
