//! Streamed ask: staged events, citations, degradation, cancellation.

mod common;

use std::sync::atomic::Ordering;

use futures::StreamExt;

use audit_rag_gateway::domain::answer::{AskEvent, ProgressStage, ProgressStatus};
use audit_rag_gateway::domain::document::DocType;
use audit_rag_gateway::domain::ingestion::{ChunkerMode, IngestOptions};
use audit_rag_gateway::domain::retrieval::RetrievalOverrides;

use common::{build_env, txt_file, ScriptedLlm};

async fn seed_three_clauses(env: &common::TestEnv) {
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

fn is_progress(event: &AskEvent, stage: ProgressStage, status: ProgressStatus) -> bool {
    matches!(event, AskEvent::Progress { stage: s, status: st, .. } if *s == stage && *st == status)
}

#[tokio::test]
async fn ask_emits_staged_events_and_resolved_citations() {
    let (llm, _calls) = ScriptedLlm::new("各条款总结如下。[S1]其次。[S2]最后。[S3]另见[S9]。");
    let env = build_env(Some(llm), None);
    seed_three_clauses(&env).await;

    let (_cancel, stream) = env.state.ask.clone().ask_stream(
        "总结所有条款".to_string(),
        RetrievalOverrides::default(),
        None,
    );
    let events: Vec<AskEvent> = stream.collect().await;

    // Session id precedes everything for a fresh conversation.
    assert!(matches!(events[0], AskEvent::Session { .. }));
    assert!(is_progress(&events[1], ProgressStage::Intent, ProgressStatus::Running));
    assert!(is_progress(&events[2], ProgressStage::Intent, ProgressStatus::Done));
    assert!(is_progress(&events[3], ProgressStage::Retrieval, ProgressStatus::Running));

    let AskEvent::Progress { extra, .. } = &events[4] else {
        panic!("expected retrieval done progress");
    };
    assert_eq!(extra["hits"], 3);
    assert!(is_progress(&events[4], ProgressStage::Retrieval, ProgressStatus::Done));
    assert!(is_progress(&events[5], ProgressStage::Generation, ProgressStatus::Running));

    let mut answer = String::new();
    let mut citations = None;
    let mut saw_generation_done = false;
    let mut saw_done = false;
    for event in &events[6..] {
        match event {
            AskEvent::Delta { content } => {
                assert!(citations.is_none(), "delta after citations event");
                answer.push_str(content);
            }
            AskEvent::Progress { stage, status, .. } => {
                assert_eq!(*stage, ProgressStage::Generation);
                assert_eq!(*status, ProgressStatus::Done);
                saw_generation_done = true;
            }
            AskEvent::Citations { citations: c } => citations = Some(c.clone()),
            AskEvent::Done { .. } => saw_done = true,
            other => panic!("unexpected event {other:?}"),
        }
    }
    assert!(saw_generation_done);
    assert!(saw_done);

    // The unresolvable [S9] token was stripped from the stream.
    assert_eq!(answer, "各条款总结如下。[S1]其次。[S2]最后。[S3]另见。");

    // Citations cover exactly the tokens present, in appearance order.
    let citations = citations.expect("citations event");
    let ids: Vec<&str> = citations.iter().map(|c| c.source_id.as_str()).collect();
    assert_eq!(ids, vec!["S1", "S2", "S3"]);
    for citation in &citations {
        assert!(answer.contains(&format!("[{}]", citation.source_id)));
        assert!(!citation.text_preview.is_empty());
    }
}

#[tokio::test]
async fn ask_with_no_hits_replies_fixed_text_without_llm_call() {
    let (llm, calls) = ScriptedLlm::new("不应被调用[S1]");
    let env = build_env(Some(llm), None);
    // No documents ingested at all.

    let (_cancel, stream) = env.state.ask.clone().ask_stream(
        "总结所有条款".to_string(),
        RetrievalOverrides::default(),
        None,
    );
    let events: Vec<AskEvent> = stream.collect().await;

    let deltas: String = events
        .iter()
        .filter_map(|e| match e {
            AskEvent::Delta { content } => Some(content.clone()),
            _ => None,
        })
        .collect();
    assert!(deltas.contains("未在参考资料中找到充分依据"));

    let citations = events.iter().find_map(|e| match e {
        AskEvent::Citations { citations } => Some(citations.len()),
        _ => None,
    });
    assert_eq!(citations, Some(0));

    // The router consulted the LLM once; generation never did.
    assert!(calls.load(Ordering::SeqCst) <= 1);
}

#[tokio::test]
async fn cancellation_before_first_delta_skips_llm() {
    let (llm, calls) = ScriptedLlm::new("完整回答。[S1]");
    let env = build_env(Some(llm), None);
    seed_three_clauses(&env).await;

    let (cancel, stream) = env.state.ask.clone().ask_stream(
        "总结所有条款".to_string(),
        RetrievalOverrides::default(),
        None,
    );
    // Cancel before the pipeline reaches its first stage boundary.
    cancel.cancel();
    let events: Vec<AskEvent> = stream.collect().await;

    assert!(events
        .iter()
        .all(|e| !matches!(e, AskEvent::Delta { .. })));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn llm_failure_degrades_to_apology() {
    let (llm, _calls) = ScriptedLlm::failing();
    let env = build_env(Some(llm), None);
    seed_three_clauses(&env).await;

    let (_cancel, stream) = env.state.ask.clone().ask_stream(
        "总结所有条款".to_string(),
        RetrievalOverrides::default(),
        None,
    );
    let events: Vec<AskEvent> = stream.collect().await;

    let deltas: String = events
        .iter()
        .filter_map(|e| match e {
            AskEvent::Delta { content } => Some(content.clone()),
            _ => None,
        })
        .collect();
    assert!(deltas.contains("抱歉"));

    let citations = events.iter().find_map(|e| match e {
        AskEvent::Citations { citations } => Some(citations.len()),
        _ => None,
    });
    assert_eq!(citations, Some(0));
    assert!(events.iter().any(|e| matches!(e, AskEvent::Done { .. })));
}

#[tokio::test]
async fn session_memory_threads_multi_turn() {
    let (llm, _calls) = ScriptedLlm::new("回答。[S1]");
    let env = build_env(Some(llm), None);
    seed_three_clauses(&env).await;

    let (_cancel, stream) = env.state.ask.clone().ask_stream(
        "总结所有条款".to_string(),
        RetrievalOverrides::default(),
        None,
    );
    let events: Vec<AskEvent> = stream.collect().await;
    let session_id = events
        .iter()
        .find_map(|e| match e {
            AskEvent::Session { session_id } => Some(session_id.clone()),
            _ => None,
        })
        .expect("session event");

    let history = env.state.ask.sessions().history(&session_id, 8).await;
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].content, "总结所有条款");
    assert!(history[1].content.contains("回答。"));

    // Reusing the session id does not re-emit a session event.
    let (_cancel, stream) = env.state.ask.clone().ask_stream(
        "继续总结条款".to_string(),
        RetrievalOverrides::default(),
        Some(session_id.clone()),
    );
    let events: Vec<AskEvent> = stream.collect().await;
    assert!(events
        .iter()
        .all(|e| !matches!(e, AskEvent::Session { .. })));

    let history = env.state.ask.sessions().history(&session_id, 8).await;
    assert_eq!(history.len(), 4);
}

#[tokio::test]
async fn non_streaming_answer_matches_contract() {
    let (llm, _calls) = ScriptedLlm::new("结论。[S2][S99]");
    let env = build_env(Some(llm), None);
    seed_three_clauses(&env).await;

    let answer = env
        .state
        .ask
        .answer("总结所有条款", &RetrievalOverrides::default(), None)
        .await
        .unwrap();

    assert_eq!(answer.answer, "结论。[S2]");
    assert_eq!(answer.citations.len(), 1);
    assert_eq!(answer.citations[0].source_id, "S2");
    assert_eq!(answer.model, "scripted");
}
