//! Intent router: LLM classification with deterministic keyword fallback

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::domain::llm::{LlmProvider, LlmRequest, Message};
use crate::domain::retrieval::{
    Intent, IntentRoute, RetrievalMode, RetrievalOptions, RetrievalOverrides, ANALYTICAL_TOP_K,
    DEFAULT_TOP_K,
};

const CLASSIFY_SYSTEM: &str = "你是一个严格只返回JSON格式的后端助手。";

fn classify_prompt(query: &str, session_summary: Option<&str>) -> String {
    let context = session_summary
        .filter(|s| !s.is_empty())
        .map(|s| format!("\n\n会话背景: {s}"))
        .unwrap_or_default();
    format!(
        "你是一个专业的审计RAG系统路由助手。请分析用户问题并输出JSON。\n\n\
         意图分类：\n\
         - regulation_query: 查询法律法规、公司制度、管理办法、合规要求等。\n\
         - audit_query: 查询特定审计报告的内容、审计发现的具体问题等。\n\
         - issue_query: 查询以往审计发现的问题库、类似问题的整改要求、审计问题台账等。\n\
         - analysis_query: 对审计报告进行宏观汇总、风险趋势分析、跨报告的TOP问题总结。\n\
         - general: 无法归类的其他问题。\n\n\
         必须返回以下JSON格式，不要包含任何其他文字：\n\
         {{\"intent\": \"意图名称\", \"reason\": \"分类的逻辑理由\", \"suggested_top_k\": 5}}\n\n\
         用户问题: {query}{context}"
    )
}

#[derive(Debug, Deserialize)]
struct ClassifyReply {
    intent: String,
    #[serde(default)]
    reason: String,
    #[serde(default)]
    suggested_top_k: Option<usize>,
}

/// Routes queries to a retrieval plan. LLM-backed when a provider is
/// configured; always falls back to keyword rules so retrieval can
/// proceed.
#[derive(Debug, Clone)]
pub struct IntentRouter {
    llm: Option<Arc<dyn LlmProvider>>,
}

impl IntentRouter {
    pub fn new(llm: Option<Arc<dyn LlmProvider>>) -> Self {
        Self { llm }
    }

    /// Classify the query and derive the full retrieval plan.
    pub async fn route(
        &self,
        query: &str,
        session_summary: Option<&str>,
        defaults: &RetrievalOptions,
        overrides: &RetrievalOverrides,
    ) -> IntentRoute {
        let (intent, reason, suggested_top_k) = self.classify(query, session_summary).await;

        let mut options = plan_for_intent(intent, defaults);
        if let Some(top_k) = suggested_top_k {
            options.top_k = top_k;
        }
        if intent == Intent::AnalysisQuery {
            options.top_k = options.top_k.max(ANALYTICAL_TOP_K);
        }
        options.doc_types = intent.doc_type_filter();

        // Explicit caller parameters outrank the routed plan.
        if let Some(mode) = overrides.retrieval_mode {
            options.mode = mode;
        }
        if let Some(top_k) = overrides.top_k {
            options.top_k = top_k;
        }
        if let Some(hops) = overrides.graph_hops {
            options.hops = hops;
        }
        if let Some(alpha) = overrides.hybrid_alpha {
            options.alpha = alpha;
        }
        if let Some(use_rerank) = overrides.use_rerank {
            options.use_rerank = use_rerank;
        }
        if let Some(ref doc_types) = overrides.doc_types {
            options.doc_types = Some(doc_types.clone());
        }

        let mut options = options.sanitized();
        apply_rerank_safety(&mut options, intent);

        IntentRoute {
            intent,
            reason,
            options,
        }
    }

    async fn classify(
        &self,
        query: &str,
        session_summary: Option<&str>,
    ) -> (Intent, String, Option<usize>) {
        if let Some(ref llm) = self.llm {
            let request = LlmRequest::new(vec![
                Message::system(CLASSIFY_SYSTEM),
                Message::user(classify_prompt(query, session_summary)),
            ])
            .with_temperature(0.1)
            .with_max_tokens(256);

            match llm.chat(request).await {
                Ok(response) => match parse_classify_reply(&response.content) {
                    Some((intent, reason, top_k)) => {
                        debug!(intent = intent.as_str(), "intent classified by LLM");
                        return (intent, reason, top_k);
                    }
                    None => {
                        warn!("unparseable intent reply, using keyword fallback");
                    }
                },
                Err(e) => {
                    warn!(error = %e, "intent classification failed, using keyword fallback");
                }
            }
        }
        let (intent, reason) = keyword_fallback(query);
        (intent, reason, None)
    }
}

/// Strip markdown code fences around a JSON payload.
fn strip_fences(content: &str) -> &str {
    let trimmed = content.trim();
    let without_open = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    without_open
        .strip_suffix("```")
        .unwrap_or(without_open)
        .trim()
}

fn parse_classify_reply(content: &str) -> Option<(Intent, String, Option<usize>)> {
    let reply: ClassifyReply = serde_json::from_str(strip_fences(content)).ok()?;
    let intent = reply.intent.parse::<Intent>().unwrap_or(Intent::General);
    let top_k = reply.suggested_top_k.map(|k| k.clamp(1, 30));
    Some((intent, reply.reason, top_k))
}

/// Deterministic fallback so retrieval always proceeds.
fn keyword_fallback(query: &str) -> (Intent, String) {
    const REGULATION: [&str; 7] = ["条款", "制度", "规定", "办法", "条例", "合规", "章程"];
    const ISSUE: [&str; 4] = ["整改", "问题台账", "台账", "问题库"];
    const AUDIT: [&str; 3] = ["审计报告", "审计发现", "审计结果"];
    const ANALYSIS: [&str; 4] = ["汇总", "趋势", "分析", "排名"];

    for keyword in REGULATION {
        if query.contains(keyword) {
            return (
                Intent::RegulationQuery,
                format!("关键词回退: 命中“{keyword}”"),
            );
        }
    }
    for keyword in ISSUE {
        if query.contains(keyword) {
            return (Intent::IssueQuery, format!("关键词回退: 命中“{keyword}”"));
        }
    }
    for keyword in AUDIT {
        if query.contains(keyword) {
            return (Intent::AuditQuery, format!("关键词回退: 命中“{keyword}”"));
        }
    }
    for keyword in ANALYSIS {
        if query.contains(keyword) {
            return (
                Intent::AnalysisQuery,
                format!("关键词回退: 命中“{keyword}”"),
            );
        }
    }
    (Intent::General, "关键词回退: 无匹配，默认路由".to_string())
}

/// Per-intent retrieval plan, seeded from the deployment defaults.
fn plan_for_intent(intent: Intent, defaults: &RetrievalOptions) -> RetrievalOptions {
    let mut options = defaults.clone();
    options.top_k = DEFAULT_TOP_K;
    match intent {
        Intent::RegulationQuery => {
            options.mode = RetrievalMode::Hybrid;
            options.graph_top_k = 10;
            options.hops = 1;
            options.alpha = 0.75;
        }
        Intent::AuditQuery => {
            options.mode = RetrievalMode::Hybrid;
            options.graph_top_k = 12;
            options.hops = 2;
            options.alpha = 0.65;
        }
        Intent::IssueQuery => {
            options.mode = RetrievalMode::Hybrid;
            options.graph_top_k = 16;
            options.hops = 2;
            options.alpha = 0.58;
        }
        Intent::AnalysisQuery => {
            options.mode = RetrievalMode::Graph;
            options.graph_top_k = 24;
            options.hops = 3;
            options.alpha = 0.45;
            options.top_k = ANALYTICAL_TOP_K;
        }
        Intent::General => {
            options.mode = RetrievalMode::Hybrid;
            options.graph_top_k = 14;
            options.hops = 2;
            options.alpha = 0.6;
        }
    }
    options
}

/// Wide recalls make cross-encoding slow and noisy; narrow or disable
/// the rerank pass as recall grows.
fn apply_rerank_safety(options: &mut RetrievalOptions, intent: Intent) {
    if options.top_k > 10 {
        if options.top_k >= 20 || intent == Intent::AnalysisQuery {
            options.use_rerank = false;
        } else {
            options.rerank_top_k = 10;
        }
    } else if options.top_k <= 5 {
        options.rerank_top_k = options.rerank_top_k.min(10).min(options.top_k * 2);
    }
}
