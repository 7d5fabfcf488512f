//! Ask orchestration: intent → retrieval → rerank → streamed answer

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};

use crate::domain::answer::{
    build_citation, build_source_contexts, AskEvent, CancelHandle, Citation, ProgressStage,
    ProgressStatus, SourceContext,
};
use crate::domain::embedding::EmbeddingProvider;
use crate::domain::llm::{ChatRole, LlmProvider, LlmRequest, LlmUsage, Message};
use crate::domain::rerank::RerankProvider;
use crate::domain::retrieval::{
    IntentRoute, RetrievalMode, RetrievalOptions, RetrievalOverrides, SearchHit,
};
use crate::domain::DomainError;
use crate::infrastructure::graph::{GraphBuilder, GraphRetriever, GraphStats};
use crate::infrastructure::retrieval::{apply_rerank, fuse_hybrid, IntentRouter};
use crate::infrastructure::session::SessionStore;
use crate::infrastructure::vector_store::SearchFilter;

use super::StoreSet;

/// Reply used when retrieval returns nothing usable.
const INSUFFICIENT_CONTEXT_REPLY: &str = "未在参考资料中找到充分依据，无法回答该问题。请先上传相关文档，或换一种提问方式。";

static CITATION_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[S(\d+)\]").unwrap());

/// Ranked hits plus whether the cross-encoder actually ran.
#[derive(Debug, Serialize)]
pub struct SearchOutcome {
    pub hits: Vec<SearchHit>,
    pub rerank_applied: bool,
}

/// Routed search response.
#[derive(Debug, Serialize)]
pub struct IntentSearchResult {
    pub route: IntentRoute,
    pub outcome: SearchOutcome,
}

/// Non-streaming answer payload.
#[derive(Debug, Serialize)]
pub struct AskAnswer {
    pub answer: String,
    pub citations: Vec<Citation>,
    pub route: IntentRoute,
    pub model: String,
    pub usage: LlmUsage,
    pub hits: Vec<SearchHit>,
}

/// Drives search and question answering over the shared stores.
pub struct AskService {
    stores: Arc<StoreSet>,
    embedder: Arc<dyn EmbeddingProvider>,
    reranker: Option<Arc<dyn RerankProvider>>,
    llm: Option<Arc<dyn LlmProvider>>,
    router: IntentRouter,
    sessions: Arc<SessionStore>,
    defaults: RetrievalOptions,
    /// Total per-provider-call budget, retries included.
    provider_budget: Duration,
}

impl AskService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        stores: Arc<StoreSet>,
        embedder: Arc<dyn EmbeddingProvider>,
        reranker: Option<Arc<dyn RerankProvider>>,
        llm: Option<Arc<dyn LlmProvider>>,
        sessions: Arc<SessionStore>,
        defaults: RetrievalOptions,
        provider_budget: Duration,
    ) -> Self {
        Self {
            stores,
            embedder,
            reranker,
            router: IntentRouter::new(llm.clone()),
            llm,
            sessions,
            defaults,
            provider_budget,
        }
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// Retrieval per the resolved options: vector recall, graph
    /// expansion, fusion, optional rerank.
    pub async fn search(&self, query: &str, options: &RetrievalOptions) -> Result<SearchOutcome, DomainError> {
        let options = options.clone().sanitized();
        let recall = if options.use_rerank {
            options.rerank_top_k.max(options.top_k * 2)
        } else {
            options.top_k
        };

        let vector_hits = if options.mode.uses_vector() {
            let query_vec = tokio::time::timeout(
                self.provider_budget,
                self.embedder.embed(&[query.to_string()]),
            )
            .await
            .map_err(|_| DomainError::provider_timeout("query embedding budget exceeded"))??
            .into_iter()
            .next()
            .ok_or_else(|| DomainError::embedding("empty query embedding", false))?;

            let filter = SearchFilter {
                doc_types: options.doc_types.clone(),
                doc_ids: None,
                title_substring: options.title_filter.clone(),
            };
            self.stores
                .vectors
                .read()
                .await
                .search(&query_vec, recall, &filter)?
        } else {
            Vec::new()
        };

        let graph_hits = if options.mode.uses_graph() {
            let graph = self.stores.graph.read().await;
            let retriever = GraphRetriever::new(&graph);
            let raw = retriever.search(
                query,
                options.graph_top_k.max(options.top_k),
                options.doc_types.as_deref(),
                options.hops,
            );
            drop(graph);

            // Chunk metadata is fetched lazily from the vector store.
            let vectors = self.stores.vectors.read().await;
            raw.into_iter()
                .filter_map(|hit| {
                    vectors
                        .get_by_chunk_id(&hit.chunk_id)
                        .map(|chunk| (chunk.clone(), hit.score))
                })
                .collect()
        } else {
            Vec::new()
        };

        let alpha = match options.mode {
            RetrievalMode::Vector => 1.0,
            RetrievalMode::Graph => 0.0,
            RetrievalMode::Hybrid => options.alpha,
        };
        let mut hits = fuse_hybrid(vector_hits, graph_hits, alpha);

        if options.use_rerank {
            if let Some(ref reranker) = self.reranker {
                let (reranked, applied) = apply_rerank(
                    reranker,
                    query,
                    hits,
                    options.top_k,
                    options.rerank_top_k,
                )
                .await;
                return Ok(SearchOutcome {
                    hits: reranked,
                    rerank_applied: applied,
                });
            }
        }

        hits.truncate(options.top_k);
        Ok(SearchOutcome {
            hits,
            rerank_applied: false,
        })
    }

    /// Intent-routed search.
    pub async fn search_with_intent(
        &self,
        query: &str,
        overrides: &RetrievalOverrides,
    ) -> Result<IntentSearchResult, DomainError> {
        let route = self
            .router
            .route(query, None, &self.defaults, overrides)
            .await;
        let outcome = self.search(query, &route.options).await?;
        Ok(IntentSearchResult { route, outcome })
    }

    /// Streamed ask. Events arrive over the returned stream; dropping
    /// it (client disconnect) aborts at the next stage boundary.
    pub fn ask_stream(
        self: Arc<Self>,
        query: String,
        overrides: RetrievalOverrides,
        session_id: Option<String>,
    ) -> (CancelHandle, ReceiverStream<AskEvent>) {
        let cancel = CancelHandle::new();
        let (tx, rx) = tokio::sync::mpsc::channel::<AskEvent>(64);

        let handle = cancel.clone();
        tokio::spawn(async move {
            self.run_ask(query, overrides, session_id, tx, handle).await;
        });

        (cancel, ReceiverStream::new(rx))
    }

    async fn run_ask(
        &self,
        query: String,
        overrides: RetrievalOverrides,
        session_id: Option<String>,
        tx: tokio::sync::mpsc::Sender<AskEvent>,
        cancel: CancelHandle,
    ) {
        // A failed send means the client is gone; cancel the request.
        macro_rules! emit {
            ($event:expr) => {
                if tx.send($event).await.is_err() {
                    cancel.cancel();
                    return;
                }
            };
        }

        let created = session_id.is_none();
        let session_id = session_id.unwrap_or_else(SessionStore::new_session_id);
        if created {
            emit!(AskEvent::Session {
                session_id: session_id.clone()
            });
        }

        // Stage: intent
        emit!(AskEvent::progress(
            ProgressStage::Intent,
            ProgressStatus::Running,
            "意图识别中"
        ));
        if cancel.is_cancelled() {
            return;
        }
        let route = self
            .router
            .route(&query, None, &self.defaults, &overrides)
            .await;
        emit!(AskEvent::progress_with(
            ProgressStage::Intent,
            ProgressStatus::Done,
            format!("意图识别完成: {}", route.intent.as_str()),
            serde_json::json!({
                "intent": route.intent.as_str(),
                "top_k": route.options.top_k,
                "use_rerank": route.options.use_rerank,
            })
        ));

        // Stage: retrieval
        emit!(AskEvent::progress(
            ProgressStage::Retrieval,
            ProgressStatus::Running,
            "检索匹配中"
        ));
        if cancel.is_cancelled() {
            return;
        }
        let outcome = match self.search(&query, &route.options).await {
            Ok(outcome) => outcome,
            Err(e) => {
                emit!(AskEvent::Error {
                    message: e.to_string(),
                    kind: e.kind().to_string(),
                    retryable: e.retryable(),
                });
                return;
            }
        };
        emit!(AskEvent::progress_with(
            ProgressStage::Retrieval,
            ProgressStatus::Done,
            format!("检索完成，命中 {} 条结果", outcome.hits.len()),
            serde_json::json!({
                "hits": outcome.hits.len(),
                "rerank_applied": outcome.rerank_applied,
            })
        ));

        let model_name = self
            .llm
            .as_ref()
            .map(|l| l.model_name().to_string())
            .unwrap_or_else(|| "unconfigured".to_string());

        // No usable context: fixed reply, empty citations, no LLM call.
        if outcome.hits.is_empty() {
            emit!(AskEvent::progress(
                ProgressStage::Generation,
                ProgressStatus::Running,
                "回答生成中"
            ));
            emit!(AskEvent::Delta {
                content: INSUFFICIENT_CONTEXT_REPLY.to_string()
            });
            emit!(AskEvent::progress(
                ProgressStage::Generation,
                ProgressStatus::Done,
                "回答生成完成"
            ));
            emit!(AskEvent::Citations {
                citations: Vec::new()
            });
            emit!(AskEvent::Done {
                model: model_name,
                usage: LlmUsage::default(),
            });
            return;
        }

        let Some(llm) = self.llm.clone() else {
            emit!(AskEvent::Error {
                message: "LLM功能未启用，请配置LLM提供者".to_string(),
                kind: "llm_error".to_string(),
                retryable: false,
            });
            return;
        };

        // Stage: generation
        emit!(AskEvent::progress(
            ProgressStage::Generation,
            ProgressStatus::Running,
            "回答生成中"
        ));
        if cancel.is_cancelled() {
            return;
        }

        let contexts = build_source_contexts(&outcome.hits);
        let history = self.sessions.history(&session_id, 8).await;
        let request = build_answer_request(&query, &contexts, history);

        let stream_result =
            tokio::time::timeout(self.provider_budget, llm.chat_stream(request)).await;
        let mut stream = match stream_result {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                warn!(error = %e, "LLM call failed, degrading to apology");
                let apology = format!("抱歉，回答生成失败（{e}），请稍后重试。");
                emit!(AskEvent::Delta { content: apology });
                emit!(AskEvent::progress(
                    ProgressStage::Generation,
                    ProgressStatus::Done,
                    "回答生成失败"
                ));
                emit!(AskEvent::Citations {
                    citations: Vec::new()
                });
                emit!(AskEvent::Done {
                    model: model_name,
                    usage: LlmUsage::default(),
                });
                return;
            }
            Err(_) => {
                let e = DomainError::provider_timeout("LLM call exceeded total budget");
                let apology = format!("抱歉，回答生成超时（{e}），请稍后重试。");
                emit!(AskEvent::Delta { content: apology });
                emit!(AskEvent::progress(
                    ProgressStage::Generation,
                    ProgressStatus::Done,
                    "回答生成超时"
                ));
                emit!(AskEvent::Citations {
                    citations: Vec::new()
                });
                emit!(AskEvent::Done {
                    model: model_name,
                    usage: LlmUsage::default(),
                });
                return;
            }
        };

        let mut filter = CitationFilter::new(contexts.len());
        let mut completion_tokens = 0u32;
        while let Some(item) = stream.next().await {
            if cancel.is_cancelled() {
                return;
            }
            match item {
                Ok(chunk) => {
                    if let Some(delta) = chunk.delta {
                        completion_tokens += 1;
                        let safe = filter.push(&delta);
                        if !safe.is_empty() {
                            emit!(AskEvent::Delta { content: safe });
                        }
                    }
                    if chunk.finish_reason.is_some() {
                        break;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "LLM stream error mid-answer");
                    break;
                }
            }
        }
        let tail = filter.finish();
        if !tail.is_empty() {
            emit!(AskEvent::Delta { content: tail });
        }

        emit!(AskEvent::progress(
            ProgressStage::Generation,
            ProgressStatus::Done,
            "回答生成完成"
        ));

        let answer = filter.answer().to_string();
        let citations = resolve_citations(&answer, &outcome.hits);

        self.sessions
            .append(&session_id, ChatRole::User, query.clone())
            .await;
        if !answer.is_empty() {
            self.sessions
                .append(&session_id, ChatRole::Assistant, answer.clone())
                .await;
        }

        emit!(AskEvent::Citations { citations });
        emit!(AskEvent::Done {
            model: model_name,
            usage: LlmUsage {
                prompt_tokens: 0,
                completion_tokens,
                total_tokens: completion_tokens,
            },
        });
        info!(session_id = %session_id, "ask request complete");
    }

    /// Non-streaming ask.
    pub async fn answer(
        &self,
        query: &str,
        overrides: &RetrievalOverrides,
        session_id: Option<&str>,
    ) -> Result<AskAnswer, DomainError> {
        let route = self
            .router
            .route(query, None, &self.defaults, overrides)
            .await;
        let outcome = self.search(query, &route.options).await?;

        if outcome.hits.is_empty() {
            return Ok(AskAnswer {
                answer: INSUFFICIENT_CONTEXT_REPLY.to_string(),
                citations: Vec::new(),
                route,
                model: "none".to_string(),
                usage: LlmUsage::default(),
                hits: Vec::new(),
            });
        }

        let llm = self
            .llm
            .as_ref()
            .ok_or_else(|| DomainError::llm("LLM功能未启用，请配置LLM提供者"))?;

        let contexts = build_source_contexts(&outcome.hits);
        let history = match session_id {
            Some(id) => self.sessions.history(id, 8).await,
            None => Vec::new(),
        };
        let request = build_answer_request(query, &contexts, history);

        let response = tokio::time::timeout(self.provider_budget, llm.chat(request))
            .await
            .map_err(|_| DomainError::provider_timeout("LLM call exceeded total budget"))??;

        let mut filter = CitationFilter::new(contexts.len());
        let mut answer = filter.push(&response.content);
        answer.push_str(&filter.finish());
        let citations = resolve_citations(&answer, &outcome.hits);

        if let Some(id) = session_id {
            self.sessions.append(id, ChatRole::User, query).await;
            self.sessions
                .append(id, ChatRole::Assistant, answer.clone())
                .await;
        }

        Ok(AskAnswer {
            answer,
            citations,
            route,
            model: response.model,
            usage: response.usage,
            hits: outcome.hits,
        })
    }

    /// Exclusive graph rebuild: takes the graph and registry write
    /// lanes for its duration; searches keep serving the prior
    /// snapshot until the swap.
    pub async fn rebuild_graph(&self) -> Result<GraphStats, DomainError> {
        let registry = self.stores.registry.write().await;
        let vectors = self.stores.vectors.read().await;
        let mut graph = self.stores.graph.write().await;

        let active: HashSet<&str> = registry.active_records().map(|d| d.doc_id.as_str()).collect();
        let rebuilt = GraphBuilder::new().build(
            vectors
                .iter_chunks()
                .filter(|c| active.contains(c.doc_id.as_str())),
        );
        *graph = rebuilt;
        graph.save(&self.stores.paths.graph())?;
        let stats = graph.stats();
        info!(nodes = stats.nodes, edges = stats.edges, "graph rebuilt");
        Ok(stats)
    }
}

/// System instructions requiring inline `[S<n>]` citation tokens.
fn build_system_prompt() -> String {
    "你是一个专业的审计和合规助手，擅长根据法规制度和审计报告来回答问题。\n\n\
     请严格遵循：\n\
     1. 只能基于给定参考资料回答，不要编造来源\n\
     2. 每条关键结论后必须添加来源标记，格式为 [S1]、[S2]\n\
     3. 来源标记必须来自参考资料中的来源ID，不能凭空创建\n\
     4. 如果资料不足，请明确说明“未在参考资料中找到充分依据”\n\
     5. 回答结构清晰、专业、可执行"
        .to_string()
}

fn build_context_text(contexts: &[SourceContext]) -> String {
    let mut parts = Vec::with_capacity(contexts.len());
    for context in contexts {
        let mut part = if !context.filename.is_empty() {
            format!("[{}] 来源: {}", context.source_id, context.filename)
        } else if !context.title.is_empty() {
            format!("[{}] 来源: {}", context.source_id, context.title)
        } else {
            format!("[{}] 来源: 参考资料", context.source_id)
        };
        if !context.title.is_empty() && context.title != context.filename {
            part.push_str(&format!("\n标题: {}", context.title));
        }
        if !context.section_path.is_empty() {
            part.push_str(&format!("\n章节: {}", context.section_path.join(" / ")));
        }
        part.push_str(&format!("\n类型: {}", context.doc_type.as_str()));
        part.push_str(&format!("\n相关度: {:.4}", context.score));
        part.push_str(&format!("\n内容:\n{}\n", context.text));
        parts.push(part);
    }
    parts.join("\n")
}

fn build_answer_request(
    query: &str,
    contexts: &[SourceContext],
    history: Vec<Message>,
) -> LlmRequest {
    let user_prompt = format!(
        "请基于以下参考资料回答问题。\n\n{}\n\n问题: {}\n\n\
         输出要求：\n\
         - 在结论句后追加来源标记，如：XXX。[S1]\n\
         - 可以同时引用多个来源，如：[S1][S3]\n\
         - 不要输出不存在的来源编号\n\
         - 不要省略来源标记",
        build_context_text(contexts),
        query
    );

    let mut messages = vec![Message::system(build_system_prompt())];
    messages.extend(history);
    messages.push(Message::user(user_prompt));
    LlmRequest::new(messages)
}

/// Streaming filter that strips `[S<n>]` tokens whose index does not
/// resolve to a provided source, holding back partial tokens at delta
/// boundaries.
struct CitationFilter {
    max_source: usize,
    pending: String,
    answer: String,
}

impl CitationFilter {
    fn new(max_source: usize) -> Self {
        Self {
            max_source,
            pending: String::new(),
            answer: String::new(),
        }
    }

    fn push(&mut self, delta: &str) -> String {
        self.pending.push_str(delta);
        let mut out = String::new();

        loop {
            let Some(open) = self.pending.find('[') else {
                out.push_str(&self.pending);
                self.pending.clear();
                break;
            };

            out.push_str(&self.pending[..open]);
            let rest = self.pending[open..].to_string();
            self.pending = rest;

            match Self::classify(&self.pending) {
                TokenState::Complete { len, index } => {
                    let token: String = self.pending.drain(..len).collect();
                    if index >= 1 && index <= self.max_source {
                        out.push_str(&token);
                    }
                    // Unresolvable tokens are dropped entirely.
                }
                TokenState::Partial => break,
                TokenState::NotAToken => {
                    out.push('[');
                    self.pending.remove(0);
                }
            }
        }

        self.answer.push_str(&out);
        out
    }

    /// Flush whatever is still held back; an unterminated prefix is
    /// literal text, not a token.
    fn finish(&mut self) -> String {
        let tail = std::mem::take(&mut self.pending);
        self.answer.push_str(&tail);
        tail
    }

    fn answer(&self) -> &str {
        &self.answer
    }

    fn classify(buffer: &str) -> TokenState {
        debug_assert!(buffer.starts_with('['));
        let chars: Vec<char> = buffer.chars().collect();
        if chars.len() == 1 {
            return TokenState::Partial;
        }
        if chars[1] != 'S' {
            return TokenState::NotAToken;
        }

        let mut digits = String::new();
        for (i, &c) in chars.iter().enumerate().skip(2) {
            if c.is_ascii_digit() {
                digits.push(c);
            } else if c == ']' {
                if digits.is_empty() {
                    return TokenState::NotAToken;
                }
                let byte_len = chars[..=i].iter().map(|c| c.len_utf8()).sum();
                let index = digits.parse::<usize>().unwrap_or(0);
                return TokenState::Complete {
                    len: byte_len,
                    index,
                };
            } else {
                return TokenState::NotAToken;
            }
        }
        TokenState::Partial
    }
}

enum TokenState {
    Complete { len: usize, index: usize },
    Partial,
    NotAToken,
}

/// Citations for the `S<n>` tokens actually present in the answer, in
/// first-appearance order.
fn resolve_citations(answer: &str, hits: &[SearchHit]) -> Vec<Citation> {
    let mut seen: Vec<usize> = Vec::new();
    for captures in CITATION_TOKEN.captures_iter(answer) {
        if let Ok(index) = captures[1].parse::<usize>() {
            if index >= 1 && index <= hits.len() && !seen.contains(&index) {
                seen.push(index);
            }
        }
    }
    seen.into_iter()
        .map(|index| build_citation(&format!("S{index}"), &hits[index - 1]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::document::DocType;
    use crate::domain::ingestion::{ChunkPiece, ChunkRecord, SemanticBoundary};

    fn hit(ordinal: usize) -> SearchHit {
        let chunk = ChunkRecord::from_piece(
            ChunkPiece::new(format!("第{}条 内容。", ordinal + 1), SemanticBoundary::Article),
            ordinal,
            "doc1",
            DocType::InternalRegulation,
            "制度",
            "regs.txt",
        );
        SearchHit::vector(chunk, 0.8)
    }

    #[test]
    fn test_citation_filter_passes_valid_tokens() {
        let mut filter = CitationFilter::new(3);
        let out = filter.push("结论一。[S1] 结论二。[S3]");
        assert_eq!(out, "结论一。[S1] 结论二。[S3]");
    }

    #[test]
    fn test_citation_filter_strips_unresolved() {
        let mut filter = CitationFilter::new(2);
        let mut out = filter.push("结论。[S7]完");
        out.push_str(&filter.finish());
        assert_eq!(out, "结论。完");
        assert_eq!(filter.answer(), "结论。完");
    }

    #[test]
    fn test_citation_filter_handles_split_tokens() {
        let mut filter = CitationFilter::new(2);
        let mut out = String::new();
        out.push_str(&filter.push("依据规定。[S"));
        out.push_str(&filter.push("1]另见"));
        out.push_str(&filter.push("[S9"));
        out.push_str(&filter.push("]。"));
        out.push_str(&filter.finish());
        assert_eq!(out, "依据规定。[S1]另见。");
    }

    #[test]
    fn test_citation_filter_keeps_plain_brackets() {
        let mut filter = CitationFilter::new(2);
        let mut out = filter.push("见[附件A]与[S2]");
        out.push_str(&filter.finish());
        assert_eq!(out, "见[附件A]与[S2]");
    }

    #[test]
    fn test_citation_filter_flushes_incomplete_tail() {
        let mut filter = CitationFilter::new(2);
        let mut out = filter.push("结尾[S1");
        out.push_str(&filter.finish());
        assert_eq!(out, "结尾[S1");
    }

    #[test]
    fn test_resolve_citations_first_appearance_order() {
        let hits = vec![hit(0), hit(1), hit(2)];
        let citations = resolve_citations("先见[S2]，再见[S1]，重复[S2]。", &hits);
        assert_eq!(citations.len(), 2);
        assert_eq!(citations[0].source_id, "S2");
        assert_eq!(citations[1].source_id, "S1");
    }

    #[test]
    fn test_resolve_citations_ignores_out_of_range() {
        let hits = vec![hit(0)];
        let citations = resolve_citations("引用[S1][S5]。", &hits);
        assert_eq!(citations.len(), 1);
        assert_eq!(citations[0].source_id, "S1");
    }

    #[test]
    fn test_answer_request_layout() {
        let hits = vec![hit(0)];
        let contexts = build_source_contexts(&hits);
        let request = build_answer_request(
            "总结条款",
            &contexts,
            vec![Message::user("早前的问题"), Message::assistant("早前的回答")],
        );
        assert_eq!(request.messages.len(), 4);
        assert_eq!(request.messages[0].role, ChatRole::System);
        assert!(request.messages[3].content.contains("[S1] 来源: regs.txt"));
        assert!(request.messages[3].content.contains("问题: 总结条款"));
    }
}
