use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::core::errors::ApiError;
use crate::llm::{build_prompt, LlmProvider, PromptTemplate};
use crate::rag::chunker::Chunker;
use crate::rag::context::{self, CustomerHistory, OrderContext};
use crate::rag::index::ScoredPassage;
use crate::rag::retriever::{IndexStats, Retriever};
use crate::tools::search::{SearchResult, WebSearchClient};

pub const REDIRECT_MESSAGE: &str = "I can only answer questions about Micro Center's store policies, including returns, exchanges, warranties, shipping, and general store information.\n\nFor questions outside of store policies, please:\n- Contact Micro Center customer service for specific account or order inquiries\n- Consult appropriate professionals for legal or medical matters\n\nHow can I help you with Micro Center's policies today?";

pub const POLICY_DISCLAIMER: &str = "\n\n---\nℹ️ Policy Information: This information is based on Micro Center's current policies as documented. Policies may change, and specific situations may vary. For the most up-to-date information or questions about your specific order, please contact Micro Center customer service.";

const DISCLAIMER_MARKER: &str = "ℹ️ Policy Information:";

const OUT_OF_SCOPE_KEYWORDS: [&str; 9] = [
    "legal advice",
    "lawyer",
    "sue",
    "lawsuit",
    "attorney",
    "medical advice",
    "diagnosis",
    "prescription",
    "doctor",
];

/// How a request terminated: a real answer, the fixed safety redirect, or an
/// apology after a provider failure. Degraded carries the provider message.
#[derive(Debug, Clone, PartialEq)]
pub enum AnswerOutcome {
    Answered,
    SafetyRedirect,
    Degraded(String),
}

#[derive(Debug, Clone)]
pub struct PipelineAnswer {
    pub answer: String,
    pub citations: Vec<String>,
    pub outcome: AnswerOutcome,
    /// Web results that were folded into the context, if any.
    pub web_results: Vec<SearchResult>,
}

#[derive(Default)]
pub struct AnswerOptions {
    pub template: PromptTemplate,
    pub use_web_search: bool,
    /// Pre-fetched results override the pipeline's own web search.
    pub web_results: Option<Vec<SearchResult>>,
    pub order_context: Option<OrderContext>,
    pub customer_history: Option<CustomerHistory>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestReceipt {
    pub document_id: String,
    pub chunks_created: usize,
}

pub struct QueryResponse {
    pub answer: PipelineAnswer,
    pub retrieved: Vec<ScoredPassage>,
}

/// End-to-end orchestrator: chunking in, answers out. Generation never
/// surfaces an error to the caller; failures become apology answers.
pub struct RagPipeline {
    chunker: Chunker,
    retriever: Arc<Retriever>,
    llm: Arc<dyn LlmProvider>,
    web_search: Option<Arc<WebSearchClient>>,
    top_k: usize,
}

impl RagPipeline {
    pub fn new(
        chunker: Chunker,
        retriever: Arc<Retriever>,
        llm: Arc<dyn LlmProvider>,
        web_search: Option<Arc<WebSearchClient>>,
        top_k: usize,
    ) -> Self {
        RagPipeline {
            chunker,
            retriever,
            llm,
            web_search,
            top_k,
        }
    }

    pub fn web_search_enabled(&self) -> bool {
        self.web_search.is_some()
    }

    /// Fixed redirect for questions the assistant must not answer.
    pub fn safety_redirect(question: &str) -> Option<&'static str> {
        let lowered = question.to_lowercase();
        OUT_OF_SCOPE_KEYWORDS
            .iter()
            .any(|keyword| lowered.contains(keyword))
            .then_some(REDIRECT_MESSAGE)
    }

    pub async fn ingest(&self, text: &str, source: &str) -> Result<IngestReceipt, ApiError> {
        let passages = self.chunker.chunk(text, source);
        let chunks_created = self.retriever.add_passages(passages).await?;
        info!("ingested {}: {} chunks", source, chunks_created);
        Ok(IngestReceipt {
            document_id: format!("doc_{}_{}", source, chunks_created),
            chunks_created,
        })
    }

    pub async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<ScoredPassage>, ApiError> {
        self.retriever.retrieve(query, top_k).await
    }

    /// Safety gate, then retrieval, then generation. The gate runs before
    /// retrieval so out-of-scope questions never touch the index.
    pub async fn query(
        &self,
        question: &str,
        top_k: Option<usize>,
        use_web_search: bool,
        template: PromptTemplate,
    ) -> Result<QueryResponse, ApiError> {
        if let Some(redirect) = Self::safety_redirect(question) {
            return Ok(QueryResponse {
                answer: PipelineAnswer {
                    answer: redirect.to_string(),
                    citations: Vec::new(),
                    outcome: AnswerOutcome::SafetyRedirect,
                    web_results: Vec::new(),
                },
                retrieved: Vec::new(),
            });
        }

        let retrieved = self
            .retriever
            .retrieve(question, top_k.unwrap_or(self.top_k))
            .await?;
        let answer = self
            .answer(
                question,
                &retrieved,
                AnswerOptions {
                    template,
                    use_web_search,
                    ..AnswerOptions::default()
                },
            )
            .await;
        Ok(QueryResponse { answer, retrieved })
    }

    /// Generates over already-retrieved passages. Infallible by contract:
    /// every path ends in a `PipelineAnswer`.
    pub async fn answer(
        &self,
        question: &str,
        passages: &[ScoredPassage],
        opts: AnswerOptions,
    ) -> PipelineAnswer {
        if let Some(redirect) = Self::safety_redirect(question) {
            return PipelineAnswer {
                answer: redirect.to_string(),
                citations: Vec::new(),
                outcome: AnswerOutcome::SafetyRedirect,
                web_results: Vec::new(),
            };
        }

        let web_results = match opts.web_results {
            Some(results) => results,
            None if opts.use_web_search => self.run_web_search(question).await,
            None => Vec::new(),
        };

        let context = context::fuse(
            passages,
            opts.order_context.as_ref(),
            opts.customer_history.as_ref(),
            &web_results,
        );
        let prompt = build_prompt(question, &context, opts.template);

        match self.llm.complete(&prompt).await {
            Ok(raw) => {
                let citations = context::citations(
                    passages,
                    opts.order_context.as_ref(),
                    opts.customer_history.as_ref(),
                    &web_results,
                );
                let answer = append_missing_citations(raw, &citations);
                let answer = apply_disclaimer(&answer);
                PipelineAnswer {
                    answer,
                    citations,
                    outcome: AnswerOutcome::Answered,
                    web_results,
                }
            }
            Err(err) => {
                warn!("answer generation failed: {}", err);
                PipelineAnswer {
                    answer: apology(&err),
                    citations: Vec::new(),
                    outcome: AnswerOutcome::Degraded(err.to_string()),
                    web_results,
                }
            }
        }
    }

    pub async fn stats(&self) -> IndexStats {
        self.retriever.stats().await
    }

    pub async fn clear(&self) -> Result<(), ApiError> {
        self.retriever.clear().await
    }

    async fn run_web_search(&self, question: &str) -> Vec<SearchResult> {
        let Some(client) = &self.web_search else {
            return Vec::new();
        };
        match client
            .search(
                question,
                client.default_num_results(),
                client.default_site_filter(),
            )
            .await
        {
            Ok(results) => results,
            Err(err) => {
                warn!("web search failed, continuing without results: {}", err);
                Vec::new()
            }
        }
    }
}

fn apology(err: &ApiError) -> String {
    format!(
        "I apologize, but I encountered an error generating a response: {}. Please try again or contact Micro Center customer service for assistance.",
        err
    )
}

/// Appends a Sources section unless the model already cited one of them
/// verbatim.
fn append_missing_citations(answer: String, citations: &[String]) -> String {
    if citations.is_empty() || citations.iter().any(|c| answer.contains(c.as_str())) {
        return answer;
    }
    let lines = citations
        .iter()
        .map(|c| format!("- {}", c))
        .collect::<Vec<_>>()
        .join("\n");
    format!("{}\n\nSources:\n{}", answer, lines)
}

/// Idempotent: an answer already carrying the marker is returned unchanged.
pub fn apply_disclaimer(answer: &str) -> String {
    if answer.contains(DISCLAIMER_MARKER) {
        return answer.to_string();
    }
    format!("{}{}", answer, POLICY_DISCLAIMER)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::EmbeddingProvider;
    use crate::rag::index::FlatIndex;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct HashEmbedder {
        dimension: usize,
        calls: AtomicUsize,
    }

    impl HashEmbedder {
        fn new(dimension: usize) -> Self {
            HashEmbedder {
                dimension,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for HashEmbedder {
        fn model_name(&self) -> &str {
            "hash-embedder"
        }

        fn dimension(&self) -> usize {
            self.dimension
        }

        async fn health_check(&self) -> Result<bool, ApiError> {
            Ok(true)
        }

        async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(inputs
                .iter()
                .map(|text| {
                    let mut v = vec![0.0f32; self.dimension];
                    for word in text.to_lowercase().split_whitespace() {
                        let mut h = 0usize;
                        for b in word.bytes() {
                            h = h.wrapping_mul(31).wrapping_add(b as usize);
                        }
                        v[h % self.dimension] += 1.0;
                    }
                    v
                })
                .collect())
        }
    }

    struct ScriptedLlm {
        reply: String,
        fail: bool,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedLlm {
        fn replying(reply: &str) -> Arc<Self> {
            Arc::new(ScriptedLlm {
                reply: reply.to_string(),
                fail: false,
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(ScriptedLlm {
                reply: String::new(),
                fail: true,
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn prompt_count(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }

        fn last_prompt(&self) -> String {
            self.prompts.lock().unwrap().last().cloned().unwrap_or_default()
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedLlm {
        fn name(&self) -> &str {
            "Scripted"
        }

        async fn health_check(&self) -> Result<bool, ApiError> {
            Ok(true)
        }

        async fn complete(&self, prompt: &str) -> Result<String, ApiError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            if self.fail {
                Err(ApiError::provider(self.name(), "connection reset"))
            } else {
                Ok(self.reply.clone())
            }
        }
    }

    struct Harness {
        pipeline: RagPipeline,
        embedder: Arc<HashEmbedder>,
    }

    fn harness(llm: Arc<ScriptedLlm>) -> Harness {
        let embedder = Arc::new(HashEmbedder::new(128));
        let index = Arc::new(FlatIndex::in_memory(128, "hash-embedder"));
        let retriever = Arc::new(Retriever::new(embedder.clone(), index));
        let pipeline = RagPipeline::new(
            Chunker::new(512, 50).unwrap(),
            retriever,
            llm,
            None,
            5,
        );
        Harness { pipeline, embedder }
    }

    const RETURNS_DOC: &str = "Returns are accepted within 30 days of purchase with a valid receipt. Refunds go back to the original payment method.";

    #[tokio::test]
    async fn ingest_then_query_answers_with_citations() {
        let llm = ScriptedLlm::replying("You have 30 days to return items with a receipt.");
        let h = harness(llm.clone());

        let receipt = h.pipeline.ingest(RETURNS_DOC, "returns.txt").await.unwrap();
        assert_eq!(receipt.chunks_created, 1);
        assert_eq!(receipt.document_id, "doc_returns.txt_1");

        let response = h
            .pipeline
            .query("How many days do I have to return receipt purchase?", None, false, PromptTemplate::Balanced)
            .await
            .unwrap();

        assert_eq!(response.answer.outcome, AnswerOutcome::Answered);
        assert!(!response.retrieved.is_empty());
        assert_eq!(
            response.answer.citations,
            vec!["returns.txt (chunk: returns.txt_chunk_0)"]
        );
        assert!(response.answer.answer.contains("You have 30 days"));
        assert!(response.answer.answer.contains("\n\nSources:\n- returns.txt (chunk: returns.txt_chunk_0)"));
        assert!(response.answer.answer.contains(DISCLAIMER_MARKER));
        assert!(llm.last_prompt().contains("[Document 1: returns.txt]"));
    }

    #[tokio::test]
    async fn safety_gate_skips_retrieval_and_generation() {
        let llm = ScriptedLlm::replying("unused");
        let h = harness(llm.clone());
        h.pipeline.ingest(RETURNS_DOC, "returns.txt").await.unwrap();
        let embed_calls_after_ingest = h.embedder.calls.load(Ordering::SeqCst);

        let response = h
            .pipeline
            .query("should I sue Micro Center", None, false, PromptTemplate::Balanced)
            .await
            .unwrap();

        assert_eq!(response.answer.outcome, AnswerOutcome::SafetyRedirect);
        assert_eq!(response.answer.answer, REDIRECT_MESSAGE);
        assert!(response.answer.citations.is_empty());
        assert!(response.retrieved.is_empty());
        assert_eq!(llm.prompt_count(), 0);
        assert_eq!(h.embedder.calls.load(Ordering::SeqCst), embed_calls_after_ingest);
    }

    #[tokio::test]
    async fn provider_failure_returns_apology_not_error() {
        let llm = ScriptedLlm::failing();
        let h = harness(llm.clone());
        h.pipeline.ingest(RETURNS_DOC, "returns.txt").await.unwrap();

        let response = h
            .pipeline
            .query("What is the return receipt window?", None, false, PromptTemplate::Balanced)
            .await
            .unwrap();

        assert!(matches!(response.answer.outcome, AnswerOutcome::Degraded(_)));
        assert!(response
            .answer
            .answer
            .starts_with("I apologize, but I encountered an error generating a response:"));
        assert!(response.answer.answer.contains("Scripted API call failed"));
        assert!(response.answer.answer.ends_with("contact Micro Center customer service for assistance."));
        assert!(response.answer.citations.is_empty());
        assert!(!response.answer.answer.contains(DISCLAIMER_MARKER));
        assert!(!response.retrieved.is_empty());
    }

    #[tokio::test]
    async fn model_citing_a_source_suppresses_the_sources_block() {
        let llm =
            ScriptedLlm::replying("Per returns.txt (chunk: returns.txt_chunk_0), you have 30 days.");
        let h = harness(llm.clone());
        h.pipeline.ingest(RETURNS_DOC, "returns.txt").await.unwrap();

        let response = h
            .pipeline
            .query("return receipt days?", None, false, PromptTemplate::Balanced)
            .await
            .unwrap();

        assert!(!response.answer.answer.contains("\n\nSources:\n"));
        assert_eq!(
            response.answer.citations,
            vec!["returns.txt (chunk: returns.txt_chunk_0)"]
        );
    }

    #[tokio::test]
    async fn disclaimer_is_applied_exactly_once() {
        let already = format!("All set.{}", POLICY_DISCLAIMER);
        assert_eq!(apply_disclaimer(&already), already);

        let llm = ScriptedLlm::replying("Answer text.");
        let h = harness(llm.clone());
        h.pipeline.ingest(RETURNS_DOC, "returns.txt").await.unwrap();
        let response = h
            .pipeline
            .query("return receipt days?", None, false, PromptTemplate::Balanced)
            .await
            .unwrap();
        assert_eq!(
            response.answer.answer.matches(DISCLAIMER_MARKER).count(),
            1
        );
        assert_eq!(
            apply_disclaimer(&response.answer.answer),
            response.answer.answer
        );
    }

    #[tokio::test]
    async fn prefetched_web_results_reach_prompt_and_citations() {
        let llm = ScriptedLlm::replying("Store hours are on the site.");
        let h = harness(llm.clone());
        h.pipeline.ingest(RETURNS_DOC, "returns.txt").await.unwrap();

        let passages = h.pipeline.retrieve("return receipt days", 2).await.unwrap();
        let web = vec![SearchResult {
            title: "Hours".to_string(),
            url: "https://example.com/hours".to_string(),
            snippet: "Open 10-9".to_string(),
        }];
        let answer = h
            .pipeline
            .answer(
                "When are you open?",
                &passages,
                AnswerOptions {
                    web_results: Some(web.clone()),
                    ..AnswerOptions::default()
                },
            )
            .await;

        assert_eq!(answer.outcome, AnswerOutcome::Answered);
        assert!(llm.last_prompt().contains("[Web Search Results]"));
        assert!(llm.last_prompt().contains("[Web Result 1: Hours]"));
        assert!(answer.citations.contains(&"https://example.com/hours".to_string()));
        assert_eq!(answer.web_results.len(), 1);
    }

    #[tokio::test]
    async fn empty_index_query_uses_fallback_prompt() {
        let llm = ScriptedLlm::replying("Please contact customer service.");
        let h = harness(llm.clone());

        let response = h
            .pipeline
            .query("What about price matching?", None, false, PromptTemplate::Balanced)
            .await
            .unwrap();

        assert_eq!(response.answer.outcome, AnswerOutcome::Answered);
        assert!(response.retrieved.is_empty());
        assert!(response.answer.citations.is_empty());
        assert!(!llm.last_prompt().contains("Context from policy documents"));
        assert!(!response.answer.answer.contains("\n\nSources:"));
        assert!(response.answer.answer.contains(DISCLAIMER_MARKER));
    }
}
