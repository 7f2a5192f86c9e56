//! Support agent: extracts order ids from free-text questions, folds the
//! matching records into the pipeline's context, and shapes the response.

use std::sync::Arc;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;
use tracing::debug;

use super::{OrderRecord, OrderStore};
use crate::core::errors::ApiError;
use crate::llm::PromptTemplate;
use crate::rag::context::{CustomerHistory, OrderContext};
use crate::rag::index::ScoredPassage;
use crate::rag::pipeline::{AnswerOptions, RagPipeline};

const AGENT_TOP_K: usize = 5;
const MAX_HISTORY_ORDERS: usize = 5;
const PREVIEW_CHARS: usize = 200;

/// Captures that pass the shape check but are ordinary words.
const ORDER_ID_STOPWORDS: [&str; 4] = ["ID", "IS", "THE", "MY"];

struct OrderIdPatterns {
    /// Letter-prefixed ids like ORD004, anywhere in the text.
    direct: Regex,
    /// Phrasings that announce an id, most specific first.
    fallbacks: Vec<Regex>,
    /// The whole query is nothing but an id.
    bare: Regex,
}

fn order_id_patterns() -> &'static OrderIdPatterns {
    static PATTERNS: OnceLock<OrderIdPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| OrderIdPatterns {
        direct: Regex::new(r"(?i)\b([A-Z]{3,4}\d{3,6})\b")
            .expect("order id pattern should compile"),
        fallbacks: [
            r"(?i)order\s+id\s+is\s+([A-Z0-9]{3,20})",
            r"(?i)order\s+id[:\s]+([A-Z0-9]{3,20})",
            r"(?i)order\s*#?\s*([A-Z0-9]{3,20})",
            r"(?i)order\s+([A-Z0-9]{3,20})",
            r"(?i)#([A-Z0-9]{3,20})",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("order id pattern should compile"))
        .collect(),
        bare: Regex::new(r"(?i)^[A-Z0-9]{5,20}$").expect("order id pattern should compile"),
    })
}

/// Pulls an order id out of a customer question, normalized to uppercase.
pub fn extract_order_id(query: &str) -> Option<String> {
    let patterns = order_id_patterns();

    if let Some(caps) = patterns.direct.captures(query) {
        return Some(caps[1].trim().to_uppercase());
    }

    for pattern in &patterns.fallbacks {
        if let Some(caps) = pattern.captures(query) {
            let candidate = caps[1].trim().to_uppercase();
            if candidate.len() >= 3 && !ORDER_ID_STOPWORDS.contains(&candidate.as_str()) {
                return Some(candidate);
            }
        }
    }

    let trimmed = query.trim();
    if patterns.bare.is_match(trimmed) {
        return Some(trimmed.to_uppercase());
    }

    None
}

#[derive(Debug, Serialize)]
pub struct ChunkPreview {
    pub chunk_id: String,
    pub text: String,
    pub source: String,
    pub score: f32,
}

#[derive(Debug, Serialize)]
pub struct AgentResponse {
    pub answer: String,
    pub citations: Vec<String>,
    pub order_found: bool,
    pub order_info: Option<OrderRecord>,
    pub retrieved_chunks: Vec<ChunkPreview>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_orders: Option<Vec<OrderRecord>>,
}

#[derive(Debug, Serialize)]
pub struct OrderInfo {
    pub order: OrderRecord,
    pub formatted_context: String,
}

#[derive(Debug, Serialize)]
pub struct StatusUpdate {
    pub message: String,
    pub order: OrderRecord,
}

#[derive(Clone)]
pub struct SupportAgent {
    orders: Arc<dyn OrderStore>,
    pipeline: Arc<RagPipeline>,
}

impl SupportAgent {
    pub fn new(orders: Arc<dyn OrderStore>, pipeline: Arc<RagPipeline>) -> Self {
        SupportAgent { orders, pipeline }
    }

    /// Answers a customer question with order context when an id is present
    /// and order history when a customer id is supplied.
    pub async fn handle_query(
        &self,
        query: &str,
        customer_id: Option<&str>,
        template: PromptTemplate,
    ) -> Result<AgentResponse, ApiError> {
        let order_id = extract_order_id(query);
        let mut order_record = None;
        let order_context = match &order_id {
            Some(id) => {
                debug!("looking up order id {}", id);
                let record = self.orders.get_by_id(id).await?;
                let text = match &record {
                    Some(rec) => rec.format_context(),
                    None => format!(
                        "Note: Order ID {} was mentioned but not found in the system.",
                        id
                    ),
                };
                order_record = record;
                Some(OrderContext {
                    reference: format!("order_{}", id),
                    text,
                })
            }
            None => None,
        };

        let customer_orders = match customer_id {
            Some(id) => self.orders.get_by_customer(id).await?,
            None => Vec::new(),
        };
        let customer_history = match customer_id {
            Some(id) if !customer_orders.is_empty() => Some(CustomerHistory {
                reference: format!("customer_history_{}", id),
                text: history_text(&customer_orders),
            }),
            _ => None,
        };

        let retrieved = self.pipeline.retrieve(query, AGENT_TOP_K).await?;
        let generated = self
            .pipeline
            .answer(
                query,
                &retrieved,
                AnswerOptions {
                    template,
                    order_context,
                    customer_history,
                    ..AnswerOptions::default()
                },
            )
            .await;

        let order_found = order_record.is_some();
        Ok(AgentResponse {
            answer: generated.answer,
            citations: generated.citations,
            order_found,
            order_info: order_record,
            retrieved_chunks: retrieved.iter().map(preview).collect(),
            customer_orders: (!customer_orders.is_empty()).then(|| {
                customer_orders
                    .into_iter()
                    .take(MAX_HISTORY_ORDERS)
                    .collect()
            }),
        })
    }

    pub async fn order_info(&self, order_id: &str) -> Result<Option<OrderInfo>, ApiError> {
        Ok(self.orders.get_by_id(order_id).await?.map(|order| OrderInfo {
            formatted_context: order.format_context(),
            order,
        }))
    }

    pub async fn update_order_status(
        &self,
        order_id: &str,
        status: &str,
    ) -> Result<Option<StatusUpdate>, ApiError> {
        if !self.orders.update_status(order_id, status).await? {
            return Ok(None);
        }
        Ok(self.orders.get_by_id(order_id).await?.map(|order| StatusUpdate {
            message: format!("Order {} status updated to {}", order.order_id, status),
            order,
        }))
    }
}

fn history_text(orders: &[OrderRecord]) -> String {
    let mut text = format!("Customer Order History ({} orders):\n", orders.len());
    for (i, order) in orders.iter().take(MAX_HISTORY_ORDERS).enumerate() {
        text.push_str(&format!(
            "{}. Order {} - {} - Status: {}\n",
            i + 1,
            order.order_id,
            order.product_name,
            order.status
        ));
    }
    text
}

fn preview(hit: &ScoredPassage) -> ChunkPreview {
    let text = &hit.passage.text;
    let mut end = text.len().min(PREVIEW_CHARS);
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    ChunkPreview {
        chunk_id: hit.passage.id.clone(),
        text: format!("{}...", &text[..end]),
        source: hit.passage.source.clone(),
        score: hit.score,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::EmbeddingProvider;
    use crate::llm::LlmProvider;
    use crate::orders::sample_order;
    use crate::orders::sqlite::SqliteOrderStore;
    use crate::rag::chunker::Chunker;
    use crate::rag::index::FlatIndex;
    use crate::rag::retriever::Retriever;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[test]
    fn extracts_order_ids_from_common_phrasings() {
        let cases = [
            ("What's the status of ORD123?", Some("ORD123")),
            ("my order id is ord004", Some("ORD004")),
            ("order #98765432", Some("98765432")),
            ("where is order 12345", Some("12345")),
            ("ORD12345", Some("ORD12345")),
            ("1234567", Some("1234567")),
            ("Where is my package?", None),
            ("What is the return policy?", None),
        ];
        for (query, expected) in cases {
            assert_eq!(
                extract_order_id(query).as_deref(),
                expected,
                "query: {}",
                query
            );
        }
    }

    struct StubEmbedder;

    #[async_trait]
    impl EmbeddingProvider for StubEmbedder {
        fn model_name(&self) -> &str {
            "stub"
        }

        fn dimension(&self) -> usize {
            4
        }

        async fn health_check(&self) -> Result<bool, ApiError> {
            Ok(true)
        }

        async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
            Ok(inputs.iter().map(|_| vec![1.0, 0.0, 0.0, 0.0]).collect())
        }
    }

    struct RecordingLlm {
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl LlmProvider for RecordingLlm {
        fn name(&self) -> &str {
            "Recording"
        }

        async fn health_check(&self) -> Result<bool, ApiError> {
            Ok(true)
        }

        async fn complete(&self, prompt: &str) -> Result<String, ApiError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok("Here is what I found.".to_string())
        }
    }

    struct AgentHarness {
        agent: SupportAgent,
        store: Arc<SqliteOrderStore>,
        llm: Arc<RecordingLlm>,
    }

    impl AgentHarness {
        fn last_prompt(&self) -> String {
            self.llm.prompts.lock().unwrap().last().cloned().unwrap_or_default()
        }
    }

    async fn harness() -> AgentHarness {
        let tmp = std::env::temp_dir().join(format!(
            "policydesk-agent-test-{}.db",
            uuid::Uuid::new_v4()
        ));
        let store = Arc::new(SqliteOrderStore::with_path(tmp).await.unwrap());
        let retriever = Arc::new(Retriever::new(
            Arc::new(StubEmbedder),
            Arc::new(FlatIndex::in_memory(4, "stub")),
        ));
        let llm = Arc::new(RecordingLlm {
            prompts: Mutex::new(Vec::new()),
        });
        let pipeline = Arc::new(RagPipeline::new(
            Chunker::new(512, 50).unwrap(),
            retriever,
            llm.clone(),
            None,
            5,
        ));
        AgentHarness {
            agent: SupportAgent::new(store.clone(), pipeline),
            store,
            llm,
        }
    }

    #[tokio::test]
    async fn found_order_enters_context_and_citations() {
        let h = harness().await;
        h.store.insert(&sample_order("ORD777", "CUST1")).await.unwrap();

        let response = h
            .agent
            .handle_query(
                "What is the status of order ORD777?",
                None,
                PromptTemplate::Balanced,
            )
            .await
            .unwrap();

        assert!(response.order_found);
        assert_eq!(response.order_info.as_ref().unwrap().order_id, "ORD777");
        assert!(h.last_prompt().contains("Order Information:"));
        assert!(h.last_prompt().contains("- Order ID: ORD777"));
        assert!(response
            .citations
            .contains(&"order_database (chunk: order_ORD777)".to_string()));
        assert!(response.retrieved_chunks.is_empty());
        assert!(response.customer_orders.is_none());
    }

    #[tokio::test]
    async fn unknown_order_id_is_noted_in_context() {
        let h = harness().await;

        let response = h
            .agent
            .handle_query("where is order ORD999", None, PromptTemplate::Balanced)
            .await
            .unwrap();

        assert!(!response.order_found);
        assert!(response.order_info.is_none());
        assert!(h
            .last_prompt()
            .contains("Note: Order ID ORD999 was mentioned but not found in the system."));
    }

    #[tokio::test]
    async fn customer_id_pulls_order_history() {
        let h = harness().await;
        h.store.insert(&sample_order("ORD001", "CUST1")).await.unwrap();
        h.store.insert(&sample_order("ORD002", "CUST1")).await.unwrap();

        let response = h
            .agent
            .handle_query(
                "What is the return policy?",
                Some("CUST1"),
                PromptTemplate::Balanced,
            )
            .await
            .unwrap();

        assert_eq!(response.customer_orders.as_ref().unwrap().len(), 2);
        assert!(h.last_prompt().contains("Customer Order History (2 orders):"));
        assert!(h
            .last_prompt()
            .contains("1. Order ORD001 - GeForce RTX 4070 Graphics Card - Status: shipped"));
        assert!(response
            .citations
            .contains(&"order_database (chunk: customer_history_CUST1)".to_string()));
    }

    #[tokio::test]
    async fn status_update_round_trips() {
        let h = harness().await;
        h.store.insert(&sample_order("ORD005", "CUST9")).await.unwrap();

        let update = h
            .agent
            .update_order_status("ord005", "delivered")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(update.message, "Order ORD005 status updated to delivered");
        assert_eq!(update.order.status, "delivered");

        assert!(h
            .agent
            .update_order_status("ORD404", "delivered")
            .await
            .unwrap()
            .is_none());
        assert!(h.agent.order_info("ORD404").await.unwrap().is_none());
    }
}
