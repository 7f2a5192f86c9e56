use std::collections::HashSet;

use crate::rag::index::ScoredPassage;
use crate::tools::search::{format_results_as_context, SearchResult};

pub const ORDER_SOURCE: &str = "order_database";

/// Formatted order-record block plus the reference id its citation uses.
#[derive(Debug, Clone)]
pub struct OrderContext {
    pub reference: String,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct CustomerHistory {
    pub reference: String,
    pub text: String,
}

/// Concatenates labeled context blocks for the prompt. Order-record context
/// leads, then customer history, then retrieved passages, then web results.
pub fn fuse(
    passages: &[ScoredPassage],
    order_context: Option<&OrderContext>,
    customer_history: Option<&CustomerHistory>,
    web_results: &[SearchResult],
) -> String {
    let mut blocks: Vec<(&str, &str)> = Vec::new();
    if let Some(order) = order_context {
        blocks.push((ORDER_SOURCE, order.text.as_str()));
    }
    if let Some(history) = customer_history {
        blocks.push((ORDER_SOURCE, history.text.as_str()));
    }
    for hit in passages {
        blocks.push((hit.passage.source.as_str(), hit.passage.text.as_str()));
    }

    let document_block = blocks
        .iter()
        .enumerate()
        .map(|(i, (source, text))| format!("[Document {}: {}]\n{}\n", i + 1, source, text))
        .collect::<Vec<_>>()
        .join("\n---\n");

    if web_results.is_empty() {
        return document_block;
    }
    let web_block = format_results_as_context(web_results);
    if document_block.is_empty() {
        web_block
    } else {
        format!(
            "{}\n\n---\n\n[Web Search Results]\n{}",
            document_block, web_block
        )
    }
}

/// One citation per unique source, first-seen order, `{source} (chunk: {id})`.
/// Web results cite their URLs and are not deduplicated against documents.
pub fn citations(
    passages: &[ScoredPassage],
    order_context: Option<&OrderContext>,
    customer_history: Option<&CustomerHistory>,
    web_results: &[SearchResult],
) -> Vec<String> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut out = Vec::new();

    if let Some(order) = order_context {
        if seen.insert(ORDER_SOURCE) {
            out.push(format!("{} (chunk: {})", ORDER_SOURCE, order.reference));
        }
    }
    if let Some(history) = customer_history {
        if seen.insert(ORDER_SOURCE) {
            out.push(format!("{} (chunk: {})", ORDER_SOURCE, history.reference));
        }
    }
    for hit in passages {
        if seen.insert(hit.passage.source.as_str()) {
            out.push(format!(
                "{} (chunk: {})",
                hit.passage.source, hit.passage.id
            ));
        }
    }
    for result in web_results {
        out.push(result.url.clone());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::chunker::Passage;

    fn hit(id: &str, source: &str, text: &str) -> ScoredPassage {
        ScoredPassage {
            passage: Passage {
                id: id.to_string(),
                text: text.to_string(),
                source: source.to_string(),
                chunk_index: 0,
            },
            score: 0.9,
        }
    }

    fn web(title: &str, url: &str) -> SearchResult {
        SearchResult {
            title: title.to_string(),
            url: url.to_string(),
            snippet: format!("snippet for {}", title),
        }
    }

    #[test]
    fn fuse_numbers_blocks_and_puts_order_first() {
        let order = OrderContext {
            reference: "order_MC1001".to_string(),
            text: "Order Information:\n- Order ID: MC1001\n".to_string(),
        };
        let passages = vec![
            hit("returns.txt_chunk_0", "returns.txt", "Returns accepted within 30 days."),
            hit("shipping.txt_chunk_2", "shipping.txt", "Free shipping over $25."),
        ];
        let fused = fuse(&passages, Some(&order), None, &[]);

        assert!(fused.starts_with("[Document 1: order_database]\nOrder Information:"));
        assert!(fused.contains("\n---\n[Document 2: returns.txt]\nReturns accepted within 30 days.\n"));
        assert!(fused.contains("\n---\n[Document 3: shipping.txt]\n"));
        assert!(!fused.contains("[Web Search Results]"));
    }

    #[test]
    fn fuse_appends_web_section_after_documents() {
        let passages = vec![hit("a_chunk_0", "a.txt", "policy text")];
        let results = vec![web("Store hours", "https://example.com/hours")];
        let fused = fuse(&passages, None, None, &results);

        assert!(fused.contains("\n\n---\n\n[Web Search Results]\n[Web Result 1: Store hours]"));
    }

    #[test]
    fn fuse_with_only_web_results_is_the_web_block() {
        let results = vec![web("Store hours", "https://example.com/hours")];
        let fused = fuse(&[], None, None, &results);
        assert!(fused.starts_with("[Web Result 1: Store hours]"));
        assert_eq!(fuse(&[], None, None, &[]), "");
    }

    #[test]
    fn citations_dedup_sources_first_seen() {
        let passages = vec![
            hit("returns.txt_chunk_0", "returns.txt", "a"),
            hit("shipping.txt_chunk_1", "shipping.txt", "b"),
            hit("returns.txt_chunk_3", "returns.txt", "c"),
        ];
        let cites = citations(&passages, None, None, &[]);
        assert_eq!(
            cites,
            vec![
                "returns.txt (chunk: returns.txt_chunk_0)",
                "shipping.txt (chunk: shipping.txt_chunk_1)",
            ]
        );
    }

    #[test]
    fn order_context_and_history_share_one_citation() {
        let order = OrderContext {
            reference: "order_MC1001".to_string(),
            text: "order block".to_string(),
        };
        let history = CustomerHistory {
            reference: "customer_history_CUST9".to_string(),
            text: "history block".to_string(),
        };
        let cites = citations(&[], Some(&order), Some(&history), &[]);
        assert_eq!(cites, vec!["order_database (chunk: order_MC1001)"]);
    }

    #[test]
    fn web_urls_follow_document_citations() {
        let passages = vec![hit("a_chunk_0", "a.txt", "text")];
        let results = vec![web("hours", "https://example.com/hours")];
        let cites = citations(&passages, None, None, &results);
        assert_eq!(
            cites,
            vec!["a.txt (chunk: a_chunk_0)", "https://example.com/hours"]
        );
    }
}
