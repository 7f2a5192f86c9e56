/// How tightly the answer must stick to retrieved context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PromptTemplate {
    Strict,
    #[default]
    Balanced,
    Permissive,
}

impl PromptTemplate {
    /// Unknown names fall back to `Balanced`.
    pub fn parse(name: &str) -> PromptTemplate {
        match name.to_lowercase().as_str() {
            "strict" => PromptTemplate::Strict,
            "permissive" => PromptTemplate::Permissive,
            _ => PromptTemplate::Balanced,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PromptTemplate::Strict => "strict",
            PromptTemplate::Balanced => "balanced",
            PromptTemplate::Permissive => "permissive",
        }
    }
}

pub fn build_prompt(question: &str, context: &str, template: PromptTemplate) -> String {
    if context.trim().is_empty() {
        return format!(
            "You are a helpful customer service assistant for Micro Center. Answer the user's question about Micro Center's policies.\n\nQuestion: {}\n\nNote: If you don't have enough information to answer, suggest contacting Micro Center customer service for assistance.\n\nAnswer:",
            question
        );
    }

    let (stance, instructions) = match template {
        PromptTemplate::Strict => (
            "Answer the user's question using ONLY the provided context from Micro Center's policy documents. If the context does not fully answer the question, say so and decline to guess.",
            "1. Answer strictly from the provided context; never draw on outside knowledge\n2. If the context does not contain the answer, reply that the policy documents do not cover it and suggest contacting customer service\n3. Cite the context for every claim (e.g., [Source: document_name])\n4. Be concise, accurate, and customer-friendly\n5. Do not speculate about policies, prices, or dates that are not in the context",
        ),
        PromptTemplate::Balanced => (
            "Answer the user's question using ONLY the provided context from Micro Center's policy documents. Do not use any external knowledge.",
            "1. Answer the question based ONLY on the provided context from Micro Center's policies\n2. If the context doesn't contain enough information, say so clearly and suggest contacting customer service\n3. Include citations in your answer (e.g., [Source: document_name])\n4. Be concise, accurate, and customer-friendly\n5. Focus on policies related to returns, exchanges, warranties, shipping, refunds, and store information\n6. If asked about something not covered in the policies, politely direct them to contact Micro Center customer service",
        ),
        PromptTemplate::Permissive => (
            "Prefer the provided context from Micro Center's policy documents, but you may supplement with general retail knowledge when the context is incomplete.",
            "1. Ground your answer in the provided context wherever it applies\n2. Clearly label anything that does not come from the context as general information\n3. Include citations for context-based statements (e.g., [Source: document_name])\n4. Be concise, accurate, and customer-friendly\n5. Suggest contacting Micro Center customer service for account- or order-specific questions",
        ),
    };

    format!(
        "You are a helpful customer service assistant for Micro Center, an electronics and computer retailer. {}\n\nContext from policy documents:\n{}\n\nQuestion: {}\n\nInstructions:\n{}\n\nAnswer:",
        stance, context, question, instructions
    )
}
