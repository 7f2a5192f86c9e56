pub mod core;
pub mod embedding;
pub mod eval;
pub mod llm;
pub mod orders;
pub mod rag;
pub mod server;
pub mod state;
pub mod tools;
