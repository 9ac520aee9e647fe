pub mod answer;
pub mod config;
pub mod embeddings;
pub mod engine;
pub mod eval;
pub mod index;
pub mod llm;
pub mod ollama;

pub use engine::{QueryEngine, QueryRun, QueryTrace};
