pub mod rag_base_config;
pub mod retrieved_chunk;
