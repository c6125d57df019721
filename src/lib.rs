pub mod config;
pub mod error;
pub mod gemini;
pub mod models;
pub mod openai;
pub mod pipeline;
pub mod prompts;
pub mod providers;
pub mod routes;
pub mod storage;
pub mod store;
