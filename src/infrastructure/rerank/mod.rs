//! Rerank provider implementations

mod dashscope;

pub use dashscope::{DashScopeRerank, DashScopeRerankSettings};
