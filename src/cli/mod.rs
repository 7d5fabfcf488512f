//! CLI module for the audit RAG gateway

pub mod serve;

use clap::{Parser, Subcommand};

/// Audit RAG Gateway - retrieval-augmented QA over audit documents
#[derive(Parser)]
#[command(name = "audit-rag-gateway")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the HTTP server
    Serve,
}
