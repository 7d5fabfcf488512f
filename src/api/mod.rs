//! API layer - HTTP endpoints

pub mod chat;
pub mod documents;
pub mod graph;
pub mod router;
pub mod state;
pub mod system;
pub mod types;

pub use router::create_router;
pub use state::AppState;
