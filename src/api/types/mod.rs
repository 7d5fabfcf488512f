//! API request/response types

pub mod chat;
pub mod documents;
pub mod error;

pub use chat::{
    AskRequest, ChatCompletionRequest, ChatMessage, SearchRequest, SearchResultEntry,
    SearchWithIntentResponse,
};
pub use documents::{DocumentChunksResponse, DocumentListQuery, UploadResponse};
pub use error::{ApiError, ApiErrorResponse};
