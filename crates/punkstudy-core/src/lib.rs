pub mod config;
pub mod conversation;
pub mod error;
pub mod gateway;
pub mod retry;
pub mod state;
pub mod upload;

// Re-export main types for convenience
pub use config::Config;
pub use conversation::{ConversationStore, PendingQuery, ReplyOrdering};
pub use error::{TransportError, UploadError};
pub use gateway::{Backend, GatewayClient, GenerationResult, QueryResult, UploadResult};
pub use retry::{RetryPolicy, RetryingBackend};
pub use state::{Message, Sender};
pub use upload::{Notice, UploadFile, UploadStatus, UploadWidget};
