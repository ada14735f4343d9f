// HTTP surface: routes, handlers and response plumbing

pub mod error;
pub mod handlers;
pub mod router;
pub mod state;
pub mod streamer;

pub use error::ApiError;
pub use router::create_router;
pub use state::AppState;
pub use streamer::{CommitState, FailureDisposition, ResponseStreamer};
