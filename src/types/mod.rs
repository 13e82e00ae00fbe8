// Public modules
pub mod chat_request;
pub mod role;
pub mod stream_record;
pub mod turn;

// Re-exports
pub use chat_request::{
    ChatRequest, DEFAULT_NUM_CTX, DEFAULT_TEMPERATURE, DEFAULT_TOP_P, GenerationOptions,
};
pub use role::Role;
pub use stream_record::{Delta, StreamRecord};
pub use turn::Turn;
