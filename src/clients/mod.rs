pub mod chat_client;
pub mod image_probe;

pub use chat_client::{CallFailure, ChatClient, ChatReply, ChatRequest};
pub use image_probe::{ImageProbe, ProbeOutcome};
