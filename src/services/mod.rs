pub mod client;
pub mod extractor;
pub mod llm_service;
pub mod prompt;
pub mod result_writer;
pub mod retry;
pub mod validator;

pub use client::{ChatMessage, ChatRole, Completion, ResearchClient};
pub use extractor::{Extraction, ResponseExtractor};
pub use llm_service::LlmService;
pub use prompt::{build_repair_prompt, format_item_input};
pub use result_writer::{ErrorEntry, JsonResultWriter, ResultSink};
pub use retry::{RetryCoordinator, RetryPolicy};
pub use validator::RecordValidator;
