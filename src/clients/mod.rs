pub mod latex_client;
pub mod llm_client;
pub mod publisher_client;

pub use latex_client::{CompileGateway, HttpCompileGateway};
pub use llm_client::{FailureKind, LlmBackend, LlmCallError, LlmClient, LlmRequest, LlmResponse, OpenAiBackend};
pub use publisher_client::{DepositionHandle, Publisher, ZenodoPublisher};
