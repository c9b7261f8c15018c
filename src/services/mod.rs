pub mod corpus;
pub mod generation_service;
pub mod outcome_log;

pub use corpus::ExampleCorpus;
pub use generation_service::{GenerationService, PaperGenerator};
pub use outcome_log::OutcomeLog;
