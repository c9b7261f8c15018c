pub mod critique;
pub mod draft;
pub mod outcome;
pub mod topics;

pub use critique::{CriterionScore, CritiqueReport, CONVERGENCE_THRESHOLD, REVISION_FLAG_THRESHOLD};
pub use draft::{Language, PaperDraft, PaperMetadata};
pub use outcome::{OutcomeStatus, PublishReceipt, RunOutcome};
pub use topics::{pick_random_topic, TopicSeed};
