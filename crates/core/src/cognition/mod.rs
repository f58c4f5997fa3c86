pub mod decision;
pub mod response;
pub mod sleep;

pub use decision::DecisionScorer;
pub use response::{LlmResponder, ResponseContext, ResponseGenerator};
pub use sleep::compute_sleep;
