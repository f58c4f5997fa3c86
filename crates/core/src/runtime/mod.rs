mod agent;
mod callbacks;
mod scheduler;

pub use agent::Agent;
pub use callbacks::{CallbackId, CallbackRegistry, Observer};
