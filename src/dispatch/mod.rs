pub mod arbiter;
pub mod engine;
