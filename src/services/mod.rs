pub mod analysis;
pub mod cache;
pub mod dispatcher;
pub mod intake;
pub mod places;
pub mod processor;
pub mod progress;
pub mod queue;
pub mod rate_limit;
pub mod synthesizer;
pub mod worker_pool;
