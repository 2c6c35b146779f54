pub mod analysis;
pub mod api;
pub mod job;
pub mod place;
pub mod progress;
pub mod report;
pub mod scan;
