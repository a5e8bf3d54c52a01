pub mod access_policy;
pub mod attempt_service;
pub mod clock;
pub mod scoring;
pub mod shuffle;

pub use access_policy::{AccessPolicy, GuestAwarePolicy};
pub use attempt_service::{AttemptMetadata, AttemptService};
pub use clock::{Clock, SeedSource, SystemClock, ThreadRngSeedSource};
