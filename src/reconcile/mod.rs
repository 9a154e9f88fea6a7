pub mod duplicates;
pub mod lifecycle;
pub mod resolver;

pub use duplicates::{DuplicateDetector, DEFAULT_SIMILARITY_THRESHOLD};
pub use lifecycle::{LifecycleReport, OfferLifecycleManager, DEFAULT_RETENTION_DAYS};
pub use resolver::{MergeOutcome, SourcePriorityResolver, SuspiciousChange};
