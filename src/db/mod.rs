mod digests;
mod jobs;
mod notifications;
mod repository;
mod schema;
mod summaries;
mod usage;

pub use digests::DigestContent;
pub use repository::Repository;
pub use summaries::{SummaryCompletion, TitledSummary};
