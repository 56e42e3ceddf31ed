pub mod router;

pub use router::{request_reprocess, HandleOutcome, ProcessingRouter};
