pub mod document;
pub mod exception;

pub use document::{DocType, DocumentStatus, ProcessorKind};
pub use exception::{ExceptionCategory, ExceptionPriority, ExceptionStatus};
