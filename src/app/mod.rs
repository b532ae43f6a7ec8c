pub mod errors;
pub mod local;

pub use errors::AppError;
pub use local::{AppLocal, SearchMode, SearchOutcome};
