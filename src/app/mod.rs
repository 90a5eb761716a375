pub mod backend;
pub mod errors;
pub mod factory;
pub mod local;

pub use backend::{AddOutcome, AppBackend, ScoredContact};
pub use errors::AppError;
pub use factory::{AppFactory, AppPaths};
pub use local::AppLocal;
