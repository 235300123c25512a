pub mod driver;
pub mod dsl;
pub mod error;
pub mod llm;
pub mod parser;
pub mod report;
pub mod runner;
pub mod utils;

#[cfg(test)]
mod testing;

// Re-export common items
pub use error::{EnsureError, EnsureResult};
pub use report::{generate_report, RunReport};
pub use runner::run;
pub use utils::Config;
