pub mod config;
pub mod discovery;
pub mod html;

pub use config::{Config, InteractionPolicy};
