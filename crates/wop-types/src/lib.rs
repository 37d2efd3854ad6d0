pub mod errors;
pub mod config;
pub mod history;
pub mod status;

pub use errors::*;
pub use config::*;
pub use history::*;
pub use status::*;
