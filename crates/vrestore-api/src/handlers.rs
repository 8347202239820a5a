//! Request handlers.

pub mod health;
pub mod history;
pub mod predictions;
pub mod upload;

pub use health::*;
pub use history::*;
pub use predictions::*;
pub use upload::*;
