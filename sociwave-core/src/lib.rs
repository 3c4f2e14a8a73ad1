pub mod error;
pub mod error_utils;
pub mod interfaces;
pub mod settings;
pub mod types;

pub use error::*;
pub use error_utils::*;
pub use interfaces::*;
pub use settings::*;
pub use types::*;
