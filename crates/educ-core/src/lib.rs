pub mod config;
pub mod error;
pub mod types;

pub use config::EducConfig;
pub use error::{EducError, EducResult};
pub use types::{Role, Session};
