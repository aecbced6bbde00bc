//! CHX Common Library
//!
//! Shared ambient concerns for the CHX workspace:
//!
//! - **Error Handling**: the workspace-level error type
//! - **Logging**: tracing subscriber configuration and initialization
//! - **Time**: the one timestamp grammar used by the feed state document
//!   and changeset attributes alike
//!
//! # Example
//!
//! ```no_run
//! use chx_common::logging::{init_logging, LogConfig};
//!
//! fn main() -> chx_common::Result<()> {
//!     let config = LogConfig::from_env()?;
//!     init_logging(&config)?;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod logging;
pub mod time;

// Re-export commonly used types
pub use error::{ChxError, Result};
