pub mod assay;
pub mod constants;
pub mod error;
pub mod types;
pub mod well;

pub use assay::AssayDefinition;
pub use error::{Error, Result};
pub use types::*;
pub use well::{PlateFormat, WellId, WellSelection};

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
