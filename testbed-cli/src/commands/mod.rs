// CLI command implementations

pub mod ci;
pub mod env;
pub mod firmware;
pub mod image;
