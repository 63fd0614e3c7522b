pub mod artifact;
pub mod output;

pub use artifact::*;
pub use output::*;
