pub mod canvas;
pub mod conversion;
pub mod model;

pub use canvas::*;
pub use conversion::*;
pub use model::*;
