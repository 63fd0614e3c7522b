mod model;

pub use model::{DocumentData, FieldValue};
