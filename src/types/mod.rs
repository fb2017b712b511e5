//! Generic values and the materializer producing them.

pub mod materialize;
pub mod value;

pub use materialize::ResultMaterializer;
pub use value::{Row, Value};
