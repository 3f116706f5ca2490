mod machine;
mod registry;

pub use machine::{normalize, Router};
pub use registry::FieldRegistry;
