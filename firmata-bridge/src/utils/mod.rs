pub mod helpers;
mod tracer;

pub use helpers::*;
pub(crate) use tracer::tracer;
pub use tracer::Tracer;
