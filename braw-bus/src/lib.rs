pub mod context;
pub mod driver;
pub mod engine;
pub mod format;
pub mod metadata;
pub mod processor;
pub mod sink;
pub mod soft;

#[cfg(test)]
pub(crate) mod mock;

pub use context::SessionConfig;
pub use driver::{DecodeOptions, Session};
pub use format::{ResolutionScale, ResourceFormat};
pub use metadata::ClipInfo;
pub use sink::{DecodeReport, EmitOrder};
