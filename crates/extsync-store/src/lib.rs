pub mod descriptor;
pub mod extract;
pub mod manifest;
pub mod processor;
pub mod reconcile;

pub use manifest::{ExtensionRecord, FileFormat, Manifest};
pub use processor::{Processor, MANIFEST_FILE};
pub use reconcile::{ProcessingStats, Transition};
