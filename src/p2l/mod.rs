//! Physical-to-logical item index: "what occupies this byte range" (§3,
//! §4.1, §4.7, §6).

pub mod builder;
pub mod format;
pub mod reader;

pub use builder::P2lBuilder;
pub use format::P2lEntry;
pub use reader::P2lReader;
