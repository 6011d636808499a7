pub mod catalog;
pub mod command;

pub use catalog::{BackendCatalog, ExecutableLookup, PathLookup};
pub use command::EffectiveCommand;
