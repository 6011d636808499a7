pub mod probe;

pub use probe::SizeProbe;
