pub mod error;
pub mod geometry;
pub mod physics;
pub mod protocol;
pub mod race;
pub mod registry;
mod settings;
pub mod track;

pub use settings::GLOBAL_CONFIG;

pub type PlayerID = u32;
