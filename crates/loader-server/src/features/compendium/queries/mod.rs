pub mod get;

pub use get::{GetCompendiumError, GetCompendiumQuery};
