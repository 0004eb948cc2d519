pub mod create;

pub use create::{CreateCompendiumCommand, CreateCompendiumResponse};
