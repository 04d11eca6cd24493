pub mod manager;
pub mod model;

pub use manager::{InstanceStore, JsonInstanceStore};
pub use model::{Instance, Resolution};
