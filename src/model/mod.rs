pub mod descriptor;
pub mod groups;
pub mod loader;
pub mod tags;
pub mod types;

pub use descriptor::*;
pub use loader::*;
pub use tags::TagSet;
pub use types::*;
