mod loader;
mod types;

pub use loader::load_from_path;
pub use types::{ClientConfig, Config, ServerInfo};
