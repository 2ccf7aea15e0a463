pub mod build_info;
pub mod commands;
pub mod config;
pub mod error;
pub mod facade;
pub mod mentions;
pub mod model;
pub mod output;
pub mod store;
pub mod validate;

pub use config::StoreConfig;
pub use error::{AgoraError, ErrorKind, Result};
pub use facade::Agora;
