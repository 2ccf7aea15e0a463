pub mod cache;
pub mod files;
pub mod lock;
pub mod messages;
pub mod paths;
pub mod presence;
pub mod query;
pub mod rooms;
