pub mod config;
pub mod serve;
pub mod sync;
pub mod version;
