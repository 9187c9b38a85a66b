pub mod allocator;
pub mod config;
pub mod profile;
pub mod volume;
