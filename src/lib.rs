pub mod app;
pub mod config;
pub mod identity;
pub mod lifecycle;
pub mod notify;
pub mod registry;
pub mod shared;
pub mod status;
pub mod steps;
pub mod store;
