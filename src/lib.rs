pub mod api;
pub mod args;
pub mod checker;
pub mod client;
pub mod config;
pub mod datagen;
pub mod error;
pub mod logging;
pub mod scenario;
pub mod stats;
pub mod suites;
