pub mod bootstrap;
pub mod comm;
pub mod config;
pub mod graph;
pub mod init;
pub mod pattern;
pub mod registry;
pub mod simulation;
pub mod topology;
pub mod transport;
pub mod utils;
