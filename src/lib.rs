// etl-anywhere - provision and run ET:Legacy servers in Docker

pub mod assets;
pub mod cli;
pub mod commands;
pub mod compose;
pub mod docker;
pub mod error;
pub mod launcher;
pub mod paths;
pub mod rcon;
pub mod render;
pub mod settings;
