pub mod archive;
pub mod cleanup;
pub mod commands;
pub mod config;
pub mod download;
pub mod http;
pub mod index;
pub mod manager;
pub mod package;
pub mod runtime;
