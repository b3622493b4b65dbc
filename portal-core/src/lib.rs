//! Captive-portal WiFi provisioning for headless devices.
//!
//! The crate brings up a configuration access point, serves a small portal
//! website, lets the user pick a network and enter credentials plus any extra
//! fields the host registers, and then drives the station connect attempt.
//! The radio itself, DNS capture, and credential persistence are capabilities
//! the host injects through the traits in [`traits`].

pub mod config;
pub mod controller;
pub mod fields;
pub mod pages;
pub mod radios;
pub mod scan;
pub mod traits;
pub mod web;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("radio error: {0}")]
    Radio(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("web server error: {0}")]
    WebServer(#[from] axum::BoxError),

    #[error("config file error: {0}")]
    ConfigFile(#[from] toml::de::Error),
}

/// A specialized `Result` type for this crate's operations.
pub type Result<T> = std::result::Result<T, Error>;
