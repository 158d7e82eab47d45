//! Retention monitor library exports

pub mod config;
pub mod controller;
pub mod cooldown;
pub mod error;
pub mod models;
pub mod policy;
pub mod probe;
pub mod sink;
pub mod store;
pub mod supervisor;

pub use error::{Error, Result};
