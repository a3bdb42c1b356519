//! Core of the Jerabot chat bot.
//!
//! This crate is framework-agnostic: the chat network lives behind the
//! [`messaging::port::Transport`] trait, implemented in adapter crates.

pub mod access;
pub mod bootstrap;
pub mod bot;
pub mod command;
pub mod commands;
pub mod config;
pub mod dispatcher;
pub mod domain;
pub mod errors;
pub mod logging;
pub mod messaging;
pub mod registry;
pub mod status;

#[cfg(test)]
mod testing;

pub use errors::{Error, Result};
