#![cfg_attr(not(test), forbid(unsafe_code))]

//! Shared models and configuration for the StoryKeep session client.

pub mod config;
pub mod models;
