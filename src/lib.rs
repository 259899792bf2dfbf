//! Version bookkeeping and release publication for multi-remote projects.
//!
//! The crate resolves a project's version through pluggable per-convention
//! parsers, keeps version files and git tags in step, packages deterministic
//! release archives, and publishes releases to GitHub, Gitee and self-hosted
//! Gitea in one fan-out pass.

pub mod config;
pub mod domain;
pub mod error;
pub mod git;
pub mod parser;
pub mod publish;
pub mod services;
pub mod ui;

pub use error::{Result, VermanError};
