//! # Core Module
//!
//! Error taxonomy and configuration shared by every component.

pub mod config;
pub mod error;
