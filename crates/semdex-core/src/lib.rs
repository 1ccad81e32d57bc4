//! Semdex Core Components
//!
//! This crate provides shared configuration for the Semdex engine.

mod config;

pub use config::EngineConfig;
