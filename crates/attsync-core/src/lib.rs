//! attsync Core - Domain logic and business rules
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain entities** - `AttachmentRecord`, `Library`, `ConflictCase`, `UploadCheckCache`
//! - **Port definitions** - Traits for adapters: `IAttachmentStore`, `IVersionCache`,
//!   `ILocalFileSystem`, `IConflictPrompt`
//! - **Configuration** - YAML config with per-library storage resolution
//!
//! # Architecture
//!
//! This crate follows the hexagonal (ports & adapters) architecture pattern.
//! The domain module contains pure business logic with no I/O.
//! Ports define trait interfaces that adapter crates implement.

pub mod config;
pub mod domain;
pub mod ports;
