//! partsync core - part model, diff engine and storage ports
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain** - `Part`, its remote path encoding, the diff engine
//!   (`difference`, `intersect`, `sort_parts`) and the coverage validator
//! - **Port definitions** - Traits for adapters: `IOriginFs`, `IRemoteFs`, `ISnapshotFs`
//! - **Configuration** - YAML configuration with validation and a builder
//!
//! # Architecture
//!
//! This crate follows the hexagonal (ports & adapters) architecture pattern.
//! The domain module contains pure logic with no I/O.
//! Ports define trait interfaces that adapter crates implement.
//! The orchestrators in `partsync-engine` drive the ports.

pub mod config;
pub mod domain;
pub mod ports;
