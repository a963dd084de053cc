//! AGCS - Autonomous Ground Control Station
//!
//! Fuses heterogeneous UAV/Remote-ID/operator telemetry into a single fleet
//! picture, emits periodic LLM-backed situation reports, and supports
//! forensic recording and time-scaled replay of recorded sessions.

pub mod asset;
pub mod auditor;
pub mod bridge;
pub mod clock;
pub mod commands;
pub mod config;
pub mod decoders;
pub mod error;
pub mod fleet;
pub mod geo;
pub mod ingest;
pub mod persona;
pub mod recorder;
pub mod replay;
pub mod sitrep;
