//! Lifecycle coordination for multi-party rental-guarantee policies.
//!
//! Brokers open policies, landlord/tenant/guarantor actors complete their
//! information through portal links, staff validate documents, and the
//! lifecycle coordinator moves each policy through its status graph.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;
