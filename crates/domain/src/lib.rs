//! # hearth-domain
//!
//! Pure domain model for the hearth home automation hub.
//!
//! ## Responsibilities
//! - Foundational types: typed identifiers, error conventions, timestamps
//! - Define **Homes** (the container a hub instance owns)
//! - Define **Devices** (physical units speaking one protocol) and the
//!   descriptors drivers produce for them
//! - Define **Entities** (addressable capabilities on a device) with their
//!   kind and capability descriptors
//! - Define **state maps**, **telemetry points**, and **credentials**
//! - Define **commands** (normalized requests routed to drivers) and
//!   **bus events** (what flows over the in-process event bus)
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or external IO crates.
//! All IO boundaries are expressed as traits in the `app` crate (ports).

pub mod command;
pub mod credential;
pub mod device;
pub mod entity;
pub mod error;
pub mod event;
pub mod home;
pub mod id;
pub mod state;
pub mod telemetry;
pub mod time;
