//! # dicefleet-domain
//!
//! Pure domain model for the dicefleet die manager.
//!
//! ## Responsibilities
//! - Foundational types: the [`DeviceId`](id::DeviceId) read from advertisements
//! - Describe dice (**descriptions**, **roll** and **battery** events, connection
//!   status and filters)
//! - Describe outgoing **commands** (blink)
//! - The **wire codec**: decoding advertisements and notifications, encoding
//!   command frames
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or external IO crates.
//! All IO boundaries are expressed as traits in the `app` crate (ports).

pub mod error;
pub mod id;

pub mod codec;
pub mod command;
pub mod die;
