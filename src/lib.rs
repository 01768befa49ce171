//! Detection-rule filter control with bus-synchronized selection state
//!
//! A connections view can be restricted to the traffic matched by a chosen
//! subset of detection rules. This crate implements the filter control that
//! owns that selection and keeps it consistent across three asynchronous
//! sources of truth:
//!
//! - the in-process [`bus::Bus`] shared with sibling filter controls,
//! - the page's shareable query state (the seed, read once at mount),
//! - the remotely-fetched rule [`registry`], which can change at runtime.
//!
//! The control broadcasts real selection changes, absorbs echoes and peer
//! updates through an order-independent set comparison, drops identifiers it
//! cannot resolve locally, and prunes its selection whenever a registry
//! refresh removes a rule.

pub mod bus;
pub mod filter;
pub mod registry;

pub use bus::{Bus, SubscriptionHandle, Topic};
pub use filter::{LoadPhase, RulesFilter, SelectionView};
pub use registry::{RegistryError, RegistryFetcher, RuleRecord, RuleRef};
