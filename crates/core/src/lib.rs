//! Hardware Market Core - Shared domain library.
//!
//! This crate provides the logic shared by every marketplace component:
//! - `client` - Backend data access and client-side stores
//! - `payments` - The `manage-payment-methods` function
//! - `cli` - Command-line front end
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no HTTP
//! clients, no clocks. Everything here is deterministic and unit tested in
//! place.
//!
//! # Modules
//!
//! - [`types`] - Newtype IDs, money helpers, and status enums
//! - [`models`] - Records mirrored from backend tables
//! - [`clabe`] - CLABE checksum and bank lookup
//! - [`order`] - Order totals (subtotal, shipping, service fee)
//! - [`normalize`] - Canonical JSON for cache keys and dirty checks
//! - [`validation`] - Synchronous form validation

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod clabe;
pub mod models;
pub mod normalize;
pub mod order;
pub mod types;
pub mod validation;

pub use clabe::{Clabe, ClabeError, ClabeValidation, validate_clabe};
pub use models::*;
pub use normalize::{canonical_key, normalize};
pub use order::{OrderItem, OrderTotals, ServiceFee, ShippingCosts, calculate_order};
pub use types::*;
pub use validation::ValidationError;
