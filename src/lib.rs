//! Scramble - golf tournament registration server
//!
//! The interesting part of this crate is the payment admission and
//! reconciliation core: capacity-gated admission, checkout session
//! correlation, idempotent payment confirmation fed by two unordered
//! channels (client confirm call + gateway webhook), and refunds as
//! compensating transactions.

pub mod admission;
pub mod capacity;
pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod gateway;
pub mod handlers;
pub mod models;
pub mod notify;
pub mod reconcile;
pub mod refund;
