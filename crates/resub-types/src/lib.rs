//! Foundation types for the reputation substrate.
//!
//! Every other `resub` crate depends on this one. Nothing in here reads the
//! wall clock or an ambient random source: logical time and nonces are
//! injected through the [`Clock`] and [`NonceSource`] traits so that the
//! kernel can be replayed deterministically.
//!
//! # Key Types
//!
//! - [`Did`]: decentralized identifier derived from a public key
//! - [`Pulse`]: logical time, a caller-controlled monotonic counter
//! - [`Clock`]: source of logical time ([`ManualClock`], [`TickingClock`])
//! - [`NonceSource`]: single-use tokens ([`SequenceNonce`], [`RandomNonce`], [`ScriptedNonce`])

pub mod error;
pub mod identity;
pub mod nonce;
pub mod temporal;

pub use error::TypeError;
pub use identity::Did;
pub use nonce::{NonceSource, RandomNonce, ScriptedNonce, SequenceNonce};
pub use temporal::{Clock, ManualClock, Pulse, TickingClock};
