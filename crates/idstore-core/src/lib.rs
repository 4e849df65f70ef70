//! # idstore-core
//!
//! Core types for the idstore identity storage providers.
//!
//! This crate defines the identity records persisted by the storage
//! backends (users, roles, claims, external logins), identifier
//! generation and validation, and the lookup-key folding rules shared
//! by every backend. It contains no I/O.
//!
//! ## Overview
//!
//! - [`User`] / [`Role`] / [`Claim`] / [`Login`] — plain-data records
//!   exchanged with the host membership framework. The host owns all
//!   higher-level policy (password hashing, lockout thresholds, token
//!   generation); these records only carry the persisted state.
//! - [`IdCodec`] — the conversion policy between externally supplied
//!   identifier strings and the canonical form the stores persist.
//! - [`normalize`] — case folding and prefix derivation for
//!   case-insensitive name/email lookup.

pub mod id;
pub mod model;
pub mod normalize;

pub use id::{IdCodec, IdError, generate_id, new_concurrency_stamp};
pub use model::{Claim, Login, Role, User};
