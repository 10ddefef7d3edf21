//! Core types for the section wizard credit ledger.
//!
//! This crate provides the plain domain types shared by the store, the
//! service and the client:
//!
//! - **Identifiers**: `AccountId`, `ExternalId`, `RecordId`
//! - **Accounts**: `Account`, `IdentityProfile`, `ProfileUpdate`
//! - **Credits**: `CreditBalance`, `Consumption`, `ConsumptionRecord`
//! - **Errors**: `LedgerError`
//!
//! # Credits
//!
//! One credit pays for one generated storefront section. Every account owns
//! exactly one balance `(current, max)`; it is provisioned lazily with
//! [`DEFAULT_GRANT`] credits, decremented by consumption, and restored to
//! `max` by the scheduled reset.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod account;
pub mod credits;
pub mod error;
pub mod ids;

pub use account::{Account, IdentityProfile, ProfileError, ProfileUpdate};
pub use credits::{Consumption, ConsumptionRecord, CreditBalance, DEFAULT_GRANT};
pub use error::{LedgerError, Result};
pub use ids::{AccountId, ExternalId, IdError, RecordId};
