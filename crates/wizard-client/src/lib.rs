//! Section wizard client SDK.
//!
//! Talks to the wizard service on behalf of one signed-in user: shows the
//! credit balance, spends credits and requests generated sections.
//!
//! # Example
//!
//! ```no_run
//! use wizard_client::{GenerateRequest, WizardClient};
//!
//! # async fn example() -> Result<(), wizard_client::ClientError> {
//! let client = WizardClient::new("https://wizard.example.com", "session-jwt")?;
//!
//! let balance = client.balance().await?;
//! println!("{} of {} credits left", balance.current, balance.max);
//!
//! let section = client
//!     .generate(&GenerateRequest::new("hero banner").with_requirements("dark theme"))
//!     .await?;
//! println!("{}", section.code);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod cache;
mod client;
mod error;
mod types;

pub use client::{ClientOptions, WizardClient};
pub use error::ClientError;
pub use types::{BalanceResponse, GenerateRequest, GenerateResponse, HistoryRecord, UserProfile};
pub use wizard_core::CreditBalance;
