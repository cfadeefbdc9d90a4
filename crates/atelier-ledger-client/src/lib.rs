//! Atelier Ledger Client SDK.
//!
//! This crate lets generation backends drive the ledger's billing protocol:
//! check a user's credits before starting paid work, deduct after the work
//! succeeds, refund when delivery fails.
//!
//! # Example
//!
//! ```no_run
//! use atelier_ledger_client::{DeductRequest, LedgerClient};
//! use atelier_ledger_core::Operation;
//!
//! # async fn example() -> Result<(), atelier_ledger_client::ClientError> {
//! let client = LedgerClient::new("http://atelier-ledger:8080", "service-api-key");
//!
//! let check = client.check_credits("user-uuid", Operation::ImageUltra).await?;
//! if !check.has_credits {
//!     // surface the deficit to the user and stop
//!     return Ok(());
//! }
//!
//! // ... run the generation ...
//!
//! let charged = client
//!     .deduct_credits(DeductRequest {
//!         user_id: "user-uuid".into(),
//!         operation: Operation::ImageUltra,
//!         attempt_id: Some("01J0000000000000000000000X".into()),
//!         metadata: None,
//!     })
//!     .await?;
//! println!("New balance: {:?} credits", charged.new_balance);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod client;
mod error;
mod types;

pub use client::{ClientOptions, LedgerClient};
pub use error::ClientError;
pub use types::*;
