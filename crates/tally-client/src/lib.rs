//! Tally client SDK.
//!
//! A typed client for applications that talk to the tally service: the
//! metered assistant, checkout initiation and, with an admin key, account
//! administration.
//!
//! # Example
//!
//! ```no_run
//! use tally_client::{MessageRequest, TallyClient};
//! use tally_core::UserId;
//!
//! # async fn example(user_id: UserId) -> Result<(), tally_client::ClientError> {
//! let client = TallyClient::new("http://tally.internal:8080")?;
//!
//! let reply = client
//!     .send_message(&MessageRequest::new(user_id, "Draft an invoice for a rewire"))
//!     .await?;
//!
//! println!("{} ({} credits left)", reply.response, reply.credits_remaining);
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

pub use client::{ClientOptions, TallyClient};
pub use error::ClientError;
pub use types::*;
