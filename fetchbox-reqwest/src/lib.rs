#![warn(missing_docs)]
//! # fetchbox-reqwest
//!
//! [`Transport`](fetchbox_core::Transport) implementation backed by
//! [`reqwest`].
//!
//! ```no_run
//! use fetchbox::{Client, FetchOptions};
//! use fetchbox_reqwest::ReqwestTransport;
//!
//! # async fn run() -> Result<(), fetchbox::FetchError> {
//! let client = Client::builder(ReqwestTransport::new())
//!     .base_url("http://localhost:5050/")
//!     .build();
//! let funds = client.fetch_json("/data/funds.json", &FetchOptions::default()).await?;
//! # let _ = funds;
//! # Ok(())
//! # }
//! ```

mod transport;

pub use transport::ReqwestTransport;

/// Re-export of the reqwest client type accepted by [`ReqwestTransport::with_client`].
pub use reqwest::Client as ReqwestClient;
