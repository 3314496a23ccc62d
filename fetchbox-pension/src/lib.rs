#![warn(missing_docs)]
//! # fetchbox-pension
//!
//! Typed access to the pension dashboard datasets (`users`, `providers`,
//! `accounts`, `funds`, `holdings`, `contributions`, `transactions`) served
//! as JSON files from a [`DataLocation`](fetchbox::DataLocation).
//!
//! ```no_run
//! use fetchbox::{Client, ClientConfig};
//! use fetchbox_pension::PensionData;
//! # use fetchbox::Transport;
//!
//! # async fn run<T: Transport + 'static>(transport: T) -> Result<(), fetchbox::FetchError> {
//! let config = ClientConfig::from_env();
//! let client = Client::from_config(transport, &config);
//!
//! let data = PensionData::load(&client, &config.data_location(), client.defaults()).await?;
//! for summary in data.account_summaries() {
//!     println!("{} {} {:.2}", summary.user_name, summary.provider, summary.holdings_value);
//! }
//! # Ok(())
//! # }
//! ```

mod dataset;
mod model;

pub use dataset::{AccountSummary, DATASET_FILES, DatasetCounts, Datasets, PensionData};
pub use model::{Account, Contribution, Fund, Holding, Provider, Transaction, User};
