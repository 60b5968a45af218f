pub mod protocol;

pub mod frame;

pub mod identifier;

pub mod engine;

pub mod transport;

pub mod tls;

pub mod server;

pub mod client;

pub mod config;

pub mod error;

pub use crate::client::LoftClient;
pub use crate::engine::{BucketEngine, FsBucketStore};
pub use crate::error::{BucketError, LoftError, Result};
pub use crate::identifier::BucketId;
pub use crate::server::LoftServer;
