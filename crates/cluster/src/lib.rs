//! Cluster membership, join-token bootstrap, and the outbound peer client.

mod client;
mod error;
mod manager;
mod sync;
mod token;

pub use client::PeerClient;
pub use error::{Error, Result};
pub use manager::Manager;
pub use sync::apply_config_sync;
pub use token::{consume_token, decode_token, hash_secret, mint_join_token, TOKEN_SECRET_LEN};
