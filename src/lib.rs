//! Incremental static-site publishing over FTP or SFTP.

pub mod changeset;
pub mod config;
pub mod environment;
pub mod marker;
pub mod publish;
pub mod sync;
pub mod transport;

#[cfg(test)]
mod test_utils;

pub use config::{Config, MarkerCommit, Protocol};
pub use environment::Environment;
pub use publish::{PublishOptions, PublishReport, publish, publish_with};
pub use transport::{Transport, TransportError};
