//! Adapters behind the domain ports: storage, provider clients and notifiers.

pub mod http_clients;
pub mod in_memory;
pub mod notifier;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
pub mod sandbox;
