//! Configuration models for dispatchers.

pub mod dispatcher;

pub use dispatcher::DispatcherConfig;
