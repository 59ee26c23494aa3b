//! Thin client for S3-compatible object stores: bucket and object CRUD,
//! listing, and presigned GET URLs.

pub mod adapters;
pub mod client;
pub mod model;
pub mod util;

pub use client::ObjectStoreClient;
pub use model::{
    config::ConnectionConfig,
    error::{Result, StoreError},
    object::ObjectEntry,
};
