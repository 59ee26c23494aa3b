pub mod adapter;
pub mod mock;
pub mod s3;

pub use adapter::ObjectAdapter;
