pub mod client;
pub mod mock;

pub use client::{ClientError, DuffelClient, DuffelConfig};
pub use mock::{MockProvider, ProviderCall, ProviderOperation};
