//! Signed clients for the cloud control-plane APIs.

pub mod ags;
pub mod client;
pub mod signer;
pub mod tcr;

pub use ags::AgsClient;
pub use client::{ApiService, CloudApiClient, AGS_SERVICE, TCR_SERVICE};
pub use signer::Credential;
pub use tcr::TcrClient;
