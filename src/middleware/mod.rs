//! HTTP middleware for admission control and client identification.
//!
//! - **Admission**: quota, flood and block checks in front of the proxy
//! - **Client identity**: forwarded-header resolution with trusted proxy
//!   validation
//!
//! # Architecture
//!
//! ```text
//! Request → resolve identity → AdmissionEngine::decide → proxy handler
//!                                     ↓
//!                              429 Too Many Requests
//! ```
//!
//! # Security Considerations
//!
//! Forwarding headers are client-controlled. Configure `TRUSTED_PROXIES` in
//! production so a client cannot rotate its identity to dodge quotas.

pub mod admission;
pub mod ip;

pub use admission::{AdmissionLayer, AdmissionService};
pub use ip::{CidrRange, TrustedProxyConfig, resolve_client_identity};
