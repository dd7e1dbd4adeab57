//! Document-store API for Herald records
//!
//! The store exposes four query shapes (exact-match by field, a name+code
//! pair lookup, array-membership, and a bounded IN batch) plus merge-style
//! mutations. Live change subscriptions over the same records live in
//! `crate::watch`.

pub mod client;
mod orgs;
mod users;

pub use client::StoreClient;
pub use orgs::*;
pub use users::*;

use thiserror::Error;

/// Typed write-path failures. Read-path callers swallow these into empty
/// results instead of propagating them.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not authenticated; run `herald-cli login` first")]
    NotAuthenticated,

    #[error("no matching record")]
    NotFound,

    #[error("an organization with that name already exists")]
    AlreadyExists,

    #[error("not permitted for this user")]
    Unauthorized,

    #[error("store unreachable: {0}")]
    Transport(String),

    #[error("malformed store response: {0}")]
    Malformed(String),
}
