//! HTTP coordination service for record leasing.
//!
//! One service process owns a directory of ledger files and hands out
//! records to out-of-process workers: `GET /{ledger}/next` leases the next
//! open record (find, mark, persist in one step), `POST /{ledger}/update`
//! reports a worker's outcome back. Workers poll — there is no push
//! channel.
//!
//! Lease atomicity comes from request serialization: every route takes the
//! service-wide mutex before touching a ledger, so "find next open, mark
//! busy, persist" never interleaves with another request. This mirrors the
//! single-writer convention of [`crate::ledger`] — run exactly one service
//! per ledger directory and keep batch tooling away from files the service
//! owns.

pub mod client;
pub mod error;
pub mod server;
pub mod state;

pub use client::{Client, ClientError, EXHAUSTED_PREFIX};
pub use error::ServiceError;
pub use server::{HEADER_GET_STATE, HEADER_SET_STATE, router, run};
pub use state::ServiceState;
