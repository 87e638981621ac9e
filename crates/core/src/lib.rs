//! Domain types and rules for the AVICAST egret review workflow.
//!
//! Pure logic only: no I/O, no database access. The `db`, `pipeline` and
//! `api` crates build on these types.

pub mod detection;
pub mod error;
pub mod review;
pub mod roles;
pub mod types;
pub mod workflow;
