//! Base types and error handling.
//!
//! - [`PoolError`](poolerror::PoolError): everything a pool operation can fail with
//! - [`IoResultExt`](context::IoResultExt): endpoint context for raw IO errors

pub mod context;
pub mod poolerror;

#[cfg(test)]
mod tests;
