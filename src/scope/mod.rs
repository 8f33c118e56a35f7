// src/scope/mod.rs

//! Scoped resources: acquisitions paired with guaranteed releases.
//!
//! - [`scoped`] holds [`Scoped`], a lazy acquisition that can be composed
//!   sequentially ([`Scoped::nest`]) or in parallel ([`Scoped::join`]).
//! - [`lease`] holds [`Lease`], the stack of release actions built up while a
//!   `Scoped` is entered. Releasing it unwinds newest-first.
//!
//! Only `futures` combinators are used for composition; Tokio is needed only
//! to finish releasing a lease that was dropped mid-scope.

pub mod lease;
pub mod scoped;

pub use lease::Lease;
pub use scoped::Scoped;
