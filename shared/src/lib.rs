#![cfg_attr(not(any(test, feature = "std")), no_std)]

extern crate alloc;

#[cfg(feature = "std")]
pub mod error;
pub mod license;
pub mod schema;
pub mod vault;
