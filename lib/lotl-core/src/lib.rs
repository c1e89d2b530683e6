#![cfg_attr(feature = "strict", deny(warnings))]

//! Fetching, validation and caching of the European List of Trusted Lists,
//! trust checks against the national trusted lists and eIDAS qualification
//! of signing certificates.

pub mod config;
pub mod model;
pub mod proto;
pub mod provider;
pub mod service;
pub mod util;

#[cfg(test)]
pub(crate) mod test_utilities;
