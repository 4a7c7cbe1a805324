//! Command line front end for `hfspace-core`.

pub mod config;
pub mod output;
