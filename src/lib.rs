//! F007TH setup library
//!
//! Installs and removes the F007TH sensor service together with the GPIO
//! kernel module it depends on. The sensor reader, the forwarder and the
//! module itself are external; this crate only manages their host
//! registration.

pub mod audit;
pub mod config;
pub mod error;
pub mod executor;
pub mod files;
pub mod kmod;
pub mod lifecycle;
pub mod templates;
pub mod unit;
pub mod validation;
