//! ArtMind: turn a spoken or typed prompt into a generated image, stamp it
//! with a logo, store it publicly and share it as a link or QR code.

#![allow(clippy::multiple_crate_versions)]
#![deny(clippy::all)]
#![deny(clippy::await_holding_lock)]
#![deny(clippy::complexity)]
#![deny(clippy::correctness)]
#![deny(clippy::disallowed_methods)]
#![deny(clippy::expect_used)]
#![deny(clippy::needless_pass_by_value)]
#![deny(clippy::panic)]
#![deny(clippy::perf)]
#![deny(clippy::trivially_copy_pass_by_ref)]
#![deny(clippy::unreachable)]
#![deny(clippy::unwrap_used)]
#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(warnings)]
#![cfg_attr(test, allow(clippy::expect_used, clippy::panic))]

pub mod cli;
pub mod composite;
pub mod config;
pub mod constants;
pub mod error;
pub mod pipeline;
pub mod providers;
pub mod qr;
pub mod sanitize;
pub mod web;
