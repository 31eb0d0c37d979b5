#![forbid(unsafe_code)]
#![warn(
    unused,
    clippy::cognitive_complexity,
    unused_extern_crates,
    clippy::unused_self,
    clippy::useless_let_if_seq,
    missing_debug_implementations,
    rust_2018_idioms
)]
#![allow(clippy::type_complexity)]

//! Low-level plumbing shared by the exchange clients in `talus-execution`:
//! request signing, small collection helpers, and the flat `config.properties`
//! parser that produces the immutable [`settings::Settings`] every component
//! is constructed from.
//!
//! Nothing in this crate talks to a specific venue's wire format — that
//! lives in `talus-execution::client`. This crate only provides the
//! ingredients (HMAC signing, a settings value, generic collections) those
//! clients are built from.

pub mod collection;
pub mod settings;
pub mod signing;

pub use collection::OneOrMany;
pub use settings::{ConfigError, Settings};
