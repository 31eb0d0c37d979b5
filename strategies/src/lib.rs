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

//! Concrete strategies built on `talus_trader::Strategy`: shared indicator
//! math ([`indicators`]) and the canonical Donchian-48 breakout
//! ([`donchian48`], §4.2).

pub mod donchian48;
pub mod indicators;

pub use donchian48::{Donchian48, Donchian48Config};
