//! Embedded scripting core plus a small command-line host.
//!
//! [`script`] is the language itself; [`tick`] holds the per-tick callback
//! lists a host drives. [`cli`], [`config`] and [`host`] belong to the
//! `scripter` binary.

pub mod cli;
pub mod config;
pub mod host;
pub mod script;
pub mod tick;
