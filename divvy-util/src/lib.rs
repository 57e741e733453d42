//! Configuration resolution, process primitives, and logging setup shared by the
//! dispatch engine and its command-line front end.

pub mod config;
pub mod log;
pub mod process;

pub use config::ConfigBag;
