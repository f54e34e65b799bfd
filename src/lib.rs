//! Core library for an automated market-making agent that quotes maker
//! orders into a peer-to-peer sports betting exchange.
//!
//! `operator::MakerCore` is the entry point most callers want; the other
//! modules are exposed for binaries, tests, and anyone embedding the core
//! directly.

pub mod book;
pub mod config;
pub mod controller;
pub mod errors;
pub mod gateway;
pub mod ids;
pub mod monitor;
pub mod odds;
pub mod operator;
pub mod position;
pub mod serializer;
pub mod stake;
pub mod transport;

pub use config::CoreConfig;
pub use errors::CoreError;
pub use operator::MakerCore;
pub use position::{Position, PositionPatch, PositionSpec, PositionStatus, Side};
