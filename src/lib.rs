//! # rust_align
//!
//! Coordinate model and power-scan engine for fibre and chip alignment rigs.
//!
//! ## Crate Structure
//!
//! - **`stage`**: axes with reversal, bounds and cached positions; derived chip
//!   axes; stages with logical x/y/z remapping; two- and three-stage rigs with
//!   a position stack, fibre retraction and centring.
//! - **`scan`**: relative scan patterns, power scans over any set of rig axes,
//!   nested scan recipes and ready-made alignment routines.
//! - **`hardware`**: the capability traits the core consumes (axis transport,
//!   power meter, move logger), a shared-bus wrapper and mock implementations.
//! - **`config`**: Figment-based configuration (TOML + `RUST_ALIGN_` environment)
//!   that builds stages and rigs.
//! - **`telemetry`**: `tracing-subscriber` setup.
//! - **`error`**: the `AlignError` enum used across the crate.
//!
//! Everything is synchronous: a move returns once the transport has confirmed
//! it, and scans visit coordinates one at a time.

pub mod config;
pub mod error;
pub mod hardware;
pub mod scan;
pub mod stage;
pub mod telemetry;

pub use error::{AlignError, AlignResult, ErrorKind, TransportError, TransportErrorKind};
pub use scan::{Scan, ScanAbort, ScanOutcome, ScanRoutines, ScannerDesign};
pub use stage::{Axis, AxisId, AxisResolver, AxisRole, Stage, StageRole, Stages2, Stages3};
