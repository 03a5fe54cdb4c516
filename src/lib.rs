//! dlxjit - DLX-to-ARM just-in-time translation.
//!
//! Compiles programs written for the 32-register DLX teaching ISA into
//! A32 machine code and executes the result in place against an emulated
//! big-endian data memory. One input format in, directly executable host
//! instructions out; there is no interpreter loop.
//!
//! # Primary Usage
//!
//! ```ignore
//! use dlxjit::DlxJit;
//!
//! let mut jit = DlxJit::new();
//! jit.load_data(dat_reader)?;
//! jit.load_code(cod_reader)?;
//! jit.execute()?; // translates and maps on first call
//! jit.save_data(out_writer)?;
//! ```
//!
//! # Architecture
//!
//! - [`isa`] - DLX instruction model and `.cod` stream parsing
//! - [`memory`] - emulated data memory and `.dat` image I/O
//! - [`arm`] - A32 backend: encoder, register policy, translation loop,
//!   executable memory
//! - [`jit`] - the facade tying loading, one-shot compilation, execution
//!   and serialization together

pub mod arm;
pub mod error;
pub mod isa;
pub mod jit;
pub mod memory;

pub use error::{JitError, JitResult};
pub use jit::DlxJit;
