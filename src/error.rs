// This module defines the error taxonomy for the DLX just-in-time translator using the
// thiserror crate for idiomatic Rust error handling. JitError covers the fatal failure
// classes of the batch pipeline: malformed instruction-stream or memory-image input,
// branch labels that cannot be resolved, DLX opcodes with no translation rule, operand
// tokens that are not valid register names, I/O failures, failures to map the executable
// region, and attempts to run the compiled code on a host that is not 32-bit ARM. Each
// variant carries the offending context (label, opcode, token) for reporting. Nothing is
// retried; the first error aborts the run.

//! Error types for the DLX JIT.

use thiserror::Error;

/// Fatal errors surfaced by loading, translation, or execution.
#[derive(Error, Debug)]
pub enum JitError {
    /// Malformed `.cod` or `.dat` input.
    #[error("{0}")]
    Format(String),

    /// A branch label is missing from the label table.
    #[error("Label not found {label}")]
    Resolution { label: String },

    /// A DLX opcode with no translation rule.
    #[error("Unsupported DLX opcode: {opcode}")]
    UnsupportedInstruction { opcode: String },

    /// A token that does not name a DLX register where one is required.
    #[error("Invalid register name: {token}")]
    Operand { token: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The read-write-execute mapping could not be created.
    #[error("Executable mapping failed: {0}")]
    Map(#[source] std::io::Error),

    /// The compiled code targets an architecture this process does not run on.
    #[error("Compiled {target} code cannot execute on this host")]
    UnsupportedHost { target: &'static str },
}

/// Result type alias for JIT operations.
pub type JitResult<T> = Result<T, JitError>;
