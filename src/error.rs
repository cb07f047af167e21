use thiserror::Error;

use crate::ir::{ClassId, FieldId, MethodId};

macro_rules! unsound_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Unsound {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Unsound {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// The analysis distinguishes two fundamentally different failure classes:
///
/// - **Input errors** ([`Error::UnknownClass`], [`Error::UnknownField`],
///   [`Error::UnknownMethod`], [`Error::InvalidCfg`]) indicate a malformed program model
///   handed over by the front end. These are reported before any analysis result is produced.
/// - **Internal-invariant errors** ([`Error::Unsound`], [`Error::FixedPointOverrun`])
///   indicate a defect in the analysis itself: a fact table entry moving against the
///   lattice order, or a worklist that fails to converge within the defensive cap.
///   Neither is recoverable; both identify the offending entity for diagnosis.
///
/// Unresolvable call or field targets are *not* errors: the analysis recovers by
/// treating the affected value as unknown and continues (see the interpreter module).
#[derive(Error, Debug)]
pub enum Error {
    /// A fact table entry moved against the lattice order.
    ///
    /// Facts and summaries may only move monotonically toward `Top`/`Conflicting`
    /// across solver iterations. Observing the reverse direction indicates a logic
    /// defect in the analysis, never a property of the input program. The error
    /// includes the source location where the violation was detected.
    #[error("Unsound - {file}:{line}: {message}")]
    Unsound {
        /// Description of the violated invariant
        message: String,
        /// The source file in which this error was detected
        file: &'static str,
        /// The source line in which this error was detected
        line: u32,
    },

    /// The interprocedural worklist failed to reach a fixed point within the cap.
    ///
    /// Termination is guaranteed by lattice height, so exceeding the defensive
    /// round cap converts a latent non-termination bug into a diagnosable failure.
    /// The pending methods identify the offending re-enqueue cycle.
    #[error("No fixed point after {rounds} rounds; still pending: {}", pending.join(", "))]
    FixedPointOverrun {
        /// Number of solver rounds performed before giving up
        rounds: usize,
        /// Fully qualified names of the methods still in the worklist
        pending: Vec<String>,
    },

    /// A class index did not resolve against the program's symbol tables.
    #[error("Failed to find class in program index - {0}")]
    UnknownClass(ClassId),

    /// A field index did not resolve against the program's symbol tables.
    #[error("Failed to find field in program index - {0}")]
    UnknownField(FieldId),

    /// A method index did not resolve against the program's symbol tables.
    #[error("Failed to find method in program index - {0}")]
    UnknownMethod(MethodId),

    /// A method body failed structural validation.
    ///
    /// Raised when a branch target is out of range, an instruction names a register
    /// beyond the declared register count, or a parameter register list does not
    /// match the declared parameter count.
    #[error("Invalid control flow graph: {0}")]
    InvalidCfg(String),
}
