//! Error types used by multiple modules.
//!
//! Parsing and validation can fail for a wide range of reasons that are
//! only interesting for diagnostics. Everything gets logged right where it
//! happens; what travels up the stack is [`Failed`], which merely states
//! that the current object is a write-off. [`ExitError`] is used by the
//! binary to determine its exit code.

use log::error;


//------------ Failed --------------------------------------------------------

/// An operation has failed to complete.
///
/// All diagnostic information has been logged and the caller can’t really
/// do anything to recover the current object.
#[derive(Clone, Copy, Debug)]
pub struct Failed;


//------------ ExitError -----------------------------------------------------

/// An error happened that should lead to terminating the program.
#[derive(Clone, Copy, Debug)]
pub enum ExitError {
    /// Something has happened.
    ///
    /// This should be exit status 1.
    Generic,

    /// An object could not be validated.
    ///
    /// This should be exit status 2.
    Invalid,
}

impl ExitError {
    pub fn exit_code(self) -> i32 {
        match self {
            ExitError::Generic => 1,
            ExitError::Invalid => 2,
        }
    }
}

impl From<Failed> for ExitError {
    fn from(_: Failed) -> ExitError {
        error!("Fatal error. Exiting.");
        ExitError::Generic
    }
}
