//! Computation of the scale factor that turns raw bin counts into a normalized signal.
//!
//! Everything in here is free of I/O; the mapped read count is obtained by the caller.

#[macro_use]
extern crate error_chain;

mod options;
pub use options::*;

mod scale_factor;
pub use scale_factor::*;

mod errors {
    // Create the Error, ErrorKind, ResultExt, and Result types
    error_chain! {
        errors {
            Normalization(msg: String) {
                description("normalization failed")
                display("normalization failed: {}", msg)
            }
        }
    }
}

pub use errors::*;
