//! Pipeline stages for converting one image.
//!
//! Each submodule implements exactly one transformation step, so each is
//! independently testable and can be swapped (e.g. another resampler)
//! without touching the others.
//!
//! ## Data Flow
//!
//! ```text
//! bytes ──▶ decode ──▶ resize ──▶ surface ──▶ encode ──▶ bytes
//!          (budget)   (fit+filter) (bg fill)  (quality)
//! ```
//!
//! 1. [`decode`]: sniff the format, enforce the pixel budget, decode
//! 2. [`resize`]: compute the target size and resample with a convolution filter
//! 3. [`surface`]: flatten transparency onto the background for alpha-less encodings
//! 4. [`encode`]: serialise the surface at the requested quality
//!
//! [`crate::convert::convert`] drives the stages in order and turns any stage
//! error into a failure outcome.

pub mod decode;
pub mod encode;
pub mod resize;
pub mod surface;
