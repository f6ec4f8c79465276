// ABOUTME: Tool module - the local registry of mirrored tools.
// ABOUTME: Defines entries, the invoke callback, and locally built results.

mod registry;
mod result;
mod traits;

pub use registry::*;
pub use result::*;
pub use traits::*;
