//! Calls process-resident native functions by name, with no compile-time
//! knowledge of their signature.
//!
//! A [`CallDescriptor`] collects a symbol name and ten word-sized argument
//! slots, resolves the name through the loader's global scope and calls the
//! target with all ten slots. This only works on 64-bit targets whose C
//! calling convention lets a callee ignore surplus arguments.

#[cfg(not(target_pointer_width = "64"))]
compile_error!("arbcall passes every argument as a 64-bit word and needs a 64-bit target");

pub mod bridge;
mod descriptor;
mod error;
mod invoke;
mod resolver;
pub mod script;
mod slot;

pub use bridge::{Bridge, BridgeCreateInfo, BridgeError, Value};
pub use descriptor::CallDescriptor;
pub use error::CallError;
pub use invoke::{CALL_FAILED, Invocation};
pub use resolver::{Symbol, resolve};
pub use slot::{ArgWidth, SLOT_COUNT, Slot};
