/*!
Kernel source generation.

Host code describes a computation with [references](data_ref::DataRef) and
[accessors](buffer::Accessor) inside a [command group](kernel::command_group). Each
statement is translated to OpenCL C as it is executed, and the buffers it touches
become the parameters of the generated kernel. The resulting
[`KernelSource`](kernel::KernelSource) has a name that is stable for the kernel
shape, so a runtime can cache compiled programs by it.
*/

#![forbid(unsafe_code)]

pub use anyhow;

pub mod result {
    pub type Result<T, E = anyhow::Error> = std::result::Result<T, E>;
}

pub mod access;
pub mod buffer;
pub mod control;
pub mod data_ref;
pub mod kernel;
pub mod scalar;
