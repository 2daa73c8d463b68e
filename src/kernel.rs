/*!
Kernel construction.

A kernel is described by running host code inside a [command group]: the closure
creates [accessors](crate::buffer::Accessor) and assigns to
[references](crate::data_ref::DataRef), each assignment appending one statement to
the kernel under construction. When the closure returns, the kernel source and its
parameters are collected into a [`KernelSource`].

```
# use krnl_source::{anyhow::Result, access::{AccessMode, AccessTarget}, buffer::{Buffer, Range}, data_ref::DataRef, kernel, scalar::ScalarType};
# fn main() -> Result<()> {
let x = Buffer::new(ScalarType::F32, Range::d1(64));
let y = Buffer::new(ScalarType::F32, Range::d1(64));
let axpy = |alpha: f32| {
    kernel::command_group("axpy", || {
        let x = x.access(AccessMode::Read, AccessTarget::GlobalBuffer)?;
        let y = y.access(AccessMode::ReadWrite, AccessTarget::GlobalBuffer)?;
        let id = DataRef::global_id(1);
        y.at(&id).add_assign(&DataRef::from(alpha) * x.at(&id));
        Ok(())
    })
};
let a = axpy(1.0)?;
let b = axpy(2.0)?;
assert_eq!(a.name(), b.name());
assert_ne!(a.code(), b.code());
# Ok(())
# }
```

Kernels of the same shape share a name, see [`name`].

[command group]: command_group
*/

use crate::{buffer::Buffer, result::Result};
use serde::{Deserialize, Serialize};

pub mod name;
pub mod registry;
pub mod scope;
pub mod source;

use name::ShapeKey;
use registry::ParamDesc;
use source::{Source, SourceBuilder};

/// Errors.
pub mod error {
    use super::source::Source;

    /// An operation that requires an active scope was called outside of one.
    #[derive(Clone, Copy, Debug, thiserror::Error)]
    #[error("`{op}` called outside of a kernel construction scope!")]
    pub struct NotInScope {
        pub(super) op: &'static str,
    }

    /// A scope was entered on a thread that already has one.
    #[derive(Debug, thiserror::Error)]
    #[error("Cannot enter a scope for kernel `{}`, `{active}` is already active!", .rejected.get_kernel_name())]
    pub struct ScopeAlreadyActive {
        pub(super) active: String,
        pub(super) rejected: Box<Source>,
    }

    impl ScopeAlreadyActive {
        /// The source that was not entered.
        pub fn into_source(self) -> Source {
            *self.rejected
        }
    }

    /// A block was closed with none open.
    #[derive(Clone, Debug, thiserror::Error)]
    #[error("Kernel `{kernel}` closed a block with none open!")]
    pub struct BlockUnderflow {
        pub(super) kernel: String,
    }

    /// A kernel was finished with open blocks.
    #[derive(Clone, Debug, thiserror::Error)]
    #[error("Kernel `{kernel}` finished with {depth} open block(s)!")]
    pub struct UnbalancedBlocks {
        pub(super) kernel: String,
        pub(super) depth: usize,
    }
}

/** A generated kernel.

The code declares the kernel with the parameters of [`.params()`](Self::params),
in order. The buffers to bind are in the same order, they are not serialized. */
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KernelSource {
    name: String,
    code: String,
    params: Vec<ParamDesc>,
    #[serde(skip)]
    buffers: Vec<Buffer>,
}

impl KernelSource {
    /// The kernel name, stable for a kernel shape.
    pub fn name(&self) -> &str {
        &self.name
    }
    /// The kernel source text.
    pub fn code(&self) -> &str {
        &self.code
    }
    pub fn params(&self) -> &[ParamDesc] {
        &self.params
    }
    /// The buffers of each parameter.
    ///
    /// Empty if deserialized.
    pub fn buffers(&self) -> &[Buffer] {
        &self.buffers
    }
    /// Serializes the kernel, excluding buffers.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }
    /// Deserializes a kernel from [`.to_bytes()`](Self::to_bytes).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}

/** Builds a kernel of `shape`.

Opens a construction scope, runs `f` and closes the scope. The scope is closed if
`f` returns an error or panics.

**errors**
- [`ScopeAlreadyActive`](error::ScopeAlreadyActive) if called within another command group.
- [`UnbalancedBlocks`](error::UnbalancedBlocks) if `f` left blocks open.
- Errors returned by `f`. */
pub fn command_group<F>(shape: impl Into<ShapeKey>, f: F) -> Result<KernelSource>
where
    F: FnOnce() -> Result<()>,
{
    command_group_with(Source::builder(shape), f)
}

/// Like [`command_group()`], with options from `builder`.
pub fn command_group_with<F>(builder: SourceBuilder, f: F) -> Result<KernelSource>
where
    F: FnOnce() -> Result<()>,
{
    let guard = scope::enter(builder.build())?;
    f()?;
    let kernel = guard.exit().finish()?;
    tracing::debug!(kernel = %kernel.name, params = kernel.params.len(), "kernel generated");
    Ok(kernel)
}
