/*!
Buffers and accessors.

A [`Buffer`] is a shared handle to a block of memory owned by a runtime. Only its
identity, element type and range matter for source generation; two handles are
the same buffer when they were cloned from one another.

Kernels reach buffers through an [`Accessor`], created with [`Buffer::access()`]
inside a [command group](crate::kernel::command_group):
```
# use krnl_source::{anyhow::Result, access::{AccessMode, AccessTarget}, buffer::{Buffer, Range}, data_ref::DataRef, kernel, scalar::ScalarType};
# fn main() -> Result<()> {
let x = Buffer::new(ScalarType::F32, Range::d1(64));
let y = Buffer::new(ScalarType::F32, Range::d1(64));
let kernel = kernel::command_group("copy", || {
    let x = x.access(AccessMode::Read, AccessTarget::GlobalBuffer)?;
    let y = y.access(AccessMode::Write, AccessTarget::GlobalBuffer)?;
    let id = DataRef::global_id(1);
    y.at(&id).assign(x.at(&id));
    Ok(())
})?;
assert_eq!(kernel.params().len(), 2);
# Ok(())
# }
```
*/

use crate::{
    access::{AccessMode, AccessTarget},
    data_ref::DataRef,
    kernel::scope,
    scalar::{Scalar, ScalarType},
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{
    fmt::{self, Debug},
    mem::size_of,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

pub mod error {
    use super::*;

    /// The dimensionality must be 1, 2 or 3.
    #[derive(Clone, Copy, Debug, thiserror::Error)]
    #[error("Expected 1, 2 or 3 dimensions, found {dimensions}!")]
    pub struct InvalidDimensions {
        pub(crate) dimensions: usize,
    }

    /// A device accessor was requested outside of a command group.
    #[derive(Clone, Debug, thiserror::Error)]
    #[error("{buffer:?} accessed for {target} outside of a command group!")]
    pub struct AccessOutsideCommandGroup {
        pub(super) buffer: BufferId,
        pub(super) target: AccessTarget,
    }
}
use error::*;

/// The identity of a buffer.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd, Debug, Serialize, Deserialize)]
pub struct BufferId(u64);

impl BufferId {
    fn next() -> Self {
        static HANDLE: AtomicU64 = AtomicU64::new(0);
        Self(HANDLE.fetch_add(1, Ordering::Relaxed))
    }
}

/** The extent of a buffer in 1, 2 or 3 dimensions.

Unused trailing dimensions are 1. */
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug, Serialize, Deserialize)]
pub struct Range {
    extent: [usize; 3],
    dimensions: u32,
}

impl Range {
    /// A range with `extent.len()` dimensions.
    ///
    /// **errors**
    ///
    /// [`InvalidDimensions`] if `extent` is empty or has more than 3 elements.
    pub fn new(extent: &[usize]) -> Result<Self, InvalidDimensions> {
        if extent.is_empty() || extent.len() > 3 {
            return Err(InvalidDimensions {
                dimensions: extent.len(),
            });
        }
        let mut output = [1; 3];
        output[..extent.len()].copy_from_slice(extent);
        Ok(Self {
            extent: output,
            dimensions: extent.len() as u32,
        })
    }
    pub fn d1(x: usize) -> Self {
        Self {
            extent: [x, 1, 1],
            dimensions: 1,
        }
    }
    pub fn d2(x: usize, y: usize) -> Self {
        Self {
            extent: [x, y, 1],
            dimensions: 2,
        }
    }
    pub fn d3(x: usize, y: usize, z: usize) -> Self {
        Self {
            extent: [x, y, z],
            dimensions: 3,
        }
    }
    /// The number of dimensions.
    pub fn dimensions(&self) -> u32 {
        self.dimensions
    }
    /// The extent of each used dimension.
    pub fn extent(&self) -> &[usize] {
        &self.extent[..self.dimensions as usize]
    }
    /// The number of elements.
    pub fn count(&self) -> usize {
        self.extent().iter().product()
    }
}

type ReleaseFn = Box<dyn FnOnce(BufferId) + Send>;

struct BufferInner {
    id: BufferId,
    scalar_type: ScalarType,
    range: Range,
    on_release: Mutex<Vec<ReleaseFn>>,
}

impl Drop for BufferInner {
    fn drop(&mut self) {
        let id = self.id;
        for f in self.on_release.get_mut().drain(..) {
            f(id);
        }
        tracing::trace!(buffer = ?id, "buffer released");
    }
}

/** A buffer.

Buffers can be cloned, which is equivalent to [`Arc::clone()`]. Clones share the
same [`BufferId`]. */
#[derive(Clone)]
pub struct Buffer {
    inner: Arc<BufferInner>,
}

impl Buffer {
    /// A buffer of `scalar_type` elements.
    pub fn new(scalar_type: ScalarType, range: Range) -> Self {
        Self {
            inner: Arc::new(BufferInner {
                id: BufferId::next(),
                scalar_type,
                range,
                on_release: Mutex::default(),
            }),
        }
    }
    /// A buffer of `T` elements.
    pub fn of<T: Scalar>(range: Range) -> Self {
        Self::new(T::scalar_type(), range)
    }
    pub fn id(&self) -> BufferId {
        self.inner.id
    }
    pub fn scalar_type(&self) -> ScalarType {
        self.inner.scalar_type
    }
    pub fn range(&self) -> Range {
        self.inner.range
    }
    /// The number of elements.
    pub fn len(&self) -> usize {
        self.inner.range.count()
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
    /// The size in bytes.
    pub fn size(&self) -> usize {
        self.len() * self.inner.scalar_type.size()
    }
    /// The number of handles sharing this buffer.
    pub fn owners(&self) -> usize {
        Arc::strong_count(&self.inner)
    }
    /// Calls `f` when the last handle is dropped.
    pub fn on_release(&self, f: impl FnOnce(BufferId) + Send + 'static) {
        self.inner.on_release.lock().push(Box::new(f));
    }
    /** Creates an accessor.

    Device targets can only be accessed while a command group is open, host
    targets can be accessed anywhere. Device accessors register the buffer with
    the active kernel immediately, so kernel parameters follow the order in which
    accessors are created.

    **errors**

    [`AccessOutsideCommandGroup`] if a device target is requested outside of a
    command group. */
    pub fn access(
        &self,
        mode: AccessMode,
        target: AccessTarget,
    ) -> Result<Accessor, AccessOutsideCommandGroup> {
        if !target.is_host() && !scope::in_scope() {
            return Err(AccessOutsideCommandGroup {
                buffer: self.id(),
                target,
            });
        }
        let accessor = Accessor {
            buffer: self.clone(),
            mode,
            target,
        };
        if !target.is_host() {
            accessor.resource_name();
        }
        Ok(accessor)
    }
}

impl PartialEq for Buffer {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Buffer {}

impl Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("id", &self.inner.id.0)
            .field("scalar_type", &self.inner.scalar_type)
            .field("range", &self.inner.range.extent())
            .finish()
    }
}

/// Access to a [`Buffer`] from within a kernel.
#[derive(Clone, Debug)]
pub struct Accessor {
    buffer: Buffer,
    mode: AccessMode,
    target: AccessTarget,
}

impl Accessor {
    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }
    pub fn mode(&self) -> AccessMode {
        self.mode
    }
    pub fn target(&self) -> AccessTarget {
        self.target
    }
    /** The size of the kernel argument in bytes.

    Local memory is allocated per work group, so the argument is the size of the
    buffer. Other targets are passed as a device pointer. */
    pub fn argument_size(&self) -> usize {
        if self.target.is_local() {
            self.buffer.size()
        } else {
            size_of::<u64>()
        }
    }
    /// The type of the kernel parameter, ie "float*".
    pub fn type_name(&self) -> String {
        self.buffer.scalar_type().pointer_name()
    }
    /** The name of the resource in the active kernel.

    Registers the buffer on first use. Empty outside of a command group and for
    host targets, which are not kernel parameters. */
    pub fn resource_name(&self) -> String {
        if self.target.is_host() {
            if scope::in_scope() {
                tracing::warn!(buffer = ?self.buffer.id(), target = %self.target, "host accessor used in a kernel ignored");
            }
            return String::new();
        }
        scope::register_resource(
            &self.buffer,
            self.mode,
            self.target,
            self.type_name(),
            self.argument_size(),
        )
    }
    /// A reference to the element at `index`.
    pub fn at(&self, index: impl Into<DataRef>) -> DataRef {
        DataRef::new(self.resource_name()).index(index)
    }
}
