/*!
Access modes and targets.

A mode describes how a kernel reads and writes a resource, a target describes
the memory space the resource lives in. Together they determine the qualifiers
of the kernel parameter.
*/

use derive_more::{Display, IsVariant};
use serde::{Deserialize, Serialize};

/// How a resource may be used inside a kernel.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug, Display, IsVariant, Serialize, Deserialize)]
pub enum AccessMode {
    /// Read only.
    Read,
    /// Write only, previous contents are discarded.
    Write,
    /// Atomic read and write.
    Atomic,
    /// Read and write.
    ReadWrite,
    /// Read and write, previous contents are discarded.
    DiscardReadWrite,
}

impl AccessMode {
    /// Whether the kernel may write through this access.
    pub fn is_mutable(&self) -> bool {
        !self.is_read()
    }
}

/// The memory space a resource is accessed through.
#[derive(
    Clone, Copy, Eq, PartialEq, Hash, Debug, Default, Display, IsVariant, Serialize, Deserialize,
)]
pub enum AccessTarget {
    /// Device global memory.
    #[default]
    GlobalBuffer,
    /// Device constant memory.
    ConstantBuffer,
    /// Work group local memory.
    Local,
    Image,
    /// Immediate access on the host.
    HostBuffer,
    HostImage,
    ImageArray,
    /// A native buffer object on the device.
    ClBuffer,
    ClImage,
}

impl AccessTarget {
    /// The address space qualifier of a kernel parameter, if any.
    pub fn qualifier(&self) -> Option<&'static str> {
        use AccessTarget::*;
        match self {
            GlobalBuffer | ClBuffer => Some("__global"),
            ConstantBuffer => Some("__constant"),
            Local => Some("__local"),
            Image | HostBuffer | HostImage | ImageArray | ClImage => None,
        }
    }
    /// Whether the target is only accessible on the host.
    pub fn is_host(&self) -> bool {
        matches!(self, Self::HostBuffer | Self::HostImage)
    }
}
