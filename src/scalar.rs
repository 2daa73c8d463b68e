/*!
Scalar types and their kernel type names.

Generated kernels name element types with OpenCL C spellings (`int`, `float`,
`uchar`, ...). [`ScalarType`] is the runtime descriptor used by
[resources](crate::kernel::registry) and [buffers](crate::buffer), so source
generation never depends on host generics.
*/

use bytemuck::Pod;
use derive_more::Display;
#[cfg(feature = "half")]
use half::f16;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug};

mod sealed {
    #[cfg(feature = "half")]
    use half::f16;

    #[doc(hidden)]
    pub trait Sealed {}

    macro_rules! impl_sealed {
        ($($t:ty),+) => {
            $(
                impl Sealed for $t {}
            )+
        };
    }

    impl_sealed! {u8, i8, u16, i16, u32, i32, f32, u64, i64, f64}
    #[cfg(feature = "half")]
    impl_sealed! {f16}
}
use sealed::Sealed;

/// Numerical types supported in generated kernels.
#[allow(missing_docs)]
#[non_exhaustive]
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug, Display, Serialize, Deserialize)]
pub enum ScalarType {
    U8,
    I8,
    U16,
    I16,
    #[cfg(feature = "half")]
    F16,
    U32,
    I32,
    F32,
    U64,
    I64,
    F64,
}

impl ScalarType {
    /// Size of the type in bytes.
    pub fn size(&self) -> usize {
        use ScalarType::*;
        match self {
            U8 | I8 => 1,
            U16 | I16 => 2,
            #[cfg(feature = "half")]
            F16 => 2,
            U32 | I32 | F32 => 4,
            U64 | I64 | F64 => 8,
        }
    }
    /// Name of the type in kernel source.
    ///
    /// ie "float", "uchar", "long", etc.
    pub fn kernel_name(&self) -> &'static str {
        use ScalarType::*;
        match self {
            U8 => "uchar",
            I8 => "char",
            U16 => "ushort",
            I16 => "short",
            #[cfg(feature = "half")]
            F16 => "half",
            U32 => "uint",
            I32 => "int",
            F32 => "float",
            U64 => "ulong",
            I64 => "long",
            F64 => "double",
        }
    }
    /// Name of a pointer to the type in kernel source, ie "float*".
    pub fn pointer_name(&self) -> String {
        format!("{}*", self.kernel_name())
    }
}

/// A scalar value, rendered as a kernel literal.
#[derive(Clone, Copy, PartialEq, Debug, Serialize, Deserialize)]
pub enum ScalarElem {
    U8(u8),
    I8(i8),
    U16(u16),
    I16(i16),
    #[cfg(feature = "half")]
    F16(f16),
    U32(u32),
    I32(i32),
    F32(f32),
    U64(u64),
    I64(i64),
    F64(f64),
}

/** Formats the value as a kernel literal.

Narrow integers are cast, unsigned and 64 bit values carry a suffix and floats
always have a decimal point, so `1f32` renders as `1.0f`. */
impl fmt::Display for ScalarElem {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use ScalarElem::*;
        match self {
            U8(x) => write!(f, "(uchar){x}"),
            I8(x) => write!(f, "(char){x}"),
            U16(x) => write!(f, "(ushort){x}"),
            I16(x) => write!(f, "(short){x}"),
            #[cfg(feature = "half")]
            F16(x) => write!(f, "(half){:?}", x.to_f32()),
            U32(x) => write!(f, "{x}u"),
            I32(x) => write!(f, "{x}"),
            F32(x) => write!(f, "{x:?}f"),
            U64(x) => write!(f, "{x}ul"),
            I64(x) => write!(f, "{x}l"),
            F64(x) => write!(f, "{x:?}"),
        }
    }
}

macro_rules! impl_scalar {
    ($($t:ty => $variant:ident),+ $(,)?) => {
        $(
            impl From<$t> for ScalarElem {
                fn from(x: $t) -> Self {
                    Self::$variant(x)
                }
            }

            impl Scalar for $t {
                fn scalar_type() -> ScalarType {
                    ScalarType::$variant
                }
            }
        )+
    };
}

/// Base trait for numerical types.
pub trait Scalar:
    Default + Copy + 'static + Into<ScalarElem> + Pod + Debug + PartialEq + Sealed
{
    /// The [`ScalarType`] of the scalar.
    fn scalar_type() -> ScalarType;
    /// Name of the type in kernel source.
    ///
    /// See [`ScalarType::kernel_name()`].
    fn kernel_name() -> &'static str {
        Self::scalar_type().kernel_name()
    }
}

impl_scalar! {
    u8 => U8,
    i8 => I8,
    u16 => U16,
    i16 => I16,
    u32 => U32,
    i32 => I32,
    f32 => F32,
    u64 => U64,
    i64 => I64,
    f64 => F64,
}

#[cfg(feature = "half")]
impl_scalar! {
    f16 => F16,
}
