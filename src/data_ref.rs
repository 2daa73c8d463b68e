/*!
References to values in generated kernels.

A [`DataRef`] is the text of an expression in kernel source, ie a work item id, a
buffer element or a combination of them. Assigning to a reference appends a
statement to the active kernel.
*/

use crate::{
    buffer::error::InvalidDimensions,
    kernel::scope,
    scalar::{ScalarElem, ScalarType},
};
#[cfg(feature = "half")]
use half::f16;
use std::{
    fmt::{self, Display},
    ops::{Add, Div, Mul, Rem, Sub},
};

/// Prefix of the global id of each dimension.
pub const ID_GLOBAL_NAME: &str = "_sycl_id_global_";
/// Name of the global id of all dimensions, for 2 and 3 dimensional kernels.
pub const ID_GLOBAL_ALL_NAME: &str = "_sycl_id_global_all";

/// Assignment operators.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
pub enum AssignOp {
    Normal,
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
}

impl AssignOp {
    /// The operator with surrounding spaces, ie " += ".
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => " = ",
            Self::Add => " += ",
            Self::Subtract => " -= ",
            Self::Multiply => " *= ",
            Self::Divide => " /= ",
            Self::Modulo => " %= ",
        }
    }
}

/// A reference to a value in a generated kernel.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct DataRef {
    name: String,
}

impl DataRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
    /** The global id of a kernel with `dimensions`.

    1 dimensional kernels use the id of dimension 0, 2 and 3 dimensional kernels
    the vector of all dimensions. Declares the ids in the active kernel.

    `dimensions` is clamped to 1..=3. */
    pub fn global_id(dimensions: u32) -> Self {
        let clamped = dimensions.clamp(1, 3);
        if clamped != dimensions {
            tracing::warn!(dimensions, clamped, "global id dimensions out of range");
        }
        scope::with_active(|source| source.use_global_ids(clamped));
        if clamped == 1 {
            Self::new(format!("{ID_GLOBAL_NAME}0"))
        } else {
            Self::new(ID_GLOBAL_ALL_NAME)
        }
    }
    /** The global id of dimension `n`.

    **errors**

    [`InvalidDimensions`] if `n` is not 0, 1 or 2. */
    pub fn global_id_component(n: u32) -> Result<Self, InvalidDimensions> {
        if n >= 3 {
            return Err(InvalidDimensions {
                dimensions: (n as usize).saturating_add(1),
            });
        }
        scope::with_active(|source| source.use_global_ids(n + 1));
        Ok(Self::new(format!("{ID_GLOBAL_NAME}{n}")))
    }
    /// Casts `value` to `scalar_type`, ie `((float)x)`.
    pub fn cast(scalar_type: ScalarType, value: impl Into<DataRef>) -> Self {
        Self::new(format!("(({}){})", scalar_type.kernel_name(), value.into()))
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    /// The element at `index`, ie `a[i]`.
    pub fn index(&self, index: impl Into<DataRef>) -> Self {
        Self::new(format!("{}[{}]", self.name, index.into()))
    }
    /// A call to `function`, ie `sqrt(x)`.
    pub fn call<I>(function: &str, args: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<DataRef>,
    {
        let args = args
            .into_iter()
            .map(|x| x.into().name)
            .collect::<Vec<_>>()
            .join(", ");
        Self::new(format!("{function}({args})"))
    }
    fn binary(&self, op: &str, rhs: impl Into<DataRef>) -> Self {
        Self::new(format!("({} {op} {})", self.name, rhs.into()))
    }
    pub fn lt(&self, rhs: impl Into<DataRef>) -> Self {
        self.binary("<", rhs)
    }
    pub fn le(&self, rhs: impl Into<DataRef>) -> Self {
        self.binary("<=", rhs)
    }
    pub fn gt(&self, rhs: impl Into<DataRef>) -> Self {
        self.binary(">", rhs)
    }
    pub fn ge(&self, rhs: impl Into<DataRef>) -> Self {
        self.binary(">=", rhs)
    }
    pub fn equals(&self, rhs: impl Into<DataRef>) -> Self {
        self.binary("==", rhs)
    }
    pub fn not_equals(&self, rhs: impl Into<DataRef>) -> Self {
        self.binary("!=", rhs)
    }
    pub fn and(&self, rhs: impl Into<DataRef>) -> Self {
        self.binary("&&", rhs)
    }
    pub fn or(&self, rhs: impl Into<DataRef>) -> Self {
        self.binary("||", rhs)
    }
    /** Appends `self op rhs;` to the active kernel, returning the statement.

    Outside of a kernel nothing is appended and the result is empty. */
    pub fn assign_with(&self, op: AssignOp, rhs: impl Into<DataRef>) -> String {
        let line = format!("{}{}{}", self.name, op.as_str(), rhs.into());
        scope::with_active(|source| {
            source.add(&line);
            line
        })
        .unwrap_or_else(|| {
            scope::violation("assign");
            String::new()
        })
    }
    /// `self = rhs;`
    pub fn assign(&self, rhs: impl Into<DataRef>) -> String {
        self.assign_with(AssignOp::Normal, rhs)
    }
    /// `self += rhs;`
    pub fn add_assign(&self, rhs: impl Into<DataRef>) -> String {
        self.assign_with(AssignOp::Add, rhs)
    }
    /// `self -= rhs;`
    pub fn sub_assign(&self, rhs: impl Into<DataRef>) -> String {
        self.assign_with(AssignOp::Subtract, rhs)
    }
    /// `self *= rhs;`
    pub fn mul_assign(&self, rhs: impl Into<DataRef>) -> String {
        self.assign_with(AssignOp::Multiply, rhs)
    }
    /// `self /= rhs;`
    pub fn div_assign(&self, rhs: impl Into<DataRef>) -> String {
        self.assign_with(AssignOp::Divide, rhs)
    }
    /// `self %= rhs;`
    pub fn rem_assign(&self, rhs: impl Into<DataRef>) -> String {
        self.assign_with(AssignOp::Modulo, rhs)
    }
    /** Declares a variable of `scalar_type` initialized to `value`, returning a
    reference to it. */
    pub fn declare(scalar_type: ScalarType, name: &str, value: impl Into<DataRef>) -> Self {
        scope::add(&format!(
            "{} {name} = {}",
            scalar_type.kernel_name(),
            value.into()
        ));
        Self::new(name)
    }
}

impl Display for DataRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl From<&DataRef> for DataRef {
    fn from(x: &DataRef) -> Self {
        x.clone()
    }
}

impl From<&str> for DataRef {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for DataRef {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

impl From<ScalarElem> for DataRef {
    fn from(x: ScalarElem) -> Self {
        Self::new(x.to_string())
    }
}

macro_rules! impl_from_scalar {
    ($($t:ty),+) => {
        $(
            impl From<$t> for DataRef {
                fn from(x: $t) -> Self {
                    ScalarElem::from(x).into()
                }
            }
        )+
    };
}

impl_from_scalar! {u8, i8, u16, i16, u32, i32, f32, u64, i64, f64}
#[cfg(feature = "half")]
impl_from_scalar! {f16}

macro_rules! impl_binary_op {
    ($($trait:ident::$method:ident => $op:literal),+) => {
        $(
            impl<R: Into<DataRef>> $trait<R> for DataRef {
                type Output = DataRef;
                fn $method(self, rhs: R) -> DataRef {
                    self.binary($op, rhs)
                }
            }

            impl<R: Into<DataRef>> $trait<R> for &DataRef {
                type Output = DataRef;
                fn $method(self, rhs: R) -> DataRef {
                    self.binary($op, rhs)
                }
            }
        )+
    };
}

impl_binary_op! {
    Add::add => "+",
    Sub::sub => "-",
    Mul::mul => "*",
    Div::div => "/",
    Rem::rem => "%"
}
