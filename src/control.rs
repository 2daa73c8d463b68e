/*!
Control structures in generated kernels.

Each function appends the header of the structure to the active kernel and runs
the body in a block.

```
# use krnl_source::{anyhow::Result, access::{AccessMode, AccessTarget}, buffer::{Buffer, Range}, control, data_ref::DataRef, kernel, scalar::ScalarType};
# fn main() -> Result<()> {
let y = Buffer::new(ScalarType::I32, Range::d1(64));
let kernel = kernel::command_group("clamp", || {
    let y = y.access(AccessMode::ReadWrite, AccessTarget::GlobalBuffer)?;
    let id = DataRef::global_id(1);
    control::if_(y.at(&id).lt(0i32), || {
        y.at(&id).assign(0i32);
        Ok(())
    })
})?;
assert!(kernel.code().contains("\tif ("));
# Ok(())
# }
```
*/

use crate::{data_ref::DataRef, kernel::scope, result::Result};

fn block(header: String, body: impl FnOnce() -> Result<()>) -> Result<()> {
    scope::add_unterminated(&header);
    scope::open_block();
    body()?;
    scope::close_block()?;
    Ok(())
}

/// `if (condition) { body }`
pub fn if_(condition: impl Into<DataRef>, body: impl FnOnce() -> Result<()>) -> Result<()> {
    block(format!("if ({})", condition.into()), body)
}

/// `else if (condition) { body }`, after [`if_()`].
pub fn else_if(condition: impl Into<DataRef>, body: impl FnOnce() -> Result<()>) -> Result<()> {
    block(format!("else if ({})", condition.into()), body)
}

/// `else { body }`, after [`if_()`] or [`else_if()`].
pub fn else_(body: impl FnOnce() -> Result<()>) -> Result<()> {
    block("else".to_string(), body)
}

/// `while (condition) { body }`
pub fn while_(condition: impl Into<DataRef>, body: impl FnOnce() -> Result<()>) -> Result<()> {
    block(format!("while ({})", condition.into()), body)
}

/// `for (init; condition; step) { body }`
pub fn for_(
    init: &str,
    condition: impl Into<DataRef>,
    step: &str,
    body: impl FnOnce() -> Result<()>,
) -> Result<()> {
    block(format!("for ({init}; {}; {step})", condition.into()), body)
}

/// `for (int var = start; var < end; ++var) { body(var) }`
pub fn for_range(
    var: &str,
    start: impl Into<DataRef>,
    end: impl Into<DataRef>,
    body: impl FnOnce(DataRef) -> Result<()>,
) -> Result<()> {
    let header = format!(
        "for (int {var} = {}; {var} < {}; ++{var})",
        start.into(),
        end.into()
    );
    block(header, || body(DataRef::new(var)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::{name::IdentityCache, source::Source};

    fn lines(f: impl FnOnce() -> Result<()>) -> Result<Vec<String>> {
        let guard = scope::enter(Source::builder("control").build_with(&IdentityCache::new()))?;
        f()?;
        Ok(guard.exit().lines().to_vec())
    }

    #[test]
    fn if_else() -> Result<()> {
        let x = DataRef::new("x");
        let lines = lines(|| {
            if_(x.gt(1i32), || {
                x.assign(1i32);
                Ok(())
            })?;
            else_(|| {
                x.assign(0i32);
                Ok(())
            })
        })?;
        assert_eq!(
            lines,
            [
                "\tif ((x > 1))",
                "\t{",
                "\t\tx = 1;",
                "\t}",
                "\telse",
                "\t{",
                "\t\tx = 0;",
                "\t}",
            ]
        );
        Ok(())
    }

    #[test]
    fn nested_loops() -> Result<()> {
        let sum = DataRef::new("sum");
        let lines = lines(|| {
            for_range("i", 0i32, 4i32, |i| {
                while_(sum.lt(&i), || {
                    sum.add_assign(&i);
                    Ok(())
                })
            })
        })?;
        assert_eq!(
            lines,
            [
                "\tfor (int i = 0; i < 4; ++i)",
                "\t{",
                "\t\twhile ((sum < i))",
                "\t\t{",
                "\t\t\tsum += i;",
                "\t\t}",
                "\t}",
            ]
        );
        Ok(())
    }

    #[test]
    fn body_error_propagates() {
        let result = lines(|| if_("1", || Err(anyhow::format_err!("body failed"))));
        assert!(result.is_err());
        assert!(!scope::in_scope());
    }
}
