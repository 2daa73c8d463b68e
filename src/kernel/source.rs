use super::{
    error::{BlockUnderflow, UnbalancedBlocks},
    name::{IdentityCache, ShapeKey},
    registry::{ParamDesc, ResourceRegistry},
    scope, KernelSource,
};
use crate::{
    access::{AccessMode, AccessTarget},
    buffer::Buffer,
    data_ref::{ID_GLOBAL_ALL_NAME, ID_GLOBAL_NAME},
};
use std::fmt::Write;

/// Builder for creating a [`Source`].
pub struct SourceBuilder {
    shape: ShapeKey,
    kernel_prefix: String,
    resource_prefix: String,
}

impl SourceBuilder {
    /// Prefix of the kernel name, defaults to "_sycl_kernel_".
    pub fn kernel_prefix(self, kernel_prefix: impl Into<String>) -> Self {
        Self {
            kernel_prefix: kernel_prefix.into(),
            ..self
        }
    }
    /// Prefix of resource names, defaults to "_sycl_buf_".
    pub fn resource_prefix(self, resource_prefix: impl Into<String>) -> Self {
        Self {
            resource_prefix: resource_prefix.into(),
            ..self
        }
    }
    /// Creates a source named from the [global](IdentityCache::global) identity cache.
    pub fn build(self) -> Source {
        self.build_with(IdentityCache::global())
    }
    /// Creates a source named from `cache`.
    pub fn build_with(self, cache: &IdentityCache) -> Source {
        let identity = cache.get_identity(&self.shape);
        Source {
            kernel_name: format!("{}{identity}", self.kernel_prefix),
            resource_prefix: self.resource_prefix,
            lines: Vec::new(),
            depth: 0,
            registry: ResourceRegistry::new(),
            global_ids: 0,
        }
    }
}

/** The source of one kernel under construction.

Statements are appended in order, indented by the current block depth. Buffers are
registered in the owned [`ResourceRegistry`] and become the kernel parameters.

Within a [command group](super::command_group) the active source is reached through
[`scope`]; a `Source` can also be driven directly. */
#[derive(Debug)]
pub struct Source {
    kernel_name: String,
    resource_prefix: String,
    lines: Vec<String>,
    depth: usize,
    registry: ResourceRegistry,
    global_ids: u32,
}

impl Source {
    /// A builder for a kernel of `shape`.
    pub fn builder(shape: impl Into<ShapeKey>) -> SourceBuilder {
        SourceBuilder {
            shape: shape.into(),
            kernel_prefix: "_sycl_kernel_".into(),
            resource_prefix: "_sycl_buf_".into(),
        }
    }
    /// A source for a kernel of `shape` with default options.
    pub fn new(shape: impl Into<ShapeKey>) -> Self {
        Self::builder(shape).build()
    }
    /// Appends `line` terminated with ';'.
    pub fn add(&mut self, line: &str) {
        self.push(line, true);
    }
    /// Appends `line` as is, for control structures.
    pub fn add_unterminated(&mut self, line: &str) {
        self.push(line, false);
    }
    fn push(&mut self, line: &str, terminate: bool) {
        let mut output = "\t".repeat(self.depth + 1);
        output.push_str(line);
        if terminate {
            output.push(';');
        }
        tracing::trace!(kernel = %self.kernel_name, line = %output.trim_start(), "line added");
        self.lines.push(output);
    }
    /// Opens a block, increasing the depth.
    pub fn open_block(&mut self) {
        self.push("{", false);
        self.depth += 1;
    }
    /** Closes a block, decreasing the depth.

    **errors**

    [`BlockUnderflow`] if no block is open, the source is unchanged. */
    pub fn close_block(&mut self) -> Result<(), BlockUnderflow> {
        if self.depth == 0 {
            return Err(BlockUnderflow {
                kernel: self.kernel_name.clone(),
            });
        }
        self.depth -= 1;
        self.push("}", false);
        Ok(())
    }
    /// The number of open blocks.
    pub fn depth(&self) -> usize {
        self.depth
    }
    /** Registers `buffer`, returning its resource name.

    New names are the resource prefix followed by the next ordinal of the calling
    thread, see [`scope::enter()`]. */
    pub fn register_resource(
        &mut self,
        buffer: &Buffer,
        mode: AccessMode,
        target: AccessTarget,
        type_name: impl Into<String>,
        size: usize,
    ) -> String {
        let prefix = &self.resource_prefix;
        self.registry
            .register(buffer, mode, target, type_name, size, || {
                format!("{prefix}{}", scope::next_resource_ordinal())
            })
            .to_string()
    }
    pub fn registry(&self) -> &ResourceRegistry {
        &self.registry
    }
    /// Declares the global id variables for `dimensions` at the top of the body.
    pub(crate) fn use_global_ids(&mut self, dimensions: u32) {
        self.global_ids = self.global_ids.max(dimensions.min(3));
    }
    pub fn lines(&self) -> &[String] {
        &self.lines
    }
    pub fn get_kernel_name(&self) -> &str {
        &self.kernel_name
    }
    /** The kernel definition.

    ```text
    __kernel void _sycl_kernel_0(__global const float* _sycl_buf_1, __global float* _sycl_buf_2)
    {
        size_t _sycl_id_global_0 = get_global_id(0);
        _sycl_buf_2[_sycl_id_global_0] = _sycl_buf_1[_sycl_id_global_0];
    }
    ``` */
    pub fn get_code(&self) -> String {
        let mut code = String::new();
        let _ = writeln!(
            &mut code,
            "__kernel void {}({})",
            self.kernel_name,
            self.registry.parameter_list()
        );
        code.push_str("{\n");
        for d in 0..self.global_ids {
            let _ = writeln!(&mut code, "\tsize_t {ID_GLOBAL_NAME}{d} = get_global_id({d});");
        }
        if self.global_ids > 1 {
            let ids = (0..self.global_ids)
                .map(|d| format!("{ID_GLOBAL_NAME}{d}"))
                .collect::<Vec<_>>()
                .join(", ");
            let n = self.global_ids;
            let _ = writeln!(&mut code, "\tint{n} {ID_GLOBAL_ALL_NAME} = (int{n})({ids});");
        }
        for line in self.lines.iter() {
            code.push_str(line);
            code.push('\n');
        }
        code.push_str("}\n");
        code
    }
    /** Finishes the kernel.

    **errors**

    [`UnbalancedBlocks`] if blocks remain open. */
    pub fn finish(self) -> Result<KernelSource, UnbalancedBlocks> {
        if self.depth != 0 {
            return Err(UnbalancedBlocks {
                kernel: self.kernel_name,
                depth: self.depth,
            });
        }
        let code = self.get_code();
        let (params, buffers) = self.registry.into_parts();
        Ok(KernelSource {
            name: self.kernel_name,
            code,
            params,
            buffers,
        })
    }
    /// The parameters of the kernel, in order.
    pub fn params(&self) -> Vec<ParamDesc> {
        self.registry.iter().map(|x| x.desc().clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{buffer::Range, scalar::ScalarType};

    fn source(shape: &str) -> Source {
        Source::builder(shape).build_with(&IdentityCache::new())
    }

    #[test]
    fn lines_are_indented_by_depth() {
        let mut src = source("indent");
        src.add("int x = 0");
        src.add_unterminated("if (x == 0)");
        src.open_block();
        src.add("x = 1");
        src.close_block().unwrap();
        assert_eq!(
            src.lines(),
            ["\tint x = 0;", "\tif (x == 0)", "\t{", "\t\tx = 1;", "\t}"]
        );
    }

    #[test]
    fn balanced_blocks_restore_depth() {
        let mut src = source("balanced");
        src.open_block();
        let depth = src.depth();
        for n in 1..4 {
            for _ in 0..n {
                src.open_block();
            }
            for _ in 0..n {
                src.close_block().unwrap();
            }
            assert_eq!(src.depth(), depth);
        }
    }

    #[test]
    fn close_block_underflow() {
        let mut src = source("underflow");
        src.add("int x = 0");
        assert!(src.close_block().is_err());
        assert_eq!(src.depth(), 0);
        assert_eq!(src.lines().len(), 1);
        src.open_block();
        assert!(src.finish().is_err());
    }

    #[test]
    fn code_lists_params_in_registration_order() {
        let mut src = source("copy");
        let a = Buffer::new(ScalarType::F32, Range::d1(4));
        let b = Buffer::new(ScalarType::F32, Range::d1(4));
        let a_name = src.register_resource(&a, AccessMode::Read, AccessTarget::GlobalBuffer, "float*", 8);
        let b_name = src.register_resource(&b, AccessMode::Write, AccessTarget::GlobalBuffer, "float*", 8);
        assert_ne!(a_name, b_name);
        src.use_global_ids(1);
        src.add(&format!("{b_name}[{ID_GLOBAL_NAME}0] = {a_name}[{ID_GLOBAL_NAME}0]"));
        let code = src.get_code();
        let header = code.lines().next().unwrap();
        assert_eq!(
            header,
            format!(
                "__kernel void {}(__global const float* {a_name}, __global float* {b_name})",
                src.get_kernel_name()
            )
        );
        assert!(code.contains("\tsize_t _sycl_id_global_0 = get_global_id(0);\n"));
        assert!(code.contains(&format!("\t{b_name}[_sycl_id_global_0] = {a_name}[_sycl_id_global_0];\n")));
        assert!(code.ends_with("}\n"));
    }

    #[test]
    fn global_ids_2d() {
        let mut src = source("ids");
        src.use_global_ids(2);
        src.use_global_ids(1);
        let code = src.get_code();
        assert!(code.contains("\tsize_t _sycl_id_global_1 = get_global_id(1);\n"));
        assert!(code.contains(
            "\tint2 _sycl_id_global_all = (int2)(_sycl_id_global_0, _sycl_id_global_1);\n"
        ));
    }

    #[test]
    fn same_shape_same_name() {
        let cache = IdentityCache::new();
        let mut a = Source::builder("shape").build_with(&cache);
        let b = Source::builder("shape").build_with(&cache);
        let c = Source::builder("other").build_with(&cache);
        a.add("int x = 1");
        assert_eq!(a.get_kernel_name(), b.get_kernel_name());
        assert_ne!(a.get_kernel_name(), c.get_kernel_name());
        assert_ne!(a.lines(), b.lines());
    }

    #[test]
    fn prefixes() {
        let src = Source::builder("prefixed")
            .kernel_prefix("k")
            .resource_prefix("buf")
            .build_with(&IdentityCache::new());
        assert_eq!(src.get_kernel_name(), "k0");
    }
}
