use crate::{
    access::{AccessMode, AccessTarget},
    buffer::{Buffer, BufferId},
};
use fxhash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// A buffer exposed to a kernel.
#[derive(Clone, Debug)]
pub struct ResourceEntry {
    buffer: Buffer,
    desc: ParamDesc,
}

impl ResourceEntry {
    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }
    pub fn desc(&self) -> &ParamDesc {
        &self.desc
    }
    pub fn name(&self) -> &str {
        &self.desc.name
    }
}

/// A kernel parameter.
#[derive(Clone, Eq, PartialEq, Hash, Debug, Serialize, Deserialize)]
pub struct ParamDesc {
    /// The generated resource name.
    pub name: String,
    /// The parameter type, ie "float*".
    pub type_name: String,
    pub mode: AccessMode,
    pub target: AccessTarget,
    /// The size of the argument in bytes.
    pub size: usize,
}

impl ParamDesc {
    /** Renders the parameter declaration.

    ie `__global const float* _sycl_buf_1`. Read only resources in global or
    constant memory are declared `const`. */
    pub fn declaration(&self) -> String {
        let mut output = String::new();
        if let Some(qualifier) = self.target.qualifier() {
            output.push_str(qualifier);
            output.push(' ');
        }
        if self.mode.is_read() && !self.target.is_local() {
            output.push_str("const ");
        }
        let _ = write!(&mut output, "{} {}", self.type_name, self.name);
        output
    }
}

/** The buffers referenced by one kernel.

Each distinct buffer is registered once, entries keep the order in which buffers
were first referenced. That order is the order of the kernel parameters. */
#[derive(Default, Debug)]
pub struct ResourceRegistry {
    entries: Vec<ResourceEntry>,
    index: FxHashMap<BufferId, usize>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }
    /** Registers `buffer`, returning its resource name.

    If the buffer is already registered the existing name is returned and the
    registry is unchanged, even if `mode` or `target` differ. Otherwise `name` is
    called to allocate a new name. */
    pub fn register(
        &mut self,
        buffer: &Buffer,
        mode: AccessMode,
        target: AccessTarget,
        type_name: impl Into<String>,
        size: usize,
        name: impl FnOnce() -> String,
    ) -> &str {
        let id = buffer.id();
        let index = if let Some(index) = self.index.get(&id).copied() {
            index
        } else {
            let index = self.entries.len();
            let desc = ParamDesc {
                name: name(),
                type_name: type_name.into(),
                mode,
                target,
                size,
            };
            tracing::trace!(buffer = ?id, resource = %desc.name, %mode, %target, "resource registered");
            self.entries.push(ResourceEntry {
                buffer: buffer.clone(),
                desc,
            });
            self.index.insert(id, index);
            index
        };
        self.entries[index].name()
    }
    /// The entry for `buffer`, if registered.
    pub fn get(&self, buffer: BufferId) -> Option<&ResourceEntry> {
        self.index.get(&buffer).map(|index| &self.entries[*index])
    }
    pub fn len(&self) -> usize {
        self.entries.len()
    }
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
    /// Entries in parameter order.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = &ResourceEntry> + '_ {
        self.entries.iter()
    }
    /// The parameter list, ie `__global float* a, __global const float* b`.
    pub fn parameter_list(&self) -> String {
        self.entries
            .iter()
            .map(|x| x.desc.declaration())
            .collect::<Vec<_>>()
            .join(", ")
    }
    pub(crate) fn into_parts(self) -> (Vec<ParamDesc>, Vec<Buffer>) {
        self.entries.into_iter().map(|x| (x.desc, x.buffer)).unzip()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{buffer::Range, scalar::ScalarType};

    fn register(
        registry: &mut ResourceRegistry,
        buffer: &Buffer,
        mode: AccessMode,
        counter: &mut usize,
    ) -> String {
        registry
            .register(buffer, mode, AccessTarget::GlobalBuffer, "float*", 8, || {
                *counter += 1;
                format!("res{counter}")
            })
            .to_string()
    }

    #[test]
    fn registration_is_idempotent() {
        let mut registry = ResourceRegistry::new();
        let mut counter = 0;
        let a = Buffer::new(ScalarType::F32, Range::d1(4));
        let first = register(&mut registry, &a, AccessMode::Read, &mut counter);
        let second = register(&mut registry, &a.clone(), AccessMode::Write, &mut counter);
        assert_eq!(first, second);
        assert_eq!(registry.len(), 1);
        assert_eq!(counter, 1);
        assert_eq!(registry.get(a.id()).unwrap().desc().mode, AccessMode::Read);
    }

    #[test]
    fn distinct_buffers_get_distinct_names() {
        let mut registry = ResourceRegistry::new();
        let mut counter = 0;
        let buffers: Vec<_> = (0..5)
            .map(|_| Buffer::new(ScalarType::F32, Range::d1(4)))
            .collect();
        let mut names: Vec<_> = buffers
            .iter()
            .map(|x| register(&mut registry, x, AccessMode::ReadWrite, &mut counter))
            .collect();
        let order = names.clone();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 5);
        let entries: Vec<_> = registry.iter().map(|x| x.name().to_string()).collect();
        assert_eq!(entries, order);
    }

    #[test]
    fn parameter_declarations() {
        let desc = ParamDesc {
            name: "_sycl_buf_1".into(),
            type_name: "float*".into(),
            mode: AccessMode::Read,
            target: AccessTarget::GlobalBuffer,
            size: 8,
        };
        assert_eq!(desc.declaration(), "__global const float* _sycl_buf_1");
        let desc = ParamDesc {
            mode: AccessMode::Write,
            target: AccessTarget::ConstantBuffer,
            ..desc
        };
        assert_eq!(desc.declaration(), "__constant float* _sycl_buf_1");
        let desc = ParamDesc {
            mode: AccessMode::Read,
            target: AccessTarget::Local,
            ..desc
        };
        assert_eq!(desc.declaration(), "__local float* _sycl_buf_1");
    }

    #[test]
    fn registry_holds_a_buffer_handle() {
        let mut registry = ResourceRegistry::new();
        let mut counter = 0;
        let a = Buffer::new(ScalarType::U32, Range::d1(4));
        register(&mut registry, &a, AccessMode::Read, &mut counter);
        assert_eq!(a.owners(), 2);
        let (params, buffers) = registry.into_parts();
        assert_eq!(params.len(), 1);
        assert_eq!(buffers[0], a);
    }
}
