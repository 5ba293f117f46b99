use std::collections::HashMap;

use abir_ir::DataType;

/// One row of a method's exception table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatchEntry {
    pub try_begin: u32,
    /// Exclusive.
    pub try_end: u32,
    pub handler_pc: u32,
    /// Exception type id; 0 catches everything.
    pub type_id: u32,
}

/// Everything the builder needs to know about one method.
#[derive(Debug, Clone)]
pub struct MethodDescriptor<'a> {
    pub name: String,
    /// Bytecode, borrowed from the shared file buffer.
    pub code: &'a [u8],
    pub num_vregs: usize,
    pub num_args: usize,
    /// Declared argument types; missing entries are `Any`.
    pub arg_types: Vec<DataType>,
    pub catches: Vec<CatchEntry>,
}

impl<'a> MethodDescriptor<'a> {
    pub fn new(name: impl Into<String>, code: &'a [u8], num_vregs: usize, num_args: usize) -> Self {
        Self {
            name: name.into(),
            code,
            num_vregs,
            num_args,
            arg_types: Vec::new(),
            catches: Vec::new(),
        }
    }

    pub fn with_arg_types(mut self, types: Vec<DataType>) -> Self {
        self.arg_types = types;
        self
    }

    pub fn with_catch(mut self, try_begin: u32, try_end: u32, handler_pc: u32, type_id: u32) -> Self {
        self.catches.push(CatchEntry {
            try_begin,
            try_end,
            handler_pc,
            type_id,
        });
        self
    }

    pub fn arg_type(&self, index: usize) -> DataType {
        self.arg_types.get(index).copied().unwrap_or(DataType::Any)
    }
}

/// Signature of a call target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalleeInfo {
    pub num_args: usize,
    pub return_type: DataType,
}

/// Resolves `call` method ids to their signatures.
pub trait CalleeResolver {
    fn resolve_callee(&self, method_id: u32) -> Option<CalleeInfo>;
}

impl CalleeResolver for HashMap<u32, CalleeInfo> {
    fn resolve_callee(&self, method_id: u32) -> Option<CalleeInfo> {
        self.get(&method_id).copied()
    }
}

/// Resolver for code without calls; every callee is unknown.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCallees;

impl CalleeResolver for NoCallees {
    fn resolve_callee(&self, _method_id: u32) -> Option<CalleeInfo> {
        None
    }
}
