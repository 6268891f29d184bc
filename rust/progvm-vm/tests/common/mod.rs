//! In-memory progs image assembly for tests.
//!
//! Builds structurally valid version-6 images so the suites can
//! exercise the loader and interpreter without fixture files on disk.
#![allow(dead_code)]

use progvm_core::Opcode;

pub const VERSION: i32 = 6;

/// Raw function record fields the builder exposes.
#[derive(Debug, Clone)]
struct RawFunction {
    first_statement: i32,
    locals_offset: i32,
    locals_count: i32,
    name_offset: i32,
    file_name_offset: i32,
    parameter_sizes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct ImageBuilder {
    pub version: i32,
    pub crc: i32,
    pub entity_size: i32,
    statements: Vec<(u16, i16, i16, i16)>,
    global_defs: Vec<(u16, i16, i32)>,
    field_defs: Vec<(u16, i16, i32)>,
    functions: Vec<RawFunction>,
    strings: Vec<u8>,
    globals: Vec<u32>,
}

impl ImageBuilder {
    /// An empty image: null string, null function, reserved globals,
    /// and a terminating DONE the loader would force anyway.
    pub fn new() -> ImageBuilder {
        let mut b = ImageBuilder {
            version: VERSION,
            crc: 0x1234,
            entity_size: 0,
            statements: Vec::new(),
            global_defs: Vec::new(),
            field_defs: Vec::new(),
            functions: Vec::new(),
            strings: vec![0],
            globals: vec![0; 28],
        };
        b.functions.push(RawFunction {
            first_statement: 0,
            locals_offset: 0,
            locals_count: 0,
            name_offset: 0,
            file_name_offset: 0,
            parameter_sizes: Vec::new(),
        });
        b
    }

    pub fn add_string(&mut self, s: &str) -> i32 {
        let at = self.strings.len() as i32;
        self.strings.extend_from_slice(s.as_bytes());
        self.strings.push(0);
        at
    }

    /// Append one global cell, returning its offset.
    pub fn add_cell(&mut self, bits: u32) -> i16 {
        self.globals.push(bits);
        (self.globals.len() - 1) as i16
    }

    pub fn add_float_cell(&mut self, v: f32) -> i16 {
        self.add_cell(v.to_bits())
    }

    pub fn add_vector_cells(&mut self, v: [f32; 3]) -> i16 {
        let at = self.add_cell(v[0].to_bits());
        self.add_cell(v[1].to_bits());
        self.add_cell(v[2].to_bits());
        at
    }

    pub fn add_global_def(&mut self, ty: u16, offset: i16, name: &str) {
        let name_offset = self.add_string(name);
        self.global_defs.push((ty, offset, name_offset));
    }

    /// Cell plus definition in one step; returns the cell offset.
    pub fn add_float_global(&mut self, name: &str, v: f32) -> i16 {
        let at = self.add_float_cell(v);
        self.add_global_def(2, at, name);
        at
    }

    pub fn add_vector_global(&mut self, name: &str, v: [f32; 3]) -> i16 {
        let at = self.add_vector_cells(v);
        self.add_global_def(3, at, name);
        at
    }

    pub fn add_string_global(&mut self, name: &str, handle: i32) -> i16 {
        let at = self.add_cell(handle as u32);
        self.add_global_def(1, at, name);
        at
    }

    pub fn add_entity_global(&mut self, name: &str) -> i16 {
        let at = self.add_cell(0);
        self.add_global_def(4, at, name);
        at
    }

    pub fn add_function_global(&mut self, name: &str, index: i32) -> i16 {
        let at = self.add_cell(index as u32);
        self.add_global_def(6, at, name);
        at
    }

    pub fn add_field_def(&mut self, ty: u16, offset: i16, name: &str) {
        let name_offset = self.add_string(name);
        self.field_defs.push((ty, offset, name_offset));
    }

    /// A global definition with a raw, possibly invalid name offset.
    pub fn global_defs_raw(&mut self, ty: u16, offset: i16, name_offset: i32) {
        self.global_defs.push((ty, offset, name_offset));
    }

    /// Shrink global data below the reserved minimum.
    pub fn truncate_globals(&mut self, cells: usize) {
        self.globals.truncate(cells);
    }

    /// A field-offset cell with a field-typed global def, as compilers
    /// emit for `.float x;` style declarations.
    pub fn add_field_ref_global(&mut self, name: &str, field_offset: i32) -> i16 {
        let at = self.add_cell(field_offset as u32);
        self.add_global_def(5, at, name);
        at
    }

    pub fn op(&mut self, op: Opcode, a: i16, b: i16, c: i16) -> i32 {
        self.raw_op(op as u16, a, b, c)
    }

    pub fn raw_op(&mut self, op: u16, a: i16, b: i16, c: i16) -> i32 {
        self.statements.push((op, a, b, c));
        (self.statements.len() - 1) as i32
    }

    /// Append a function whose body starts at the next statement
    /// emitted; returns the function index.
    pub fn add_function(
        &mut self,
        name: &str,
        first_statement: i32,
        locals_offset: i32,
        locals_count: i32,
        parameter_sizes: &[u8],
    ) -> i32 {
        let name_offset = self.add_string(name);
        self.functions.push(RawFunction {
            first_statement,
            locals_offset,
            locals_count,
            name_offset,
            file_name_offset: 0,
            parameter_sizes: parameter_sizes.to_vec(),
        });
        (self.functions.len() - 1) as i32
    }

    /// Reserve a local window of `count` cells, returning its offset.
    pub fn add_locals(&mut self, count: usize) -> i32 {
        let at = self.globals.len() as i32;
        self.globals.extend(std::iter::repeat(0).take(count));
        at
    }

    /// Declare a builtin: a function record with a negated number
    /// instead of a statement index. Returns the function index.
    pub fn add_builtin_function(&mut self, name: &str, number: i32) -> i32 {
        self.add_function(name, -number, 0, 0, &[])
    }

    /// Append unnamed zero cells, e.g. to give a trailing float global
    /// the three-cell extent the return operand reads.
    pub fn pad(&mut self, cells: usize) {
        self.globals.extend(std::iter::repeat(0).take(cells));
    }

    pub fn build(&self) -> Vec<u8> {
        let mut out = vec![0u8; 64];

        let statements_offset = out.len() as i32;
        for &(op, a, b, c) in &self.statements {
            out.extend_from_slice(&op.to_le_bytes());
            out.extend_from_slice(&a.to_le_bytes());
            out.extend_from_slice(&b.to_le_bytes());
            out.extend_from_slice(&c.to_le_bytes());
        }

        let global_defs_offset = out.len() as i32;
        for &(ty, offset, name) in &self.global_defs {
            out.extend_from_slice(&ty.to_le_bytes());
            out.extend_from_slice(&offset.to_le_bytes());
            out.extend_from_slice(&name.to_le_bytes());
        }

        let field_defs_offset = out.len() as i32;
        for &(ty, offset, name) in &self.field_defs {
            out.extend_from_slice(&ty.to_le_bytes());
            out.extend_from_slice(&offset.to_le_bytes());
            out.extend_from_slice(&name.to_le_bytes());
        }

        let functions_offset = out.len() as i32;
        for func in &self.functions {
            out.extend_from_slice(&func.first_statement.to_le_bytes());
            out.extend_from_slice(&func.locals_offset.to_le_bytes());
            out.extend_from_slice(&func.locals_count.to_le_bytes());
            out.extend_from_slice(&0i32.to_le_bytes()); // profiling
            out.extend_from_slice(&func.name_offset.to_le_bytes());
            out.extend_from_slice(&func.file_name_offset.to_le_bytes());
            out.extend_from_slice(&(func.parameter_sizes.len() as i32).to_le_bytes());
            let mut sizes = [0u8; 8];
            sizes[..func.parameter_sizes.len()].copy_from_slice(&func.parameter_sizes);
            out.extend_from_slice(&sizes);
        }

        let string_offset = out.len() as i32;
        out.extend_from_slice(&self.strings);

        let global_offset = out.len() as i32;
        for &cell in &self.globals {
            out.extend_from_slice(&cell.to_le_bytes());
        }

        let header: [i32; 16] = [
            self.version,
            self.crc,
            statements_offset,
            self.statements.len() as i32,
            global_defs_offset,
            self.global_defs.len() as i32,
            field_defs_offset,
            self.field_defs.len() as i32,
            functions_offset,
            self.functions.len() as i32,
            string_offset,
            self.strings.len() as i32,
            global_offset,
            self.globals.len() as i32,
            self.entity_size,
            0,
        ];
        for (i, v) in header.iter().enumerate() {
            out[i * 4..i * 4 + 4].copy_from_slice(&v.to_le_bytes());
        }
        out
    }
}

impl Default for ImageBuilder {
    fn default() -> Self {
        Self::new()
    }
}
