//! Image loading and validation.
//!
//! `Image::parse` turns raw file bytes into validated tables. Nothing
//! else in the runtime re-checks what is validated here, so the checks
//! are the trust boundary: after a successful parse every name offset,
//! global slot operand, jump target, and local window is known to be in
//! bounds. The tables are immutable for the life of the VM.

use std::borrow::Cow;

use progvm_core::{
    DefType, Definition, FunctionDef, ImageHeader, Lump, Opcode, OperandKind, Statement,
    FORMAT_VERSION,
};
use tracing::{debug, warn};

use crate::error::LoadError;
use crate::globals::RESERVED_CELLS;

/// A global definition plus its load-time derived flags.
#[derive(Debug, Clone, Copy)]
pub struct GlobalDef {
    pub def: Definition,
    /// Declared before the `end_sys_fields` sentinel: an engine global.
    pub system: bool,
    /// Offset falls inside some function's local-variable window.
    pub local: bool,
    /// Is itself one of the sentinel definitions.
    pub special: bool,
}

/// The validated, immutable representation of a loaded program.
#[derive(Debug)]
pub struct Image {
    pub crc: i32,
    /// Entity record size in field cells.
    pub entity_size: i32,
    pub statements: Vec<Statement>,
    pub global_defs: Vec<GlobalDef>,
    pub field_defs: Vec<Definition>,
    pub functions: Vec<FunctionDef>,
    pub string_data: Vec<u8>,
    /// Initial global-data cells, raw bits.
    pub global_data: Vec<u32>,
    /// Field offset to owning field type; vector fields win ties.
    pub field_types: Vec<DefType>,
}

impl Image {
    /// Validate and decode a version-6 progs image.
    pub fn parse(bytes: &[u8]) -> Result<Image, LoadError> {
        let header = match ImageHeader::parse(bytes) {
            Some(h) => h,
            None => {
                warn!(size = bytes.len(), "image smaller than its header");
                return Err(LoadError::TooSmall);
            }
        };
        if header.version != FORMAT_VERSION {
            warn!(version = header.version, "image has unsupported version");
            return Err(LoadError::BadVersion(header.version));
        }
        if header.entity_size < 0 {
            return Err(LoadError::EntitySize(header.entity_size));
        }

        let statements_raw = lump_bytes(bytes, header.statements, Statement::SIZE, "statements")?;
        let global_defs_raw =
            lump_bytes(bytes, header.global_defs, Definition::SIZE, "global definitions")?;
        let field_defs_raw =
            lump_bytes(bytes, header.field_defs, Definition::SIZE, "field definitions")?;
        let functions_raw = lump_bytes(bytes, header.functions, FunctionDef::SIZE, "functions")?;
        let string_raw = lump_bytes(bytes, header.string_data, 1, "string data")?;
        let global_raw = lump_bytes(bytes, header.global_data, 4, "global data")?;
        if statements_raw.is_empty() {
            return Err(LoadError::EmptyLump("statements"));
        }
        if string_raw.is_empty() {
            return Err(LoadError::EmptyLump("string data"));
        }

        let mut string_data = string_raw.to_vec();
        let global_data: Vec<u32> = global_raw
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        if global_data.len() < RESERVED_CELLS {
            return Err(LoadError::ReservedCells(global_data.len()));
        }

        let defs: Vec<Definition> = global_defs_raw
            .chunks_exact(Definition::SIZE)
            .filter_map(Definition::parse)
            .collect();
        let field_defs: Vec<Definition> = field_defs_raw
            .chunks_exact(Definition::SIZE)
            .filter_map(Definition::parse)
            .collect();
        let functions: Vec<FunctionDef> = functions_raw
            .chunks_exact(FunctionDef::SIZE)
            .filter_map(FunctionDef::parse)
            .collect();

        for (i, def) in defs.iter().enumerate() {
            if def.name_offset < 0 || def.name_offset as usize >= string_data.len() {
                return Err(LoadError::GlobalDefName(i));
            }
            // vector-typed definitions claim three cells
            let width = def.def_type().width();
            if def.offset < 0 || def.offset as usize + width > global_data.len() {
                return Err(LoadError::GlobalDefOffset(i));
            }
        }
        for (i, def) in field_defs.iter().enumerate() {
            if def.name_offset < 0 || def.name_offset as usize >= string_data.len() {
                return Err(LoadError::FieldDefName(i));
            }
            if def.offset < 0 || i32::from(def.offset) >= header.entity_size {
                return Err(LoadError::FieldDefOffset(i));
            }
        }
        for (i, func) in functions.iter().enumerate() {
            if func.first_statement >= (statements_raw.len() / Statement::SIZE) as i32 {
                return Err(LoadError::FunctionFirstStatement(i));
            }
            if func.locals_offset < 0
                || func.locals_count < 0
                || func.locals_offset as usize + func.locals_count as usize > global_data.len()
            {
                return Err(LoadError::FunctionLocals(i));
            }
            if func.name_offset < 0 || func.name_offset as usize >= string_data.len() {
                return Err(LoadError::FunctionName(i));
            }
            if func.file_name_offset < 0 || func.file_name_offset as usize >= string_data.len() {
                return Err(LoadError::FunctionFileName(i));
            }
            if !(0..=8).contains(&func.parameter_count) {
                return Err(LoadError::FunctionParameters(i));
            }
            let widths = &func.parameter_sizes[..func.parameter_count as usize];
            if widths.iter().any(|&w| w != 1 && w != 3) {
                return Err(LoadError::FunctionParameters(i));
            }
            let total: i32 = widths.iter().map(|&w| i32::from(w)).sum();
            if total > func.locals_count {
                return Err(LoadError::FunctionParameters(i));
            }
        }

        let mut statements = Vec::with_capacity(statements_raw.len() / Statement::SIZE);
        for (i, chunk) in statements_raw.chunks_exact(Statement::SIZE).enumerate() {
            let st = Statement::parse(chunk).map_err(|raw| LoadError::BadOpcode(i, raw))?;
            statements.push(st);
        }
        let count = statements.len();
        for (i, st) in statements.iter().enumerate() {
            for (j, kind) in st.op.operands().into_iter().enumerate() {
                let value = st.operand(j);
                match kind {
                    OperandKind::None => {}
                    OperandKind::Direct => {
                        let target = i as i64 + i64::from(value);
                        if target < 0 || target >= count as i64 {
                            return Err(LoadError::JumpBounds {
                                statement: i,
                                operand: j,
                            });
                        }
                    }
                    slot => {
                        let width = slot.slot_width().unwrap_or(1);
                        if value < 0 || value as usize + width > global_data.len() {
                            return Err(LoadError::OperandBounds {
                                statement: i,
                                operand: j,
                            });
                        }
                    }
                }
            }
        }

        // Defensive normalization, not validation: the blob always ends
        // in a terminator and the program always ends in a halt.
        if let Some(last) = string_data.last_mut() {
            *last = 0;
        }
        if let Some(last) = statements.last_mut() {
            *last = Statement {
                op: Opcode::Done,
                a: 0,
                b: 0,
                c: 0,
            };
        }

        let mut is_local = vec![false; global_data.len()];
        for func in &functions {
            let start = func.locals_offset as usize;
            for cell in &mut is_local[start..start + func.locals_count as usize] {
                *cell = true;
            }
        }
        let mut end_sys = false;
        let global_defs: Vec<GlobalDef> = defs
            .into_iter()
            .map(|def| {
                let name = cstr_at(&string_data, def.name_offset as usize);
                let special = name == b"end_sys_globals" || name == b"end_sys_fields";
                let system = !end_sys;
                if name == b"end_sys_fields" {
                    end_sys = true;
                }
                GlobalDef {
                    def,
                    system,
                    local: is_local[def.offset as usize],
                    special,
                }
            })
            .collect();

        let mut field_types = vec![DefType::None; header.entity_size as usize];
        for def in &field_defs {
            let at = def.offset as usize;
            if field_types[at] != DefType::Vector {
                field_types[at] = def.def_type();
            }
        }

        debug!(
            statements = statements.len(),
            globals = global_defs.len(),
            fields = field_defs.len(),
            functions = functions.len(),
            entity_size = header.entity_size,
            "image validated"
        );

        Ok(Image {
            crc: header.crc,
            entity_size: header.entity_size,
            statements,
            global_defs,
            field_defs,
            functions,
            string_data,
            global_data,
            field_types,
        })
    }

    /// NUL-terminated name at a validated blob offset.
    pub fn name_bytes(&self, offset: i32) -> &[u8] {
        if offset < 0 || offset as usize >= self.string_data.len() {
            return b"";
        }
        cstr_at(&self.string_data, offset as usize)
    }

    /// Display form of [`name_bytes`](Self::name_bytes).
    pub fn name_lossy(&self, offset: i32) -> Cow<'_, str> {
        String::from_utf8_lossy(self.name_bytes(offset))
    }

    /// Declared type of the field owning an entity-record offset.
    pub fn field_type_at(&self, offset: i32) -> DefType {
        if offset < 0 || offset >= self.entity_size {
            return DefType::None;
        }
        self.field_types[offset as usize]
    }
}

fn cstr_at(blob: &[u8], at: usize) -> &[u8] {
    let tail = &blob[at..];
    let end = tail.iter().position(|&b| b == 0).unwrap_or(tail.len());
    &tail[..end]
}

fn lump_bytes<'a>(
    bytes: &'a [u8],
    lump: Lump,
    element_size: usize,
    what: &'static str,
) -> Result<&'a [u8], LoadError> {
    if !lump.fits(element_size, bytes.len()) {
        warn!(what, lump.offset, lump.count, "lump exceeds file bounds");
        return Err(LoadError::LumpBounds(what));
    }
    let start = lump.offset as usize;
    Ok(&bytes[start..start + lump.count as usize * element_size])
}
