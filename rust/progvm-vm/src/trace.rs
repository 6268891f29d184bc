//! Failure backtrace formatting.
//!
//! When a frame stops with an error it appends its function name and up
//! to six statements ending at the failing one, newest first. Operands
//! are annotated from the operand-kind table with the global's resolved
//! name and current value, so the log reads like a tiny disassembly of
//! the crash site.

use std::borrow::Cow;
use std::fmt::Write;

use progvm_core::{DefType, FunctionDef, Opcode, OperandKind};

use crate::vm::Vm;

impl Vm {
    pub(crate) fn trace_function(&mut self, func: FunctionDef, pc: usize) {
        let mut out = String::new();
        let _ = writeln!(out, "  in {}", self.image.name_lossy(func.name_offset));

        let mut idx = pc as i64;
        for _ in 0..6 {
            if idx < 0 {
                break;
            }
            let Some(&st) = self.image.statements.get(idx as usize) else {
                break;
            };
            if st.op == Opcode::Done {
                break;
            }
            let _ = write!(out, "{}: {} ", idx, st.op.name());
            for (j, kind) in st.op.operands().into_iter().enumerate() {
                let value = st.operand(j);
                let _ = write!(out, "{value}");
                match kind {
                    OperandKind::None => {}
                    OperandKind::Direct => {
                        let _ = write!(out, "(*direct*)");
                    }
                    OperandKind::Float => {
                        let at = value as usize;
                        let name = self.global_name_at(value, Some(DefType::Float));
                        let _ = write!(out, "({})={}", name, self.globals.f32(at));
                    }
                    OperandKind::Vector => {
                        let at = value as usize;
                        let name = self.global_name_at(value, Some(DefType::Vector));
                        let v = self.globals.vec3(at);
                        let _ = write!(out, "({})='{} {} {}'", name, v[0], v[1], v[2]);
                    }
                    _ => {
                        let at = value as usize;
                        let name = self.global_name_at(value, None);
                        let _ = write!(out, "({})={}", name, self.globals.i32(at));
                    }
                }
                let _ = write!(out, " ");
            }
            let _ = writeln!(out);
            idx -= 1;
        }
        self.errors.append(&out);
    }

    /// Name of the global definition at a data offset, optionally
    /// filtered by declared type; `?` when nothing matches.
    fn global_name_at(&self, offset: i16, ty: Option<DefType>) -> Cow<'_, str> {
        for def in &self.image.global_defs {
            if def.def.offset != offset {
                continue;
            }
            if let Some(ty) = ty {
                if def.def.def_type() != ty {
                    continue;
                }
            }
            return self.image.name_lossy(def.def.name_offset);
        }
        Cow::Borrowed("?")
    }
}
