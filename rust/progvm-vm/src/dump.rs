//! Debug dump: the loaded tables and current data, CSV-style.

use std::io::{self, Write};

use progvm_core::DefType;

use crate::vm::Vm;

impl Vm {
    /// Write every table and the current global data as CSV sections.
    /// A thin formatter over the same state the host APIs read.
    pub fn dump<W: Write>(&self, w: &mut W) -> io::Result<()> {
        let image = &self.image;

        writeln!(w, "Globals:")?;
        writeln!(w, "Number,Name,Type,Offset,Value")?;
        for (i, def) in image.global_defs.iter().enumerate() {
            let offset = def.def.offset as usize;
            write!(
                w,
                "{},{},{},{},",
                i,
                image.name_lossy(def.def.name_offset),
                def.def.def_type().name(),
                offset
            )?;
            match def.def.def_type() {
                DefType::Float => writeln!(w, "{}", self.globals.f32(offset))?,
                DefType::Vector => {
                    let v = self.globals.vec3(offset);
                    writeln!(w, "'{} {} {}'", v[0], v[1], v[2])?
                }
                _ => writeln!(w, "{}", self.globals.i32(offset))?,
            }
        }
        writeln!(w)?;

        writeln!(w, "Fields:")?;
        writeln!(w, "Number,Name,Type,Offset")?;
        for (i, def) in image.field_defs.iter().enumerate() {
            writeln!(
                w,
                "{},{},{},{}",
                i,
                image.name_lossy(def.name_offset),
                def.def_type().name(),
                def.offset
            )?;
        }
        writeln!(w)?;

        writeln!(w, "Functions:")?;
        writeln!(w, "Number,Name,File,LocalsOffset,FirstStatement")?;
        for (i, func) in image.functions.iter().enumerate() {
            writeln!(
                w,
                "{},{},{},{},{}",
                i,
                image.name_lossy(func.name_offset),
                image.name_lossy(func.file_name_offset),
                func.locals_offset,
                func.first_statement
            )?;
        }
        writeln!(w)?;

        writeln!(w, "Statements:")?;
        writeln!(w, "Number,Instruction,A,B,C")?;
        for (i, st) in image.statements.iter().enumerate() {
            writeln!(w, "{},{},{},{},{}", i, st.op.name(), st.a, st.b, st.c)?;
        }
        writeln!(w)?;

        writeln!(w, "Global data:")?;
        writeln!(w, "Offset,AsFloat,AsInt")?;
        for at in 0..self.globals.len() {
            writeln!(w, "{},{},{}", at, self.globals.f32(at), self.globals.i32(at))?;
        }
        writeln!(w)?;

        writeln!(w, "String data:")?;
        for (i, &b) in image.string_data.iter().enumerate() {
            if b < 0x20 {
                write!(w, "?")?;
            } else {
                write!(w, "{}", b as char)?;
            }
            if i & 0x3f == 0x3f {
                writeln!(w)?;
            }
        }
        writeln!(w)?;
        Ok(())
    }
}
