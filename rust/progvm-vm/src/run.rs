//! The execution engine.
//!
//! One `run` call executes one top-level function. Nested script calls
//! recurse into `exec`, sharing a single instruction counter so the
//! runaway budget bounds the whole invocation, and carrying a depth so
//! unbounded script recursion cannot exhaust the host stack. Every
//! failure unwinds the entire invocation; there is no script-level
//! recovery.

use progvm_core::Opcode;
use tracing::trace;

use crate::data::FuncRef;
use crate::error::ErrorKind;
use crate::globals::{OFS_PARM0, OFS_RETURN};
use crate::vm::Vm;

/// Nested script calls allowed before the engine gives up.
pub const MAX_CALL_DEPTH: usize = 64;

/// Execution stops once the shared counter has bits in this mask: a
/// budget of 2,097,151 instructions per top-level call.
const RUNAWAY_MASK: u32 = 0xffe0_0000;

/// Why one frame stopped executing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stop {
    Success,
    /// A callee failed and already reported; unwind quietly.
    Propagated,
    EntityRead,
    EntityWrite,
    Runaway,
}

impl FuncRef {
    /// Run this function to completion. See [`Vm::run`].
    pub fn run(&self, vm: &mut Vm) -> Result<(), ErrorKind> {
        vm.run(*self)
    }
}

impl Vm {
    /// Run a function to completion.
    ///
    /// On failure the error log holds the report and backtrace until
    /// [`Vm::clear_errors`]; the return slot is unspecified and must not
    /// be trusted.
    pub fn run(&mut self, func: FuncRef) -> Result<(), ErrorKind> {
        debug_assert_eq!(func.vm, self.id());
        let mut count = 0u32;
        if self.exec(func.index, &mut count, 0) {
            Ok(())
        } else {
            let kind = self.errors.last().unwrap_or(ErrorKind::FunctionNotFound);
            trace!(?kind, "run failed");
            Err(kind)
        }
    }

    /// Execute one function frame. Returns false when execution was
    /// halted by an error, which has then already been reported.
    pub(crate) fn exec(&mut self, function_index: i32, count: &mut u32, depth: usize) -> bool {
        if function_index <= 0 || function_index as usize >= self.image.functions.len() {
            self.errors
                .begin(ErrorKind::FunctionNotFound, "invalid function index");
            self.errors
                .add_line(&format!("no function with index {function_index}"));
            return false;
        }
        let func = self.image.functions[function_index as usize];

        if func.is_builtin() {
            let number = func.builtin_number();
            let ok = self.run_builtin(number);
            if !ok {
                let name = self.image.name_lossy(func.name_offset).into_owned();
                self.errors.add_line(&format!("in builtin #{number}: {name}"));
            }
            return ok;
        }

        if depth >= MAX_CALL_DEPTH {
            self.errors
                .begin(ErrorKind::CallDepthExceeded, "maximum call depth exceeded");
            let name = self.image.name_lossy(func.name_offset).into_owned();
            self.errors
                .add_line(&format!("calling {name} at depth {depth}"));
            return false;
        }

        // Prologue: set the caller's locals aside, move the call's
        // parameter slots into the callee's window.
        let window = func.locals_offset as usize;
        let saved = self.globals.save_window(window, func.locals_count as usize);
        let mut ofs = window;
        for (i, &width) in func.parameter_sizes[..func.parameter_count as usize]
            .iter()
            .enumerate()
        {
            for j in 0..width as usize {
                let bits = self.globals.cell(OFS_PARM0 + i * 3 + j);
                self.globals.set_cell(ofs, bits);
                ofs += 1;
            }
        }

        let mut pc = func.first_statement as usize;
        let stop = loop {
            if *count & RUNAWAY_MASK != 0 {
                break Stop::Runaway;
            }
            *count += 1;

            let Some(&st) = self.image.statements.get(pc) else {
                self.errors
                    .begin(ErrorKind::InvalidInstruction, "program counter out of range");
                break Stop::Propagated;
            };
            let (a, b, c) = (st.a, st.b, st.c);
            let g = |v: i16| v as usize;

            match st.op {
                // -- return ------------------------------------------------
                Opcode::Done | Opcode::Return => {
                    self.globals.copy3(g(a), OFS_RETURN);
                    break Stop::Success;
                }

                // -- arithmetic --------------------------------------------
                Opcode::MulF => self.bin_f(a, b, c, |x, y| x * y),
                Opcode::MulV => {
                    let x = self.globals.vec3(g(a));
                    let y = self.globals.vec3(g(b));
                    self.globals
                        .set_f32(g(c), x[0] * y[0] + x[1] * y[1] + x[2] * y[2]);
                }
                Opcode::MulFv => {
                    let s = self.globals.f32(g(a));
                    let v = self.globals.vec3(g(b));
                    self.globals.set_vec3(g(c), [s * v[0], s * v[1], s * v[2]]);
                }
                Opcode::MulVf => {
                    let v = self.globals.vec3(g(a));
                    let s = self.globals.f32(g(b));
                    self.globals.set_vec3(g(c), [v[0] * s, v[1] * s, v[2] * s]);
                }
                Opcode::DivF => self.bin_f(a, b, c, |x, y| x / y),
                Opcode::AddF => self.bin_f(a, b, c, |x, y| x + y),
                Opcode::AddV => self.bin_v(a, b, c, |x, y| x + y),
                Opcode::SubF => self.bin_f(a, b, c, |x, y| x - y),
                Opcode::SubV => self.bin_v(a, b, c, |x, y| x - y),

                // -- equality ----------------------------------------------
                Opcode::EqF => self.cmp_f(a, b, c, |x, y| x == y),
                Opcode::EqV => {
                    let eq = self.globals.vec3(g(a)) == self.globals.vec3(g(b));
                    self.globals.set_f32(g(c), bool_f(eq));
                }
                Opcode::EqS => {
                    let eq = self.string_bytes(g(a)) == self.string_bytes(g(b));
                    self.globals.set_f32(g(c), bool_f(eq));
                }
                Opcode::EqE | Opcode::EqFnc => {
                    let eq = self.globals.i32(g(a)) == self.globals.i32(g(b));
                    self.globals.set_f32(g(c), bool_f(eq));
                }

                // -- inequality --------------------------------------------
                Opcode::NeF => self.cmp_f(a, b, c, |x, y| x != y),
                Opcode::NeV => {
                    let ne = self.globals.vec3(g(a)) != self.globals.vec3(g(b));
                    self.globals.set_f32(g(c), bool_f(ne));
                }
                Opcode::NeS => {
                    let ne = self.string_bytes(g(a)) != self.string_bytes(g(b));
                    self.globals.set_f32(g(c), bool_f(ne));
                }
                Opcode::NeE | Opcode::NeFnc => {
                    let ne = self.globals.i32(g(a)) != self.globals.i32(g(b));
                    self.globals.set_f32(g(c), bool_f(ne));
                }

                // -- comparison --------------------------------------------
                Opcode::Le => self.cmp_f(a, b, c, |x, y| x <= y),
                Opcode::Ge => self.cmp_f(a, b, c, |x, y| x >= y),
                Opcode::Lt => self.cmp_f(a, b, c, |x, y| x < y),
                Opcode::Gt => self.cmp_f(a, b, c, |x, y| x > y),

                // -- entity loads ------------------------------------------
                Opcode::LoadF => {
                    let (ent, field) = (self.globals.i32(g(a)), self.globals.i32(g(b)));
                    match self.entities.read_float(ent, field) {
                        Some(v) => self.globals.set_f32(g(c), v),
                        None => break Stop::EntityRead,
                    }
                }
                Opcode::LoadV => {
                    let (ent, field) = (self.globals.i32(g(a)), self.globals.i32(g(b)));
                    match self.entities.read_vector(ent, field) {
                        Some(v) => self.globals.set_vec3(g(c), v),
                        None => break Stop::EntityRead,
                    }
                }
                Opcode::LoadS | Opcode::LoadEnt | Opcode::LoadFld | Opcode::LoadFnc => {
                    let (ent, field) = (self.globals.i32(g(a)), self.globals.i32(g(b)));
                    match self.entities.read_int(ent, field) {
                        Some(v) => self.globals.set_i32(g(c), v),
                        None => break Stop::EntityRead,
                    }
                }

                // -- address-of --------------------------------------------
                Opcode::Address => {
                    let (ent, field) = (self.globals.i32(g(a)), self.globals.i32(g(b)));
                    let addr = self.entities.address_of(ent, field);
                    self.globals.set_i32(g(c), addr);
                }

                // -- direct stores -----------------------------------------
                Opcode::StoreF
                | Opcode::StoreS
                | Opcode::StoreEnt
                | Opcode::StoreFld
                | Opcode::StoreFnc => {
                    let bits = self.globals.cell(g(a));
                    self.globals.set_cell(g(b), bits);
                }
                Opcode::StoreV => self.globals.copy3(g(a), g(b)),

                // -- addressed stores --------------------------------------
                Opcode::StorepF => {
                    let addr = self.globals.i32(g(b));
                    let v = self.globals.f32(g(a));
                    if !self.entities.write_float(addr, v) {
                        break Stop::EntityWrite;
                    }
                }
                Opcode::StorepV => {
                    let addr = self.globals.i32(g(b));
                    let v = self.globals.vec3(g(a));
                    if !self.entities.write_vector(addr, v) {
                        break Stop::EntityWrite;
                    }
                }
                Opcode::StorepS | Opcode::StorepEnt | Opcode::StorepFld | Opcode::StorepFnc => {
                    let addr = self.globals.i32(g(b));
                    let v = self.globals.i32(g(a));
                    if !self.entities.write_int(addr, v) {
                        break Stop::EntityWrite;
                    }
                }

                // -- logical not -------------------------------------------
                Opcode::NotF => {
                    let z = self.globals.f32(g(a)) == 0.0;
                    self.globals.set_f32(g(c), bool_f(z));
                }
                Opcode::NotV => {
                    let z = self.globals.vec3(g(a)) == [0.0, 0.0, 0.0];
                    self.globals.set_f32(g(c), bool_f(z));
                }
                Opcode::NotS | Opcode::NotEnt | Opcode::NotFnc => {
                    let z = self.globals.i32(g(a)) == 0;
                    self.globals.set_f32(g(c), bool_f(z));
                }

                // -- jumps -------------------------------------------------
                Opcode::If => {
                    if self.globals.f32(g(a)) != 0.0 {
                        pc = jump(pc, b);
                        continue;
                    }
                }
                Opcode::IfNot => {
                    if self.globals.f32(g(a)) == 0.0 {
                        pc = jump(pc, b);
                        continue;
                    }
                }
                Opcode::Goto => {
                    pc = jump(pc, a);
                    continue;
                }

                // -- calls -------------------------------------------------
                Opcode::Call0
                | Opcode::Call1
                | Opcode::Call2
                | Opcode::Call3
                | Opcode::Call4
                | Opcode::Call5
                | Opcode::Call6
                | Opcode::Call7
                | Opcode::Call8 => {
                    self.call_parameters = st.op.call_arg_count().unwrap_or(0);
                    let callee = self.globals.i32(g(a));
                    if !self.exec(callee, count, depth + 1) {
                        break Stop::Propagated;
                    }
                }

                // -- state -------------------------------------------------
                Opcode::State => {
                    self.errors
                        .begin(ErrorKind::NotImplemented, "STATE instruction not implemented");
                    break Stop::Propagated;
                }

                // -- logical and bitwise -----------------------------------
                Opcode::And => {
                    let r = self.globals.f32(g(a)) != 0.0 && self.globals.f32(g(b)) != 0.0;
                    self.globals.set_f32(g(c), bool_f(r));
                }
                Opcode::Or => {
                    let r = self.globals.f32(g(a)) != 0.0 || self.globals.f32(g(b)) != 0.0;
                    self.globals.set_f32(g(c), bool_f(r));
                }
                Opcode::BitAnd => {
                    self.bin_f(a, b, c, |x, y| ((x as i32) & (y as i32)) as f32)
                }
                Opcode::BitOr => self.bin_f(a, b, c, |x, y| ((x as i32) | (y as i32)) as f32),
            }

            pc += 1;
        };

        match stop {
            Stop::EntityRead => self
                .errors
                .begin(ErrorKind::InvalidRead, "attempted read from invalid entity"),
            Stop::EntityWrite => self
                .errors
                .begin(ErrorKind::InvalidWrite, "attempted write to invalid entity"),
            Stop::Runaway => self
                .errors
                .begin(ErrorKind::RunawayLoop, "maximum instruction limit reached"),
            Stop::Success | Stop::Propagated => {}
        }
        if stop != Stop::Success {
            self.trace_function(func, pc);
        }

        // Epilogue: the caller's locals come back even when unwinding.
        self.globals.restore_window(window, &saved);

        stop == Stop::Success
    }

    fn run_builtin(&mut self, number: i32) -> bool {
        let Some(callback) = self.builtins.lookup(number) else {
            self.errors
                .begin(ErrorKind::BuiltinNotFound, "builtin not found");
            self.errors.add_line(&format!(
                "builtin #{number} has no registration and no catch-all"
            ));
            return false;
        };
        callback(self, number)
    }

    fn bin_f(&mut self, a: i16, b: i16, c: i16, op: impl Fn(f32, f32) -> f32) {
        let r = op(self.globals.f32(a as usize), self.globals.f32(b as usize));
        self.globals.set_f32(c as usize, r);
    }

    fn bin_v(&mut self, a: i16, b: i16, c: i16, op: impl Fn(f32, f32) -> f32) {
        let x = self.globals.vec3(a as usize);
        let y = self.globals.vec3(b as usize);
        self.globals.set_vec3(
            c as usize,
            [op(x[0], y[0]), op(x[1], y[1]), op(x[2], y[2])],
        );
    }

    fn cmp_f(&mut self, a: i16, b: i16, c: i16, op: impl Fn(f32, f32) -> bool) {
        let r = op(self.globals.f32(a as usize), self.globals.f32(b as usize));
        self.globals.set_f32(c as usize, bool_f(r));
    }

    /// Bytes of the string whose handle sits in a global slot; invalid
    /// handles compare as the empty string.
    fn string_bytes(&self, at: usize) -> &[u8] {
        self.strings.get(self.globals.i32(at)).unwrap_or(b"")
    }
}

fn bool_f(v: bool) -> f32 {
    if v {
        1.0
    } else {
        0.0
    }
}

/// Branch target: signed offset from the current statement. Validated
/// in bounds at load time.
fn jump(pc: usize, offset: i16) -> usize {
    (pc as i64 + i64::from(offset)) as usize
}
