//! Runtime for compiled progs images.
//!
//! A [`Vm`] is constructed from the bytes of a version-6 progs image.
//! Construction validates the image completely; a `Vm` value therefore
//! always holds a structurally sound program. The host drives it through
//! typed pointers ([`FloatPtr`], [`VectorPtr`], ...), registers builtin
//! callbacks by number, and runs functions by name:
//!
//! ```no_run
//! use progvm_vm::Vm;
//!
//! let mut vm = Vm::from_file("progs.dat")?;
//! vm.add_builtin(1, |vm, _num| {
//!     let msg = vm.param_string(0).get(vm);
//!     if let Some(text) = vm.string_value(msg) {
//!         println!("{text}");
//!     }
//!     true
//! });
//! let main = vm.function("main");
//! if let Err(kind) = vm.run(main) {
//!     eprintln!("{kind}\n{}", vm.error_messages());
//! }
//! # Ok::<(), progvm_vm::LoadError>(())
//! ```
//!
//! Each `Vm` owns all of its mutable state (globals, entities, strings,
//! builtin registry, error log); independent instances are fully
//! independent and may live on different threads.

mod builtins;
mod data;
mod dump;
mod entities;
mod error;
mod globals;
mod image;
mod run;
mod strings;
mod trace;
mod vm;

pub use progvm_core::DefType;

pub use builtins::BuiltinFn;
pub use data::{
    Entity, EntityPtr, FieldPtr, FieldRef, FloatPtr, FuncRef, FunctionPtr, Str, StringPtr,
    VectorPtr,
};
pub use entities::{EntityManager, DEFAULT_REUSE_DELAY, ENTITIES_PER_PAGE};
pub use error::{ErrorKind, LoadError};
pub use globals::{OFS_PARM0, OFS_RETURN, PARM_STRIDE, RESERVED_CELLS};
pub use image::{GlobalDef, Image};
pub use run::MAX_CALL_DEPTH;
pub use strings::StringManager;
pub use vm::Vm;
