//! Typed values and pointers for the host-facing API.
//!
//! Globals and entity fields are plain cells internally; these wrappers
//! keep the host from reading a cell as the wrong kind. Every wrapper
//! remembers which VM created it. Reads through a null pointer yield the
//! kind's zero value and writes through one are ignored, so a failed
//! lookup degrades quietly; mixing wrappers between VM instances is a
//! caller bug and fails a debug assertion.

use std::borrow::Cow;

use progvm_core::DefType;
use uuid::Uuid;

use crate::vm::Vm;

/// Where a pointer leads: nowhere, a global-data cell, or an entity
/// field reached through its computed address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Target {
    Null,
    Global(usize),
    Entity(i32),
}

fn check_owner(tag: Uuid, vm: &Vm) {
    debug_assert_eq!(tag, vm.id(), "value used with a VM it does not belong to");
}

// ---------------------------------------------------------------------------
// Value types
// ---------------------------------------------------------------------------

/// A string handle. Handle 0 is the null string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Str {
    pub(crate) vm: Uuid,
    pub(crate) handle: i32,
}

impl Str {
    pub(crate) fn new(vm: Uuid, handle: i32) -> Str {
        Str { vm, handle }
    }

    pub fn is_valid(&self) -> bool {
        self.handle != 0
    }

    pub fn handle(&self) -> i32 {
        self.handle
    }

    /// The character data, if the handle addresses a live string.
    pub fn value<'v>(&self, vm: &'v Vm) -> Option<Cow<'v, str>> {
        check_owner(self.vm, vm);
        vm.string_value(*self)
    }
}

/// An entity number. Invalid entities carry a negative number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entity {
    pub(crate) vm: Uuid,
    pub(crate) num: i32,
}

impl Entity {
    pub(crate) fn new(vm: Uuid, num: i32) -> Entity {
        Entity { vm, num }
    }

    pub fn is_valid(&self) -> bool {
        self.num >= 0
    }

    pub fn number(&self) -> i32 {
        self.num
    }

    /// The next allocated entity in iteration order.
    pub fn next(&self, vm: &Vm) -> Entity {
        check_owner(self.vm, vm);
        vm.next_entity(*self)
    }
}

/// A field offset within every entity record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldRef {
    pub(crate) vm: Uuid,
    pub(crate) offset: i32,
}

impl FieldRef {
    pub(crate) fn new(vm: Uuid, offset: i32) -> FieldRef {
        FieldRef { vm, offset }
    }

    pub fn is_valid(&self) -> bool {
        self.offset >= 0
    }

    pub fn offset(&self) -> i32 {
        self.offset
    }

    /// Best-guess declared type. A vector's first component shares its
    /// offset with the vector itself, which resolves as vector.
    pub fn def_type(&self, vm: &Vm) -> DefType {
        check_owner(self.vm, vm);
        vm.image().field_type_at(self.offset)
    }
}

/// A function table index. Index 0 is the null function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FuncRef {
    pub(crate) vm: Uuid,
    pub(crate) index: i32,
}

impl FuncRef {
    pub(crate) fn new(vm: Uuid, index: i32) -> FuncRef {
        FuncRef { vm, index }
    }

    pub fn is_valid(&self) -> bool {
        self.index > 0
    }

    pub fn index(&self) -> i32 {
        self.index
    }
}

// ---------------------------------------------------------------------------
// Pointer types
// ---------------------------------------------------------------------------

/// Pointer to a float cell.
#[derive(Debug, Clone, Copy)]
pub struct FloatPtr {
    pub(crate) vm: Uuid,
    pub(crate) target: Target,
}

impl FloatPtr {
    pub(crate) fn new(vm: Uuid, target: Target) -> FloatPtr {
        FloatPtr { vm, target }
    }

    pub fn is_null(&self) -> bool {
        self.target == Target::Null
    }

    pub fn get(&self, vm: &Vm) -> f32 {
        check_owner(self.vm, vm);
        match self.target {
            Target::Null => 0.0,
            Target::Global(at) => vm.globals.f32(at),
            Target::Entity(addr) => vm.entities.read_addr_float(addr).unwrap_or(0.0),
        }
    }

    pub fn set(&self, vm: &mut Vm, v: f32) {
        check_owner(self.vm, vm);
        match self.target {
            Target::Null => {}
            Target::Global(at) => vm.globals.set_f32(at, v),
            Target::Entity(addr) => {
                vm.entities.write_float(addr, v);
            }
        }
    }
}

/// Pointer to a three-cell vector.
#[derive(Debug, Clone, Copy)]
pub struct VectorPtr {
    pub(crate) vm: Uuid,
    pub(crate) target: Target,
}

impl VectorPtr {
    pub(crate) fn new(vm: Uuid, target: Target) -> VectorPtr {
        VectorPtr { vm, target }
    }

    pub fn is_null(&self) -> bool {
        self.target == Target::Null
    }

    pub fn get(&self, vm: &Vm) -> [f32; 3] {
        check_owner(self.vm, vm);
        match self.target {
            Target::Null => [0.0; 3],
            Target::Global(at) => vm.globals.vec3(at),
            Target::Entity(addr) => vm.entities.read_addr_vector(addr).unwrap_or([0.0; 3]),
        }
    }

    pub fn set(&self, vm: &mut Vm, v: [f32; 3]) {
        check_owner(self.vm, vm);
        match self.target {
            Target::Null => {}
            Target::Global(at) => vm.globals.set_vec3(at, v),
            Target::Entity(addr) => {
                vm.entities.write_vector(addr, v);
            }
        }
    }

    /// One component; the index is wrapped into 0..=2.
    pub fn component(&self, vm: &Vm, i: usize) -> f32 {
        self.get(vm)[i % 3]
    }

    pub fn set_component(&self, vm: &mut Vm, i: usize, v: f32) {
        let mut all = self.get(vm);
        all[i % 3] = v;
        self.set(vm, all);
    }
}

/// Generates the four handle-kind pointers. They differ only in which
/// value type rides in the cell.
macro_rules! handle_pointer {
    ($(#[$doc:meta])* $ptr:ident, $value:ident, $field:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy)]
        pub struct $ptr {
            pub(crate) vm: Uuid,
            pub(crate) target: Target,
        }

        impl $ptr {
            pub(crate) fn new(vm: Uuid, target: Target) -> $ptr {
                $ptr { vm, target }
            }

            pub fn is_null(&self) -> bool {
                self.target == Target::Null
            }

            pub fn get(&self, vm: &Vm) -> $value {
                check_owner(self.vm, vm);
                let raw = match self.target {
                    Target::Null => 0,
                    Target::Global(at) => vm.globals.i32(at),
                    Target::Entity(addr) => vm.entities.read_addr_int(addr).unwrap_or(0),
                };
                $value::new(self.vm, raw)
            }

            pub fn set(&self, vm: &mut Vm, value: $value) {
                check_owner(self.vm, vm);
                check_owner(value.vm, vm);
                match self.target {
                    Target::Null => {}
                    Target::Global(at) => vm.globals.set_i32(at, value.$field),
                    Target::Entity(addr) => {
                        vm.entities.write_int(addr, value.$field);
                    }
                }
            }
        }
    };
}

handle_pointer!(
    /// Pointer to a string-handle cell.
    StringPtr,
    Str,
    handle
);
handle_pointer!(
    /// Pointer to an entity-number cell.
    EntityPtr,
    Entity,
    num
);
handle_pointer!(
    /// Pointer to a field-offset cell.
    FieldPtr,
    FieldRef,
    offset
);
handle_pointer!(
    /// Pointer to a function-index cell.
    FunctionPtr,
    FuncRef,
    index
);
