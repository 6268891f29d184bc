//! The VM instance and its host-facing API.

use std::any::Any;
use std::borrow::Cow;
use std::path::Path;
use std::sync::Arc;

use progvm_core::DefType;
use tracing::debug;
use uuid::Uuid;

use crate::builtins::BuiltinRegistry;
use crate::data::{
    Entity, EntityPtr, FieldPtr, FieldRef, FloatPtr, FuncRef, FunctionPtr, Str, StringPtr, Target,
    VectorPtr,
};
use crate::entities::{EntityManager, DEFAULT_REUSE_DELAY};
use crate::error::{ErrorKind, ErrorLog, LoadError};
use crate::globals::{Globals, OFS_PARM0, OFS_RETURN, PARM_STRIDE};
use crate::image::Image;
use crate::strings::StringManager;

/// One loaded program and all of its runtime state.
///
/// A `Vm` only exists for a structurally valid image; construction
/// performs the full validation. Dropping it releases everything. Two
/// instances share nothing, including their builtin registries.
pub struct Vm {
    id: Uuid,
    pub(crate) image: Image,
    pub(crate) globals: Globals,
    pub(crate) strings: StringManager,
    pub(crate) entities: EntityManager,
    pub(crate) builtins: BuiltinRegistry,
    pub(crate) errors: ErrorLog,
    pub(crate) call_parameters: i32,
    /// Arbitrary host state, downcastable from builtin callbacks.
    pub host_data: Option<Box<dyn Any + Send>>,
}

impl std::fmt::Debug for Vm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vm")
            .field("id", &self.id)
            .field("image", &self.image)
            .field("globals", &self.globals)
            .field("strings", &self.strings)
            .field("entities", &self.entities)
            .field("builtins", &format_args!("<builtins>"))
            .field("errors", &self.errors)
            .field("call_parameters", &self.call_parameters)
            .field("host_data", &self.host_data.as_ref().map(|_| "<host_data>"))
            .finish()
    }
}

impl Vm {
    /// Load an image from raw bytes with the default entity reuse delay.
    pub fn from_bytes(bytes: &[u8]) -> Result<Vm, LoadError> {
        Self::with_reuse_delay(bytes, DEFAULT_REUSE_DELAY)
    }

    /// Load an image, choosing how long deleted entity slots stay
    /// ineligible for reuse. Zero makes reuse immediate.
    pub fn with_reuse_delay(bytes: &[u8], reuse_delay: i64) -> Result<Vm, LoadError> {
        let image = Image::parse(bytes)?;
        let globals = Globals::from_cells(image.global_data.clone());
        let strings = StringManager::new(image.string_data.clone());
        let entities = EntityManager::new(image.entity_size, reuse_delay);
        let id = Uuid::new_v4();
        debug!(%id, crc = image.crc, "vm created");
        Ok(Vm {
            id,
            image,
            globals,
            strings,
            entities,
            builtins: BuiltinRegistry::default(),
            errors: ErrorLog::default(),
            call_parameters: 0,
            host_data: None,
        })
    }

    /// Load an image file from disk.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Vm, LoadError> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes)
    }

    /// Identity of this instance; typed values and pointers carry it.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Checksum recorded by the compiler in the image header.
    pub fn crc(&self) -> i32 {
        self.image.crc
    }

    /// The validated image tables, for dumps and reflection.
    pub fn image(&self) -> &Image {
        &self.image
    }

    // -- globals ------------------------------------------------------------

    fn named_global(&self, name: &str, ty: DefType) -> Target {
        for def in &self.image.global_defs {
            if def.def.def_type() != ty || def.special || def.local {
                continue;
            }
            if self.image.name_bytes(def.def.name_offset) == name.as_bytes() {
                return Target::Global(def.def.offset as usize);
            }
        }
        Target::Null
    }

    fn field_target(&self, entity: Entity, field: FieldRef) -> Target {
        debug_assert_eq!(entity.vm, self.id);
        debug_assert_eq!(field.vm, self.id);
        match self.entities.address_of(entity.num, field.offset) {
            0 => Target::Null,
            addr => Target::Entity(addr),
        }
    }
}

/// The six typed views share one accessor surface: a named global
/// lookup, an entity-field binding, and the reserved return/parameter
/// slots (which are always valid addresses).
macro_rules! pointer_accessors {
    ($ty:expr, $ptr:ident, $global:ident, $field:ident, $ret:ident, $parm:ident) => {
        impl Vm {
            /// Pointer to the named global of this kind, or a null
            /// pointer when no non-local, non-sentinel match exists.
            pub fn $global(&self, name: &str) -> $ptr {
                $ptr::new(self.id, self.named_global(name, $ty))
            }

            /// Pointer to a field of one entity, null when the entity is
            /// not in use or the field offset is out of bounds.
            pub fn $field(&self, entity: Entity, field: FieldRef) -> $ptr {
                $ptr::new(self.id, self.field_target(entity, field))
            }

            /// Pointer to the return slot. Never null.
            pub fn $ret(&self) -> $ptr {
                $ptr::new(self.id, Target::Global(OFS_RETURN))
            }

            /// Pointer to one of the eight parameter slots; the index is
            /// truncated into 0..=7. Never null.
            pub fn $parm(&self, parm: usize) -> $ptr {
                $ptr::new(self.id, Target::Global(OFS_PARM0 + (parm & 7) * PARM_STRIDE))
            }
        }
    };
}

pointer_accessors!(DefType::Float, FloatPtr, float_global, float_field, return_float, param_float);
pointer_accessors!(
    DefType::Vector,
    VectorPtr,
    vector_global,
    vector_field,
    return_vector,
    param_vector
);
pointer_accessors!(
    DefType::String,
    StringPtr,
    string_global,
    string_field,
    return_string,
    param_string
);
pointer_accessors!(
    DefType::Entity,
    EntityPtr,
    entity_global,
    entity_field,
    return_entity,
    param_entity
);
pointer_accessors!(DefType::Field, FieldPtr, field_global, field_field, return_field, param_field);
pointer_accessors!(
    DefType::Function,
    FunctionPtr,
    function_global,
    function_field,
    return_function,
    param_function
);

impl Vm {
    // -- entities -----------------------------------------------------------

    /// Allocate an entity at host time `time`. Reuses the first
    /// eligible slot, or grows a page.
    pub fn create_entity(&mut self, time: i64) -> Entity {
        Entity::new(self.id, self.entities.create(time))
    }

    /// Free an entity; its slot is barred from reuse until the reuse
    /// delay has passed.
    pub fn delete_entity(&mut self, entity: Entity, time: i64) {
        debug_assert_eq!(entity.vm, self.id);
        self.entities.delete(entity.num, time);
    }

    /// Lowest-numbered allocated entity, invalid when there are none.
    pub fn first_entity(&self) -> Entity {
        Entity::new(self.id, self.entities.first().unwrap_or(-1))
    }

    /// Next allocated entity after `entity`, wrapping; see the entity
    /// manager for the exact contract.
    pub fn next_entity(&self, entity: Entity) -> Entity {
        debug_assert_eq!(entity.vm, self.id);
        Entity::new(self.id, self.entities.next(entity.num).unwrap_or(-1))
    }

    /// Find a field definition by name.
    pub fn field_named(&self, name: &str) -> FieldRef {
        for def in &self.image.field_defs {
            if self.image.name_bytes(def.name_offset) == name.as_bytes() {
                return FieldRef::new(self.id, i32::from(def.offset));
            }
        }
        FieldRef::new(self.id, -1)
    }

    /// Find a field definition by name and resolved type.
    pub fn field_named_typed(&self, name: &str, ty: DefType) -> FieldRef {
        for def in &self.image.field_defs {
            if self.image.field_type_at(i32::from(def.offset)) != ty {
                continue;
            }
            if self.image.name_bytes(def.name_offset) == name.as_bytes() {
                return FieldRef::new(self.id, i32::from(def.offset));
            }
        }
        FieldRef::new(self.id, -1)
    }

    // -- strings ------------------------------------------------------------

    /// Create a temporary string. Temporaries accumulate until
    /// [`clear_temp_strings`](Self::clear_temp_strings).
    pub fn temp_string(&mut self, s: &str) -> Str {
        Str::new(self.id, self.strings.temp_string(s))
    }

    /// Release every temporary string. Call between runs; outstanding
    /// temporary handles resolve to nothing afterwards.
    pub fn clear_temp_strings(&mut self) {
        self.strings.clear_temp_strings();
    }

    /// Allocate a permanent string; it lives until freed.
    pub fn zone_string(&mut self, s: &str) -> Str {
        Str::new(self.id, self.strings.zone(s))
    }

    /// Free a zoned string. False for constants, temporaries, and
    /// already-freed handles.
    pub fn free_string(&mut self, s: Str) -> bool {
        debug_assert_eq!(s.vm, self.id);
        self.strings.unzone(s.handle)
    }

    /// Character data behind a string value.
    pub fn string_value(&self, s: Str) -> Option<Cow<'_, str>> {
        debug_assert_eq!(s.vm, self.id);
        self.strings.get_str(s.handle)
    }

    // -- functions and builtins ----------------------------------------------

    /// Find a function by name; invalid when absent.
    pub fn function(&self, name: &str) -> FuncRef {
        for (i, func) in self.image.functions.iter().enumerate() {
            if self.image.name_bytes(func.name_offset) == name.as_bytes() {
                return FuncRef::new(self.id, i as i32);
            }
        }
        FuncRef::new(self.id, 0)
    }

    /// Register a builtin callback, replacing any previous registration
    /// for the number. Number 0 acts as a catch-all.
    pub fn add_builtin<F>(&mut self, number: i32, callback: F)
    where
        F: Fn(&mut Vm, i32) -> bool + Send + Sync + 'static,
    {
        self.builtins.add(number, Arc::new(callback));
    }

    /// Drop a builtin registration; nothing happens if none exists.
    pub fn remove_builtin(&mut self, number: i32) {
        self.builtins.remove(number);
    }

    /// Builtin number declared in the image for a name, or 0.
    pub fn find_builtin_number(&self, name: &str) -> i32 {
        for func in &self.image.functions {
            if func.is_builtin() && self.image.name_bytes(func.name_offset) == name.as_bytes() {
                return func.builtin_number();
            }
        }
        0
    }

    /// Inside a builtin callback: how many parameter slots the current
    /// call populated.
    pub fn call_parameter_count(&self) -> i32 {
        self.call_parameters
    }

    // -- errors -------------------------------------------------------------

    /// Kind of the most recent runtime failure, if any.
    pub fn last_error(&self) -> Option<ErrorKind> {
        self.errors.last()
    }

    /// The accumulated error log.
    pub fn error_messages(&self) -> &str {
        self.errors.messages()
    }

    /// Forget the last error and its log.
    pub fn clear_errors(&mut self) {
        self.errors.clear();
    }

    /// For builtins: fail the current call with a fresh error report.
    pub fn builtin_error(&mut self, message: &str) {
        self.errors.begin(ErrorKind::BuiltinError, message);
    }

    /// For builtins: append context to the current error report.
    pub fn add_error_line(&mut self, message: &str) {
        self.errors.add_line(message);
    }

    // -- reflection ---------------------------------------------------------

    pub fn num_entity_fields(&self) -> usize {
        self.image.field_defs.len()
    }

    /// Name of field definition `i`; empty for index 0 (the null
    /// definition) and out-of-range indices.
    pub fn field_name(&self, i: usize) -> Cow<'_, str> {
        match self.image.field_defs.get(i) {
            Some(def) if i > 0 => self.image.name_lossy(def.name_offset),
            _ => Cow::Borrowed(""),
        }
    }

    /// Declared type of field definition `i`.
    pub fn field_def_type(&self, i: usize) -> DefType {
        match self.image.field_defs.get(i) {
            Some(def) if i > 0 => def.def_type(),
            _ => DefType::None,
        }
    }

    /// Field handle for definition `i`.
    pub fn field_at(&self, i: usize) -> FieldRef {
        match self.image.field_defs.get(i) {
            Some(def) if i > 0 => FieldRef::new(self.id, i32::from(def.offset)),
            _ => FieldRef::new(self.id, -1),
        }
    }

    pub fn num_functions(&self) -> usize {
        self.image.functions.len()
    }

    /// Name of function `i`; empty for index 0 and out-of-range indices.
    pub fn function_name(&self, i: usize) -> Cow<'_, str> {
        match self.image.functions.get(i) {
            Some(func) if i > 0 => self.image.name_lossy(func.name_offset),
            _ => Cow::Borrowed(""),
        }
    }

    /// Function handle for table index `i`.
    pub fn function_at(&self, i: usize) -> FuncRef {
        if i > 0 && i < self.image.functions.len() {
            FuncRef::new(self.id, i as i32)
        } else {
            FuncRef::new(self.id, 0)
        }
    }
}
