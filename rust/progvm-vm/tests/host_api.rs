//! Host-facing surface: typed pointers, entity lifecycle, strings,
//! reflection, and instance independence.

mod common;

use common::ImageBuilder;
use progvm_core::{DefType, Opcode};
use progvm_vm::{ErrorKind, Vm};

fn minimal() -> ImageBuilder {
    let mut b = ImageBuilder::new();
    b.op(Opcode::Done, 0, 0, 0);
    b
}

#[test]
fn named_globals_resolve_with_type_filtering() {
    let mut b = minimal();
    b.add_float_global("speed", 7.5);
    b.add_vector_global("origin", [1.0, 2.0, 3.0]);
    let mut vm = Vm::from_bytes(&b.build()).unwrap();

    let speed = vm.float_global("speed");
    assert!(!speed.is_null());
    assert_eq!(speed.get(&vm), 7.5);
    speed.set(&mut vm, 8.5);
    assert_eq!(speed.get(&vm), 8.5);

    // wrong kind, wrong name: both null, and reads degrade to zero
    assert!(vm.float_global("origin").is_null());
    assert!(vm.vector_global("speed").is_null());
    assert!(vm.float_global("missing").is_null());
    assert_eq!(vm.float_global("missing").get(&vm), 0.0);
    vm.float_global("missing").set(&mut vm, 1.0); // ignored

    let origin = vm.vector_global("origin");
    assert_eq!(origin.get(&vm), [1.0, 2.0, 3.0]);
    origin.set_component(&mut vm, 1, 9.0);
    assert_eq!(origin.component(&vm, 1), 9.0);
    assert_eq!(origin.component(&vm, 4), 9.0); // index wraps into 0..=2
}

#[test]
fn local_and_sentinel_globals_are_not_host_visible() {
    let mut b = minimal();
    let at = b.add_float_cell(0.0);
    b.add_global_def(2, at, "end_sys_fields");
    let window = b.add_locals(1);
    b.add_global_def(2, window as i16, "counter");
    b.add_function("f", 0, window, 1, &[]);
    let vm = Vm::from_bytes(&b.build()).unwrap();

    assert!(vm.float_global("end_sys_fields").is_null());
    assert!(vm.float_global("counter").is_null());
}

#[test]
fn return_and_parameter_pointers_are_never_null() {
    let mut vm = Vm::from_bytes(&minimal().build()).unwrap();
    assert!(!vm.return_float().is_null());
    assert!(!vm.return_vector().is_null());
    assert!(!vm.return_string().is_null());
    for i in 0..8 {
        assert!(!vm.param_float(i).is_null());
    }
    vm.param_float(2).set(&mut vm, 1.25);
    assert_eq!(vm.param_float(2).get(&vm), 1.25);
    // the slot index is truncated into 0..=7
    assert_eq!(vm.param_float(10).get(&vm), 1.25);
}

#[test]
fn entity_lifecycle_and_field_pointers() {
    let mut b = minimal();
    b.entity_size = 4;
    b.add_field_def(2, 0, "health");
    b.add_field_def(3, 1, "velocity");
    let mut vm = Vm::from_bytes(&b.build()).unwrap();

    let health = vm.field_named("health");
    assert!(health.is_valid());
    assert_eq!(health.def_type(&vm), DefType::Float);
    assert!(!vm.field_named("missing").is_valid());
    assert!(!vm.field_named_typed("health", DefType::Vector).is_valid());
    let velocity = vm.field_named_typed("velocity", DefType::Vector);
    assert!(velocity.is_valid());

    let e = vm.create_entity(0);
    assert!(e.is_valid());

    let hp = vm.float_field(e, health);
    assert!(!hp.is_null());
    hp.set(&mut vm, 55.0);
    assert_eq!(hp.get(&vm), 55.0);

    let vel = vm.vector_field(e, velocity);
    vel.set(&mut vm, [1.0, 2.0, 3.0]);
    assert_eq!(vel.get(&vm), [1.0, 2.0, 3.0]);

    // field pointers to a dead entity are null
    vm.delete_entity(e, 0);
    assert!(vm.float_field(e, health).is_null());
    // the stale pointer now reads zero and drops writes
    assert_eq!(hp.get(&vm), 0.0);
    hp.set(&mut vm, 1.0);
    assert_eq!(hp.get(&vm), 0.0);
}

#[test]
fn entity_reuse_honors_the_delay_boundary() {
    let mut b = minimal();
    b.entity_size = 1;
    let bytes = b.build();

    let mut vm = Vm::with_reuse_delay(&bytes, 5).unwrap();
    let e = vm.create_entity(10);
    vm.delete_entity(e, 10);
    let e2 = vm.create_entity(14);
    assert_ne!(e2.number(), e.number()); // one tick early
    let e3 = vm.create_entity(15); // exactly delete time + delay
    assert_eq!(e3.number(), e.number());

    // zero delay reuses immediately
    let mut vm = Vm::with_reuse_delay(&bytes, 0).unwrap();
    let e = vm.create_entity(0);
    vm.delete_entity(e, 0);
    assert_eq!(vm.create_entity(0).number(), e.number());
}

#[test]
fn entity_iteration_wraps() {
    let mut b = minimal();
    b.entity_size = 1;
    let mut vm = Vm::from_bytes(&b.build()).unwrap();

    assert!(!vm.first_entity().is_valid());
    let a = vm.create_entity(0);
    let c = vm.create_entity(0);
    let first = vm.first_entity();
    assert_eq!(first.number(), a.number());
    let second = first.next(&vm);
    assert_eq!(second.number(), c.number());
    assert_eq!(second.next(&vm).number(), a.number()); // wrap
}

#[test]
fn zoned_and_temporary_strings() {
    let mut vm = Vm::from_bytes(&minimal().build()).unwrap();

    let z = vm.zone_string("alpha");
    assert!(z.is_valid());
    assert_eq!(vm.string_value(z).as_deref(), Some("alpha"));
    assert!(vm.free_string(z));
    assert!(!vm.free_string(z)); // double free reports failure
    let z2 = vm.zone_string("beta");
    assert_eq!(z2.handle(), z.handle()); // first-fit reuse
    assert_eq!(vm.string_value(z2).as_deref(), Some("beta"));

    let t = vm.temp_string("scratch");
    assert!(t.handle() < 0);
    assert_eq!(vm.string_value(t).as_deref(), Some("scratch"));
    vm.clear_temp_strings();
    assert_eq!(vm.string_value(t), None);
}

#[test]
fn string_pointers_move_handles_between_cells() {
    let mut b = minimal();
    let hello = b.add_string("hello");
    b.add_string_global("greeting", hello);
    b.add_string_global("copy", 0);
    let mut vm = Vm::from_bytes(&b.build()).unwrap();

    let greeting = vm.string_global("greeting");
    let copy = vm.string_global("copy");
    let s = greeting.get(&vm);
    assert_eq!(vm.string_value(s).as_deref(), Some("hello"));
    copy.set(&mut vm, s);
    assert_eq!(copy.get(&vm).handle(), hello);

    let temp = vm.temp_string("fresh");
    copy.set(&mut vm, temp);
    let back = copy.get(&vm);
    assert_eq!(vm.string_value(back).as_deref(), Some("fresh"));
}

#[test]
fn reflection_enumerates_fields_and_functions() {
    let mut b = minimal();
    b.entity_size = 4;
    b.add_field_def(2, 0, "pad");
    b.add_field_def(2, 1, "health");
    b.add_field_def(3, 2, "dir");
    b.add_function("spawn", 0, 0, 0, &[]);
    let vm = Vm::from_bytes(&b.build()).unwrap();

    assert_eq!(vm.num_entity_fields(), 3);
    assert_eq!(vm.field_name(0), ""); // index 0 is the null definition
    assert_eq!(vm.field_name(1), "health");
    assert_eq!(vm.field_def_type(2), DefType::Vector);
    assert!(vm.field_at(1).is_valid());
    assert_eq!(vm.field_name(99), "");

    assert_eq!(vm.num_functions(), 2);
    assert_eq!(vm.function_name(1), "spawn");
    assert!(vm.function_at(1).is_valid());
    assert!(!vm.function_at(0).is_valid());
    assert!(!vm.function_at(99).is_valid());
}

#[test]
fn instances_are_independent() {
    let bytes = {
        let mut b = minimal();
        b.add_builtin_function("hook", 4);
        b.build()
    };
    let mut first = Vm::from_bytes(&bytes).unwrap();
    let mut second = Vm::from_bytes(&bytes).unwrap();
    assert_ne!(first.id(), second.id());
    assert_eq!(first.find_builtin_number("hook"), 4);

    // a registration on one instance does not leak into the other
    first.add_builtin(4, |_, _| true);
    let hook = first.function("hook");
    first.run(hook).unwrap();
    let hook = second.function("hook");
    assert_eq!(second.run(hook), Err(ErrorKind::BuiltinNotFound));
}

#[test]
fn dump_writes_every_section() {
    let mut b = minimal();
    b.add_float_global("speed", 1.0);
    b.entity_size = 1;
    b.add_field_def(2, 0, "health");
    let vm = Vm::from_bytes(&b.build()).unwrap();

    let mut out = Vec::new();
    vm.dump(&mut out).unwrap();
    let text = String::from_utf8(out).unwrap();
    for section in [
        "Globals:",
        "Fields:",
        "Functions:",
        "Statements:",
        "Global data:",
        "String data:",
    ] {
        assert!(text.contains(section), "missing section {section}");
    }
    assert!(text.contains("speed"));
    assert!(text.contains("health"));
    assert!(text.contains("DONE"));
}

#[test]
fn crc_is_exposed() {
    let mut b = minimal();
    b.crc = 0x7777;
    let vm = Vm::from_bytes(&b.build()).unwrap();
    assert_eq!(vm.crc(), 0x7777);
}
