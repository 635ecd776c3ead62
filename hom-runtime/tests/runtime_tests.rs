use std::rc::Rc;

use hom_core::float::encode_number;
use hom_core::Opcode;

use hom_runtime::class::{ClassData, MethodKind, VTableEntry};
use hom_runtime::error::{Fault, FaultKind};
use hom_runtime::hash::selector_hash;
use hom_runtime::interpreter::execute;
use hom_runtime::message::message_name;
use hom_runtime::object::{Object, Payload};
use hom_runtime::registry::Registry;
use hom_runtime::ObjRef;

/// Hand-assembled instruction streams, standing in for the out-of-scope
/// compiler.
mod asm {
    use super::*;

    pub fn const_int(code: &mut Vec<u8>, dest: u8, value: i32) {
        code.push(Opcode::AssignConstInt as u8);
        code.push(dest);
        code.extend_from_slice(&value.to_be_bytes());
    }

    pub fn const_num(code: &mut Vec<u8>, dest: u8, value: f64) {
        let (mantissa, exponent) = encode_number(value);
        code.push(Opcode::AssignConstNum as u8);
        code.push(dest);
        code.extend_from_slice(&mantissa.to_be_bytes());
        code.extend_from_slice(&exponent.to_be_bytes());
    }

    pub fn const_txt(code: &mut Vec<u8>, dest: u8, text: &str) {
        code.push(Opcode::AssignConstTxt as u8);
        code.push(dest);
        code.extend_from_slice(text.as_bytes());
        code.push(0);
    }

    pub fn assign(code: &mut Vec<u8>, dest: u8, src: u8) {
        code.extend_from_slice(&[Opcode::Assign as u8, dest, src]);
    }

    pub fn assign_prop(code: &mut Vec<u8>, dest: u8, index: u8) {
        code.extend_from_slice(&[Opcode::AssignProperty as u8, dest, index]);
    }

    pub fn set_prop(code: &mut Vec<u8>, index: u8, src: u8) {
        code.extend_from_slice(&[Opcode::SetProperty as u8, index, src]);
    }

    pub fn assign_class(code: &mut Vec<u8>, dest: u8, hash: u32) {
        code.push(Opcode::AssignClass as u8);
        code.push(dest);
        code.extend_from_slice(&hash.to_be_bytes());
    }

    pub fn message(code: &mut Vec<u8>, object: u8, selector: &str, params: &[u8]) {
        code.push(Opcode::Message as u8);
        code.push(object);
        code.extend_from_slice(&selector_hash(selector).to_be_bytes());
        code.push(params.len() as u8);
        code.extend_from_slice(params);
    }

    pub fn message_result(code: &mut Vec<u8>, object: u8, result: u8, selector: &str, params: &[u8]) {
        code.push(Opcode::MessageResult as u8);
        code.push(object);
        code.push(result);
        code.extend_from_slice(&selector_hash(selector).to_be_bytes());
        code.push(params.len() as u8);
        code.extend_from_slice(params);
    }

    pub fn super_result(code: &mut Vec<u8>, object: u8, result: u8, selector: &str, params: &[u8]) {
        code.push(Opcode::MessageSuperResult as u8);
        code.push(object);
        code.push(result);
        code.extend_from_slice(&selector_hash(selector).to_be_bytes());
        code.push(params.len() as u8);
        code.extend_from_slice(params);
    }

    pub fn block(code: &mut Vec<u8>, result: u8, own_locals: u8, body: &[u8]) {
        code.push(Opcode::Block as u8);
        code.push(result);
        code.push(own_locals);
        code.extend_from_slice(&(body.len() as u16).to_be_bytes());
        code.extend_from_slice(body);
    }

    pub fn end(code: &mut Vec<u8>) {
        code.push(Opcode::ContextEnd as u8);
    }
}

/// Assemble a class out of `(selector, locals, body)` methods and record it.
fn build_class(
    registry: &mut Registry,
    name: &str,
    super_class: &ObjRef,
    obj_properties: u8,
    methods: &[(&str, u8, Vec<u8>)],
) -> ObjRef {
    let mut blob = Vec::new();
    let mut layout = Vec::new();
    for (selector, locals, body) in methods {
        layout.push((*selector, *locals, blob.len() as u16));
        blob.extend_from_slice(body);
    }

    let mut data = ClassData::new(name);
    data.super_class = super_class.clone();
    data.obj_properties = obj_properties;
    data.bytecode = Rc::new(blob);
    let class = ObjRef::new(Object {
        class: registry.class_class(),
        properties: Vec::new(),
        payload: Payload::Class(data),
    });
    for (selector, locals, offset) in layout {
        let hash_id = registry.intern_selector(selector);
        class
            .borrow_mut()
            .as_class_mut()
            .unwrap()
            .vtable
            .insert_object(VTableEntry {
                hash_id,
                owner: class.weak(),
                kind: MethodKind::Bytecode { offset },
                locals,
            });
    }
    registry.record(&class, name, false).unwrap();
    class
}

fn send(registry: &mut Registry, object: &ObjRef, selector: &str) -> Result<ObjRef, Fault> {
    let context = message_name(registry, object, selector, &ObjRef::null())?;
    execute(registry, &context)
}

fn send_with(
    registry: &mut Registry,
    object: &ObjRef,
    selector: &str,
    arguments: &[ObjRef],
) -> Result<ObjRef, Fault> {
    let context = message_name(registry, object, selector, &ObjRef::null())?;
    for (index, argument) in arguments.iter().enumerate() {
        context.set_local(4 + index, argument.clone()).unwrap();
    }
    execute(registry, &context)
}

fn integer_result(value: &ObjRef) -> i64 {
    value.borrow().as_integer().expect("expected an integer result")
}

fn init_counter(registry: &mut Registry, object: &ObjRef) -> Result<(), Fault> {
    let zero = registry.make_integer(0);
    object.borrow_mut().set_property(0, zero).unwrap();
    Ok(())
}

/// The `Counter` class of the end-to-end scenario: one `count` property and
/// an `increment` method doing `count := count + 1`.
fn counter_class(registry: &mut Registry) -> ObjRef {
    let mut increment = Vec::new();
    asm::assign_prop(&mut increment, 4, 0);
    asm::const_int(&mut increment, 5, 1);
    asm::message_result(&mut increment, 4, 6, "+", &[5]);
    asm::set_prop(&mut increment, 0, 6);
    asm::end(&mut increment);

    let object_class = registry.object_class();
    let class = build_class(registry, "Counter", &object_class, 1, &[("increment", 3, increment)]);
    class.borrow_mut().as_class_mut().unwrap().constructor = Some(init_counter);
    class
}

#[test]
fn counter_increments_five_times() {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut registry = Registry::new();
    let class = counter_class(&mut registry);
    let counter = registry.make_instance(&class).unwrap();
    assert_eq!(
        integer_result(&counter.borrow().property(0).unwrap()),
        0,
        "the constructor primes the count"
    );

    let mut last = ObjRef::null();
    for _ in 0..5 {
        let context = message_name(&mut registry, &counter, "increment", &ObjRef::null()).unwrap();
        last = context.clone();
        execute(&mut registry, &context).unwrap();
    }

    assert_eq!(integer_result(&counter.borrow().property(0).unwrap()), 5);
    // The finished frame's messenger link is cleared during unwinding.
    assert!(last.messenger().is_null());
}

#[test]
fn a_method_returns_its_last_assigned_result() {
    let mut registry = Registry::new();
    let class = counter_class(&mut registry);
    let counter = registry.make_instance(&class).unwrap();

    let result = send(&mut registry, &counter, "increment").unwrap();
    assert_eq!(integer_result(&result), 1);
}

#[test]
fn unresolved_messages_name_the_selector_and_class() {
    let mut registry = Registry::new();
    let class = counter_class(&mut registry);
    let counter = registry.make_instance(&class).unwrap();

    let error = send(&mut registry, &counter, "noSuchSelector").unwrap_err();
    assert_eq!(error.kind, FaultKind::UnresolvedMessage);
    assert!(error.message.contains("noSuchSelector"));
    assert!(error.message.contains("Counter"));
}

#[test]
fn overrides_resolve_per_class_and_super_sends_skip_them() {
    let mut registry = Registry::new();

    let mut base_tag = Vec::new();
    asm::const_int(&mut base_tag, 4, 1);
    asm::end(&mut base_tag);
    let object_class = registry.object_class();
    let a = build_class(&mut registry, "A", &object_class, 0, &[("tag", 1, base_tag)]);

    let c = build_class(&mut registry, "C", &a, 0, &[]);

    let mut leaf_tag = Vec::new();
    asm::const_int(&mut leaf_tag, 4, 2);
    asm::end(&mut leaf_tag);
    let mut super_tag = Vec::new();
    asm::super_result(&mut super_tag, 0, 4, "tag", &[]);
    asm::end(&mut super_tag);
    let d = build_class(
        &mut registry,
        "D",
        &c,
        0,
        &[("tag", 1, leaf_tag), ("superTag", 1, super_tag)],
    );

    let from_c = registry.make_instance(&c).unwrap();
    let from_d = registry.make_instance(&d).unwrap();

    // D's override wins from D; C finds A's definition.
    assert_eq!(integer_result(&send(&mut registry, &from_d, "tag").unwrap()), 2);
    assert_eq!(integer_result(&send(&mut registry, &from_c, "tag").unwrap()), 1);
    // The super send starts above the defining class and reaches A.
    assert_eq!(
        integer_result(&send(&mut registry, &from_d, "superTag").unwrap()),
        1
    );
}

#[test]
fn while_loops_run_on_blocks() {
    let mut registry = Registry::new();

    // upTo: counts i from 0 while `i < n`, returning i.
    let mut up_to = Vec::new();
    asm::const_int(&mut up_to, 5, 0);
    let mut condition = Vec::new();
    asm::message_result(&mut condition, 5, 8, "<", &[4]);
    asm::end(&mut condition);
    asm::block(&mut up_to, 6, 0, &condition);
    let mut body = Vec::new();
    asm::const_int(&mut body, 8, 1);
    asm::message_result(&mut body, 5, 5, "+", &[8]);
    asm::end(&mut body);
    asm::block(&mut up_to, 7, 0, &body);
    asm::message(&mut up_to, 6, "whileTrue:", &[7]);
    asm::assign(&mut up_to, 8, 5);
    asm::end(&mut up_to);

    let object_class = registry.object_class();
    let class = build_class(&mut registry, "Looper", &object_class, 0, &[("upTo:", 5, up_to)]);
    let looper = registry.make_instance(&class).unwrap();

    let five = registry.make_integer(5);
    let result = send_with(&mut registry, &looper, "upTo:", &[five]).unwrap();
    assert_eq!(integer_result(&result), 5);

    let zero = registry.make_integer(0);
    let result = send_with(&mut registry, &looper, "upTo:", &[zero]).unwrap();
    assert_eq!(integer_result(&result), 0);
}

#[test]
fn break_exits_the_loop_at_the_trapping_level() {
    let mut registry = Registry::new();

    // runaway: i counts up under `i < 100`, but the body breaks at 3.
    let mut runaway = Vec::new();
    asm::const_int(&mut runaway, 5, 0);
    asm::const_int(&mut runaway, 10, 100);
    let mut condition = Vec::new();
    asm::message_result(&mut condition, 5, 8, "<", &[10]);
    asm::end(&mut condition);
    asm::block(&mut runaway, 6, 0, &condition);

    let mut breaker = Vec::new();
    asm::message(&mut breaker, 7, "break", &[]);
    asm::end(&mut breaker);
    let mut body = Vec::new();
    asm::const_int(&mut body, 8, 1);
    asm::message_result(&mut body, 5, 5, "+", &[8]);
    asm::const_int(&mut body, 9, 3);
    asm::message_result(&mut body, 5, 9, "=", &[9]);
    asm::block(&mut body, 11, 0, &breaker);
    asm::message(&mut body, 9, "then:", &[11]);
    asm::end(&mut body);
    asm::block(&mut runaway, 7, 0, &body);

    asm::message(&mut runaway, 6, "whileTrue:", &[7]);
    asm::assign(&mut runaway, 8, 5);
    asm::end(&mut runaway);

    let object_class = registry.object_class();
    let class = build_class(
        &mut registry,
        "Breaker",
        &object_class,
        0,
        &[("runaway", 8, runaway)],
    );
    let breaker = registry.make_instance(&class).unwrap();

    let result = send(&mut registry, &breaker, "runaway").unwrap();
    assert_eq!(integer_result(&result), 3);
}

#[test]
fn blocks_take_a_value_parameter() {
    let mut registry = Registry::new();

    // callBlock: builds `[:x | x + x]` and applies it to the argument.
    // The method's effective frame is 7 slots, so the block's own parameter
    // slot is 7.
    let mut double = Vec::new();
    asm::message_result(&mut double, 7, 6, "+", &[7]);
    asm::end(&mut double);
    let mut call_block = Vec::new();
    asm::block(&mut call_block, 5, 1, &double);
    asm::message_result(&mut call_block, 5, 6, "value:", &[4]);
    asm::end(&mut call_block);

    let object_class = registry.object_class();
    let class = build_class(
        &mut registry,
        "Applier",
        &object_class,
        0,
        &[("callBlock:", 3, call_block)],
    );
    let applier = registry.make_instance(&class).unwrap();

    let argument = registry.make_integer(21);
    let result = send_with(&mut registry, &applier, "callBlock:", &[argument]).unwrap();
    assert_eq!(integer_result(&result), 42);
}

#[test]
fn rescue_catches_faults_raised_below() {
    let mut registry = Registry::new();

    // safeDivide:by: runs `[a / b] rescue: [:reason | -1]`.
    let mut attempt = Vec::new();
    asm::message_result(&mut attempt, 4, 8, "/", &[5]);
    asm::end(&mut attempt);
    let mut handler = Vec::new();
    asm::const_int(&mut handler, 8, -1);
    asm::end(&mut handler);
    let mut safe_divide = Vec::new();
    asm::block(&mut safe_divide, 6, 0, &attempt);
    asm::block(&mut safe_divide, 7, 1, &handler);
    asm::message_result(&mut safe_divide, 6, 8, "rescue:", &[7]);
    asm::end(&mut safe_divide);

    let object_class = registry.object_class();
    let class = build_class(
        &mut registry,
        "Divider",
        &object_class,
        0,
        &[("safeDivide:by:", 5, safe_divide)],
    );
    let divider = registry.make_instance(&class).unwrap();

    let ten = registry.make_integer(10);
    let two = registry.make_integer(2);
    let result = send_with(&mut registry, &divider, "safeDivide:by:", &[ten, two]).unwrap();
    assert_eq!(integer_result(&result), 5);

    let ten = registry.make_integer(10);
    let zero = registry.make_integer(0);
    let result = send_with(&mut registry, &divider, "safeDivide:by:", &[ten, zero]).unwrap();
    assert_eq!(integer_result(&result), -1);

    // Without the rescue, the fault propagates out of `execute`.
    let ten = registry.make_integer(10);
    let zero = registry.make_integer(0);
    let error = {
        let context = message_name(&mut registry, &ten, "/", &ObjRef::null()).unwrap();
        context.set_local(4, zero).unwrap();
        execute(&mut registry, &context).unwrap_err()
    };
    assert_eq!(error.kind, FaultKind::Domain);
    assert!(error.message.contains("division by zero"));
}

#[test]
fn literal_constants_materialize() {
    let mut registry = Registry::new();

    let mut pi = Vec::new();
    asm::const_num(&mut pi, 4, -3.1415);
    asm::end(&mut pi);
    let mut greet = Vec::new();
    asm::const_txt(&mut greet, 4, "hello");
    asm::message_result(&mut greet, 4, 5, "length", &[]);
    asm::end(&mut greet);

    let object_class = registry.object_class();
    let class = build_class(
        &mut registry,
        "Literals",
        &object_class,
        0,
        &[("pi", 1, pi), ("greet", 2, greet)],
    );
    let instance = registry.make_instance(&class).unwrap();

    let result = send(&mut registry, &instance, "pi").unwrap();
    assert_eq!(result.borrow().as_number(), Some(-3.1415));

    let result = send(&mut registry, &instance, "greet").unwrap();
    assert_eq!(integer_result(&result), 5);
}

#[test]
fn classes_resolve_by_hash_from_bytecode() {
    let mut registry = Registry::new();

    let mut find = Vec::new();
    asm::assign_class(&mut find, 4, selector_hash("Integer"));
    asm::end(&mut find);
    let mut miss = Vec::new();
    asm::assign_class(&mut miss, 4, selector_hash("Nowhere"));
    asm::end(&mut miss);

    let object_class = registry.object_class();
    let class = build_class(
        &mut registry,
        "Finder",
        &object_class,
        0,
        &[("find", 1, find), ("miss", 1, miss)],
    );
    let instance = registry.make_instance(&class).unwrap();

    let result = send(&mut registry, &instance, "find").unwrap();
    assert!(result.ptr_eq(&registry.integer_class()));

    let error = send(&mut registry, &instance, "miss").unwrap_err();
    assert_eq!(error.kind, FaultKind::RegistryMiss);
}

#[test]
fn unknown_opcodes_name_the_class_and_offset() {
    let mut registry = Registry::new();

    let object_class = registry.object_class();
    let class = build_class(
        &mut registry,
        "Broken",
        &object_class,
        0,
        &[("boom", 0, vec![Opcode::Noop as u8, 0xff])],
    );
    let instance = registry.make_instance(&class).unwrap();

    let error = send(&mut registry, &instance, "boom").unwrap_err();
    assert_eq!(error.kind, FaultKind::UnknownOpcode);
    assert!(error.message.contains("Broken"));
    assert!(error.message.contains("offset 1"));
    assert!(error.message.contains("0xff"));
}

#[test]
fn class_side_sends_instantiate_through_the_chain() {
    let mut registry = Registry::new();
    let class = counter_class(&mut registry);

    // `new` is a class-side method inherited from Object's table.
    let counter = send(&mut registry, &class, "new").unwrap();
    assert!(counter.class_of().ptr_eq(&class));
    assert_eq!(integer_result(&counter.borrow().property(0).unwrap()), 0);

    let name = send(&mut registry, &class, "name").unwrap();
    assert_eq!(name.borrow().as_text(), Some("Counter"));
}

#[test]
fn written_classes_run_after_import() {
    let mut registry = Registry::new();
    let class = counter_class(&mut registry);
    let record = registry.write(&class).unwrap();

    let mut fresh = Registry::new();
    let imported = fresh.import(&record).unwrap();

    // The native constructor cannot travel; prime the property by hand.
    let counter = fresh.make_instance(&imported).unwrap();
    let zero = fresh.make_integer(0);
    counter.borrow_mut().set_property(0, zero).unwrap();

    for _ in 0..5 {
        send(&mut fresh, &counter, "increment").unwrap();
    }
    assert_eq!(integer_result(&counter.borrow().property(0).unwrap()), 5);
}
