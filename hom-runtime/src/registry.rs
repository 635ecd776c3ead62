//!
//! The collection of all known classes during execution.
//!
//! The registry is an explicitly-owned value injected into every entry point
//! that needs it (dispatch, the interpreter, natives), so tests can build
//! independent registries. It maps the 32-bit name digest to the class
//! object, keeps direct handles to the core classes (user code can never
//! displace them), and interns selector names so diagnostics can name what a
//! digest stands for.
//!

use std::collections::HashMap;

use indexmap::IndexMap;
use log::debug;

use crate::class::{self, ClassData, MethodKind, VTableEntry};
use crate::error::Fault;
use crate::hash::selector_hash;
use crate::object::{Object, Payload};
use crate::primitives::{self, PrimitiveDef};
use crate::ObjRef;

/// The runtime's core classes.
///
/// This struct always keeps a strong handle to each of them, so the weak
/// bootstrap links never dangle.
pub struct CoreClasses {
    /// The **Object** class, root of every chain.
    pub object_class: ObjRef,
    /// The **Class** class, the class of classes.
    pub class_class: ObjRef,
    /// The **Context** class.
    pub context_class: ObjRef,
    /// The **Block** class.
    pub block_class: ObjRef,
    /// The **Integer** class.
    pub integer_class: ObjRef,
    /// The **Number** class.
    pub number_class: ObjRef,
    /// The **Text** class.
    pub text_class: ObjRef,
    /// The **Boolean** class.
    pub boolean_class: ObjRef,
}

/// The process-wide class map, owned explicitly rather than globally.
pub struct Registry {
    /// All recorded classes, keyed by name digest.
    pub classes: IndexMap<u32, ObjRef>,
    /// Interned selector names, for diagnostics.
    selectors: HashMap<u32, String>,
    /// The core classes.
    pub core: CoreClasses,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Bootstrap a fresh registry with the core classes and their primitives.
    pub fn new() -> Self {
        // The two bootstrap classes exist before the registry does and go in
        // with the replace flag. "Class" is its own class (held weakly, to
        // break the metaclass cycle) and "Object" is the root of the chain.
        let class_class = ObjRef::new(Object {
            class: ObjRef::null(),
            properties: Vec::new(),
            payload: Payload::Class(ClassData::new("Class")),
        });
        let weak_self = class_class.weak();
        class_class.borrow_mut().class = weak_self;

        let object_class = ObjRef::new(Object {
            class: class_class.weak(),
            properties: Vec::new(),
            payload: Payload::Class(ClassData::new("Object")),
        });
        class_class
            .borrow_mut()
            .as_class_mut()
            .expect("bootstrap class payload")
            .super_class = object_class.clone();

        let context_class = raw_class(&class_class, &object_class, "Context");
        let block_class = raw_class(&class_class, &context_class, "Block");
        let integer_class = raw_class(&class_class, &object_class, "Integer");
        let number_class = raw_class(&class_class, &object_class, "Number");
        let text_class = raw_class(&class_class, &object_class, "Text");
        let boolean_class = raw_class(&class_class, &object_class, "Boolean");

        let mut registry = Self {
            classes: IndexMap::new(),
            selectors: HashMap::new(),
            core: CoreClasses {
                object_class: object_class.clone(),
                class_class: class_class.clone(),
                context_class: context_class.clone(),
                block_class: block_class.clone(),
                integer_class: integer_class.clone(),
                number_class: number_class.clone(),
                text_class: text_class.clone(),
                boolean_class: boolean_class.clone(),
            },
        };

        registry.install(
            &object_class,
            primitives::object::INSTANCE_PRIMITIVES,
            primitives::object::CLASS_PRIMITIVES,
        );
        registry.install(&integer_class, primitives::integer::INSTANCE_PRIMITIVES, &[]);
        registry.install(&number_class, primitives::number::INSTANCE_PRIMITIVES, &[]);
        registry.install(&text_class, primitives::text::INSTANCE_PRIMITIVES, &[]);
        registry.install(&boolean_class, primitives::boolean::INSTANCE_PRIMITIVES, &[]);
        registry.install(&block_class, primitives::block::INSTANCE_PRIMITIVES, &[]);

        let bootstrap: &[(&ObjRef, &str, bool)] = &[
            (&class_class, "Class", true),
            (&object_class, "Object", true),
            (&context_class, "Context", false),
            (&block_class, "Block", false),
            (&integer_class, "Integer", false),
            (&number_class, "Number", false),
            (&text_class, "Text", false),
            (&boolean_class, "Boolean", false),
        ];
        for (class, name, replace) in bootstrap {
            registry
                .record(class, name, *replace)
                .expect("the bootstrap classes are conflict-free");
        }

        registry
    }

    /// Install a set of native methods on a class.
    fn install(&mut self, class: &ObjRef, instance: &[PrimitiveDef], class_side: &[PrimitiveDef]) {
        for (name, params, function) in instance {
            let hash_id = self.intern_selector(name);
            class
                .borrow_mut()
                .as_class_mut()
                .expect("primitives install on classes")
                .vtable
                .insert_object(VTableEntry {
                    hash_id,
                    owner: class.weak(),
                    kind: MethodKind::Native(*function),
                    locals: *params,
                });
        }
        for (name, params, function) in class_side {
            let hash_id = self.intern_selector(name);
            class
                .borrow_mut()
                .as_class_mut()
                .expect("primitives install on classes")
                .vtable
                .insert_class(VTableEntry {
                    hash_id,
                    owner: class.weak(),
                    kind: MethodKind::Native(*function),
                    locals: *params,
                });
        }
    }

    /// Intern a selector name and return its digest.
    pub fn intern_selector(&mut self, name: &str) -> u32 {
        let hash = selector_hash(name);
        self.selectors
            .entry(hash)
            .or_insert_with(|| name.to_string());
        hash
    }

    /// The name behind a selector digest (hexadecimal when unknown).
    pub fn selector_name(&self, hash: u32) -> String {
        self.selectors
            .get(&hash)
            .cloned()
            .unwrap_or_else(|| format!("0x{:08x}", hash))
    }

    /// Record a class under a name.
    ///
    /// Computes the class' hash identity, links its method tables against the
    /// super chain, and inserts it. Fails on a naming conflict unless
    /// `replace` is set (used only by the bootstrap).
    pub fn record(&mut self, class: &ObjRef, name: &str, replace: bool) -> Result<u32, Fault> {
        let hash = selector_hash(name);
        if !replace && self.classes.contains_key(&hash) {
            return Err(Fault::registry_conflict(name));
        }

        {
            let mut object = class.borrow_mut();
            let data = object
                .as_class_mut()
                .ok_or_else(|| Fault::domain("only classes can be recorded", ObjRef::null()))?;
            data.name = name.to_string();
            data.hash_id = hash;
        }
        class::link_vtable(class)?;

        self.selectors
            .entry(hash)
            .or_insert_with(|| name.to_string());
        self.classes.insert(hash, class.clone());
        debug!("registry: recorded class `{}` as 0x{:08x}", name, hash);
        Ok(hash)
    }

    /// Record a class that already carries its hash identity (the library
    /// import path; imported classes have no name).
    pub(crate) fn record_imported(&mut self, class: &ObjRef) -> Result<u32, Fault> {
        let hash = class
            .borrow()
            .as_class()
            .map(|data| data.hash_id)
            .ok_or_else(|| Fault::domain("only classes can be recorded", ObjRef::null()))?;
        if self.classes.contains_key(&hash) {
            return Err(Fault::registry_conflict(&format!("0x{:08x}", hash)));
        }

        class::link_vtable(class)?;
        self.classes.insert(hash, class.clone());
        debug!("registry: recorded imported class 0x{:08x}", hash);
        Ok(hash)
    }

    /// Resolve a class by name.
    pub fn resolve(&self, name: &str) -> Result<ObjRef, Fault> {
        self.classes
            .get(&selector_hash(name))
            .cloned()
            .ok_or_else(|| Fault::registry_miss(format!("no class named `{}` is recorded", name)))
    }

    /// Resolve a class by hash identity.
    pub fn resolve_hash(&self, hash: u32) -> Result<ObjRef, Fault> {
        self.classes
            .get(&hash)
            .cloned()
            .ok_or_else(|| Fault::registry_miss(format!("no class recorded under 0x{:08x}", hash)))
    }

    /// Remove a class from the registry (library teardown).
    pub fn unrecord(&mut self, class: &ObjRef) -> Result<(), Fault> {
        let hash = class
            .borrow()
            .as_class()
            .map(|data| data.hash_id)
            .ok_or_else(|| Fault::domain("only classes can be unrecorded", ObjRef::null()))?;
        match self.classes.shift_remove(&hash) {
            Some(_) => {
                debug!("registry: unrecorded class 0x{:08x}", hash);
                Ok(())
            }
            None => Err(Fault::registry_miss(format!(
                "no class recorded under 0x{:08x}",
                hash
            ))),
        }
    }
}

impl Registry {
    /// Get the **Object** class.
    pub fn object_class(&self) -> ObjRef {
        self.core.object_class.clone()
    }

    /// Get the **Class** class.
    pub fn class_class(&self) -> ObjRef {
        self.core.class_class.clone()
    }

    /// Get the **Context** class.
    pub fn context_class(&self) -> ObjRef {
        self.core.context_class.clone()
    }

    /// Get the **Block** class.
    pub fn block_class(&self) -> ObjRef {
        self.core.block_class.clone()
    }

    /// Get the **Integer** class.
    pub fn integer_class(&self) -> ObjRef {
        self.core.integer_class.clone()
    }

    /// Get the **Number** class.
    pub fn number_class(&self) -> ObjRef {
        self.core.number_class.clone()
    }

    /// Get the **Text** class.
    pub fn text_class(&self) -> ObjRef {
        self.core.text_class.clone()
    }

    /// Get the **Boolean** class.
    pub fn boolean_class(&self) -> ObjRef {
        self.core.boolean_class.clone()
    }
}

impl Registry {
    /// Materialize an integer value.
    pub fn make_integer(&self, value: i64) -> ObjRef {
        ObjRef::new(Object::with_payload(
            self.core.integer_class.clone(),
            Payload::Integer(value),
        ))
    }

    /// Materialize a floating-point value.
    pub fn make_number(&self, value: f64) -> ObjRef {
        ObjRef::new(Object::with_payload(
            self.core.number_class.clone(),
            Payload::Number(value),
        ))
    }

    /// Materialize a text value.
    pub fn make_text(&self, value: &str) -> ObjRef {
        ObjRef::new(Object::with_payload(
            self.core.text_class.clone(),
            Payload::Text(value.to_string()),
        ))
    }

    /// Materialize a boolean value.
    pub fn make_boolean(&self, value: bool) -> ObjRef {
        ObjRef::new(Object::with_payload(
            self.core.boolean_class.clone(),
            Payload::Boolean(value),
        ))
    }

    /// Allocate an instance of a class: the property array spans the whole
    /// super chain, and native constructors run root-first down the chain.
    pub fn make_instance(&mut self, class: &ObjRef) -> Result<ObjRef, Fault> {
        if class.is_null() || !class.borrow().is_class() {
            return Err(Fault::domain(
                "only classes can be instantiated",
                ObjRef::null(),
            ));
        }

        let property_count = class::total_object_properties(class);
        let object = ObjRef::new(Object::new(class.normal(), property_count));

        for link in class::chain(class).into_iter().rev() {
            let constructor = link.borrow().as_class().and_then(|data| data.constructor);
            if let Some(constructor) = constructor {
                constructor(self, &object)?;
            }
        }
        Ok(object)
    }
}

fn raw_class(class_class: &ObjRef, super_class: &ObjRef, name: &str) -> ObjRef {
    let mut data = ClassData::new(name);
    data.super_class = super_class.clone();
    ObjRef::new(Object {
        class: class_class.clone(),
        properties: Vec::new(),
        payload: Payload::Class(data),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstrap_wires_the_core_hierarchy() {
        let registry = Registry::new();

        let object = registry.resolve("Object").unwrap();
        assert!(object.ptr_eq(&registry.object_class()));
        assert!(class::super_class(&object).is_null());

        let class = registry.resolve("Class").unwrap();
        assert!(class::super_class(&class).ptr_eq(&object));
        // The class of classes is itself, held weakly.
        assert!(class.class_of().ptr_eq(&class));

        let block = registry.resolve("Block").unwrap();
        assert!(class::super_class(&block).ptr_eq(&registry.context_class()));
    }

    #[test]
    fn record_fails_on_naming_conflicts() {
        let mut registry = Registry::new();
        let class = raw_class(&registry.class_class(), &registry.object_class(), "Thing");

        registry.record(&class, "Thing", false).unwrap();
        let duplicate = raw_class(&registry.class_class(), &registry.object_class(), "Thing");
        let error = registry.record(&duplicate, "Thing", false).unwrap_err();
        assert_eq!(error.kind, crate::error::FaultKind::RegistryConflict);

        // The replace flag is the bootstrap escape hatch.
        registry.record(&duplicate, "Thing", true).unwrap();
        assert!(registry.resolve("Thing").unwrap().ptr_eq(&duplicate));
    }

    #[test]
    fn resolve_fails_on_absent_classes() {
        let registry = Registry::new();
        let error = registry.resolve("Nowhere").unwrap_err();
        assert_eq!(error.kind, crate::error::FaultKind::RegistryMiss);
        assert!(registry.resolve_hash(0xdead_beef).is_err());
    }

    #[test]
    fn unrecord_removes_exactly_once() {
        let mut registry = Registry::new();
        let class = raw_class(&registry.class_class(), &registry.object_class(), "Gone");
        registry.record(&class, "Gone", false).unwrap();

        registry.unrecord(&class).unwrap();
        assert!(registry.resolve("Gone").is_err());
        assert!(registry.unrecord(&class).is_err());
    }

    #[test]
    fn instances_span_the_property_chain_and_run_constructors() {
        fn prime(registry: &mut Registry, object: &ObjRef) -> Result<(), Fault> {
            let seven = registry.make_integer(7);
            object.borrow_mut().set_property(0, seven).unwrap();
            Ok(())
        }

        let mut registry = Registry::new();
        let base = raw_class(&registry.class_class(), &registry.object_class(), "Base");
        {
            let mut object = base.borrow_mut();
            let data = object.as_class_mut().unwrap();
            data.obj_properties = 1;
            data.constructor = Some(prime);
        }
        registry.record(&base, "Base", false).unwrap();

        let derived = raw_class(&registry.class_class(), &base, "Derived");
        derived.borrow_mut().as_class_mut().unwrap().obj_properties = 2;
        registry.record(&derived, "Derived", false).unwrap();

        let instance = registry.make_instance(&derived).unwrap();
        assert_eq!(instance.borrow().properties.len(), 3);
        let primed = instance.borrow().property(0).unwrap();
        assert_eq!(primed.borrow().as_integer(), Some(7));
        assert!(instance.borrow().property(1).unwrap().is_null());
    }

    #[test]
    fn selector_names_intern_for_diagnostics() {
        let mut registry = Registry::new();
        let hash = registry.intern_selector("doThing:");
        assert_eq!(registry.selector_name(hash), "doThing:");
        assert!(registry.selector_name(0x0102_0304).starts_with("0x"));
    }
}
