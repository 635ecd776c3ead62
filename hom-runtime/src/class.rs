//!
//! Facilities for manipulating classes and their method tables.
//!
//! A class is itself an object whose payload is a [`ClassData`]: a 32-bit
//! name digest (the sole runtime identity), a super link, the property counts
//! this class adds, a pair of sorted method tables, a bytecode blob, and an
//! optional native constructor.
//!
//! Method tables are kept sorted ascending by selector hash so lookup is a
//! binary search; a miss is not an error, resolution walks to the super
//! class. Entries imported as "inherited" are placeholders that get linked
//! (replaced by the concrete entry found up the chain) once, at registration
//! time.
//!

use std::rc::Rc;

use crate::error::Fault;
use crate::hash::selector_hash;
use crate::primitives::{NativeConstructor, NativeFn};
use crate::ObjRef;

/// How a method table entry is implemented.
#[derive(Clone, Copy)]
pub enum MethodKind {
    /// A native method (host code).
    Native(NativeFn),
    /// A compiled method, starting at the given offset into its owner's
    /// bytecode blob.
    Bytecode {
        /// Offset of the method's first instruction.
        offset: u16,
    },
    /// An inherited entry not yet linked against the super chain.
    UnlinkedSuper,
}

/// A method table entry.
#[derive(Clone)]
pub struct VTableEntry {
    /// The selector digest.
    pub hash_id: u32,
    /// The class that defined the method (weak; its hash is the
    /// owner-class-id of the wire format).
    pub owner: ObjRef,
    /// The implementation.
    pub kind: MethodKind,
    /// The number of parameter and local slots the method needs beyond the
    /// fixed four.
    pub locals: u8,
}

/// The per-class pair of method tables.
///
/// Object-method and class-method tables are independent and identically
/// structured, each sorted ascending by selector hash.
#[derive(Default)]
pub struct VTable {
    /// Entries answering sends to instances.
    pub object_entries: Vec<VTableEntry>,
    /// Entries answering sends to the class itself.
    pub class_entries: Vec<VTableEntry>,
}

impl VTable {
    /// Binary-search the object-method entries.
    pub fn find(&self, hash_id: u32) -> Option<&VTableEntry> {
        search(&self.object_entries, hash_id)
    }

    /// Binary-search the class-method entries.
    pub fn class_find(&self, hash_id: u32) -> Option<&VTableEntry> {
        search(&self.class_entries, hash_id)
    }

    /// Insert an object-method entry, keeping the table sorted.
    ///
    /// An entry with the same hash is replaced.
    pub fn insert_object(&mut self, entry: VTableEntry) {
        insert(&mut self.object_entries, entry);
    }

    /// Insert a class-method entry, keeping the table sorted.
    pub fn insert_class(&mut self, entry: VTableEntry) {
        insert(&mut self.class_entries, entry);
    }
}

fn search(entries: &[VTableEntry], hash_id: u32) -> Option<&VTableEntry> {
    let index = entries
        .binary_search_by_key(&hash_id, |entry| entry.hash_id)
        .ok()?;
    Some(&entries[index])
}

fn insert(entries: &mut Vec<VTableEntry>, entry: VTableEntry) {
    match entries.binary_search_by_key(&entry.hash_id, |existing| existing.hash_id) {
        Ok(index) => entries[index] = entry,
        Err(index) => entries.insert(index, entry),
    }
}

/// The state of a loaded class.
pub struct ClassData {
    /// The class' name (empty for classes imported by hash alone).
    pub name: String,
    /// The 32-bit digest of the name; the class' runtime identity.
    pub hash_id: u32,
    /// The superclass (null at the root).
    pub super_class: ObjRef,
    /// How many object properties this class adds to its instances.
    pub obj_properties: u8,
    /// How many class-level properties this class adds.
    pub class_properties: u8,
    /// The class' method tables.
    pub vtable: VTable,
    /// The class' bytecode blob, shared with running frames.
    pub bytecode: Rc<Vec<u8>>,
    /// The native constructor, if any.
    pub constructor: Option<NativeConstructor>,
}

impl ClassData {
    /// Construct a fresh, root-parented class with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let hash_id = selector_hash(&name);
        Self {
            name,
            hash_id,
            super_class: ObjRef::null(),
            obj_properties: 0,
            class_properties: 0,
            vtable: VTable::default(),
            bytecode: Rc::new(Vec::new()),
            constructor: None,
        }
    }
}

/// Get a class' displayable name (hash-only classes render in hexadecimal).
pub fn class_name(class: &ObjRef) -> String {
    if class.is_null() {
        return String::from("??");
    }
    let object = class.borrow();
    match object.as_class() {
        Some(data) if data.name.is_empty() => format!("0x{:08x}", data.hash_id),
        Some(data) => data.name.clone(),
        None => String::from("??"),
    }
}

/// Get a class' superclass (null at the root or for non-classes).
pub fn super_class(class: &ObjRef) -> ObjRef {
    if class.is_null() {
        return ObjRef::null();
    }
    class
        .borrow()
        .as_class()
        .map(|data| data.super_class.clone())
        .unwrap_or_else(ObjRef::null)
}

/// The cumulative object-property count over the super chain.
pub fn total_object_properties(class: &ObjRef) -> usize {
    chain(class)
        .into_iter()
        .map(|link| {
            link.borrow()
                .as_class()
                .map_or(0, |data| data.obj_properties as usize)
        })
        .sum()
}

/// The cumulative class-property count over the super chain.
pub fn total_class_properties(class: &ObjRef) -> usize {
    chain(class)
        .into_iter()
        .map(|link| {
            link.borrow()
                .as_class()
                .map_or(0, |data| data.class_properties as usize)
        })
        .sum()
}

/// The super chain starting at `class` itself, leaf first.
pub fn chain(class: &ObjRef) -> Vec<ObjRef> {
    let mut links = Vec::new();
    let mut current = class.normal();
    while !current.is_null() {
        links.push(current.clone());
        current = super_class(&current);
    }
    links
}

/// Resolve an instance-side selector against a class' chain.
///
/// Returns the entry and the class whose table held it.
pub fn find_method(class: &ObjRef, hash_id: u32) -> Option<(VTableEntry, ObjRef)> {
    for link in chain(class) {
        let found = link
            .borrow()
            .as_class()
            .and_then(|data| data.vtable.find(hash_id).cloned());
        if let Some(entry) = found {
            return Some((entry, link));
        }
    }
    None
}

/// Resolve a class-side selector against a class' chain.
pub fn find_class_method(class: &ObjRef, hash_id: u32) -> Option<(VTableEntry, ObjRef)> {
    for link in chain(class) {
        let found = link
            .borrow()
            .as_class()
            .and_then(|data| data.vtable.class_find(hash_id).cloned());
        if let Some(entry) = found {
            return Some((entry, link));
        }
    }
    None
}

/// Link a class' inherited entries against its super chain.
///
/// Every `UnlinkedSuper` placeholder is replaced by the concrete entry found
/// by walking the supers: copied down once, never looked up per send.
pub fn link_vtable(class: &ObjRef) -> Result<(), Fault> {
    let parent = super_class(class);
    link_entries(class, &parent, false)?;
    link_entries(class, &parent, true)
}

fn link_entries(class: &ObjRef, parent: &ObjRef, class_side: bool) -> Result<(), Fault> {
    let unlinked: Vec<u32> = {
        let object = class.borrow();
        let data = match object.as_class() {
            Some(data) => data,
            None => return Ok(()),
        };
        let entries = if class_side {
            &data.vtable.class_entries
        } else {
            &data.vtable.object_entries
        };
        entries
            .iter()
            .filter(|entry| matches!(entry.kind, MethodKind::UnlinkedSuper))
            .map(|entry| entry.hash_id)
            .collect()
    };

    for hash_id in unlinked {
        let resolved = if class_side {
            find_class_method(parent, hash_id)
        } else {
            find_method(parent, hash_id)
        };
        let (entry, _) = resolved.ok_or_else(|| {
            Fault::registry_miss(format!(
                "cannot link inherited method 0x{:08x} of class `{}`",
                hash_id,
                class_name(class)
            ))
        })?;

        let mut object = class.borrow_mut();
        let data = object.as_class_mut().expect("checked above");
        if class_side {
            data.vtable.insert_class(entry);
        } else {
            data.vtable.insert_object(entry);
        }
    }

    Ok(())
}
