//!
//! The wire codec for compiled class records.
//!
//! This is the contract a library loader/serializer builds on. A class
//! record is, in order: `{4B class hash BE, 4B super hash BE (zero at the
//! root), 1B class-property-count, 1B object-property-count, 1B
//! object-entry-count, 1B class-entry-count, the object entries, the class
//! entries, 2B bytecode-length BE, the bytecode}`. Each entry is `{4B hash
//! BE, 4B owner-class-id BE, 1B flags, 1B locals, 2B offset BE}` with a zero
//! offset for inherited entries.
//!
//! `write` marks an entry inherited whenever its owner is not the class
//! being written; `import` turns inherited entries back into placeholders
//! that are relinked against the super chain at registration time. Native
//! bodies cannot travel in a record, so native-flagged entries fault on
//! import.
//!

use std::convert::TryInto;
use std::rc::Rc;

use log::debug;

use crate::class::{self, ClassData, MethodKind, VTableEntry};
use crate::error::Fault;
use crate::object::{Object, Payload};
use crate::registry::Registry;
use crate::ObjRef;

const FLAG_BYTECODE: u8 = 0;
const FLAG_NATIVE: u8 = 1;
const FLAG_INHERITED: u8 = 2;

impl Registry {
    /// Serialize a class into its on-wire record.
    pub fn write(&self, class: &ObjRef) -> Result<Vec<u8>, Fault> {
        let object = class.borrow();
        let data = object
            .as_class()
            .ok_or_else(|| Fault::domain("only classes can be written", ObjRef::null()))?;

        let mut bytes = Vec::new();
        bytes.extend_from_slice(&data.hash_id.to_be_bytes());
        let super_hash = if data.super_class.is_null() {
            0
        } else {
            data.super_class
                .borrow()
                .as_class()
                .map(|data| data.hash_id)
                .unwrap_or(0)
        };
        bytes.extend_from_slice(&super_hash.to_be_bytes());
        bytes.push(data.class_properties);
        bytes.push(data.obj_properties);

        bytes.push(table_count(&data.vtable.object_entries)?);
        bytes.push(table_count(&data.vtable.class_entries)?);
        for entry in &data.vtable.object_entries {
            write_entry(&mut bytes, entry, class);
        }
        for entry in &data.vtable.class_entries {
            write_entry(&mut bytes, entry, class);
        }

        let length: u16 = data.bytecode.len().try_into().map_err(|_| {
            Fault::domain("bytecode too large for a class record", ObjRef::null())
        })?;
        bytes.extend_from_slice(&length.to_be_bytes());
        bytes.extend_from_slice(&data.bytecode);
        Ok(bytes)
    }

    /// Rebuild a class from its on-wire record and register it.
    ///
    /// The super class must already be recorded; imported classes are known
    /// by their hash alone.
    pub fn import(&mut self, bytes: &[u8]) -> Result<ObjRef, Fault> {
        let mut reader = Reader::new(bytes);
        let hash_id = reader.u32()?;
        let super_hash = reader.u32()?;
        let class_properties = reader.u8()?;
        let obj_properties = reader.u8()?;
        let object_count = reader.u8()? as usize;
        let class_count = reader.u8()? as usize;

        let mut object_entries = Vec::with_capacity(object_count);
        for _ in 0..object_count {
            object_entries.push(read_entry(&mut reader)?);
        }
        let mut class_entries = Vec::with_capacity(class_count);
        for _ in 0..class_count {
            class_entries.push(read_entry(&mut reader)?);
        }

        let length = reader.u16()? as usize;
        let bytecode = reader.bytes(length)?.to_vec();

        let super_class = if super_hash == 0 {
            ObjRef::null()
        } else {
            self.resolve_hash(super_hash)?
        };

        let mut data = ClassData::new("");
        data.name = String::new();
        data.hash_id = hash_id;
        data.super_class = super_class.clone();
        data.obj_properties = obj_properties;
        data.class_properties = class_properties;
        data.bytecode = Rc::new(bytecode);
        for entry in object_entries {
            data.vtable.insert_object(entry);
        }
        for entry in class_entries {
            data.vtable.insert_class(entry);
        }

        let property_count =
            class_properties as usize + class::total_class_properties(&super_class);
        let class = ObjRef::new(Object {
            class: self.class_class(),
            properties: vec![ObjRef::null(); property_count],
            payload: Payload::Class(data),
        });

        // Concrete entries are owned by the class itself; placeholders get
        // their owner when they are linked at registration.
        {
            let owner = class.weak();
            let mut object = class.borrow_mut();
            let data = object.as_class_mut().expect("just built as a class");
            for entry in data
                .vtable
                .object_entries
                .iter_mut()
                .chain(data.vtable.class_entries.iter_mut())
            {
                if matches!(entry.kind, MethodKind::Bytecode { .. }) {
                    entry.owner = owner.clone();
                }
            }
        }

        self.record_imported(&class)?;
        debug!("registry: imported class 0x{:08x}", hash_id);
        Ok(class)
    }
}

fn table_count(entries: &[VTableEntry]) -> Result<u8, Fault> {
    entries
        .len()
        .try_into()
        .map_err(|_| Fault::domain("method table too large for a class record", ObjRef::null()))
}

fn write_entry(bytes: &mut Vec<u8>, entry: &VTableEntry, class: &ObjRef) {
    let owner_id = if entry.owner.is_null() {
        0
    } else {
        entry
            .owner
            .borrow()
            .as_class()
            .map(|data| data.hash_id)
            .unwrap_or(0)
    };
    let inherited = !entry.owner.ptr_eq(class);
    let (flags, offset) = if inherited {
        (FLAG_INHERITED, 0)
    } else {
        match entry.kind {
            MethodKind::Bytecode { offset } => (FLAG_BYTECODE, offset),
            MethodKind::Native(_) => (FLAG_NATIVE, 0),
            MethodKind::UnlinkedSuper => (FLAG_INHERITED, 0),
        }
    };

    bytes.extend_from_slice(&entry.hash_id.to_be_bytes());
    bytes.extend_from_slice(&owner_id.to_be_bytes());
    bytes.push(flags);
    bytes.push(entry.locals);
    bytes.extend_from_slice(&offset.to_be_bytes());
}

fn read_entry(reader: &mut Reader<'_>) -> Result<VTableEntry, Fault> {
    let hash_id = reader.u32()?;
    let _owner_id = reader.u32()?;
    let flags = reader.u8()?;
    let locals = reader.u8()?;
    let offset = reader.u16()?;

    let kind = match flags {
        FLAG_BYTECODE => MethodKind::Bytecode { offset },
        FLAG_INHERITED => MethodKind::UnlinkedSuper,
        FLAG_NATIVE => {
            return Err(Fault::domain(
                "native methods cannot travel in a class record",
                ObjRef::null(),
            ))
        }
        other => {
            return Err(Fault::domain(
                format!("unknown method flags 0x{:02x} in a class record", other),
                ObjRef::null(),
            ))
        }
    };

    Ok(VTableEntry {
        hash_id,
        owner: ObjRef::null(),
        kind,
        locals,
    })
}

struct Reader<'a> {
    bytes: &'a [u8],
    at: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, at: 0 }
    }

    fn bytes(&mut self, count: usize) -> Result<&'a [u8], Fault> {
        let slice = self
            .bytes
            .get(self.at..self.at + count)
            .ok_or_else(|| Fault::domain("truncated class record", ObjRef::null()))?;
        self.at += count;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, Fault> {
        Ok(self.bytes(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, Fault> {
        let bytes = self.bytes(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn u32(&mut self) -> Result<u32, Fault> {
        let bytes = self.bytes(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}
