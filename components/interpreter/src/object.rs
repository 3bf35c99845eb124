//! Heap cells and the slot/name/trait property store.
//!
//! Every object in the heap is an [`Obj`]: a type reference, the helper
//! vtable chosen by that type, a [`PropertyStore`] and a kind-specific
//! payload. Blocks, types and functions are objects with extra data, so
//! one store implementation serves all of them.

use crate::block::BlockData;
use crate::function::FunctionData;
use crate::helpers::Helpers;
use crate::names::{Lookup, Names};
use crate::types::TypeData;
use bitflags::bitflags;
use bytecode_system::Attributes;
use core_types::{GcRef, QualifiedName, StackFrame, Value};
use std::sync::Arc;

bitflags! {
    /// Per-object dispatch flags.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct ObjFlags: u8 {
        /// Accepts new named properties at runtime
        const DYNAMIC = 1 << 0;
        /// Backed by a native helper implementation
        const NATIVE = 1 << 1;
    }
}

/// Metadata parallel to a slot: declared type and attributes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Trait {
    /// Declared type, if any
    pub declared_type: Option<GcRef>,
    /// Declaration attributes
    pub attributes: Attributes,
}

impl Trait {
    /// A trait with attributes and no declared type.
    pub fn new(attributes: Attributes) -> Self {
        Trait {
            declared_type: None,
            attributes,
        }
    }

    /// A trait with a declared type.
    pub fn typed(declared_type: Option<GcRef>, attributes: Attributes) -> Self {
        Trait {
            declared_type,
            attributes,
        }
    }
}

/// Capacity reserved for a store holding `len` slots.
///
/// Small stores grow in steps of eight; large ones to the next power of two
/// so repeated appends stay amortized.
pub fn round_capacity(len: usize) -> usize {
    match len {
        0..=4 => 4,
        5..=64 => (len + 7) & !7,
        _ => len.next_power_of_two(),
    }
}

/// Slots, traits and names of one object.
///
/// The three tables are reference counted. Cloning a store shares them and
/// the first mutation of a shared table copies it, so instances can alias
/// their type's template until they diverge.
#[derive(Debug, Clone, Default)]
pub struct PropertyStore {
    slots: Arc<Vec<Value>>,
    traits: Arc<Vec<Trait>>,
    names: Arc<Names>,
}

impl PropertyStore {
    /// An empty store.
    pub fn new() -> Self {
        PropertyStore::default()
    }

    /// A store with `len` undefined, unnamed slots.
    pub fn with_len(len: usize) -> Self {
        let mut store = PropertyStore::new();
        store.grow_to(len);
        store
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True if there are no slots.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Reserved slot capacity.
    pub fn capacity(&self) -> usize {
        self.slots.capacity()
    }

    /// Value of `slot`.
    pub fn get(&self, slot: u32) -> Option<&Value> {
        self.slots.get(slot as usize)
    }

    /// All slot values.
    pub fn values(&self) -> &[Value] {
        &self.slots
    }

    /// Trait of `slot`.
    pub fn trait_at(&self, slot: u32) -> Option<&Trait> {
        self.traits.get(slot as usize)
    }

    /// All traits.
    pub fn traits(&self) -> &[Trait] {
        &self.traits
    }

    /// Name of `slot`, if it is named.
    pub fn name(&self, slot: u32) -> Option<&QualifiedName> {
        self.names.get(slot)
    }

    /// The name table.
    pub fn names(&self) -> &Names {
        &self.names
    }

    /// Slot of an exact qualified name.
    pub fn lookup(&self, name: &QualifiedName) -> Option<u32> {
        self.names.lookup(name)
    }

    /// Slot carrying `name` in whichever namespace holds it.
    pub fn lookup_unqualified(&self, name: &str) -> Lookup {
        self.names.lookup_unqualified(name)
    }

    /// True if `other` still aliases this store's slot table.
    pub fn shares_slots_with(&self, other: &PropertyStore) -> bool {
        Arc::ptr_eq(&self.slots, &other.slots)
    }

    /// Extends all three tables to at least `len` entries. Capacity never
    /// shrinks.
    pub fn grow_to(&mut self, len: usize) {
        if len <= self.slots.len() {
            return;
        }
        let slots = Arc::make_mut(&mut self.slots);
        if slots.capacity() < len {
            let target = round_capacity(len);
            slots.reserve_exact(target - slots.len());
        }
        slots.resize(len, Value::Undefined);
        Arc::make_mut(&mut self.traits).resize(len, Trait::default());
        Arc::make_mut(&mut self.names).resize(len);
    }

    /// Appends `count` empty slots.
    pub fn grow_by(&mut self, count: usize) {
        self.grow_to(self.len() + count);
    }

    /// Stores `value` at `slot`, or appends it when `slot` is `None`.
    /// Returns the slot used.
    pub fn set(&mut self, slot: Option<u32>, value: Value) -> u32 {
        let slot = slot.unwrap_or(self.len() as u32);
        self.grow_to(slot as usize + 1);
        Arc::make_mut(&mut self.slots)[slot as usize] = value;
        slot
    }

    /// Sets the name, trait and value of a slot in one step.
    pub fn define(
        &mut self,
        slot: Option<u32>,
        name: QualifiedName,
        attributes: Trait,
        value: Value,
    ) -> u32 {
        let slot = self.set(slot, value);
        Arc::make_mut(&mut self.traits)[slot as usize] = attributes;
        Arc::make_mut(&mut self.names).set(slot, name);
        slot
    }

    /// Renames `slot`.
    pub fn set_name(&mut self, slot: u32, name: QualifiedName) {
        self.grow_to(slot as usize + 1);
        Arc::make_mut(&mut self.names).set(slot, name);
    }

    /// Replaces the trait of `slot`.
    pub fn set_trait(&mut self, slot: u32, attributes: Trait) {
        self.grow_to(slot as usize + 1);
        Arc::make_mut(&mut self.traits)[slot as usize] = attributes;
    }

    /// Nulls `slot` and drops its name. Other slots keep their numbers.
    pub fn delete(&mut self, slot: u32) -> bool {
        if slot as usize >= self.len() {
            return false;
        }
        Arc::make_mut(&mut self.slots)[slot as usize] = Value::Null;
        Arc::make_mut(&mut self.traits)[slot as usize] = Trait::default();
        Arc::make_mut(&mut self.names).clear(slot);
        true
    }

    /// Opens `count` empty slots at `at`, moving later slots up.
    pub fn insert_room(&mut self, count: usize, at: usize) {
        if count == 0 {
            return;
        }
        let at = at.min(self.len());
        let slots = Arc::make_mut(&mut self.slots);
        let tail = slots.split_off(at);
        slots.extend(std::iter::repeat(Value::Undefined).take(count));
        slots.extend(tail);

        let traits = Arc::make_mut(&mut self.traits);
        let tail = traits.split_off(at);
        traits.extend(std::iter::repeat(Trait::default()).take(count));
        traits.extend(tail);

        Arc::make_mut(&mut self.names).insert_room(count, at);
    }

    /// Iterates over `(slot, name)` for named slots.
    pub fn named_slots(&self) -> impl Iterator<Item = (u32, &QualifiedName)> {
        self.names.iter()
    }
}

/// Payload of a core error instance.
#[derive(Debug, Clone, Default)]
pub struct ErrorData {
    /// Backtrace captured when the error was first thrown
    pub backtrace: Vec<StackFrame>,
    /// True once `backtrace` has been captured
    pub captured: bool,
}

/// What kind of cell an [`Obj`] is.
#[derive(Debug, Clone)]
pub enum ObjKind {
    /// Plain property container
    Object,
    /// Lexical scope
    Block,
    /// A type; its props are the static slots
    Type(Box<TypeData>),
    /// A function template or closure; its props are the activation layout
    Function(Box<FunctionData>),
    /// Core array elements
    Array(Vec<Value>),
    /// Core error instance
    Error(Box<ErrorData>),
}

/// A heap object.
#[derive(Debug, Clone)]
pub struct Obj {
    /// Type of this object; fixed for its lifetime
    pub ty: GcRef,
    /// Helper vtable selected by the type at creation
    pub helpers: Arc<dyn Helpers>,
    /// Dispatch flags
    pub flags: ObjFlags,
    /// Slots, traits and names
    pub props: PropertyStore,
    /// Scope data for blocks, types and functions
    pub block: Option<Box<BlockData>>,
    /// Kind-specific payload
    pub kind: ObjKind,
}

impl Obj {
    /// A plain object with no properties.
    pub fn new(ty: GcRef, helpers: Arc<dyn Helpers>) -> Self {
        Obj {
            ty,
            helpers,
            flags: ObjFlags::empty(),
            props: PropertyStore::new(),
            block: None,
            kind: ObjKind::Object,
        }
    }

    /// A block with `slots` empty slots.
    pub fn block(ty: GcRef, helpers: Arc<dyn Helpers>, slots: usize, data: BlockData) -> Self {
        Obj {
            ty,
            helpers,
            flags: ObjFlags::DYNAMIC,
            props: PropertyStore::with_len(slots),
            block: Some(Box::new(data)),
            kind: ObjKind::Block,
        }
    }

    /// True if the object accepts new properties.
    pub fn is_dynamic(&self) -> bool {
        self.flags.contains(ObjFlags::DYNAMIC)
    }

    /// Type payload.
    pub fn as_type(&self) -> Option<&TypeData> {
        match &self.kind {
            ObjKind::Type(data) => Some(data),
            _ => None,
        }
    }

    /// Mutable type payload.
    pub fn as_type_mut(&mut self) -> Option<&mut TypeData> {
        match &mut self.kind {
            ObjKind::Type(data) => Some(data),
            _ => None,
        }
    }

    /// Function payload.
    pub fn as_function(&self) -> Option<&FunctionData> {
        match &self.kind {
            ObjKind::Function(data) => Some(data),
            _ => None,
        }
    }

    /// Mutable function payload.
    pub fn as_function_mut(&mut self) -> Option<&mut FunctionData> {
        match &mut self.kind {
            ObjKind::Function(data) => Some(data),
            _ => None,
        }
    }

    /// Array elements.
    pub fn as_array(&self) -> Option<&Vec<Value>> {
        match &self.kind {
            ObjKind::Array(elements) => Some(elements),
            _ => None,
        }
    }

    /// Mutable array elements.
    pub fn as_array_mut(&mut self) -> Option<&mut Vec<Value>> {
        match &mut self.kind {
            ObjKind::Array(elements) => Some(elements),
            _ => None,
        }
    }

    /// Block data, for blocks, types and functions.
    pub fn block_data(&self) -> Option<&BlockData> {
        self.block.as_deref()
    }

    /// Mutable block data.
    pub fn block_data_mut(&mut self) -> Option<&mut BlockData> {
        self.block.as_deref_mut()
    }

    /// Slots inherited from a base block.
    pub fn num_inherited(&self) -> u32 {
        self.block.as_ref().map_or(0, |block| block.num_inherited)
    }
}
