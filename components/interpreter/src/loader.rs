//! Module loading.
//!
//! A load batch walks the section sequence of one or more module records
//! and materializes it: classes become types bound to global slots,
//! functions become eternal function templates, properties become slots of
//! whatever container is open. Type references that name a type not
//! defined yet are recorded as fixups. Once every record of the batch is
//! read the fixups are resolved, the new types inherit their bases' layout
//! in base-first order, and their initializers are queued.

use crate::block::BlockData;
use crate::error::{VmError, VmResult};
use crate::function::{FunctionBody, FunctionData, FunctionFlags, ScriptCode};
use crate::object::{Obj, Trait};
use crate::types::{TypeFlags, TypeSpec};
use crate::vm::Interpreter;
use bytecode_system::{
    Attributes, BlockRecord, BytecodeChunk, ClassRecord, ConstantValue, ExceptionRecord,
    FunctionRecord, ModuleError, ModuleRecord, PropertyRecord, Section, TypeRef,
};
use core_types::{GcRef, QualifiedName, Value};
use memory_manager::Generation;
use std::sync::Arc;
use tracing::{debug, info};

/// Where a resolved fixup stores its type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FixupTarget {
    /// Base of the holder type
    Base,
    /// An interface the holder type implements
    Interface,
    /// Declared type of a slot of the holder
    Trait(u32),
    /// Declared type of a parameter of the holder function
    Arg(usize),
    /// Declared return type of the holder function
    Return,
    /// Catch type of a handler of the holder function
    Catch(usize),
}

/// A type reference waiting for its type to be defined.
#[derive(Debug, Clone)]
pub(crate) struct Fixup {
    pub(crate) holder: GcRef,
    pub(crate) target: FixupTarget,
    pub(crate) name: QualifiedName,
    pub(crate) module: Arc<str>,
}

impl Fixup {
    /// The object the resolved type is stored into.
    pub(crate) fn holder(&self) -> GcRef {
        self.holder
    }
}

/// Work queued for [`Interpreter::run_initializers`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Initializer {
    /// A module initializer function
    Module(GcRef),
    /// A type to bring to the ready state
    Type(GcRef),
}

impl Initializer {
    pub(crate) fn target(&self) -> GcRef {
        match *self {
            Initializer::Module(function) | Initializer::Type(function) => function,
        }
    }
}

/// A function whose sections are still being read.
struct PendingFunction {
    function: GcRef,
    container: GcRef,
    code: Option<BytecodeChunk>,
    handlers: Vec<ExceptionRecord>,
    expected_handlers: u32,
}

/// An open container section.
enum Open {
    Module,
    Class(GcRef),
    Instance(GcRef),
    Block(GcRef),
    Function(Box<PendingFunction>),
}

/// State of one load batch.
struct Batch {
    module: Arc<str>,
    constants: Arc<[Arc<str>]>,
    file: Option<Arc<str>>,
    defined: Vec<String>,
    open: Vec<Open>,
    loaded: Vec<String>,
    initializers: Vec<Initializer>,
}

impl Batch {
    fn new(records: &[Arc<ModuleRecord>]) -> Self {
        let defined = records
            .iter()
            .flat_map(|record| record.module_names().map(str::to_string))
            .collect();
        Batch {
            module: Arc::from(""),
            constants: Arc::from(Vec::new()),
            file: None,
            defined,
            open: Vec::new(),
            loaded: Vec::new(),
            initializers: Vec::new(),
        }
    }
}

fn invalid<T>(message: impl Into<String>) -> VmResult<T> {
    Err(VmError::Load(ModuleError::Invalid(message.into())))
}

fn constant_value(value: &ConstantValue) -> Value {
    match value {
        ConstantValue::Null => Value::Null,
        ConstantValue::Boolean(b) => Value::Boolean(*b),
        ConstantValue::Number(n) => Value::Number(*n),
        ConstantValue::String(s) => Value::string(s),
    }
}

impl Interpreter {
    /// Loads `records` as one batch and returns the names of the modules
    /// they defined.
    ///
    /// Records must be in dependency order. On failure the fixups and
    /// types of the batch are dropped and none of its modules count as
    /// loaded.
    pub(crate) fn load_batch(&mut self, records: &[Arc<ModuleRecord>]) -> VmResult<Vec<String>> {
        let mut batch = Batch::new(records);
        let result = self.read_batch(records, &mut batch);
        if result.is_err() {
            self.fixups.clear();
            self.pending_types.clear();
            for name in &batch.loaded {
                self.loaded.remove(name);
            }
        }
        result.map(|_| batch.loaded)
    }

    fn read_batch(&mut self, records: &[Arc<ModuleRecord>], batch: &mut Batch) -> VmResult<()> {
        for record in records {
            record.validate()?;
            batch.constants = record
                .constants
                .iter()
                .map(|text| Arc::from(text.as_str()))
                .collect();
            batch.file = record.file.as_deref().map(Arc::from);
            for section in &record.sections {
                self.load_section(batch, section)?;
            }
            if !batch.open.is_empty() {
                return invalid("record ends inside an open section");
            }
        }
        self.finish_batch(batch)
    }

    fn load_section(&mut self, batch: &mut Batch, section: &Section) -> VmResult<()> {
        match section {
            Section::Module { name, .. } => {
                if !batch.open.is_empty() {
                    return invalid(format!("module '{}' opened inside another", name));
                }
                if self.loaded.contains(name) {
                    return invalid(format!("module '{}' is already loaded", name));
                }
                batch.module = Arc::from(name.as_str());
                batch.open.push(Open::Module);
                debug!(target: "ejs::loader", module = %name, "loading module");
            }
            Section::Dependency { name } => {
                if !self.loaded.contains(name) && !batch.defined.contains(name) {
                    return invalid(format!(
                        "module '{}' depends on '{}', which is not loaded",
                        batch.module, name
                    ));
                }
            }
            Section::Class(record) => {
                if !matches!(batch.open.last(), Some(Open::Module)) {
                    return invalid(format!("class {} outside module scope", record.name));
                }
                let ty = self.declare_class(batch, record)?;
                batch.open.push(Open::Class(ty));
            }
            Section::Block(record) => self.open_block_section(batch, record)?,
            Section::Function(record) => self.declare_function(batch, record)?,
            Section::Property(record) => self.define_property(batch, record)?,
            Section::Exception(record) => match batch.open.last_mut() {
                Some(Open::Function(pending)) => pending.handlers.push(record.clone()),
                _ => return invalid("exception section outside a function"),
            },
            Section::FunctionEnd => match batch.open.pop() {
                Some(Open::Function(pending)) => self.finish_function(batch, *pending)?,
                _ => return invalid("unbalanced function end"),
            },
            Section::ClassEnd => {
                if !matches!(batch.open.pop(), Some(Open::Class(_))) {
                    return invalid("unbalanced class end");
                }
            }
            Section::BlockEnd => {
                if !matches!(batch.open.pop(), Some(Open::Block(_) | Open::Instance(_))) {
                    return invalid("unbalanced block end");
                }
            }
            Section::ModuleEnd => {
                if !matches!(batch.open.pop(), Some(Open::Module)) || !batch.open.is_empty() {
                    return invalid("unbalanced module end");
                }
                let name = batch.module.to_string();
                self.loaded.insert(name.clone());
                batch.loaded.push(name);
            }
            Section::Doc { .. } => {}
        }
        Ok(())
    }

    /// The object the innermost open section defines slots in.
    fn container(&self, batch: &Batch) -> VmResult<GcRef> {
        match batch.open.last() {
            Some(Open::Module) => Ok(self.global),
            Some(Open::Class(r) | Open::Instance(r) | Open::Block(r)) => Ok(*r),
            Some(Open::Function(pending)) => Ok(pending.function),
            None => invalid("section outside a module"),
        }
    }

    /// Defines a slot in `container`. A global declared without a slot
    /// reuses the slot of an existing global of the same name.
    fn place(
        &mut self,
        container: GcRef,
        slot: Option<u32>,
        name: &QualifiedName,
        attributes: Trait,
        value: Option<Value>,
    ) -> VmResult<u32> {
        let existing = match slot {
            None if container == self.global => self.obj(container)?.props.lookup(name),
            _ => None,
        };
        match (existing, value) {
            (Some(slot), None) => {
                self.obj_mut(container)?.props.set_trait(slot, attributes);
                Ok(slot)
            }
            (existing, value) => self.define_slot(
                container,
                existing.or(slot),
                name.clone(),
                attributes,
                value.unwrap_or_default(),
            ),
        }
    }

    /// Resolves a type reference now, or returns `None` if it names a type
    /// that is not defined yet.
    fn resolve_type_ref(&mut self, reference: &TypeRef) -> VmResult<Option<GcRef>> {
        match reference {
            TypeRef::Slot(slot) => {
                let value = self.obj(self.global)?.props.get(*slot).cloned();
                match value.and_then(|v| v.as_object()) {
                    Some(ty) if self.type_data(ty).is_some() => Ok(Some(ty)),
                    _ => invalid(format!("global slot {} does not hold a type", slot)),
                }
            }
            TypeRef::Name(name) => self.resolve_type_name(name),
        }
    }

    fn resolve_type_name(&mut self, name: &QualifiedName) -> VmResult<Option<GcRef>> {
        let global = self.global;
        let Some(slot) = self.lookup_own(global, name)? else {
            return Ok(None);
        };
        let value = self.obj(global)?.props.get(slot).cloned().unwrap_or_default();
        match value.as_object() {
            Some(ty) if self.type_data(ty).is_some() => Ok(Some(ty)),
            _ => invalid(format!("'{}' is not a type", name)),
        }
    }

    /// Resolves `reference` or records a fixup for it.
    fn type_ref_or_fixup(
        &mut self,
        batch: &Batch,
        reference: &TypeRef,
        holder: GcRef,
        target: FixupTarget,
    ) -> VmResult<Option<GcRef>> {
        let resolved = self.resolve_type_ref(reference)?;
        if resolved.is_none() {
            if let TypeRef::Name(name) = reference {
                self.fixups.push(Fixup {
                    holder,
                    target,
                    name: name.clone(),
                    module: batch.module.clone(),
                });
            }
        }
        Ok(resolved)
    }

    fn declare_class(&mut self, batch: &mut Batch, record: &ClassRecord) -> VmResult<GcRef> {
        let base = match &record.base {
            Some(reference) => self.resolve_type_ref(reference)?,
            None => Some(self.core.object),
        };
        let mut spec = TypeSpec::new(record.name.clone(), base);
        spec.type_props = record.num_type_props;
        spec.instance_props = record.num_instance_props;
        spec.attributes = record.attributes;
        let ty = self.create_type(spec)?;
        if let Some(data) = self.type_data_mut(ty) {
            data.module = Some(batch.module.clone());
        }
        if base.is_none() {
            if let Some(TypeRef::Name(name)) = &record.base {
                self.fixups.push(Fixup {
                    holder: ty,
                    target: FixupTarget::Base,
                    name: name.clone(),
                    module: batch.module.clone(),
                });
                if let Some(data) = self.type_data_mut(ty) {
                    data.flags |= TypeFlags::NEEDS_FIXUP;
                }
            }
        }
        for interface in &record.implements {
            if let Some(resolved) =
                self.type_ref_or_fixup(batch, interface, ty, FixupTarget::Interface)?
            {
                if let Some(data) = self.type_data_mut(ty) {
                    data.implements.push(resolved);
                }
                self.heap.note_edge(ty, resolved);
            }
        }

        let type_type = self.core.type_;
        let global = self.global;
        self.place(
            global,
            record.slot,
            &record.name,
            Trait::typed(Some(type_type), Attributes::CONST),
            Some(Value::Object(ty)),
        )?;
        self.pending_types.push(ty);
        Ok(ty)
    }

    fn open_block_section(&mut self, batch: &mut Batch, record: &BlockRecord) -> VmResult<()> {
        if record.instance {
            let Some(Open::Class(ty)) = batch.open.last() else {
                return invalid("instance block outside a class");
            };
            let ty = *ty;
            let block = match self.type_data(ty).and_then(|data| data.instance_block) {
                Some(block) => block,
                None => {
                    let block = self.allocate_instance_block(record.num_slots as usize)?;
                    if let Some(data) = self.type_data_mut(ty) {
                        data.instance_block = Some(block);
                    }
                    self.heap.note_edge(ty, block);
                    block
                }
            };
            batch.open.push(Open::Instance(block));
            return Ok(());
        }

        let container = self.container(batch)?;
        let cell = Obj::block(
            self.core.block,
            self.helpers.object.clone(),
            record.num_slots as usize,
            BlockData::default(),
        );
        let block = self.heap.allocate_in(Generation::ETERNAL, cell)?;
        self.place(
            container,
            record.slot,
            &record.name,
            Trait::default(),
            Some(Value::Object(block)),
        )?;
        batch.open.push(Open::Block(block));
        Ok(())
    }

    fn declare_function(&mut self, batch: &mut Batch, record: &FunctionRecord) -> VmResult<()> {
        let container = self.container(batch)?;
        let owner = match batch.open.last() {
            Some(Open::Class(ty)) => Some(*ty),
            _ => None,
        };
        let flags = FunctionFlags::from_attributes(record.attributes);
        if flags.contains(FunctionFlags::NATIVE) && record.code.is_some() {
            return invalid(format!("native function {} carries bytecode", record.name));
        }

        let mut data = FunctionData::new(record.name.clone(), FunctionBody::Declared);
        data.num_args = record.num_args;
        data.num_default = record.num_default;
        data.num_locals = record.num_locals;
        data.flags = flags;
        data.owner = owner;
        data.slot = record.slot;
        data.arg_types = vec![None; record.arg_types.len()];
        if flags.contains(FunctionFlags::NATIVE) {
            let key = self.native_key(owner, &record.name);
            if let Some(native) = self.natives.get(&key) {
                data.body = FunctionBody::Native(*native);
            }
        }
        let slots = data.activation_size();
        let function = self.allocate_function(data, slots, Generation::ETERNAL)?;

        let mut arg_types = Vec::with_capacity(record.arg_types.len());
        for (index, reference) in record.arg_types.iter().enumerate() {
            arg_types.push(match reference {
                Some(reference) => {
                    self.type_ref_or_fixup(batch, reference, function, FixupTarget::Arg(index))?
                }
                None => None,
            });
        }
        let return_type = match &record.return_type {
            Some(reference) => {
                self.type_ref_or_fixup(batch, reference, function, FixupTarget::Return)?
            }
            None => None,
        };
        if let Some(data) = self.obj_mut(function)?.as_function_mut() {
            data.arg_types = arg_types;
            data.return_type = return_type;
        }
        self.heap.write_barrier_all(function);

        if flags.contains(FunctionFlags::INITIALIZER) {
            match owner {
                Some(ty) => {
                    if let Some(data) = self.type_data_mut(ty) {
                        data.initializer = Some(function);
                        data.flags |= TypeFlags::HAS_INITIALIZER;
                    }
                    self.heap.note_edge(ty, function);
                }
                None => batch.initializers.push(Initializer::Module(function)),
            }
        } else {
            let mut slot = record.slot;
            if slot.is_none() && flags.contains(FunctionFlags::SETTER) {
                slot = Some(self.obj(container)?.props.len() as u32);
            }
            let slot = self.place(
                container,
                slot,
                &record.name,
                Trait::new(record.attributes),
                Some(Value::Object(function)),
            )?;
            if let Some(data) = self.obj_mut(function)?.as_function_mut() {
                data.slot = Some(slot);
            }
            if let (Some(ty), true) = (owner, flags.contains(FunctionFlags::CONSTRUCTOR)) {
                if slot != 0 {
                    return invalid(format!("constructor of {} must be its first slot", record.name));
                }
                if let Some(data) = self.type_data_mut(ty) {
                    data.flags |= TypeFlags::HAS_CONSTRUCTOR;
                }
            }
        }

        batch.open.push(Open::Function(Box::new(PendingFunction {
            function,
            container,
            code: record.code.clone(),
            handlers: Vec::new(),
            expected_handlers: record.num_exceptions,
        })));
        Ok(())
    }

    fn finish_function(&mut self, batch: &mut Batch, pending: PendingFunction) -> VmResult<()> {
        let function = pending.function;
        if pending.handlers.len() as u32 != pending.expected_handlers {
            return invalid(format!(
                "function declares {} exception handlers but {} follow",
                pending.expected_handlers,
                pending.handlers.len()
            ));
        }
        match pending.code {
            Some(mut chunk) => {
                chunk.handlers = pending.handlers;
                chunk.validate(batch.constants.len())?;
                let mut catch_types = vec![None; chunk.handlers.len()];
                for (index, handler) in chunk.handlers.iter().enumerate() {
                    if let Some(reference) = &handler.catch_type {
                        catch_types[index] = self.type_ref_or_fixup(
                            batch,
                            reference,
                            function,
                            FixupTarget::Catch(index),
                        )?;
                    }
                }
                let code = Arc::new(ScriptCode {
                    chunk,
                    constants: batch.constants.clone(),
                    file: batch.file.clone(),
                });
                if let Some(data) = self.obj_mut(function)?.as_function_mut() {
                    data.body = FunctionBody::Script(code);
                    data.catch_types = catch_types;
                }
            }
            None if !pending.handlers.is_empty() => {
                return invalid("exception handlers on a function without code");
            }
            None => {}
        }
        self.link_accessor(pending.container, function)
    }

    /// Pairs a getter with the setter of the same name in `container`. The
    /// setter's slot loses its name so the name finds the getter.
    fn link_accessor(&mut self, container: GcRef, function: GcRef) -> VmResult<()> {
        let Some(data) = self.obj(function)?.as_function() else {
            return Ok(());
        };
        let is_getter = data.flags.contains(FunctionFlags::GETTER);
        let is_setter = data.flags.contains(FunctionFlags::SETTER);
        if !is_getter && !is_setter {
            return Ok(());
        }
        let name = data.name.clone();
        let partner_flag = if is_getter {
            FunctionFlags::SETTER
        } else {
            FunctionFlags::GETTER
        };
        let values = self.obj(container)?.props.values().to_vec();
        let partner = values.iter().enumerate().find_map(|(slot, value)| {
            let candidate = value.as_object().filter(|&r| r != function)?;
            let data = self.heap.get(candidate)?.as_function()?;
            (data.flags.contains(partner_flag) && data.name == name).then_some((slot, candidate))
        });
        let Some((partner_slot, partner)) = partner else {
            return Ok(());
        };
        let (getter, setter) = if is_getter {
            (function, partner)
        } else {
            (partner, function)
        };
        if let Some(data) = self.obj_mut(getter)?.as_function_mut() {
            data.setter = Some(setter);
        }
        self.heap.note_edge(getter, setter);
        let setter_slot = if is_setter {
            self.obj(function)?
                .as_function()
                .and_then(|data| data.slot)
        } else {
            Some(partner_slot as u32)
        };
        if let Some(slot) = setter_slot {
            self.obj_mut(container)?
                .props
                .set_name(slot, QualifiedName::default());
        }
        Ok(())
    }

    fn define_property(&mut self, batch: &mut Batch, record: &PropertyRecord) -> VmResult<()> {
        let container = self.container(batch)?;
        let declared = match &record.declared_type {
            Some(reference) => self.resolve_type_ref(reference)?,
            None => None,
        };
        let value = record.value.as_ref().map(constant_value);
        let slot = self.place(
            container,
            record.slot,
            &record.name,
            Trait::typed(declared, record.attributes),
            value,
        )?;
        if let (None, Some(TypeRef::Name(name))) = (declared, &record.declared_type) {
            self.fixups.push(Fixup {
                holder: container,
                target: FixupTarget::Trait(slot),
                name: name.clone(),
                module: batch.module.clone(),
            });
        }
        Ok(())
    }

    /// Key a native implementation is registered under: `Type.name` for
    /// members, the plain name for globals.
    pub(crate) fn native_key(&self, owner: Option<GcRef>, name: &QualifiedName) -> String {
        match owner {
            Some(ty) => format!("{}.{}", self.type_name(ty), name.name),
            None => name.name.to_string(),
        }
    }

    fn finish_batch(&mut self, batch: &mut Batch) -> VmResult<()> {
        self.resolve_fixups()?;
        let ordered = self.inheritance_order()?;
        for &ty in &ordered {
            self.inherit_type(ty)?;
            self.renumber_members(ty)?;
        }
        self.pending_types.clear();
        self.initializers
            .extend(ordered.into_iter().map(Initializer::Type));
        self.initializers.extend(batch.initializers.drain(..));
        for name in &batch.loaded {
            info!(target: "ejs::loader", module = %name, "module loaded");
        }
        Ok(())
    }

    /// Resolves every recorded fixup and returns how many there were.
    ///
    /// Fixups are consumed, so a second pass over a resolved graph does
    /// nothing.
    ///
    /// # Errors
    ///
    /// [`ModuleError::Unresolved`] for a name that still names no type.
    pub fn resolve_fixups(&mut self) -> VmResult<usize> {
        let fixups = std::mem::take(&mut self.fixups);
        let count = fixups.len();
        for fixup in fixups {
            let Some(ty) = self.resolve_type_name(&fixup.name)? else {
                return Err(VmError::Load(ModuleError::Unresolved {
                    name: fixup.name.to_string(),
                    module: fixup.module.to_string(),
                }));
            };
            self.apply_fixup(&fixup, ty)?;
        }
        if count > 0 {
            debug!(target: "ejs::loader", resolved = count, "type references fixed up");
        }
        Ok(count)
    }

    fn apply_fixup(&mut self, fixup: &Fixup, ty: GcRef) -> VmResult<()> {
        let holder = fixup.holder;
        match fixup.target {
            FixupTarget::Base => {
                let helpers = self.type_helpers(ty)?;
                if let Some(data) = self.type_data_mut(holder) {
                    data.base = Some(ty);
                    data.instance_helpers = helpers;
                }
            }
            FixupTarget::Interface => {
                if let Some(data) = self.type_data_mut(holder) {
                    data.implements.push(ty);
                }
            }
            FixupTarget::Trait(slot) => {
                let props = &mut self.obj_mut(holder)?.props;
                let mut attributes = props.trait_at(slot).copied().unwrap_or_default();
                attributes.declared_type = Some(ty);
                props.set_trait(slot, attributes);
            }
            FixupTarget::Arg(index) => {
                if let Some(slot) = self
                    .obj_mut(holder)?
                    .as_function_mut()
                    .and_then(|data| data.arg_types.get_mut(index))
                {
                    *slot = Some(ty);
                }
            }
            FixupTarget::Return => {
                if let Some(data) = self.obj_mut(holder)?.as_function_mut() {
                    data.return_type = Some(ty);
                }
            }
            FixupTarget::Catch(index) => {
                if let Some(slot) = self
                    .obj_mut(holder)?
                    .as_function_mut()
                    .and_then(|data| data.catch_types.get_mut(index))
                {
                    *slot = Some(ty);
                }
            }
        }
        self.heap.note_edge(holder, ty);
        Ok(())
    }

    /// Pending types ordered so every base and interface precedes the types
    /// that use it.
    fn inheritance_order(&self) -> VmResult<Vec<GcRef>> {
        let mut remaining = self.pending_types.clone();
        let mut ordered = Vec::with_capacity(remaining.len());
        while !remaining.is_empty() {
            let ready = remaining.iter().position(|&ty| {
                self.type_data(ty).is_some_and(|data| {
                    data.base.iter().chain(&data.implements).all(|dep| !remaining.contains(dep))
                })
            });
            match ready {
                Some(index) => ordered.push(remaining.remove(index)),
                None => {
                    let names: Vec<String> =
                        remaining.iter().map(|&ty| self.type_name(ty)).collect();
                    return invalid(format!("circular inheritance among {}", names.join(", ")));
                }
            }
        }
        Ok(ordered)
    }

    /// Records the final slot of each own member after inheritance moved
    /// it.
    fn renumber_members(&mut self, ty: GcRef) -> VmResult<()> {
        let cell = self.obj(ty)?;
        let start = cell.num_inherited();
        let members: Vec<(u32, GcRef)> = (start..cell.props.len() as u32)
            .filter(|&slot| cell.props.name(slot).is_some())
            .filter_map(|slot| cell.props.get(slot).and_then(Value::as_object).map(|r| (slot, r)))
            .collect();
        for (slot, member) in members {
            if let Some(data) = self.heap.get_mut(member).and_then(Obj::as_function_mut) {
                if data.owner == Some(ty) {
                    data.slot = Some(slot);
                }
            }
        }
        Ok(())
    }
}
