//! Builders that assemble module records.
//!
//! There is no source compiler; producers and tests describe modules with
//! these builders and get a [`ModuleRecord`] with correctly nested sections.

use crate::attributes::Attributes;
use crate::chunk::BytecodeChunk;
use crate::exception::{ExceptionRecord, HandlerKind};
use crate::instruction::Instruction;
use crate::module::{
    BlockRecord, ClassRecord, ConstantValue, FunctionRecord, ModuleError, ModuleRecord,
    PropertyRecord, Section, TypeRef,
};
use crate::opcode::Opcode;
use core_types::QualifiedName;

/// A forward-referencable position in a [`CodeBuilder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label(usize);

/// Labels delimiting a protected region and its handler.
#[derive(Debug, Clone, Copy)]
pub struct TryRange {
    /// First protected instruction
    pub try_start: Label,
    /// One past the last protected instruction
    pub try_end: Label,
    /// First handler instruction
    pub handler_start: Label,
    /// One past the last handler instruction
    pub handler_end: Label,
    /// Lexical blocks open at the try statement
    pub block_depth: u32,
}

struct PendingHandler {
    kind: HandlerKind,
    range: TryRange,
    catch_type: Option<TypeRef>,
}

/// Emits instructions with symbolic jump targets.
///
/// # Examples
///
/// ```
/// use bytecode_system::{CodeBuilder, Opcode};
///
/// let mut code = CodeBuilder::new();
/// let done = code.label();
/// code.emit(Opcode::PushTrue)
///     .jump_if_false(done)
///     .emit(Opcode::PushNumber(1.0))
///     .emit(Opcode::ReturnValue);
/// code.bind(done);
/// code.emit(Opcode::Return);
///
/// let chunk = code.finish().unwrap();
/// assert_eq!(chunk.opcode(1), Some(&Opcode::JumpIfFalse(4)));
/// ```
#[derive(Default)]
pub struct CodeBuilder {
    instructions: Vec<Instruction>,
    labels: Vec<Option<u32>>,
    patches: Vec<(usize, Label)>,
    handlers: Vec<PendingHandler>,
    line: u32,
}

impl CodeBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of the next instruction.
    pub fn here(&self) -> u32 {
        self.instructions.len() as u32
    }

    /// Sets the source line attached to following instructions.
    pub fn line(&mut self, line: u32) -> &mut Self {
        self.line = line;
        self
    }

    /// Appends an instruction.
    pub fn emit(&mut self, opcode: Opcode) -> &mut Self {
        self.instructions
            .push(Instruction::with_line(opcode, self.line));
        self
    }

    /// Creates an unbound label.
    pub fn label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    /// Binds `label` to the next instruction.
    pub fn bind(&mut self, label: Label) -> &mut Self {
        let here = self.here();
        if let Some(slot) = self.labels.get_mut(label.0) {
            *slot = Some(here);
        }
        self
    }

    /// Creates a label bound to the next instruction.
    pub fn label_here(&mut self) -> Label {
        let label = self.label();
        self.bind(label);
        label
    }

    fn emit_jump(&mut self, opcode: Opcode, target: Label) -> &mut Self {
        self.patches.push((self.instructions.len(), target));
        self.emit(opcode)
    }

    /// Unconditional jump to `target`.
    pub fn jump(&mut self, target: Label) -> &mut Self {
        self.emit_jump(Opcode::Jump(0), target)
    }

    /// Jump to `target` if the popped value is truthy.
    pub fn jump_if_true(&mut self, target: Label) -> &mut Self {
        self.emit_jump(Opcode::JumpIfTrue(0), target)
    }

    /// Jump to `target` if the popped value is falsy.
    pub fn jump_if_false(&mut self, target: Label) -> &mut Self {
        self.emit_jump(Opcode::JumpIfFalse(0), target)
    }

    /// Registers a catch handler. `catch_type` of `None` catches anything.
    pub fn try_catch(&mut self, range: TryRange, catch_type: Option<TypeRef>) -> &mut Self {
        self.handlers.push(PendingHandler {
            kind: HandlerKind::Catch,
            range,
            catch_type,
        });
        self
    }

    /// Registers a finally handler.
    pub fn try_finally(&mut self, range: TryRange) -> &mut Self {
        self.handlers.push(PendingHandler {
            kind: HandlerKind::Finally,
            range,
            catch_type: None,
        });
        self
    }

    fn resolve(&self, label: Label) -> Result<u32, ModuleError> {
        self.labels
            .get(label.0)
            .copied()
            .flatten()
            .ok_or(ModuleError::UnboundLabel(label.0))
    }

    /// Resolves labels and produces the chunk.
    ///
    /// # Errors
    ///
    /// Returns [`ModuleError::UnboundLabel`] if a referenced label was never
    /// bound.
    pub fn finish(mut self) -> Result<BytecodeChunk, ModuleError> {
        for &(index, label) in &self.patches {
            let target = self.resolve(label)?;
            if let Some(inst) = self.instructions.get_mut(index) {
                inst.opcode.set_jump_target(target);
            }
        }
        let mut handlers = Vec::with_capacity(self.handlers.len());
        for pending in &self.handlers {
            handlers.push(ExceptionRecord {
                kind: pending.kind,
                try_start: self.resolve(pending.range.try_start)?,
                try_end: self.resolve(pending.range.try_end)?,
                handler_start: self.resolve(pending.range.handler_start)?,
                handler_end: self.resolve(pending.range.handler_end)?,
                catch_type: pending.catch_type.clone(),
                block_depth: pending.range.block_depth,
            });
        }
        Ok(BytecodeChunk {
            instructions: std::mem::take(&mut self.instructions),
            handlers,
        })
    }
}

/// Describes a function template.
#[derive(Debug, Clone)]
pub struct FunctionBuilder {
    record: FunctionRecord,
    locals: Vec<PropertyRecord>,
    nested: Vec<FunctionBuilder>,
}

impl FunctionBuilder {
    /// A function with no parameters and no body.
    pub fn new(name: &str) -> Self {
        FunctionBuilder {
            record: FunctionRecord::new(QualifiedName::parse(name)),
            locals: Vec::new(),
            nested: Vec::new(),
        }
    }

    /// Declared parameter count.
    pub fn args(mut self, count: u32) -> Self {
        self.record.num_args = count;
        self
    }

    /// Trailing parameters with defaults.
    pub fn defaults(mut self, count: u32) -> Self {
        self.record.num_default = count;
        self
    }

    /// Local slots after the parameters.
    pub fn locals(mut self, count: u32) -> Self {
        self.record.num_locals = count;
        self
    }

    /// Adds attributes.
    pub fn attributes(mut self, attributes: Attributes) -> Self {
        self.record.attributes |= attributes;
        self
    }

    /// Binds the template at a fixed slot of its container.
    pub fn at_slot(mut self, slot: u32) -> Self {
        self.record.slot = Some(slot);
        self
    }

    /// Declares the type of parameter `index`.
    pub fn arg_type(mut self, index: usize, ty: TypeRef) -> Self {
        if self.record.arg_types.len() <= index {
            self.record.arg_types.resize(index + 1, None);
        }
        self.record.arg_types[index] = Some(ty);
        self
    }

    /// Declares the return type.
    pub fn returns(mut self, ty: TypeRef) -> Self {
        self.record.return_type = Some(ty);
        self
    }

    /// Names an activation slot (parameter or local).
    pub fn local(mut self, slot: u32, name: &str) -> Self {
        let mut record = PropertyRecord::new(QualifiedName::parse(name));
        record.slot = Some(slot);
        self.locals.push(record);
        self
    }

    /// Places a nested function template in activation slot `slot`.
    pub fn nested(mut self, slot: u32, function: FunctionBuilder) -> Self {
        self.nested.push(function.at_slot(slot));
        self
    }

    /// Sets the body.
    pub fn code(mut self, code: BytecodeChunk) -> Self {
        self.record.code = Some(code);
        self
    }

    /// Marks the function as native; the host binds the body later.
    pub fn native(mut self) -> Self {
        self.record.attributes |= Attributes::NATIVE;
        self.record.code = None;
        self
    }

    /// Appends the function's sections.
    pub fn emit(mut self, sections: &mut Vec<Section>) {
        let handlers = self
            .record
            .code
            .as_mut()
            .map(|code| std::mem::take(&mut code.handlers))
            .unwrap_or_default();
        self.record.num_exceptions = handlers.len() as u32;
        sections.push(Section::Function(self.record));
        sections.extend(self.locals.into_iter().map(Section::Property));
        for nested in self.nested {
            nested.emit(sections);
        }
        sections.extend(handlers.into_iter().map(Section::Exception));
        sections.push(Section::FunctionEnd);
    }
}

enum Member {
    Method(FunctionBuilder),
    Static(PropertyRecord),
}

/// Describes a class.
///
/// The constructor, if any, takes the first own slot; methods and static
/// properties follow in the order they were added.
pub struct ClassBuilder {
    record: ClassRecord,
    constructor: Option<FunctionBuilder>,
    members: Vec<Member>,
    instance: Vec<PropertyRecord>,
    initializer: Option<FunctionBuilder>,
}

impl ClassBuilder {
    /// A class deriving from `Object`.
    pub fn new(name: &str) -> Self {
        ClassBuilder {
            record: ClassRecord {
                name: QualifiedName::parse(name),
                slot: None,
                attributes: Attributes::empty(),
                base: None,
                implements: Vec::new(),
                num_type_props: 0,
                num_instance_props: 0,
            },
            constructor: None,
            members: Vec::new(),
            instance: Vec::new(),
            initializer: None,
        }
    }

    /// Sets the base type.
    pub fn base(mut self, base: TypeRef) -> Self {
        self.record.base = Some(base);
        self
    }

    /// Adds an implemented interface.
    pub fn implements(mut self, interface: TypeRef) -> Self {
        self.record.implements.push(interface);
        self
    }

    /// Adds attributes.
    pub fn attributes(mut self, attributes: Attributes) -> Self {
        self.record.attributes |= attributes;
        self
    }

    /// Binds the type at a fixed global slot.
    pub fn at_slot(mut self, slot: u32) -> Self {
        self.record.slot = Some(slot);
        self
    }

    /// Sets the constructor.
    pub fn constructor(mut self, function: FunctionBuilder) -> Self {
        self.constructor = Some(function.attributes(Attributes::CONSTRUCTOR));
        self
    }

    /// Adds an instance method.
    pub fn method(mut self, function: FunctionBuilder) -> Self {
        self.members.push(Member::Method(function));
        self
    }

    /// Adds a static method.
    pub fn static_method(mut self, function: FunctionBuilder) -> Self {
        self.members
            .push(Member::Method(function.attributes(Attributes::STATIC)));
        self
    }

    /// Adds a static property.
    pub fn static_property(mut self, name: &str, value: Option<ConstantValue>) -> Self {
        let mut record = PropertyRecord::new(QualifiedName::parse(name));
        record.attributes = Attributes::STATIC;
        record.value = value;
        self.members.push(Member::Static(record));
        self
    }

    /// Adds an instance property with an optional default.
    pub fn instance_property(mut self, name: &str, value: Option<ConstantValue>) -> Self {
        let mut record = PropertyRecord::new(QualifiedName::parse(name));
        record.value = value;
        self.instance.push(record);
        self
    }

    /// Adds a typed instance property.
    pub fn typed_instance_property(mut self, name: &str, ty: TypeRef) -> Self {
        let mut record = PropertyRecord::new(QualifiedName::parse(name));
        record.declared_type = Some(ty);
        self.instance.push(record);
        self
    }

    /// Sets the static initializer.
    pub fn initializer(mut self, function: FunctionBuilder) -> Self {
        self.initializer = Some(function.attributes(Attributes::INITIALIZER | Attributes::STATIC));
        self
    }

    /// Appends the class's sections.
    pub fn emit(mut self, sections: &mut Vec<Section>) {
        let own_slots = self.members.len() + usize::from(self.constructor.is_some());
        self.record.num_type_props = own_slots as u32;
        self.record.num_instance_props = self.instance.len() as u32;
        sections.push(Section::Class(self.record));

        let mut slot = 0u32;
        if let Some(constructor) = self.constructor {
            constructor.at_slot(slot).emit(sections);
            slot += 1;
        }
        for member in self.members {
            match member {
                Member::Method(function) => function.at_slot(slot).emit(sections),
                Member::Static(mut record) => {
                    record.slot = Some(slot);
                    sections.push(Section::Property(record));
                }
            }
            slot += 1;
        }
        if let Some(initializer) = self.initializer {
            initializer.emit(sections);
        }
        if !self.instance.is_empty() {
            sections.push(Section::Block(BlockRecord {
                name: QualifiedName::public("instance"),
                slot: None,
                num_slots: self.instance.len() as u32,
                instance: true,
            }));
            for (index, mut record) in self.instance.into_iter().enumerate() {
                record.slot = Some(index as u32);
                sections.push(Section::Property(record));
            }
            sections.push(Section::BlockEnd);
        }
        sections.push(Section::ClassEnd);
    }
}

/// Assembles a single-module record.
///
/// # Examples
///
/// ```
/// use bytecode_system::{ClassBuilder, ModuleBuilder, Section};
///
/// let mut module = ModuleBuilder::new("shapes");
/// module.depends_on("geometry");
/// module.class(ClassBuilder::new("Shape"));
/// let record = module.build();
///
/// assert_eq!(record.dependencies(), vec!["geometry".to_string()]);
/// assert!(record.validate().is_ok());
/// assert!(matches!(record.sections.last(), Some(Section::ModuleEnd)));
/// ```
pub struct ModuleBuilder {
    record: ModuleRecord,
}

impl ModuleBuilder {
    /// Starts a module.
    pub fn new(name: &str) -> Self {
        ModuleBuilder {
            record: ModuleRecord {
                file: None,
                constants: Vec::new(),
                sections: vec![Section::Module {
                    name: name.to_string(),
                    version: 0,
                }],
            },
        }
    }

    /// Sets the file name reported in backtraces.
    pub fn file(&mut self, file: &str) -> &mut Self {
        self.record.file = Some(file.to_string());
        self
    }

    /// Interns a string in the constant pool.
    pub fn constant(&mut self, text: &str) -> u32 {
        if let Some(index) = self.record.constants.iter().position(|c| c == text) {
            return index as u32;
        }
        self.record.constants.push(text.to_string());
        (self.record.constants.len() - 1) as u32
    }

    /// Declares a dependency.
    pub fn depends_on(&mut self, name: &str) -> &mut Self {
        self.record.sections.push(Section::Dependency {
            name: name.to_string(),
        });
        self
    }

    /// Adds a class.
    pub fn class(&mut self, class: ClassBuilder) -> &mut Self {
        class.emit(&mut self.record.sections);
        self
    }

    /// Adds a global function.
    pub fn function(&mut self, function: FunctionBuilder) -> &mut Self {
        function.emit(&mut self.record.sections);
        self
    }

    /// Sets the module initializer.
    pub fn initializer(&mut self, function: FunctionBuilder) -> &mut Self {
        function
            .attributes(Attributes::INITIALIZER)
            .emit(&mut self.record.sections);
        self
    }

    /// Declares a global variable.
    pub fn global(&mut self, name: &str, value: Option<ConstantValue>) -> &mut Self {
        let mut record = PropertyRecord::new(QualifiedName::parse(name));
        record.value = value;
        self.record.sections.push(Section::Property(record));
        self
    }

    /// Declares a global property from a full record.
    pub fn property(&mut self, record: PropertyRecord) -> &mut Self {
        self.record.sections.push(Section::Property(record));
        self
    }

    /// Attaches documentation.
    pub fn doc(&mut self, text: &str) -> &mut Self {
        self.record.sections.push(Section::Doc {
            text: text.to_string(),
        });
        self
    }

    /// Closes the module and returns the record.
    pub fn build(mut self) -> ModuleRecord {
        self.record.sections.push(Section::ModuleEnd);
        self.record
    }
}
