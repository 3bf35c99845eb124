//! Module records: the ordered section sequence a loader consumes.
//!
//! A record holds one or more modules. Each module is a `Module` section,
//! its contents, and a closing `ModuleEnd`. `Class`, `Function` and `Block`
//! sections open containers that later sections populate until the
//! matching end section:
//!
//! - `Property` defines a slot in the current container (a global, a static
//!   member, an instance field or a function local)
//! - `Function` defines a function template in the current container
//! - `Exception` appends a handler to the current function
//! - `Block` with `instance: true` inside a class opens its instance block
//!
//! Slot numbers inside a class are relative to the class's own region; the
//! loader shifts them past the inherited slots once the base type is known.

use crate::attributes::Attributes;
use crate::chunk::BytecodeChunk;
use crate::exception::ExceptionRecord;
use core_types::QualifiedName;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors raised while reading, validating or resolving module records.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModuleError {
    /// No file for the module on the search path
    #[error("module '{0}' not found on the search path")]
    NotFound(String),
    /// Reading the module file failed
    #[error("cannot read module file {path}: {message}")]
    Io {
        /// File path
        path: String,
        /// Underlying error text
        message: String,
    },
    /// The JSON text is not a module record
    #[error("malformed module record: {0}")]
    Parse(String),
    /// The record is well-formed JSON but inconsistent
    #[error("invalid module record: {0}")]
    Invalid(String),
    /// A deferred type reference could not be resolved
    #[error("unresolved type reference '{name}' in module '{module}'")]
    Unresolved {
        /// Referenced type name
        name: String,
        /// Module holding the reference
        module: String,
    },
    /// A code builder label was used but never bound
    #[error("label {0} used but never bound")]
    UnboundLabel(usize),
}

/// A reference to a type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TypeRef {
    /// Already resolved to a global slot (core types and earlier modules)
    Slot(u32),
    /// Resolved by name, possibly after later modules load
    Name(QualifiedName),
}

impl TypeRef {
    /// Reference by (qualified) name.
    pub fn named(name: &str) -> Self {
        TypeRef::Name(QualifiedName::parse(name))
    }
}

/// A literal initial value for a declared property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConstantValue {
    /// null
    Null,
    /// Boolean literal
    Boolean(bool),
    /// Number literal
    Number(f64),
    /// String literal
    String(String),
}

/// Declares a type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassRecord {
    /// Qualified type name
    pub name: QualifiedName,
    /// Global slot to bind the type at, or the next free slot
    #[serde(default)]
    pub slot: Option<u32>,
    /// Type attributes (DYNAMIC, INTERFACE, FINAL, ...)
    #[serde(default)]
    pub attributes: Attributes,
    /// Base type; `Object` when absent
    #[serde(default)]
    pub base: Option<TypeRef>,
    /// Implemented interfaces
    #[serde(default)]
    pub implements: Vec<TypeRef>,
    /// Own static slots (methods and static properties)
    #[serde(default)]
    pub num_type_props: u32,
    /// Own instance slots
    #[serde(default)]
    pub num_instance_props: u32,
}

/// Declares a function template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionRecord {
    /// Function name
    pub name: QualifiedName,
    /// Slot in the enclosing container, or the next free slot
    #[serde(default)]
    pub slot: Option<u32>,
    /// Function attributes
    #[serde(default)]
    pub attributes: Attributes,
    /// Declared parameters, not counting a rest parameter
    #[serde(default)]
    pub num_args: u32,
    /// Trailing parameters that have defaults
    #[serde(default)]
    pub num_default: u32,
    /// Locals after the parameters
    #[serde(default)]
    pub num_locals: u32,
    /// Exception sections that follow
    #[serde(default)]
    pub num_exceptions: u32,
    /// Declared parameter types
    #[serde(default)]
    pub arg_types: Vec<Option<TypeRef>>,
    /// Declared return type
    #[serde(default)]
    pub return_type: Option<TypeRef>,
    /// Body; `None` for native functions
    #[serde(default)]
    pub code: Option<BytecodeChunk>,
}

impl FunctionRecord {
    /// A record with no parameters, locals or body.
    pub fn new(name: QualifiedName) -> Self {
        FunctionRecord {
            name,
            slot: None,
            attributes: Attributes::empty(),
            num_args: 0,
            num_default: 0,
            num_locals: 0,
            num_exceptions: 0,
            arg_types: Vec::new(),
            return_type: None,
            code: None,
        }
    }
}

/// Declares a property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyRecord {
    /// Property name
    pub name: QualifiedName,
    /// Slot in the enclosing container, or the next free slot
    #[serde(default)]
    pub slot: Option<u32>,
    /// Trait attributes
    #[serde(default)]
    pub attributes: Attributes,
    /// Declared type
    #[serde(default)]
    pub declared_type: Option<TypeRef>,
    /// Initial value
    #[serde(default)]
    pub value: Option<ConstantValue>,
}

impl PropertyRecord {
    /// An untyped property with no initial value.
    pub fn new(name: QualifiedName) -> Self {
        PropertyRecord {
            name,
            slot: None,
            attributes: Attributes::empty(),
            declared_type: None,
            value: None,
        }
    }
}

/// Opens a block container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockRecord {
    /// Block name
    pub name: QualifiedName,
    /// Slot in the enclosing container (ignored for instance blocks)
    #[serde(default)]
    pub slot: Option<u32>,
    /// Declared slot count
    #[serde(default)]
    pub num_slots: u32,
    /// The enclosing class's instance block
    #[serde(default)]
    pub instance: bool,
}

/// One section of a module record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "section", rename_all = "kebab-case")]
pub enum Section {
    /// Starts a module
    Module {
        /// Module name
        name: String,
        /// Module version
        #[serde(default)]
        version: u32,
    },
    /// Declares that the current module needs another one loaded first
    Dependency {
        /// Module name
        name: String,
    },
    /// Opens a block
    Block(BlockRecord),
    /// Closes the current block
    BlockEnd,
    /// Opens a class
    Class(ClassRecord),
    /// Closes the current class
    ClassEnd,
    /// Opens a function
    Function(FunctionRecord),
    /// Closes the current function
    FunctionEnd,
    /// Defines a property
    Property(PropertyRecord),
    /// Appends an exception handler to the current function
    Exception(ExceptionRecord),
    /// Ends the current module
    ModuleEnd,
    /// Documentation attached to the preceding declaration
    Doc {
        /// Text
        text: String,
    },
}

/// A module file: a constant pool and a section sequence.
///
/// # Examples
///
/// ```
/// use bytecode_system::{ModuleRecord, Section};
///
/// let json = r#"{
///     "constants": [],
///     "sections": [
///         { "section": "module", "name": "empty" },
///         { "section": "module-end" }
///     ]
/// }"#;
/// let record = ModuleRecord::from_json(json).unwrap();
/// assert_eq!(record.name(), Some("empty"));
/// assert!(matches!(record.sections[1], Section::ModuleEnd));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleRecord {
    /// File the record was read from, used in backtraces
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    /// Strings referenced by instructions
    #[serde(default)]
    pub constants: Vec<String>,
    /// Section sequence
    pub sections: Vec<Section>,
}

impl ModuleRecord {
    /// Name of the first module in the record.
    pub fn name(&self) -> Option<&str> {
        self.module_names().next()
    }

    /// Names of every module in the record, in order.
    pub fn module_names(&self) -> impl Iterator<Item = &str> {
        self.sections.iter().filter_map(|section| match section {
            Section::Module { name, .. } => Some(name.as_str()),
            _ => None,
        })
    }

    /// Modules this record depends on, excluding modules it defines itself.
    pub fn dependencies(&self) -> Vec<String> {
        let own: Vec<&str> = self.module_names().collect();
        let mut deps: Vec<String> = Vec::new();
        for section in &self.sections {
            if let Section::Dependency { name } = section {
                if !own.contains(&name.as_str()) && !deps.contains(name) {
                    deps.push(name.clone());
                }
            }
        }
        deps
    }

    /// Parses a record from JSON.
    pub fn from_json(text: &str) -> Result<Self, ModuleError> {
        serde_json::from_str(text).map_err(|e| ModuleError::Parse(e.to_string()))
    }

    /// Serializes the record as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, ModuleError> {
        serde_json::to_string_pretty(self).map_err(|e| ModuleError::Parse(e.to_string()))
    }

    /// Reads a record from a file, remembering the file name.
    pub fn read(path: &Path) -> Result<Self, ModuleError> {
        let text = std::fs::read_to_string(path).map_err(|e| ModuleError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let mut record = ModuleRecord::from_json(&text)?;
        if record.file.is_none() {
            record.file = Some(path.display().to_string());
        }
        Ok(record)
    }

    /// Writes the record to a file.
    pub fn write(&self, path: &Path) -> Result<(), ModuleError> {
        let text = self.to_json()?;
        std::fs::write(path, text).map_err(|e| ModuleError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Checks section nesting and every function body.
    pub fn validate(&self) -> Result<(), ModuleError> {
        #[derive(PartialEq, Debug)]
        enum Open {
            Module,
            Class,
            Function,
            Block,
        }
        let mut stack: Vec<Open> = Vec::new();
        let close = |stack: &mut Vec<Open>, want: Open| -> Result<(), ModuleError> {
            match stack.pop() {
                Some(open) if open == want => Ok(()),
                other => Err(ModuleError::Invalid(format!(
                    "expected end of {:?}, found end while in {:?}",
                    want, other
                ))),
            }
        };
        for section in &self.sections {
            match section {
                Section::Module { .. } => {
                    if !stack.is_empty() {
                        return Err(ModuleError::Invalid("nested module section".into()));
                    }
                    stack.push(Open::Module);
                }
                Section::Class(_) => stack.push(Open::Class),
                Section::Function(record) => {
                    if let Some(code) = &record.code {
                        code.validate(self.constants.len())?;
                    }
                    stack.push(Open::Function);
                }
                Section::Block(_) => stack.push(Open::Block),
                Section::ModuleEnd => close(&mut stack, Open::Module)?,
                Section::ClassEnd => close(&mut stack, Open::Class)?,
                Section::FunctionEnd => close(&mut stack, Open::Function)?,
                Section::BlockEnd => close(&mut stack, Open::Block)?,
                Section::Exception(_) => {
                    if stack.last() != Some(&Open::Function) {
                        return Err(ModuleError::Invalid(
                            "exception section outside a function".into(),
                        ));
                    }
                }
                Section::Dependency { .. } | Section::Property(_) | Section::Doc { .. } => {
                    if stack.is_empty() {
                        return Err(ModuleError::Invalid("section outside a module".into()));
                    }
                }
            }
        }
        if !stack.is_empty() {
            return Err(ModuleError::Invalid(format!(
                "record ends with {:?} still open",
                stack
            )));
        }
        Ok(())
    }
}
