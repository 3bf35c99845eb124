//! Attribute bitmasks shared by traits, functions and types.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Declaration attributes carried by module records and by runtime
    /// traits.
    ///
    /// The same mask describes properties, functions and classes; each
    /// consumer reads the bits that apply to it.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct Attributes: u32 {
        /// Value cannot change once defined
        const CONST = 1 << 0;
        /// Member of the type rather than its instances
        const STATIC = 1 << 1;
        /// Function is a property getter
        const GETTER = 1 << 2;
        /// Function is a property setter
        const SETTER = 1 << 3;
        /// Not enumerated by property-name listings
        const HIDDEN = 1 << 4;
        /// Body is supplied by the host
        const NATIVE = 1 << 5;
        /// Function is its type's constructor
        const CONSTRUCTOR = 1 << 6;
        /// Overrides an inherited member; inheritance leaves it in place
        const OVERRIDE = 1 << 7;
        /// Extra actual arguments are collected into an array
        const REST_ARGS = 1 << 8;
        /// Missing arguments are padded and extras truncated
        const LEGACY_ARGS = 1 << 9;
        /// Module or type initializer
        const INITIALIZER = 1 << 10;
        /// Instances accept new properties at runtime
        const DYNAMIC = 1 << 11;
        /// Type is an interface
        const INTERFACE = 1 << 12;
        /// Type cannot be subclassed
        const FINAL = 1 << 13;
        /// Constructor calls its base constructor explicitly
        const CALLS_SUPER = 1 << 14;
    }
}
