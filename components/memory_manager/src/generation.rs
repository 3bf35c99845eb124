//! Heap generations.

use std::fmt;

/// An ordered heap generation.
///
/// Generations are ordered from youngest to oldest. Collecting generation
/// `G` collects `G` and every younger generation. The eternal generation is
/// never collected.
///
/// # Examples
///
/// ```
/// use memory_manager::Generation;
///
/// assert!(Generation::NEW < Generation::OLD);
/// assert_eq!(Generation::NEW.older(), Some(Generation::YOUNG));
/// assert_eq!(Generation::ETERNAL.older(), None);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Generation(u8);

impl Generation {
    /// Where ordinary allocations land.
    pub const NEW: Generation = Generation(0);
    /// Objects that survived a new-generation collection twice.
    pub const YOUNG: Generation = Generation(1);
    /// The oldest collectable generation.
    pub const OLD: Generation = Generation(2);
    /// Templates and boot objects; never collected.
    pub const ETERNAL: Generation = Generation(3);

    /// Number of generations.
    pub const COUNT: usize = 4;

    /// All generations, youngest first.
    pub const ALL: [Generation; Generation::COUNT] = [
        Generation::NEW,
        Generation::YOUNG,
        Generation::OLD,
        Generation::ETERNAL,
    ];

    /// Index into per-generation tables.
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Generation for a table index.
    pub fn from_index(index: usize) -> Option<Generation> {
        Generation::ALL.get(index).copied()
    }

    /// The next older generation, or `None` for eternal.
    pub fn older(self) -> Option<Generation> {
        Generation::from_index(self.index() + 1)
    }

    /// True if the collector may sweep this generation.
    pub fn is_collectable(self) -> bool {
        self <= Generation::OLD
    }

    /// Bit used in a cell header's root-log membership mask.
    pub(crate) fn bit(self) -> u8 {
        1 << self.0
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self.0 {
            0 => "new",
            1 => "young",
            2 => "old",
            _ => "eternal",
        };
        f.write_str(name)
    }
}
