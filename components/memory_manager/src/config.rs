//! Collector configuration.

/// How the collector picks a generation when a collection is due.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GcMode {
    /// Collect the oldest generation whose allocation count exceeds the quota.
    #[default]
    Smart,
    /// Collect only the new generation.
    Quick,
    /// Collect every collectable generation.
    Full,
}

impl std::str::FromStr for GcMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "smart" => Ok(GcMode::Smart),
            "quick" => Ok(GcMode::Quick),
            "full" => Ok(GcMode::Full),
            other => Err(format!("unknown gc mode '{}'", other)),
        }
    }
}

/// Tunables for the managed heap.
///
/// # Examples
///
/// ```
/// use memory_manager::{GcConfig, GcMode};
///
/// let config = GcConfig {
///     work_quota: 64,
///     ..GcConfig::default()
/// };
/// assert_eq!(config.mode, GcMode::Smart);
/// ```
#[derive(Debug, Clone)]
pub struct GcConfig {
    /// Allocations between collection requests, and the per-generation
    /// allocation count the smart policy compares against.
    pub work_quota: usize,
    /// Live-byte estimate above which the collector escalates and then
    /// degrades.
    pub red_line: usize,
    /// Live-byte estimate above which the host is warned.
    pub low_memory: usize,
    /// Policy used for requested collections.
    pub mode: GcMode,
    /// When false, allocation never requests a collection.
    pub enabled: bool,
}

impl Default for GcConfig {
    fn default() -> Self {
        GcConfig {
            work_quota: 1024,
            red_line: 256 * 1024 * 1024,
            low_memory: 192 * 1024 * 1024,
            mode: GcMode::Smart,
            enabled: true,
        }
    }
}
