//! Command line arguments

use clap::Parser;
use memory_manager::GcMode;
use std::path::PathBuf;

/// `corten-ejs [--search DIR]... [--run FN] [--gc MODE] MODULE... [-- ARGS...]`
#[derive(Parser, Debug)]
#[command(name = "corten-ejs", version, about = "Runs Ejs module records")]
pub struct Cli {
    /// Directory searched for `<module>.mod.json`; repeatable, searched in order
    #[arg(short = 's', long = "search", value_name = "DIR")]
    pub search: Vec<PathBuf>,

    /// Exported function to call once the modules are initialized
    #[arg(short = 'r', long = "run", value_name = "FN")]
    pub run: Option<String>,

    /// Collection policy: smart, quick or full
    #[arg(long = "gc", value_name = "MODE", default_value = "smart")]
    pub gc: GcMode,

    /// Pad and truncate arguments for every function
    #[arg(long = "legacy-args")]
    pub legacy_args: bool,

    /// Maximum call depth
    #[arg(long = "max-depth", value_name = "N", default_value_t = 1024)]
    pub max_depth: usize,

    /// Modules to load, dependencies first
    #[arg(value_name = "MODULE", required = true)]
    pub modules: Vec<String>,

    /// Arguments passed to the function named by --run
    #[arg(last = true, value_name = "ARGS")]
    pub args: Vec<String>,
}
