//! Runtime orchestration for module execution
//!
//! The Runtime owns one interpreter configured from the command line. It
//! loads the named modules, runs their initializers and calls the exported
//! function, if any.

use crate::cli::Cli;
use crate::error::{CliError, CliResult};
use core_types::Value;
use interpreter::{HostEvent, Interpreter, InterpreterConfig};
use memory_manager::GcConfig;
use std::path::PathBuf;
use tracing::{debug, error, info, warn};

/// Converts a command line argument to a script value.
///
/// Numbers, `true`, `false`, `null` and `undefined` keep their meaning;
/// anything else is a string.
///
/// # Example
/// ```
/// use core_types::Value;
/// use js_cli::parse_argument;
///
/// assert_eq!(parse_argument("2.5"), Value::Number(2.5));
/// assert_eq!(parse_argument("null"), Value::Null);
/// assert_eq!(parse_argument("hello"), Value::from("hello"));
/// ```
pub fn parse_argument(text: &str) -> Value {
    match text {
        "true" => Value::Boolean(true),
        "false" => Value::Boolean(false),
        "null" => Value::Null,
        "undefined" => Value::Undefined,
        _ => match text.parse::<f64>() {
            Ok(n) => Value::Number(n),
            Err(_) => Value::from(text),
        },
    }
}

/// Host shell around one interpreter
pub struct Runtime {
    vm: Interpreter,
}

impl Runtime {
    /// Create a runtime with `config`
    ///
    /// Host events are forwarded to the log.
    ///
    /// # Example
    /// ```
    /// use interpreter::InterpreterConfig;
    /// use js_cli::Runtime;
    ///
    /// let runtime = Runtime::new(InterpreterConfig::default()).unwrap();
    /// ```
    pub fn new(config: InterpreterConfig) -> CliResult<Self> {
        let mut vm = Interpreter::new(config)?;
        vm.set_host_callback(log_event);
        Ok(Runtime { vm })
    }

    /// Create a runtime configured from parsed arguments
    ///
    /// Without `--search` the current directory is searched.
    pub fn from_cli(cli: &Cli) -> CliResult<Self> {
        let search_path = if cli.search.is_empty() {
            vec![PathBuf::from(".")]
        } else {
            cli.search.clone()
        };
        let config = InterpreterConfig {
            search_path,
            legacy_args: cli.legacy_args,
            max_call_depth: cli.max_depth,
            gc: GcConfig {
                mode: cli.gc,
                ..GcConfig::default()
            },
            ..InterpreterConfig::default()
        };
        Runtime::new(config)
    }

    /// Load `modules` with their dependencies and run the initializers
    ///
    /// # Returns
    /// Every module loaded by this call, dependencies first
    ///
    /// # Errors
    /// Returns `CliError` if a module cannot be found or loaded, or an
    /// initializer throws
    pub fn load(&mut self, modules: &[String]) -> CliResult<Vec<String>> {
        let mut loaded = Vec::new();
        for module in modules {
            let names = self.vm.load_module(module)?;
            debug!(target: "ejs::cli", module = %module, count = names.len(), "requested module loaded");
            loaded.extend(names);
        }
        self.vm.run_initializers()?;
        info!(target: "ejs::cli", modules = ?loaded, "initializers complete");
        Ok(loaded)
    }

    /// Call the exported function `name` with arguments parsed by
    /// [`parse_argument`]
    pub fn run(&mut self, name: &str, args: &[String]) -> CliResult<Value> {
        let args: Vec<Value> = args.iter().map(|arg| parse_argument(arg)).collect();
        Ok(self.vm.run_function(name, &args)?)
    }

    /// Load the modules named by `cli` and call its `--run` function
    ///
    /// # Returns
    /// The function's result, or `None` without `--run`
    pub fn execute(&mut self, cli: &Cli) -> CliResult<Option<Value>> {
        if cli.run.is_none() && !cli.args.is_empty() {
            return Err(CliError::ArgsWithoutRun);
        }
        self.load(&cli.modules)?;
        match &cli.run {
            Some(name) => self.run(name, &cli.args).map(Some),
            None => Ok(None),
        }
    }

    /// Get access to the interpreter for direct manipulation
    pub fn vm(&mut self) -> &mut Interpreter {
        &mut self.vm
    }
}

fn log_event(event: HostEvent) {
    match event {
        HostEvent::LowMemory { live_bytes } => {
            warn!(target: "ejs::cli", live_bytes, "interpreter memory is low")
        }
        HostEvent::Degraded => error!(target: "ejs::cli", "interpreter heap degraded"),
        HostEvent::UncaughtException { report } => {
            debug!(target: "ejs::cli", %report, "uncaught exception reported")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_parse_argument_kinds() {
        assert_eq!(parse_argument("42"), Value::Number(42.0));
        assert_eq!(parse_argument("-1e3"), Value::Number(-1000.0));
        assert_eq!(parse_argument("true"), Value::Boolean(true));
        assert_eq!(parse_argument("undefined"), Value::Undefined);
        assert_eq!(parse_argument("4 apples"), Value::from("4 apples"));
    }

    #[test]
    fn test_config_follows_arguments() {
        let cli = Cli::try_parse_from([
            "corten-ejs",
            "--search",
            "lib",
            "--legacy-args",
            "--max-depth",
            "64",
            "app",
        ])
        .unwrap();
        let mut runtime = Runtime::from_cli(&cli).unwrap();
        let config = runtime.vm().config();
        assert_eq!(config.search_path, vec![PathBuf::from("lib")]);
        assert!(config.legacy_args);
        assert_eq!(config.max_call_depth, 64);
    }

    #[test]
    fn test_args_require_run() {
        let cli = Cli::try_parse_from(["corten-ejs", "app", "--", "1"]).unwrap();
        let mut runtime = Runtime::from_cli(&cli).unwrap();
        assert!(matches!(
            runtime.execute(&cli),
            Err(CliError::ArgsWithoutRun)
        ));
    }
}
