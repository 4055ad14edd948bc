//! Command trait definition for CLI commands.

use anyhow::Result;
use enum_dispatch::enum_dispatch;

/// Trait implemented by all fgcollapse CLI commands.
///
/// The `command_line` parameter contains the full command invocation for the @PG record.
#[enum_dispatch]
pub trait Command {
    #[allow(clippy::missing_errors_doc)]
    fn execute(&self, command_line: &str) -> Result<()>;
}
