pub mod ast;
pub mod builtins;
pub mod config;
pub mod executor;
pub mod helper;
pub mod parser;
pub mod signals;
pub mod sio;
pub mod state;

// Re-export commonly used items
pub use ast::Command;
pub use config::{ConfigError, ShellOptions, USAGE};
pub use executor::{ExecError, eval, execute};
pub use helper::ShellHelper;
pub use parser::{Lexer, Parser, ShellError, parse_line};
pub use signals::{SignalBlock, install_handlers};
pub use state::{Job, JobError, JobId, JobState, JobTable, MAXJOBS};
