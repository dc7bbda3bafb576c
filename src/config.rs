use std::env;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("unknown option: -{0}")]
    UnknownFlag(char),
    #[error("unexpected argument: {0}")]
    UnexpectedArgument(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShellOptions {
    /// Print a prompt before each line (`-p` turns this off).
    pub emit_prompt: bool,
    /// Debug-level diagnostics (`-v`).
    pub verbose: bool,
    /// Print usage and exit (`-h`).
    pub help: bool,
    pub history_path: Option<PathBuf>,
}

impl Default for ShellOptions {
    fn default() -> Self {
        Self {
            emit_prompt: true,
            verbose: false,
            help: false,
            history_path: env::var_os("HOME").map(|home| PathBuf::from(home).join(".jobsh_history")),
        }
    }
}

impl ShellOptions {
    /// Parses getopt-style flags; `-vp` is the same as `-v -p`.
    pub fn from_args<I>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut options = Self::default();
        for arg in args {
            let flags = match arg.strip_prefix('-') {
                Some(flags) if !flags.is_empty() => flags,
                _ => return Err(ConfigError::UnexpectedArgument(arg.clone())),
            };
            for flag in flags.chars() {
                match flag {
                    'h' => options.help = true,
                    'v' => options.verbose = true,
                    'p' => options.emit_prompt = false,
                    other => return Err(ConfigError::UnknownFlag(other)),
                }
            }
        }
        Ok(options)
    }

    /// Default tracing filter when `RUST_LOG` is unset.
    pub fn log_directive(&self) -> &'static str {
        if self.verbose { "jobsh=debug" } else { "warn" }
    }
}

pub const USAGE: &str = "\
Usage: jobsh [-hvp]
   -h   print this message
   -v   print additional diagnostic information
   -p   do not emit a command prompt

Built-in commands:
   quit              exit the shell
   jobs [> file]     list jobs
   bg <pid|%jobid>   continue a job in the background
   fg <pid|%jobid>   continue a job in the foreground
";

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<ShellOptions, ConfigError> {
        ShellOptions::from_args(args.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_defaults() {
        let options = parse(&[]).unwrap();
        assert!(options.emit_prompt);
        assert!(!options.verbose);
        assert!(!options.help);
        assert_eq!(options.log_directive(), "warn");
    }

    #[test]
    fn test_combined_flags() {
        let options = parse(&["-vp"]).unwrap();
        assert!(options.verbose);
        assert!(!options.emit_prompt);
        assert_eq!(options.log_directive(), "jobsh=debug");
        assert!(parse(&["-h"]).unwrap().help);
    }

    #[test]
    fn test_rejects_unknown_input() {
        assert_eq!(parse(&["-x"]), Err(ConfigError::UnknownFlag('x')));
        assert_eq!(
            parse(&["script.sh"]),
            Err(ConfigError::UnexpectedArgument("script.sh".to_string()))
        );
        assert_eq!(
            parse(&["-"]),
            Err(ConfigError::UnexpectedArgument("-".to_string()))
        );
    }
}
