use anyhow::Context;
use jobsh::{ShellHelper, ShellOptions, USAGE, eval, install_handlers};
use nix::unistd::dup2;
use rustyline::Editor;
use rustyline::config::{Config, EditMode};
use rustyline::error::ReadlineError;
use rustyline::history::FileHistory;
use std::env;
use std::io::{self, IsTerminal};
use std::process::ExitCode;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const PROMPT: &str = "jobsh> ";

fn main() -> ExitCode {
    let options = match ShellOptions::from_args(env::args().skip(1)) {
        Ok(options) => options,
        Err(e) => {
            eprintln!("jobsh: {e}");
            eprint!("{USAGE}");
            return ExitCode::FAILURE;
        }
    };
    if options.help {
        print!("{USAGE}");
        return ExitCode::SUCCESS;
    }

    // RUST_LOG wins over -v
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(options.log_directive()));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();

    match run(&options) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e:#}");
            eprintln!("jobsh: {e:?}");
            ExitCode::FAILURE
        }
    }
}

fn run(options: &ShellOptions) -> anyhow::Result<()> {
    // Send stderr to stdout so every diagnostic, including those from
    // children that failed to exec, lands on one stream.
    dup2(libc::STDOUT_FILENO, libc::STDERR_FILENO).context("dup2 error")?;
    install_handlers().context("failed to install signal handlers")?;

    let config = Config::builder()
        .edit_mode(EditMode::Emacs)
        .auto_add_history(false) // We add manually for control
        .build();
    let mut rl = Editor::<ShellHelper, FileHistory>::with_config(config)?;
    rl.set_helper(Some(ShellHelper::default()));

    // History only makes sense for a person at a terminal.
    let interactive = io::stdin().is_terminal();
    let history_path = options.history_path.as_ref().filter(|_| interactive);
    if let Some(path) = history_path {
        if rl.load_history(path).is_err() {
            tracing::debug!(path = %path.display(), "no previous history");
        }
    }

    let prompt = if options.emit_prompt { PROMPT } else { "" };
    loop {
        match rl.readline(prompt) {
            Ok(line) => {
                let command_text = line.trim();
                if command_text.is_empty() {
                    continue;
                }
                if interactive {
                    rl.add_history_entry(command_text)?;
                }
                eval(command_text).context("job control failure")?;
            }
            Err(ReadlineError::Interrupted) => {
                // Ctrl-C at the prompt; no foreground job to forward it to
                println!("^C");
            }
            Err(ReadlineError::Eof) => {
                println!();
                break;
            }
            Err(err) => return Err(err).context("failed to read command line"),
        }
    }

    if let Some(path) = history_path {
        if let Err(e) = rl.save_history(path) {
            tracing::warn!(path = %path.display(), "failed to save history: {}", e);
        }
    }
    Ok(())
}
