use crate::ast::Command;
use crate::builtins::get_builtin;
use crate::parser::parse_line;
use crate::signals::{SignalBlock, restore_child_signals};
use crate::sio_println;
use crate::state::{JobError, JobState, MAXJOBS};
use nix::errno::Errno;
use nix::fcntl::{OFlag, open};
use nix::sys::signal::{Signal, kill};
use nix::sys::stat::Mode;
use nix::unistd::{ForkResult, Pid, dup2, execvp, fork, setpgid};
use std::ffi::CString;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use thiserror::Error;

/// Failures of the process-control primitives themselves. The shell cannot
/// keep its invariants without them, so these end the session.
#[derive(Error, Debug)]
pub enum ExecError {
    #[error("Nix error: {0}")]
    Nix(#[from] nix::Error),
}

/// Parses and runs one input line.
pub fn eval(line: &str) -> Result<(), ExecError> {
    match parse_line(line) {
        Ok(Some(cmd)) => execute(&cmd, line),
        Ok(None) => Ok(()),
        Err(e) => {
            sio_println!("{}", e);
            Ok(())
        }
    }
}

pub fn execute(cmd: &Command, cmdline: &str) -> Result<(), ExecError> {
    let Some(program) = cmd.program() else {
        return Ok(());
    };
    if let Some(builtin) = get_builtin(program) {
        return builtin.execute(cmd);
    }
    launch(cmd, cmdline)
}

/// Forks and execs an external command, registering it as a job before any
/// of its status changes can be observed.
pub fn launch(cmd: &Command, cmdline: &str) -> Result<(), ExecError> {
    let args = match cmd
        .args
        .iter()
        .map(|a| CString::new(a.as_bytes()))
        .collect::<Result<Vec<_>, _>>()
    {
        Ok(args) => args,
        Err(_) => {
            sio_println!("{}: argument contains a NUL byte", cmd.args[0]);
            return Ok(());
        }
    };

    // Held across fork so SIGCHLD for this child cannot be handled before
    // the job exists.
    let mut block = SignalBlock::new()?;
    if block.jobs().is_full() {
        sio_println!("jobsh: {}", JobError::Capacity { max: MAXJOBS });
        return Ok(());
    }

    // SAFETY: the shell is single-threaded; the child only touches its own
    // copies of already-allocated data before exec or _exit.
    match unsafe { fork() }? {
        ForkResult::Child => run_child(cmd, &args, block),
        ForkResult::Parent { child } => {
            // Set from both sides; whichever runs first wins.
            let _ = setpgid(child, child);

            let state = if cmd.background {
                JobState::Background
            } else {
                JobState::Foreground
            };
            let jid = match block.jobs().add(child, state, cmdline) {
                Ok(jid) => jid,
                Err(e) => {
                    let _ = kill(child, Signal::SIGKILL);
                    sio_println!("jobsh: {}", e);
                    return Ok(());
                }
            };
            tracing::debug!(job = jid, pid = %child, %state, "launched {}", cmdline);

            if cmd.background {
                drop(block);
                sio_println!("[{}] ({}) {}", jid, child, cmdline);
            } else {
                wait_foreground(&mut block, child);
            }
            Ok(())
        }
    }
}

/// Sleeps until `pid` no longer owns the foreground: it stopped, exited, or
/// was killed. Every check happens with signals blocked, and the only
/// window in which they are delivered is inside `sigsuspend`.
pub fn wait_foreground(block: &mut SignalBlock, pid: Pid) {
    while block.jobs().foreground_pid() == Some(pid) {
        block.suspend();
    }
}

/// Opens an output redirection target: created or truncated, mode 0644.
pub fn open_output(path: &str) -> nix::Result<OwnedFd> {
    let mode = Mode::S_IRUSR | Mode::S_IWUSR | Mode::S_IRGRP | Mode::S_IROTH;
    let fd = open(path, OFlag::O_CREAT | OFlag::O_TRUNC | OFlag::O_WRONLY, mode)?;
    // SAFETY: `open` just returned this descriptor and nothing else owns it.
    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

fn open_input(path: &str) -> nix::Result<OwnedFd> {
    let fd = open(path, OFlag::O_RDONLY, Mode::empty())?;
    // SAFETY: as above.
    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

fn redirect(opened: nix::Result<OwnedFd>, target: RawFd) -> nix::Result<()> {
    let fd = opened?;
    dup2(fd.as_raw_fd(), target)?;
    Ok(())
}

/// Reports why `name` could not be used, e.g. `./prog: Permission denied`.
fn report(name: &str, errno: Errno) {
    sio_println!("{}: {}", name, errno.desc());
}

/// Leaves a child that never reached exec, skipping the parent's atexit
/// handlers and stdio buffers.
fn exit_child() -> ! {
    // SAFETY: _exit is async-signal-safe and only terminates this process.
    unsafe { libc::_exit(0) }
}

/// Child side of `launch`: redirect, unblock, join a new process group, exec.
/// Any failure is reported and the child exits with status 0 without
/// running the program.
fn run_child(cmd: &Command, args: &[CString], block: SignalBlock) -> ! {
    if let Some(path) = &cmd.infile {
        if let Err(e) = redirect(open_input(path), libc::STDIN_FILENO) {
            report(path, e);
            exit_child();
        }
    }
    if let Some(path) = &cmd.outfile {
        if let Err(e) = redirect(open_output(path), libc::STDOUT_FILENO) {
            report(path, e);
            exit_child();
        }
    }

    restore_child_signals();
    drop(block);
    let _ = setpgid(Pid::from_raw(0), Pid::from_raw(0));

    match execvp(&args[0], args) {
        Ok(never) => match never {},
        Err(e) => {
            report(&cmd.args[0], e);
            exit_child();
        }
    }
}
