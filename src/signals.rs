//! Signal dispatch and the critical section that guards the job table.
//!
//! The job table is shared between the main line and the handlers below.
//! The only exclusion mechanism is the signal mask: [`SignalBlock`] blocks
//! every signal for as long as it lives, and the table is reachable only
//! through it. Handlers run with the same discipline, so at most one
//! context touches the table at any instant.
//!
//! Everything reachable from a handler is async-signal-safe: no heap
//! allocation, no locks, no buffered I/O. Output goes through [`crate::sio`].

use crate::sio_println;
use crate::state::{JobState, JobTable};
use nix::errno::Errno;
use nix::sys::signal::{
    SaFlags, SigAction, SigHandler, SigSet, SigmaskHow, Signal, killpg, sigaction, sigprocmask,
};
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::Pid;
use std::cell::UnsafeCell;

struct JobCell(UnsafeCell<JobTable>);

// SAFETY: the process is single-threaded and every access goes through a
// live `SignalBlock`, which excludes the only other context (handlers).
unsafe impl Sync for JobCell {}

static JOBS: JobCell = JobCell(UnsafeCell::new(JobTable::new()));

/// RAII guard that blocks all signals and restores the previous mask on drop.
pub struct SignalBlock {
    prev: SigSet,
}

impl SignalBlock {
    pub fn new() -> nix::Result<Self> {
        let mut prev = SigSet::empty();
        sigprocmask(SigmaskHow::SIG_BLOCK, Some(&SigSet::all()), Some(&mut prev))?;
        Ok(Self { prev })
    }

    /// The shared job table. The borrow is tied to the guard, so the table
    /// cannot be held across [`SignalBlock::suspend`].
    pub fn jobs(&mut self) -> &mut JobTable {
        // SAFETY: all signals are blocked while `self` lives, and the
        // exclusive borrow of `self` keeps this reference unique within the
        // main line.
        unsafe { &mut *JOBS.0.get() }
    }

    /// Atomically restores the pre-block mask and sleeps until a signal has
    /// been handled, then re-blocks everything.
    pub fn suspend(&mut self) {
        // SAFETY: `prev` is a valid, initialised sigset_t.
        unsafe {
            libc::sigsuspend(self.prev.as_ref());
        }
    }
}

impl Drop for SignalBlock {
    fn drop(&mut self) {
        let _ = sigprocmask(SigmaskHow::SIG_SETMASK, Some(&self.prev), None);
    }
}

/// Saves `errno` and puts it back when dropped.
struct ErrnoGuard(i32);

impl ErrnoGuard {
    fn save() -> Self {
        Self(Errno::last_raw())
    }
}

impl Drop for ErrnoGuard {
    fn drop(&mut self) {
        Errno::set_raw(self.0);
    }
}

/// Reaps every child with a pending status change.
extern "C" fn sigchld_handler(_: libc::c_int) {
    let _errno = ErrnoGuard::save();

    loop {
        let flags = WaitPidFlag::WNOHANG | WaitPidFlag::WUNTRACED;
        let status = match waitpid(Pid::from_raw(-1), Some(flags)) {
            Ok(WaitStatus::StillAlive) | Err(_) => break,
            Ok(status) => status,
        };
        let Ok(mut block) = SignalBlock::new() else {
            break;
        };
        let jobs = block.jobs();

        match status {
            WaitStatus::Stopped(pid, sig) => {
                if let Some(jid) = jobs.job_from_pid(pid) {
                    jobs.set_state(jid, JobState::Stopped);
                    sio_println!("Job [{}] ({}) stopped by signal {}", jid, pid, sig as i32);
                }
            }
            WaitStatus::Signaled(pid, sig, _) => {
                if let Some(jid) = jobs.job_from_pid(pid) {
                    sio_println!("Job [{}] ({}) terminated by signal {}", jid, pid, sig as i32);
                    jobs.remove(jid);
                }
            }
            WaitStatus::Exited(pid, _) => {
                if let Some(jid) = jobs.job_from_pid(pid) {
                    jobs.remove(jid);
                }
            }
            // Only reported when WCONTINUED is requested, which this loop
            // does not do. `set_state` refuses to create a second
            // foreground job either way.
            WaitStatus::Continued(pid) => {
                if let Some(jid) = jobs.job_from_pid(pid) {
                    jobs.set_state(jid, JobState::Foreground);
                }
            }
            _ => {}
        }
    }
}

/// Sends `sig` to every process in the foreground job's group, if any.
fn forward_to_foreground(sig: Signal) {
    let _errno = ErrnoGuard::save();
    let Ok(mut block) = SignalBlock::new() else {
        return;
    };
    if let Some(pid) = block.jobs().foreground_pid() {
        let _ = killpg(pid, sig);
    }
}

extern "C" fn sigint_handler(_: libc::c_int) {
    forward_to_foreground(Signal::SIGINT);
}

extern "C" fn sigtstp_handler(_: libc::c_int) {
    forward_to_foreground(Signal::SIGTSTP);
}

extern "C" fn sigquit_handler(_: libc::c_int) {
    sio_println!("Terminating after receipt of SIGQUIT signal");
    // SAFETY: _exit is async-signal-safe.
    unsafe { libc::_exit(1) }
}

/// Install the shell's handlers. Called once at startup before the REPL loop.
///
/// Ctrl-C and Ctrl-Z are forwarded to the foreground job instead of
/// affecting the shell. SIGTTIN/SIGTTOU are ignored so background reads and
/// writes on the terminal never stop the shell itself.
pub fn install_handlers() -> nix::Result<()> {
    let handlers: [(Signal, extern "C" fn(libc::c_int)); 4] = [
        (Signal::SIGINT, sigint_handler),
        (Signal::SIGTSTP, sigtstp_handler),
        (Signal::SIGCHLD, sigchld_handler),
        (Signal::SIGQUIT, sigquit_handler),
    ];
    let ignore = SigAction::new(SigHandler::SigIgn, SaFlags::empty(), SigSet::empty());

    // SAFETY: every handler above restricts itself to async-signal-safe calls.
    unsafe {
        for (signal, handler) in handlers {
            let action = SigAction::new(
                SigHandler::Handler(handler),
                SaFlags::SA_RESTART,
                SigSet::empty(),
            );
            sigaction(signal, &action)?;
        }
        sigaction(Signal::SIGTTIN, &ignore)?;
        sigaction(Signal::SIGTTOU, &ignore)?;
    }
    Ok(())
}

/// Put back default dispositions in a child process after fork().
/// Caught signals are reset by exec anyway; ignored ones are not.
pub fn restore_child_signals() {
    let default = SigAction::new(SigHandler::SigDfl, SaFlags::empty(), SigSet::empty());

    // SAFETY: installing SIG_DFL has no handler-safety requirements.
    unsafe {
        let _ = sigaction(Signal::SIGTTIN, &default);
        let _ = sigaction(Signal::SIGTTOU, &default);
    }
}
