use crate::ast::Command;
use crate::executor::{ExecError, open_output, wait_foreground};
use crate::signals::SignalBlock;
use crate::sio_println;
use crate::state::{JobId, JobState, JobTable};
use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;
use std::fs::File;
use std::io;
use std::process;
use thiserror::Error;

/// User-facing failures of a built-in. These are printed, never propagated.
#[derive(Error, Debug, PartialEq)]
pub enum BuiltinError {
    #[error("{0} command requires PID or %jobid argument")]
    MissingArgument(&'static str),
    #[error("{0}: argument must be a PID or %jobid")]
    BadArgument(&'static str),
    #[error("{0}: No such job")]
    NoSuchJob(String),
}

pub trait Builtin {
    fn execute(&self, cmd: &Command) -> Result<(), ExecError>;
}

pub struct Quit;

impl Builtin for Quit {
    fn execute(&self, _cmd: &Command) -> Result<(), ExecError> {
        process::exit(0);
    }
}

pub struct Jobs;

impl Builtin for Jobs {
    fn execute(&self, cmd: &Command) -> Result<(), ExecError> {
        let mut block = SignalBlock::new()?;
        let result = match &cmd.outfile {
            Some(path) => match open_output(path) {
                Ok(fd) => block.jobs().list(&mut File::from(fd)),
                Err(errno) => {
                    sio_println!("{}: {}", path, errno.desc());
                    return Ok(());
                }
            },
            None => block.jobs().list(&mut io::stdout().lock()),
        };
        if result.is_err() {
            sio_println!("Fails to write into job list.");
        }
        Ok(())
    }
}

/// A `bg`/`fg` argument: `%<jobid>` or a bare process id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobRef {
    Job(JobId),
    Process(Pid),
}

impl JobRef {
    pub fn parse(name: &'static str, arg: Option<&str>) -> Result<Self, BuiltinError> {
        let arg = arg.ok_or(BuiltinError::MissingArgument(name))?;
        if let Some(num) = arg.strip_prefix('%') {
            Ok(JobRef::Job(JobId::try_from(leading_number(num)).unwrap_or(0)))
        } else if arg.starts_with(|c: char| c.is_ascii_digit()) {
            Ok(JobRef::Process(Pid::from_raw(
                i32::try_from(leading_number(arg)).unwrap_or(0),
            )))
        } else {
            Err(BuiltinError::BadArgument(name))
        }
    }

    pub fn resolve(self, jobs: &JobTable) -> Option<(JobId, Pid)> {
        match self {
            JobRef::Job(jid) => jobs.pid_of(jid).map(|pid| (jid, pid)),
            JobRef::Process(pid) => jobs.job_from_pid(pid).map(|jid| (jid, pid)),
        }
    }
}

/// Value of the leading decimal digits, 0 if there are none or they overflow.
fn leading_number(s: &str) -> u64 {
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    s[..end].parse().unwrap_or(0)
}

/// Continues a job's process group in the background or foreground.
pub struct Resume {
    name: &'static str,
    state: JobState,
}

impl Resume {
    pub const BG: Resume = Resume {
        name: "bg",
        state: JobState::Background,
    };
    pub const FG: Resume = Resume {
        name: "fg",
        state: JobState::Foreground,
    };
}

impl Builtin for Resume {
    fn execute(&self, cmd: &Command) -> Result<(), ExecError> {
        let mut block = SignalBlock::new()?;

        let job_ref = match JobRef::parse(self.name, cmd.args.get(1).map(String::as_str)) {
            Ok(job_ref) => job_ref,
            Err(e) => {
                sio_println!("{}", e);
                return Ok(());
            }
        };
        let Some((jid, pid)) = job_ref.resolve(block.jobs()) else {
            sio_println!("{}", BuiltinError::NoSuchJob(cmd.args[1].clone()));
            return Ok(());
        };

        if self.state == JobState::Background {
            let jobs = block.jobs();
            sio_println!("[{}] ({}) {}", jid, pid, jobs.get(jid).map_or("", |j| j.cmdline()));
        }
        if let Err(e) = killpg(pid, Signal::SIGCONT) {
            tracing::warn!(job = jid, %pid, "{}: failed to continue: {}", self.name, e);
        }
        block.jobs().set_state(jid, self.state);
        tracing::debug!(job = jid, %pid, state = %self.state, "resumed");

        if self.state == JobState::Foreground {
            wait_foreground(&mut block, pid);
        }
        Ok(())
    }
}

pub fn get_builtin(name: &str) -> Option<Box<dyn Builtin>> {
    match name {
        "quit" => Some(Box::new(Quit)),
        "jobs" => Some(Box::new(Jobs)),
        "bg" => Some(Box::new(Resume::BG)),
        "fg" => Some(Box::new(Resume::FG)),
        _ => None,
    }
}

pub fn is_builtin(name: &str) -> bool {
    matches!(name, "quit" | "jobs" | "bg" | "fg")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_ref_shapes() {
        assert_eq!(JobRef::parse("fg", Some("%3")), Ok(JobRef::Job(3)));
        assert_eq!(
            JobRef::parse("bg", Some("1234")),
            Ok(JobRef::Process(Pid::from_raw(1234)))
        );
        assert_eq!(
            JobRef::parse("fg", None),
            Err(BuiltinError::MissingArgument("fg"))
        );
        assert_eq!(
            JobRef::parse("bg", Some("abc")),
            Err(BuiltinError::BadArgument("bg"))
        );
    }

    #[test]
    fn test_job_ref_out_of_range_pid_does_not_wrap() {
        assert_eq!(
            JobRef::parse("fg", Some("4294967297")),
            Ok(JobRef::Process(Pid::from_raw(0)))
        );
        assert_eq!(
            JobRef::parse("bg", Some("99999999999999999999999")),
            Ok(JobRef::Process(Pid::from_raw(0)))
        );

        let mut jobs = JobTable::new();
        jobs.add(Pid::from_raw(1), JobState::Background, "init &")
            .unwrap();
        let wrapped = JobRef::parse("fg", Some("4294967297")).unwrap();
        assert_eq!(wrapped.resolve(&jobs), None);
    }

    #[test]
    fn test_job_ref_non_numeric_suffix_resolves_to_nothing() {
        assert_eq!(JobRef::parse("fg", Some("%x")), Ok(JobRef::Job(0)));
        assert_eq!(JobRef::parse("fg", Some("%")), Ok(JobRef::Job(0)));
        assert_eq!(
            JobRef::parse("fg", Some("12ab")),
            Ok(JobRef::Process(Pid::from_raw(12)))
        );
    }

    #[test]
    fn test_job_ref_resolve() {
        let mut jobs = JobTable::new();
        let jid = jobs
            .add(Pid::from_raw(777), JobState::Background, "sleep 5 &")
            .unwrap();

        assert_eq!(
            JobRef::Job(jid).resolve(&jobs),
            Some((jid, Pid::from_raw(777)))
        );
        assert_eq!(
            JobRef::Process(Pid::from_raw(777)).resolve(&jobs),
            Some((jid, Pid::from_raw(777)))
        );
        assert_eq!(JobRef::Job(0).resolve(&jobs), None);
        assert_eq!(JobRef::Job(2).resolve(&jobs), None);
        assert_eq!(JobRef::Process(Pid::from_raw(1)).resolve(&jobs), None);
    }

    #[test]
    fn test_builtin_messages() {
        assert_eq!(
            BuiltinError::MissingArgument("bg").to_string(),
            "bg command requires PID or %jobid argument"
        );
        assert_eq!(
            BuiltinError::BadArgument("fg").to_string(),
            "fg: argument must be a PID or %jobid"
        );
        assert_eq!(
            BuiltinError::NoSuchJob("%4".to_string()).to_string(),
            "%4: No such job"
        );
    }

    #[test]
    fn test_get_builtin() {
        for name in ["quit", "jobs", "bg", "fg"] {
            assert!(get_builtin(name).is_some());
            assert!(is_builtin(name));
        }
        assert!(get_builtin("ls").is_none());
        assert!(!is_builtin("cd"));
    }
}
