use nix::unistd::Pid;
use std::fmt;
use std::io::{self, Write};
use thiserror::Error;

/// Maximum number of jobs tracked at once.
pub const MAXJOBS: usize = 16;
/// Bytes of command-line text retained per job.
pub const MAXLINE: usize = 1024;

/// Job ids start at 1; slot `i` holds job `i + 1`.
pub type JobId = usize;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    #[error("job table full ({max} jobs)")]
    Capacity { max: usize },
    #[error("job {0} already owns the foreground")]
    ForegroundBusy(JobId),
    #[error("process {0} is already tracked")]
    DuplicatePid(Pid),
}

// --- Job Control ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Undefined,
    Foreground,
    Background,
    Stopped,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Undefined => write!(f, "Undefined"),
            JobState::Foreground => write!(f, "Foreground"),
            JobState::Background => write!(f, "Running"),
            JobState::Stopped => write!(f, "Stopped"),
        }
    }
}

/// Command-line text stored inline so a job never owns heap memory.
#[derive(Clone, Copy)]
pub struct CmdLine {
    buf: [u8; MAXLINE],
    len: usize,
}

impl CmdLine {
    pub const EMPTY: CmdLine = CmdLine {
        buf: [0; MAXLINE],
        len: 0,
    };

    /// Copies `text`, truncating on a character boundary if it does not fit.
    pub fn new(text: &str) -> Self {
        let mut len = text.len().min(MAXLINE);
        while !text.is_char_boundary(len) {
            len -= 1;
        }
        let mut line = Self::EMPTY;
        line.buf[..len].copy_from_slice(&text.as_bytes()[..len]);
        line.len = len;
        line
    }

    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.buf[..self.len]).unwrap_or("")
    }
}

impl fmt::Debug for CmdLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Job {
    pub id: JobId,
    pub pid: Pid,
    pub state: JobState,
    cmdline: CmdLine,
}

impl Job {
    const EMPTY: Job = Job {
        id: 0,
        pid: Pid::from_raw(0),
        state: JobState::Undefined,
        cmdline: CmdLine::EMPTY,
    };

    pub fn cmdline(&self) -> &str {
        self.cmdline.as_str()
    }

    fn is_live(&self) -> bool {
        self.state != JobState::Undefined
    }
}

/// Fixed-capacity registry of child processes.
///
/// Nothing here allocates, so the table can be read and written from a
/// signal handler. Callers are responsible for excluding signal delivery
/// around every access (see [`crate::signals::SignalBlock`]).
pub struct JobTable {
    slots: [Job; MAXJOBS],
}

impl Default for JobTable {
    fn default() -> Self {
        Self::new()
    }
}

impl JobTable {
    pub const fn new() -> Self {
        Self {
            slots: [Job::EMPTY; MAXJOBS],
        }
    }

    /// Registers a child in the lowest free slot and returns its job id.
    pub fn add(&mut self, pid: Pid, state: JobState, cmdline: &str) -> Result<JobId, JobError> {
        debug_assert!(matches!(state, JobState::Foreground | JobState::Background));
        if self.job_from_pid(pid).is_some() {
            return Err(JobError::DuplicatePid(pid));
        }
        if state == JobState::Foreground {
            if let Some(fg) = self.foreground() {
                return Err(JobError::ForegroundBusy(fg));
            }
        }
        let index = self
            .slots
            .iter()
            .position(|job| !job.is_live())
            .ok_or(JobError::Capacity { max: MAXJOBS })?;

        let id = index + 1;
        self.slots[index] = Job {
            id,
            pid,
            state,
            cmdline: CmdLine::new(cmdline),
        };
        Ok(id)
    }

    pub fn remove(&mut self, id: JobId) {
        if let Some(job) = self.slot_mut(id) {
            *job = Job::EMPTY;
        }
    }

    /// Changes a live job's state. Returns `false` without touching the
    /// table if the job is unknown or the change would leave two jobs in
    /// the foreground.
    pub fn set_state(&mut self, id: JobId, state: JobState) -> bool {
        if state == JobState::Undefined {
            return false;
        }
        if state == JobState::Foreground && self.foreground().is_some_and(|fg| fg != id) {
            return false;
        }
        match self.slot_mut(id) {
            Some(job) => {
                job.state = state;
                true
            }
            None => false,
        }
    }

    pub fn job_from_pid(&self, pid: Pid) -> Option<JobId> {
        self.iter().find(|job| job.pid == pid).map(|job| job.id)
    }

    pub fn pid_of(&self, id: JobId) -> Option<Pid> {
        self.get(id).map(|job| job.pid)
    }

    pub fn exists(&self, id: JobId) -> bool {
        self.get(id).is_some()
    }

    pub fn get(&self, id: JobId) -> Option<&Job> {
        id.checked_sub(1)
            .and_then(|index| self.slots.get(index))
            .filter(|job| job.is_live())
    }

    pub fn foreground(&self) -> Option<JobId> {
        self.iter()
            .find(|job| job.state == JobState::Foreground)
            .map(|job| job.id)
    }

    pub fn foreground_pid(&self) -> Option<Pid> {
        self.foreground().and_then(|id| self.pid_of(id))
    }

    pub fn is_full(&self) -> bool {
        self.slots.iter().all(Job::is_live)
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Live jobs in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Job> {
        self.slots.iter().filter(|job| job.is_live())
    }

    /// Writes one `[id] (pid) State cmdline` line per live job.
    pub fn list<W: Write>(&self, out: &mut W) -> io::Result<()> {
        for job in self.iter() {
            writeln!(out, "[{}] ({}) {} {}", job.id, job.pid, job.state, job.cmdline())?;
        }
        out.flush()
    }

    fn slot_mut(&mut self, id: JobId) -> Option<&mut Job> {
        id.checked_sub(1)
            .and_then(|index| self.slots.get_mut(index))
            .filter(|job| job.is_live())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(raw: i32) -> Pid {
        Pid::from_raw(raw)
    }

    #[test]
    fn test_add_assigns_lowest_free_id() {
        let mut jobs = JobTable::new();
        assert_eq!(jobs.add(pid(100), JobState::Background, "a &"), Ok(1));
        assert_eq!(jobs.add(pid(101), JobState::Background, "b &"), Ok(2));
        assert_eq!(jobs.add(pid(102), JobState::Background, "c &"), Ok(3));

        jobs.remove(2);
        assert_eq!(jobs.add(pid(103), JobState::Background, "d &"), Ok(2));
        assert_eq!(jobs.pid_of(2), Some(pid(103)));
        assert_eq!(jobs.add(pid(104), JobState::Background, "e &"), Ok(4));
    }

    #[test]
    fn test_live_id_is_never_reassigned() {
        let mut jobs = JobTable::new();
        let first = jobs.add(pid(10), JobState::Background, "x &").unwrap();
        let second = jobs.add(pid(11), JobState::Background, "y &").unwrap();
        assert_ne!(first, second);
        assert_eq!(jobs.pid_of(first), Some(pid(10)));
        assert_eq!(jobs.job_from_pid(pid(11)), Some(second));
    }

    #[test]
    fn test_capacity_rejects_without_side_effects() {
        let mut jobs = JobTable::new();
        for i in 0..MAXJOBS {
            jobs.add(pid(1000 + i as i32), JobState::Background, "sleep 5 &")
                .unwrap();
        }
        assert!(jobs.is_full());
        assert_eq!(
            jobs.add(pid(5000), JobState::Background, "sleep 5 &"),
            Err(JobError::Capacity { max: MAXJOBS })
        );
        assert_eq!(jobs.len(), MAXJOBS);
        assert_eq!(jobs.job_from_pid(pid(5000)), None);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let mut jobs = JobTable::new();
        jobs.add(pid(1), JobState::Background, "a &").unwrap();
        jobs.add(pid(2), JobState::Background, "b &").unwrap();

        jobs.remove(1);
        jobs.remove(1);
        jobs.remove(0);
        jobs.remove(MAXJOBS + 5);

        assert!(!jobs.exists(1));
        assert!(jobs.exists(2));
        assert_eq!(jobs.get(2).map(Job::cmdline), Some("b &"));
    }

    #[test]
    fn test_single_foreground_job() {
        let mut jobs = JobTable::new();
        let fg = jobs.add(pid(1), JobState::Foreground, "sleep 5").unwrap();
        let bg = jobs.add(pid(2), JobState::Background, "sleep 5 &").unwrap();

        assert_eq!(
            jobs.add(pid(3), JobState::Foreground, "sleep 1"),
            Err(JobError::ForegroundBusy(fg))
        );
        assert!(!jobs.set_state(bg, JobState::Foreground));
        assert_eq!(jobs.foreground(), Some(fg));

        assert!(jobs.set_state(fg, JobState::Stopped));
        assert!(jobs.set_state(bg, JobState::Foreground));
        assert_eq!(jobs.foreground(), Some(bg));
        assert_eq!(jobs.foreground_pid(), Some(pid(2)));
        assert_eq!(
            jobs.iter()
                .filter(|job| job.state == JobState::Foreground)
                .count(),
            1
        );
    }

    #[test]
    fn test_set_state_on_missing_job_is_noop() {
        let mut jobs = JobTable::new();
        assert!(!jobs.set_state(3, JobState::Stopped));
        assert!(jobs.is_empty());
    }

    #[test]
    fn test_duplicate_pid_rejected() {
        let mut jobs = JobTable::new();
        jobs.add(pid(42), JobState::Background, "a &").unwrap();
        assert_eq!(
            jobs.add(pid(42), JobState::Background, "b &"),
            Err(JobError::DuplicatePid(pid(42)))
        );
    }

    #[test]
    fn test_list_format() {
        let mut jobs = JobTable::new();
        jobs.add(pid(200), JobState::Background, "sleep 5 &").unwrap();
        let stopped = jobs.add(pid(201), JobState::Foreground, "cat").unwrap();
        jobs.set_state(stopped, JobState::Stopped);

        let mut out = Vec::new();
        jobs.list(&mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "[1] (200) Running sleep 5 &\n[2] (201) Stopped cat\n"
        );
    }

    #[test]
    fn test_cmdline_truncates_on_char_boundary() {
        let long = "é".repeat(MAXLINE);
        let line = CmdLine::new(&long);
        assert!(line.as_str().len() <= MAXLINE);
        assert!(line.as_str().chars().all(|c| c == 'é'));
        assert_eq!(CmdLine::new("ls -l").as_str(), "ls -l");
    }
}
