//! Background/stopped job tracking.
//!
//! Grounded on the original C's `jobs.c`: a job is just a process-group id,
//! the command line that started it, and whether it's running in the
//! background. Reaping is a non-blocking `waitpid(-1, WNOHANG)` loop rather
//! than per-job polling, matching the original's `jobs_reap()`.

use std::collections::HashMap;

#[cfg(unix)]
use std::io;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum JobStatus {
    Running,
    Stopped,
    Done(i32),
}

pub struct Job {
    pub id: usize,
    pub pgid: i32,
    pub command: String,
    pub background: bool,
    pub status: JobStatus,
}

#[derive(Default)]
pub struct JobTable {
    jobs: HashMap<usize, Job>,
    next_id: usize,
}

impl JobTable {
    pub fn new() -> Self {
        JobTable { jobs: HashMap::new(), next_id: 1 }
    }

    pub fn add(&mut self, pgid: i32, command: String, background: bool) -> usize {
        let id = self.next_id;
        self.next_id += 1;
        self.jobs.insert(
            id,
            Job { id, pgid, command, background, status: JobStatus::Running },
        );
        id
    }

    pub fn mark_stopped(&mut self, pgid: i32) {
        if let Some(job) = self.jobs.values_mut().find(|j| j.pgid == pgid) {
            job.status = JobStatus::Stopped;
        }
    }

    pub fn get_mut(&mut self, id: usize) -> Option<&mut Job> {
        self.jobs.get_mut(&id)
    }

    pub fn remove(&mut self, id: usize) -> Option<Job> {
        self.jobs.remove(&id)
    }

    pub fn jobs_sorted(&self) -> Vec<&Job> {
        let mut list: Vec<&Job> = self.jobs.values().collect();
        list.sort_by_key(|j| j.id);
        list
    }

    pub fn most_recent_id(&self) -> Option<usize> {
        self.jobs.keys().copied().max()
    }

    pub fn most_recent_stopped_id(&self) -> Option<usize> {
        self.jobs
            .iter()
            .filter(|(_, j)| j.status == JobStatus::Stopped)
            .map(|(id, _)| *id)
            .max()
    }

    /// Non-blocking poll of every background process group, reporting
    /// `[bg] process %d finished\n` for each whose group leader has exited
    /// and removing it from the table. Matches the original's `jobs_reap`.
    #[cfg(unix)]
    pub fn reap(&mut self) -> io::Result<()> {
        let mut done_ids = Vec::new();

        for (id, job) in self.jobs.iter_mut() {
            if job.status != JobStatus::Running {
                continue;
            }
            let mut raw_status: libc::c_int = 0;
            let rc = unsafe { libc::waitpid(job.pgid, &mut raw_status, libc::WNOHANG) };
            if rc == job.pgid {
                let code = crate::status::exit_code_from_wait_status(raw_status).unwrap_or(0);
                println!("[bg] process {} finished", job.pgid);
                job.status = JobStatus::Done(code);
                done_ids.push(*id);
            } else if rc < 0 {
                let err = io::Error::last_os_error();
                if err.raw_os_error() != Some(libc::ECHILD) {
                    return Err(err);
                }
                done_ids.push(*id);
            }
        }

        for id in done_ids {
            self.jobs.remove(&id);
        }
        Ok(())
    }

    /// `jobs` builtin listing: `[pgid] Running|Done cmd`.
    pub fn print(&self) {
        for job in self.jobs_sorted() {
            let label = if job.background { "Running" } else { "Done" };
            println!("[{}] {} {}", job.pgid, label, job.command);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_assigns_increasing_ids() {
        let mut table = JobTable::new();
        let a = table.add(100, "sleep 1".to_string(), true);
        let b = table.add(200, "sleep 2".to_string(), true);
        assert!(b > a);
    }

    #[test]
    fn most_recent_id_tracks_latest_add() {
        let mut table = JobTable::new();
        table.add(100, "a".to_string(), true);
        let b = table.add(200, "b".to_string(), true);
        assert_eq!(table.most_recent_id(), Some(b));
    }

    #[test]
    fn mark_stopped_updates_status() {
        let mut table = JobTable::new();
        table.add(100, "a".to_string(), true);
        table.mark_stopped(100);
        assert_eq!(table.most_recent_stopped_id(), Some(1));
    }
}
