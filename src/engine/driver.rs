//! Background driver threads used by the engine.
//!
//! A [`Driver`] owns one named thread that drains a FIFO job queue. The
//! loopback engine runs two of them: one executes operations, the other runs
//! completion callbacks so a callback may block on another operation without
//! stalling the engine.
//!
//! The thread exits once every [`Driver`] clone has been dropped and the queue
//! is drained.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::mpsc::{self, Sender};
use std::{io, thread};
use tracing::{error, trace, warn};

/// Unit of work executed on a driver thread.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Handle to a driver thread. Cloning shares the same thread.
#[derive(Clone)]
pub struct Driver {
    name: &'static str,
    transmitter: Sender<Job>,
}

impl Driver {
    /// Spawns a new driver thread.
    ///
    /// # Arguments
    /// * `name` - Thread name, also used in log output
    ///
    /// # Returns
    /// The driver handle, or the error from spawning the thread
    pub fn spawn(name: &'static str) -> io::Result<Self> {
        let (transmitter, receiver) = mpsc::channel::<Job>();

        thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                for job in receiver {
                    // Panics stay inside the job; the queue keeps draining.
                    if catch_unwind(AssertUnwindSafe(job)).is_err() {
                        error!(target: "edge_client::engine", driver = name, "job panicked");
                    }
                }
                trace!(target: "edge_client::engine", driver = name, "driver stopped");
            })?;

        Ok(Self { name, transmitter })
    }

    /// Queues a job on the driver thread.
    ///
    /// If the thread is gone the job runs inline, so queued completions are
    /// never lost.
    pub fn dispatch(&self, job: Job) {
        if let Err(mpsc::SendError(job)) = self.transmitter.send(job) {
            warn!(target: "edge_client::engine", driver = self.name, "driver gone, running job inline");
            job();
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn jobs_run_in_order() {
        let driver = Driver::spawn("test-driver").unwrap();
        let (tx, rx) = mpsc::channel();

        for i in 0..5 {
            let tx = tx.clone();
            driver.dispatch(Box::new(move || tx.send(i).unwrap()));
        }

        let got: Vec<i32> = (0..5).map(|_| rx.recv().unwrap()).collect();
        assert_eq!(got, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn panicking_job_keeps_driver_alive() {
        let driver = Driver::spawn("test-panic").unwrap();
        let (tx, rx) = mpsc::channel();

        driver.dispatch(Box::new(|| panic!("boom")));
        driver.dispatch(Box::new(move || tx.send(7).unwrap()));

        assert_eq!(rx.recv().unwrap(), 7);
    }
}
