use std::{
    sync::{Arc, Mutex, PoisonError, mpsc},
    thread,
};

use log::debug;

pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Fixed set of worker threads completing asynchronous connection I/O.
#[derive(Debug)]
pub struct ThreadPool {
    workers: Vec<Worker>,
    sender: Option<mpsc::Sender<Job>>,
}

impl ThreadPool {
    pub fn new(name: &str, size: usize) -> Self {
        assert!(size > 0);

        let mut workers = Vec::with_capacity(size);
        let (sender, receiver) = mpsc::channel();

        let receiver = Arc::new(Mutex::new(receiver));
        let sender = Some(sender);

        for i in 0..size {
            workers.push(Worker::new(name, i, Arc::clone(&receiver)));
        }

        Self { workers, sender }
    }

    /// Queues `f` on a worker. Hands the job back if no worker is left to run it.
    pub fn execute<F>(&self, f: F) -> Result<(), Job>
    where
        F: FnOnce() + Send + 'static,
    {
        let job: Job = Box::new(f);
        match self.sender.as_ref() {
            Some(sender) => sender.send(job).map_err(|e| e.0),
            None => Err(job),
        }
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        drop(self.sender.take());

        let current = thread::current().id();
        for worker in self.workers.drain(..) {
            // The last handle on the pool can be released from inside one of its own jobs.
            if worker.thread.thread().id() == current {
                continue;
            }
            debug!("shutting down worker {}", worker.id);
            if worker.thread.join().is_err() {
                debug!("worker {} panicked", worker.id);
            }
        }
    }
}

#[derive(Debug)]
struct Worker {
    id: usize,
    thread: thread::JoinHandle<()>,
}

impl Worker {
    fn new(name: &str, id: usize, receiver: Arc<Mutex<mpsc::Receiver<Job>>>) -> Self {
        let name = name.to_string();
        let thread = thread::spawn(move || {
            loop {
                let msg = receiver
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .recv();
                match msg {
                    Ok(job) => {
                        debug!("{name} worker {id} running a job");
                        job();
                    }
                    Err(_) => {
                        debug!("{name} worker {id} disconnected");
                        break;
                    }
                }
            }
        });

        Self { id, thread }
    }
}
