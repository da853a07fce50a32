use std::{
    mem,
    sync::{
        Arc, Condvar, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use log::warn;

use crate::error::{MongoError, Result};

enum CellState<T> {
    Pending,
    Completed(Result<T>),
    Observed,
}

struct Shared<T> {
    state: Mutex<CellState<T>>,
    ready: Condvar,
    completers: AtomicUsize,
}

impl<T> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, CellState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Read side of a single-assignment result cell.
///
/// The cell is completed exactly once through its [`ResultCompleter`]; the first completion
/// wins and every later one is ignored.
pub struct SingleResultFuture<T> {
    shared: Arc<Shared<T>>,
}

/// Write side of a [`SingleResultFuture`].
///
/// Dropping the last completer of a pending cell completes it with [`MongoError::Abandoned`].
pub struct ResultCompleter<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for ResultCompleter<T> {
    fn clone(&self) -> Self {
        self.shared.completers.fetch_add(1, Ordering::Relaxed);
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> SingleResultFuture<T> {
    pub fn channel() -> (ResultCompleter<T>, SingleResultFuture<T>) {
        let shared = Arc::new(Shared {
            state: Mutex::new(CellState::Pending),
            ready: Condvar::new(),
            completers: AtomicUsize::new(1),
        });
        (
            ResultCompleter {
                shared: Arc::clone(&shared),
            },
            SingleResultFuture { shared },
        )
    }

    pub fn is_done(&self) -> bool {
        !matches!(*self.shared.lock(), CellState::Pending)
    }

    /// Blocks until the cell is completed and returns the outcome.
    pub fn wait(self) -> Result<T> {
        let mut state = self.shared.lock();
        while matches!(*state, CellState::Pending) {
            state = self
                .shared
                .ready
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        take(&mut state)
    }

    /// Like [`wait`](Self::wait), but gives the future back if `timeout` elapses first.
    pub fn wait_timeout(self, timeout: Duration) -> std::result::Result<Result<T>, Self> {
        let state = self.shared.lock();
        let (mut state, _) = self
            .shared
            .ready
            .wait_timeout_while(state, timeout, |state| {
                matches!(state, CellState::Pending)
            })
            .unwrap_or_else(PoisonError::into_inner);

        if matches!(*state, CellState::Pending) {
            drop(state);
            return Err(self);
        }
        Ok(take(&mut state))
    }
}

fn take<T>(state: &mut CellState<T>) -> Result<T> {
    match mem::replace(state, CellState::Observed) {
        CellState::Completed(outcome) => outcome,
        CellState::Pending | CellState::Observed => {
            unreachable!("result cell read before completion or read twice")
        }
    }
}

impl<T> ResultCompleter<T> {
    /// Completes the cell. Returns `false`, leaving the cell untouched, if it was already
    /// completed.
    pub fn complete(&self, outcome: Result<T>) -> bool {
        let mut state = self.shared.lock();
        if !matches!(*state, CellState::Pending) {
            warn!(
                "ignoring second completion of a result cell (discarded {})",
                if outcome.is_ok() { "value" } else { "failure" }
            );
            return false;
        }
        *state = CellState::Completed(outcome);
        drop(state);
        self.shared.ready.notify_all();
        true
    }
}

impl<T> Drop for ResultCompleter<T> {
    fn drop(&mut self) {
        if self.shared.completers.fetch_sub(1, Ordering::AcqRel) != 1 {
            return;
        }
        let mut state = self.shared.lock();
        if matches!(*state, CellState::Pending) {
            warn!("result cell dropped before completion");
            *state = CellState::Completed(Err(MongoError::Abandoned));
            drop(state);
            self.shared.ready.notify_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use crate::error::AuthError;

    #[test]
    fn first_completion_wins() {
        let (completer, future) = SingleResultFuture::channel();

        assert!(completer.complete(Ok(1)));
        assert!(!completer.complete(Ok(2)));
        assert!(!completer.complete(Err(AuthError::MissingCredential("x".into()).into())));
        assert!(future.is_done());
        assert_eq!(future.wait().unwrap(), 1);
    }

    #[test]
    fn failure_then_success_keeps_failure() {
        let (completer, future) = SingleResultFuture::<u8>::channel();

        completer.complete(Err(AuthError::MissingCredential("admin".into()).into()));
        completer.complete(Ok(7));
        assert!(matches!(
            future.wait(),
            Err(MongoError::Auth(AuthError::MissingCredential(_)))
        ));
    }

    #[test]
    fn completes_from_another_thread() {
        let (completer, future) = SingleResultFuture::channel();

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            completer.complete(Ok("done"))
        });

        assert_eq!(future.wait().unwrap(), "done");
        assert!(handle.join().unwrap());
    }

    #[test]
    fn wait_timeout_returns_pending_future() {
        let (completer, future) = SingleResultFuture::<u8>::channel();

        let future = match future.wait_timeout(Duration::from_millis(10)) {
            Ok(_) => panic!("cell completed without a value"),
            Err(future) => future,
        };
        assert!(!future.is_done());

        completer.complete(Ok(3));
        assert_eq!(
            future.wait_timeout(Duration::from_secs(1)).ok().unwrap().unwrap(),
            3
        );
    }

    #[test]
    fn dropping_last_completer_abandons_cell() {
        let (completer, future) = SingleResultFuture::<u8>::channel();
        let spare = completer.clone();

        drop(completer);
        assert!(!future.is_done());

        let handle = thread::spawn(move || drop(spare));
        assert!(matches!(future.wait(), Err(MongoError::Abandoned)));
        handle.join().unwrap();
    }

    #[test]
    fn dropping_completed_cell_keeps_outcome() {
        let (completer, future) = SingleResultFuture::channel();

        completer.complete(Ok(5));
        drop(completer);
        assert_eq!(future.wait().unwrap(), 5);
    }
}
