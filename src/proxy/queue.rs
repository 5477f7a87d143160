/*!
 * Task queue.
 *
 * FIFO of boxed closures protected by one mutex and two condition
 * variables: `not_empty` wakes workers when there is work (or shutdown),
 * `drained` wakes `WorkerPool::shutdown` once the queue has emptied out
 * after `stop_accepting` was set.
 */
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;

/// A unit of work: an owned closure to run on a worker thread.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

struct State {
    items: VecDeque<Task>,
    stop_accepting: bool,
    shutdown: bool,
}

/// The shared FIFO plus its mutex/condvar pair. Cheap to share via `Arc`
/// between the acceptor (producer) and worker threads (consumers).
pub struct TaskQueue {
    state: Mutex<State>,
    not_empty: Condvar,
    drained: Condvar,
}

impl TaskQueue {
    pub fn new() -> Self {
        TaskQueue {
            state: Mutex::new(State {
                items: VecDeque::new(),
                stop_accepting: false,
                shutdown: false,
            }),
            not_empty: Condvar::new(),
            drained: Condvar::new(),
        }
    }

    /// Current queue length (for diagnostics and tests; not part of the
    /// hot path).
    pub fn size(&self) -> usize {
        self.state.lock().items.len()
    }

    /// Enqueue one task. Silently dropped (no error) if `stop_accepting` has
    /// already been set - dispatching after the pool has started quiescing
    /// is a no-op, not an error.
    pub fn dispatch(&self, task: Task) {
        let mut state = self.state.lock();
        if state.stop_accepting {
            return;
        }
        state.items.push_back(task);
        drop(state);
        self.not_empty.notify_one();
    }

    /// Block until a task is available or the pool is shutting down.
    /// Returns `None` when the worker should exit: either `shutdown` has
    /// been set, or the queue is empty and no further tasks will ever
    /// arrive (`stop_accepting` with `size == 0`).
    pub fn recv(&self) -> Option<Task> {
        let mut state = self.state.lock();
        loop {
            if !state.items.is_empty() {
                break;
            }
            if state.shutdown {
                return None;
            }
            self.not_empty.wait(&mut state);
        }
        if state.shutdown || (state.items.is_empty() && state.stop_accepting) {
            return None;
        }
        let task = state.items.pop_front();
        if state.items.is_empty() && state.stop_accepting {
            self.drained.notify_one();
        }
        task
    }

    /// Phase 1+2 of teardown: refuse new dispatches, then block until the
    /// queue has drained to empty.
    pub fn quiesce(&self) {
        let mut state = self.state.lock();
        state.stop_accepting = true;
        while !state.items.is_empty() {
            self.drained.wait(&mut state);
        }
    }

    /// Phase 3 of teardown: mark `shutdown` and wake every worker blocked
    /// on `not_empty` so they observe it and exit.
    pub fn signal_shutdown(&self) {
        let mut state = self.state.lock();
        state.shutdown = true;
        drop(state);
        self.not_empty.notify_all();
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        TaskQueue::new()
    }
}
