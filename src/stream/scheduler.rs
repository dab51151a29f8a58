//! Scheduler - explicit "next tick" for deferred work.
//!
//! Stream delivery is synchronous, so the only deferred work is what the
//! runtime queues on purpose (e.g. a restart's replay). Nothing runs on a
//! timer: work waits in a thread-local FIFO until someone calls [`flush`].
//!
//! ```
//! use spark_restart::stream::scheduler;
//!
//! scheduler::schedule(|| println!("later"));
//! assert_eq!(scheduler::pending(), 1);
//! assert_eq!(scheduler::flush(), 1);
//! ```

use std::cell::RefCell;
use std::collections::VecDeque;

thread_local! {
    static QUEUE: RefCell<VecDeque<Box<dyn FnOnce()>>> = RefCell::new(VecDeque::new());
}

/// Queue `task` for the next flush.
pub fn schedule<F>(task: F)
where
    F: FnOnce() + 'static,
{
    QUEUE.with(|queue| queue.borrow_mut().push_back(Box::new(task)));
}

/// Number of queued tasks.
pub fn pending() -> usize {
    QUEUE.with(|queue| queue.borrow().len())
}

/// Run queued tasks until the queue is empty, then settle signal effects.
///
/// Tasks queued while flushing run in the same flush. Returns how many tasks
/// ran.
pub fn flush() -> usize {
    let mut ran = 0;
    loop {
        // Pop outside the borrow so tasks can schedule more work
        let task = QUEUE.with(|queue| queue.borrow_mut().pop_front());
        match task {
            Some(task) => {
                task();
                ran += 1;
            }
            None => break,
        }
    }

    spark_signals::flush_sync();
    ran
}

/// Drop every queued task without running it (for testing).
pub fn reset_scheduler() {
    QUEUE.with(|queue| queue.borrow_mut().clear());
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn test_fifo_order() {
        reset_scheduler();
        let order = Rc::new(RefCell::new(Vec::new()));
        for i in 0..3 {
            let order = order.clone();
            schedule(move || order.borrow_mut().push(i));
        }

        assert_eq!(pending(), 3);
        assert!(order.borrow().is_empty());
        assert_eq!(flush(), 3);
        assert_eq!(*order.borrow(), vec![0, 1, 2]);
        assert_eq!(pending(), 0);
    }

    #[test]
    fn test_nested_schedule_runs_in_same_flush() {
        reset_scheduler();
        let ran = Rc::new(Cell::new(0));
        let ran_clone = ran.clone();
        schedule(move || {
            let ran = ran_clone.clone();
            ran_clone.set(ran_clone.get() + 1);
            schedule(move || ran.set(ran.get() + 1));
        });

        assert_eq!(flush(), 2);
        assert_eq!(ran.get(), 2);
    }

    #[test]
    fn test_reset() {
        reset_scheduler();
        schedule(|| panic!("must not run"));
        reset_scheduler();
        assert_eq!(flush(), 0);
    }
}
