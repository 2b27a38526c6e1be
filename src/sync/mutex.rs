/*
 * Kernel Mutexes
 *
 * Blocking mutual exclusion for processes. Mutexes live in a fixed pool;
 * ids are handed out by an allocator queue. A held mutex has exactly one
 * owner; contending processes park in the mutex's FIFO wait queue, leave
 * the scheduler, and are resumed by direct handoff: unlock transfers
 * ownership to the head waiter within the same kernel entry, so there is
 * no unlocked window for a late arrival to barge through.
 *
 * The owner never holds the lock recursively; a second lock from the
 * owner blocks like any other process would.
 */

use crate::scheduler::Scheduler;
use crate::scheduler::process::{PROC_MAX, Pid, ProcState};
use crate::utils::queue::IdQueue;

/// Size of the mutex pool.
pub const MUTEX_MAX: usize = 16;

pub struct Mutex {
    allocated: bool,
    /// 0 = free, 1 = held. Never exceeds 1.
    locks: u32,
    owner: Option<Pid>,
    wait_queue: IdQueue<PROC_MAX>,
}

impl Mutex {
    const fn empty() -> Self {
        Self {
            allocated: false,
            locks: 0,
            owner: None,
            wait_queue: IdQueue::new(),
        }
    }

    pub fn is_held(&self) -> bool {
        self.locks > 0
    }

    pub fn owner(&self) -> Option<Pid> {
        self.owner
    }
}

/// The mutex pool plus its id allocator.
pub struct MutexPool {
    table: [Mutex; MUTEX_MAX],
    allocator: IdQueue<MUTEX_MAX>,
}

impl MutexPool {
    pub fn new() -> Self {
        let mut allocator = IdQueue::new();
        for id in 0..MUTEX_MAX {
            allocator.enqueue(id);
        }
        Self {
            table: [const { Mutex::empty() }; MUTEX_MAX],
            allocator,
        }
    }

    fn valid(&self, id: usize) -> bool {
        id < MUTEX_MAX && self.table[id].allocated
    }

    pub fn get(&self, id: usize) -> Option<&Mutex> {
        self.valid(id).then(|| &self.table[id])
    }

    /// Allocate a mutex. Returns its id, or None when the pool is empty.
    pub fn init(&mut self) -> Option<usize> {
        let Some(id) = self.allocator.dequeue() else {
            log::error!("mutex: unable to allocate");
            return None;
        };
        let mutex = &mut self.table[id];
        mutex.allocated = true;
        mutex.locks = 0;
        mutex.owner = None;
        mutex.wait_queue = IdQueue::new();
        log::trace!("mutex {} allocated", id);
        Some(id)
    }

    /// Free a mutex. Fails while it is held.
    pub fn destroy(&mut self, id: usize) -> Option<i64> {
        if !self.valid(id) {
            log::error!("mutex: destroy of invalid id {}", id);
            return None;
        }
        let mutex = &mut self.table[id];
        if mutex.locks > 0 {
            log::error!(
                "mutex: destroy of held mutex {} (owner pid {:?})",
                id,
                mutex.owner
            );
            return None;
        }
        mutex.allocated = false;
        self.allocator.enqueue(id);
        Some(0)
    }

    /// Acquire the mutex on behalf of the active process.
    ///
    /// Uncontended, the caller becomes owner and the call returns the lock
    /// count (1) immediately. Contended, the caller is enqueued, marked
    /// Waiting and removed from the scheduler; the returned value is what
    /// the caller observes once the handoff resumes it, which is again 1.
    pub fn lock(&mut self, id: usize, sched: &mut Scheduler) -> Option<i64> {
        if !self.valid(id) {
            log::error!("mutex: lock of invalid id {}", id);
            return None;
        }
        let Some(pid) = sched.active_pid() else {
            log::error!("mutex: lock with no active process");
            return None;
        };

        let mutex = &mut self.table[id];
        if mutex.locks == 0 {
            mutex.owner = Some(pid);
            mutex.locks = 1;
        } else {
            mutex.wait_queue.enqueue(pid as usize);
            if let Some(pcb) = sched.procs.get_mut(pid) {
                pcb.state = ProcState::Waiting;
            }
            sched.remove(pid);
        }
        Some(1)
    }

    /// Release the mutex. Unlocking an unheld mutex is a no-op returning
    /// 0. With waiters queued, the head waiter becomes the owner and goes
    /// back on the run queue; otherwise the mutex becomes free.
    pub fn unlock(&mut self, id: usize, sched: &mut Scheduler) -> Option<i64> {
        if !self.valid(id) {
            log::error!("mutex: unlock of invalid id {}", id);
            return None;
        }
        let mutex = &mut self.table[id];
        if mutex.locks == 0 {
            return Some(0);
        }

        match mutex.wait_queue.dequeue() {
            Some(next) => {
                // Direct handoff: ownership moves without the mutex ever
                // appearing free.
                let next = next as Pid;
                mutex.owner = Some(next);
                mutex.locks = 1;
                sched.add(next);
            }
            None => {
                mutex.owner = None;
                mutex.locks = 0;
            }
        }
        Some(mutex.locks as i64)
    }
}

impl Default for MutexPool {
    fn default() -> Self {
        Self::new()
    }
}
