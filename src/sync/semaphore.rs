/*
 * Kernel Semaphores
 *
 * Counting semaphores with FIFO waiters, drawn from a fixed pool. A wait
 * on a zero count parks the caller on the semaphore's queue and removes
 * it from the scheduler. A post with waiters present transfers the permit
 * to exactly one waiter: the count is incremented and immediately
 * decremented back as the head waiter is rescheduled, so one post wakes
 * one process.
 */

use crate::scheduler::Scheduler;
use crate::scheduler::process::{PROC_MAX, Pid, ProcState};
use crate::utils::queue::IdQueue;

/// Size of the semaphore pool.
pub const SEM_MAX: usize = 16;

pub struct Semaphore {
    allocated: bool,
    count: i32,
    wait_queue: IdQueue<PROC_MAX>,
}

impl Semaphore {
    const fn empty() -> Self {
        Self {
            allocated: false,
            count: 0,
            wait_queue: IdQueue::new(),
        }
    }

    pub fn count(&self) -> i32 {
        self.count
    }

    pub fn waiters(&self) -> usize {
        self.wait_queue.len()
    }
}

/// The semaphore pool plus its id allocator.
pub struct SemaphorePool {
    table: [Semaphore; SEM_MAX],
    allocator: IdQueue<SEM_MAX>,
}

impl SemaphorePool {
    pub fn new() -> Self {
        let mut allocator = IdQueue::new();
        for id in 0..SEM_MAX {
            allocator.enqueue(id);
        }
        Self {
            table: [const { Semaphore::empty() }; SEM_MAX],
            allocator,
        }
    }

    fn valid(&self, id: usize) -> bool {
        id < SEM_MAX && self.table[id].allocated
    }

    pub fn get(&self, id: usize) -> Option<&Semaphore> {
        self.valid(id).then(|| &self.table[id])
    }

    /// Allocate a semaphore with the given initial count. Returns its id.
    pub fn init(&mut self, value: i32) -> Option<usize> {
        if value < 0 {
            log::error!("semaphore: negative initial value {}", value);
            return None;
        }
        let Some(id) = self.allocator.dequeue() else {
            log::error!("semaphore: unable to allocate");
            return None;
        };
        let sem = &mut self.table[id];
        sem.allocated = true;
        sem.count = value;
        sem.wait_queue = IdQueue::new();
        log::trace!("semaphore {} allocated (count {})", id, value);
        Some(id)
    }

    /// Free a semaphore. Fails while processes are waiting on it.
    pub fn destroy(&mut self, id: usize) -> Option<i64> {
        if !self.valid(id) {
            log::error!("semaphore: destroy of invalid id {}", id);
            return None;
        }
        let sem = &mut self.table[id];
        if !sem.wait_queue.is_empty() {
            log::error!("semaphore: destroy of {} with {} waiters", id, sem.wait_queue.len());
            return None;
        }
        sem.allocated = false;
        sem.count = 0;
        self.allocator.enqueue(id);
        Some(0)
    }

    /// Take a permit on behalf of the active process, blocking it when
    /// none is available. The returned value is what the caller observes:
    /// the decremented count, or, for a blocked caller, the count as it
    /// stands after the wakeup handoff.
    pub fn wait(&mut self, id: usize, sched: &mut Scheduler) -> Option<i64> {
        if !self.valid(id) {
            log::error!("semaphore: wait on invalid id {}", id);
            return None;
        }
        let Some(pid) = sched.active_pid() else {
            log::error!("semaphore: wait with no active process");
            return None;
        };

        let sem = &mut self.table[id];
        if sem.count > 0 {
            sem.count -= 1;
            return Some(sem.count as i64);
        }

        sem.wait_queue.enqueue(pid as usize);
        if let Some(pcb) = sched.procs.get_mut(pid) {
            pcb.state = ProcState::Waiting;
        }
        sched.remove(pid);
        // The post that wakes this process transfers the permit directly,
        // leaving the count where it stands now.
        Some(sem.count as i64)
    }

    /// Release a permit. Exactly one waiter (the head of the queue) is
    /// woken per post.
    pub fn post(&mut self, id: usize, sched: &mut Scheduler) -> Option<i64> {
        if !self.valid(id) {
            log::error!("semaphore: post to invalid id {}", id);
            return None;
        }
        let sem = &mut self.table[id];
        sem.count += 1;

        if let Some(next) = sem.wait_queue.dequeue() {
            sched.add(next as Pid);
            sem.count -= 1;
        }
        Some(sem.count as i64)
    }
}

impl Default for SemaphorePool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::process::ProcType;

    fn booted() -> Scheduler {
        let mut sched = Scheduler::new();
        sched.create_process(0x1000, "idle", ProcType::Kernel, 0).unwrap();
        sched.run();
        sched
    }

    fn spawn(sched: &mut Scheduler, name: &str) -> Pid {
        sched.create_process(0x2000, name, ProcType::User, 0).unwrap()
    }

    fn make_active(sched: &mut Scheduler, pid: Pid) {
        while sched.active_pid() != Some(pid) {
            sched.timer_tick();
            sched.run();
        }
    }

    #[test]
    fn wait_decrements_when_permits_available() {
        let mut sched = booted();
        let a = spawn(&mut sched, "a");
        make_active(&mut sched, a);

        let mut pool = SemaphorePool::new();
        let id = pool.init(3).unwrap();
        assert_eq!(pool.wait(id, &mut sched), Some(2));
        assert_eq!(pool.wait(id, &mut sched), Some(1));
        assert_eq!(pool.wait(id, &mut sched), Some(0));
        // A never blocked.
        assert_eq!(sched.active_pid(), Some(a));
    }

    #[test]
    fn wait_on_zero_blocks() {
        let mut sched = booted();
        let a = spawn(&mut sched, "a");
        make_active(&mut sched, a);

        let mut pool = SemaphorePool::new();
        let id = pool.init(0).unwrap();
        assert_eq!(pool.wait(id, &mut sched), Some(0));

        assert_eq!(sched.procs.get(a).unwrap().state, ProcState::Waiting);
        assert_eq!(sched.active_pid(), None);
        assert_eq!(pool.get(id).unwrap().waiters(), 1);
    }

    #[test]
    fn producer_consumer_handoff() {
        let mut sched = booted();
        let consumer = spawn(&mut sched, "consumer");
        let producer = spawn(&mut sched, "producer");

        let mut pool = SemaphorePool::new();
        let id = pool.init(0).unwrap();

        // Consumer waits on an empty semaphore and blocks.
        make_active(&mut sched, consumer);
        pool.wait(id, &mut sched);
        sched.run();

        // One post wakes the consumer; the permit is transferred, so the
        // observed count stays 0.
        make_active(&mut sched, producer);
        assert_eq!(pool.post(id, &mut sched), Some(0));
        assert_eq!(sched.procs.get(consumer).unwrap().state, ProcState::Idle);
        assert_eq!(pool.get(id).unwrap().waiters(), 0);

        // Three more posts with no waiter accumulate.
        assert_eq!(pool.post(id, &mut sched), Some(1));
        assert_eq!(pool.post(id, &mut sched), Some(2));
        assert_eq!(pool.post(id, &mut sched), Some(3));

        // A subsequent wait consumes one.
        assert_eq!(pool.wait(id, &mut sched), Some(2));
    }

    #[test]
    fn waiters_wake_in_fifo_order() {
        let mut sched = booted();
        let a = spawn(&mut sched, "a");
        let b = spawn(&mut sched, "b");
        let c = spawn(&mut sched, "c");

        let mut pool = SemaphorePool::new();
        let id = pool.init(0).unwrap();

        for pid in [a, b, c] {
            make_active(&mut sched, pid);
            pool.wait(id, &mut sched);
            sched.run();
        }
        assert_eq!(pool.get(id).unwrap().waiters(), 3);

        // Each post wakes exactly the next waiter in blocking order.
        pool.post(id, &mut sched);
        assert_eq!(sched.procs.get(a).unwrap().state, ProcState::Idle);
        assert_eq!(sched.procs.get(b).unwrap().state, ProcState::Waiting);

        pool.post(id, &mut sched);
        assert_eq!(sched.procs.get(b).unwrap().state, ProcState::Idle);
        assert_eq!(sched.procs.get(c).unwrap().state, ProcState::Waiting);

        pool.post(id, &mut sched);
        assert_eq!(sched.procs.get(c).unwrap().state, ProcState::Idle);
    }

    #[test]
    fn permit_conservation() {
        let mut sched = booted();
        let a = spawn(&mut sched, "a");
        make_active(&mut sched, a);

        let mut pool = SemaphorePool::new();
        let initial = 2;
        let id = pool.init(initial).unwrap();

        // Interleave posts and non-blocking waits; the books must balance:
        // count = initial + posts - completed waits.
        let mut posts = 0i32;
        let mut waits = 0i32;
        for step in 0..20 {
            if step % 3 == 0 {
                pool.post(id, &mut sched);
                posts += 1;
            } else if pool.get(id).unwrap().count() > 0 {
                pool.wait(id, &mut sched);
                waits += 1;
            }
            assert_eq!(pool.get(id).unwrap().count(), initial + posts - waits);
        }
    }

    #[test]
    fn destroy_with_waiters_fails() {
        let mut sched = booted();
        let a = spawn(&mut sched, "a");
        make_active(&mut sched, a);

        let mut pool = SemaphorePool::new();
        let id = pool.init(0).unwrap();
        pool.wait(id, &mut sched);

        assert_eq!(pool.destroy(id), None);

        // Once the waiter is released, destroy succeeds.
        pool.post(id, &mut sched);
        assert_eq!(pool.destroy(id), Some(0));
        assert_eq!(pool.wait(id, &mut sched), None);
    }

    #[test]
    fn pool_exhaustion_and_invalid_ids() {
        let mut sched = booted();
        let mut pool = SemaphorePool::new();
        for _ in 0..SEM_MAX {
            assert!(pool.init(1).is_some());
        }
        assert!(pool.init(1).is_none());

        assert_eq!(pool.post(SEM_MAX, &mut sched), None);
        assert!(pool.init(-1).is_none());
    }
}
