/*
 * Synchronization Primitives
 *
 * Fixed pools of kernel mutexes and counting semaphores, reached from the
 * system call layer. Both primitives block by parking the calling process
 * on the object's wait queue and removing it from the scheduler; the
 * matching unlock/post puts the head waiter back on the run queue.
 */

pub mod mutex;
pub mod semaphore;

use spin::Mutex as SpinMutex;

pub use mutex::{MUTEX_MAX, MutexPool};
pub use semaphore::{SEM_MAX, SemaphorePool};

static MUTEXES: SpinMutex<Option<MutexPool>> = SpinMutex::new(None);
static SEMAPHORES: SpinMutex<Option<SemaphorePool>> = SpinMutex::new(None);

/// Initialize both pools.
pub fn init() {
    log::info!("sync: initializing {} mutexes, {} semaphores", MUTEX_MAX, SEM_MAX);
    *MUTEXES.lock() = Some(MutexPool::new());
    *SEMAPHORES.lock() = Some(SemaphorePool::new());
}

/// Run `f` with the mutex pool. Panics before init.
pub fn with_mutexes<R>(f: impl FnOnce(&mut MutexPool) -> R) -> R {
    let mut guard = MUTEXES.lock();
    let pool = guard.as_mut().expect("mutex pool not initialized");
    f(pool)
}

/// Run `f` with the semaphore pool. Panics before init.
pub fn with_semaphores<R>(f: impl FnOnce(&mut SemaphorePool) -> R) -> R {
    let mut guard = SEMAPHORES.lock();
    let pool = guard.as_mut().expect("semaphore pool not initialized");
    f(pool)
}
