//! The configuration is process-wide, so it gets a test binary of its own.

use synch::{
    KernelError,
    config::{self, SynchConfig, SynchConfigBuilder, TraceFlags},
    sync::{ConditionVariable, Lock, RwLock, Semaphore},
};

#[test]
fn install_once() {
    assert_eq!(
        SynchConfigBuilder::new().reader_admission_cap(0).build(),
        Err(KernelError::InvalidArgument)
    );

    SynchConfigBuilder::new()
        .reader_admission_cap(4)
        .trace(TraceFlags::all())
        .install()
        .unwrap();
    assert_eq!(
        config::current(),
        &SynchConfig {
            reader_admission_cap: 4,
            trace: TraceFlags::all(),
        }
    );
    assert_eq!(config::install(SynchConfig::default()), Err(KernelError::Busy));
    assert_eq!(config::current().reader_admission_cap, 4);

    let rwlock = RwLock::new("configured").unwrap();
    assert_eq!(rwlock.admission_cap(), 4);
    assert_eq!(RwLock::with_admission_cap("explicit", 7).unwrap().admission_cap(), 7);

    // Every traced path runs with tracing switched on.
    rwlock.acquire_read();
    rwlock.release_read();
    rwlock.acquire_write();
    rwlock.release_write();

    let sema = Semaphore::new("traced", 1).unwrap();
    sema.wait();
    sema.signal();

    let lock = Lock::new("traced").unwrap();
    let cv = ConditionVariable::new("traced").unwrap();
    lock.acquire();
    cv.signal(&lock);
    cv.broadcast(&lock);
    lock.release();
}
