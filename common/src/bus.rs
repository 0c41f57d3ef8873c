use std::{
    sync::{Mutex, MutexGuard, TryLockError},
    thread,
    time::{Duration, Instant},
};

use crate::error::SensorError;

const RETRY_INTERVAL: Duration = Duration::from_millis(5);

/// Takes a shared bus, giving up after `timeout`. A reader that panicked while
/// holding the bus leaves it poisoned; the lock is still handed out since the
/// bus itself carries no state worth protecting.
pub fn lock_with_timeout<T>(
    bus: &Mutex<T>,
    timeout: Duration,
) -> Result<MutexGuard<'_, T>, SensorError> {
    let deadline = Instant::now() + timeout;
    loop {
        match bus.try_lock() {
            Ok(guard) => return Ok(guard),
            Err(TryLockError::Poisoned(poisoned)) => return Ok(poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => {}
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(SensorError::BusBusy {
                waited_ms: timeout.as_millis().try_into().unwrap_or(u64::MAX),
            });
        }
        thread::sleep(RETRY_INTERVAL.min(deadline - now));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{mpsc, Arc};

    #[test]
    fn free_bus_is_taken_immediately() {
        let bus = Mutex::new(7_u8);
        let guard = lock_with_timeout(&bus, Duration::from_millis(10)).unwrap();
        assert_eq!(*guard, 7);
    }

    #[test]
    fn held_bus_times_out() {
        let bus = Arc::new(Mutex::new(()));
        let (locked_tx, locked_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();

        let holder = {
            let bus = bus.clone();
            thread::spawn(move || {
                let _guard = bus.lock().unwrap();
                locked_tx.send(()).unwrap();
                let _ = release_rx.recv();
            })
        };
        locked_rx.recv().unwrap();

        let started = Instant::now();
        let result = lock_with_timeout(&bus, Duration::from_millis(30));

        assert!(matches!(result, Err(SensorError::BusBusy { waited_ms: 30 })));
        assert!(started.elapsed() >= Duration::from_millis(30));

        release_tx.send(()).unwrap();
        holder.join().unwrap();
        assert!(lock_with_timeout(&bus, Duration::from_millis(30)).is_ok());
    }

    #[test]
    fn poisoned_bus_is_recovered() {
        let bus = Arc::new(Mutex::new(()));
        let poisoner = bus.clone();
        let _ = thread::spawn(move || {
            let _guard = poisoner.lock().unwrap();
            panic!("reader crashed");
        })
        .join();

        assert!(bus.is_poisoned());
        assert!(lock_with_timeout(&bus, Duration::from_millis(10)).is_ok());
    }
}
