//! Lock helpers that recover from poisoning
//!
//! Every critical section in the engine finishes its mutation before any
//! step that can panic, so a poisoned guard still protects consistent data.

use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

pub(crate) fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub(crate) fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_poisoned_mutex_is_recovered() {
        let shared = Arc::new(Mutex::new(5));
        let clone = Arc::clone(&shared);
        let _ = std::thread::spawn(move || {
            let _guard = clone.lock().unwrap();
            panic!("poison the lock");
        })
        .join();

        assert!(shared.is_poisoned());
        assert_eq!(*lock(&shared), 5);
    }

    #[test]
    fn test_rwlock_helpers() {
        let shared = RwLock::new(vec![1, 2]);
        write(&shared).push(3);
        assert_eq!(read(&shared).len(), 3);
    }
}
