//! 条件变量
//!
//! 与 [`SpinLock`](crate::SpinLock) 配合使用：等待期间释放锁，被唤醒后重新获取锁。
//!
//! ## 唤醒语义
//!
//! - 每个等待者在持锁状态下登记（`waiters += 1`），因此不会丢失唤醒。
//! - `notify_one` 发放一个许可，最多有一个等待者消耗它并返回。
//! - `notify_all` 为当前所有等待者发放许可。
//!
//! 与常见的条件变量一样，调用者必须在循环中重新检查等待条件。

use crate::{arch_ops, SpinLockGuard};
use core::sync::atomic::{AtomicUsize, Ordering};

/// 条件变量
#[derive(Debug, Default)]
pub struct Condvar {
    /// 已登记的等待者数量
    waiters: AtomicUsize,
    /// 尚未被消耗的唤醒许可
    permits: AtomicUsize,
}

impl Condvar {
    /// 创建一个新的条件变量
    pub const fn new() -> Self {
        Self {
            waiters: AtomicUsize::new(0),
            permits: AtomicUsize::new(0),
        }
    }

    /// 释放 `guard` 对应的锁并等待唤醒，返回前重新获取锁。
    pub fn wait<T>(&self, guard: &mut SpinLockGuard<'_, T>) {
        self.waiters.fetch_add(1, Ordering::AcqRel);
        lock_api::MutexGuard::unlocked(guard, || {
            loop {
                let permits = self.permits.load(Ordering::Acquire);
                if permits > 0
                    && self
                        .permits
                        .compare_exchange(permits, permits - 1, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                {
                    break;
                }
                arch_ops().yield_now();
            }
            self.waiters.fetch_sub(1, Ordering::AcqRel);
        });
    }

    /// 唤醒一个等待者（如果有）
    pub fn notify_one(&self) {
        loop {
            let permits = self.permits.load(Ordering::Acquire);
            if permits >= self.waiters.load(Ordering::Acquire) {
                return;
            }
            if self
                .permits
                .compare_exchange(permits, permits + 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return;
            }
        }
    }

    /// 唤醒所有等待者
    pub fn notify_all(&self) {
        let waiters = self.waiters.load(Ordering::Acquire);
        self.permits.fetch_max(waiters, Ordering::AcqRel);
    }

    /// 当前等待者数量
    pub fn waiters(&self) -> usize {
        self.waiters.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SpinLock;
    use std::sync::Arc;
    use std::thread;

    // 没有等待者时 notify 不留下许可
    #[test]
    fn test_notify_without_waiters() {
        crate::test_arch::init();
        let cv = Condvar::new();
        cv.notify_one();
        cv.notify_all();
        assert_eq!(cv.waiters(), 0);
        assert_eq!(cv.permits.load(Ordering::Relaxed), 0);
    }

    // 等待者在条件满足并被唤醒后返回，且重新持有锁
    #[test]
    fn test_wait_and_notify_one() {
        crate::test_arch::init();
        let pair = Arc::new((SpinLock::new(false), Condvar::new()));
        let waiter = {
            let pair = pair.clone();
            thread::spawn(move || {
                let (lock, cv) = &*pair;
                let mut ready = lock.lock();
                while !*ready {
                    cv.wait(&mut ready);
                }
                *ready = false;
            })
        };

        while pair.1.waiters() == 0 {
            thread::yield_now();
        }
        {
            let mut ready = pair.0.lock();
            *ready = true;
            pair.1.notify_one();
        }
        waiter.join().unwrap();
        assert!(!*pair.0.lock());
        assert_eq!(pair.1.waiters(), 0);
    }

    // notify_one 只放行一个等待者
    #[test]
    fn test_notify_one_wakes_single_waiter() {
        crate::test_arch::init();
        let pair = Arc::new((SpinLock::new(0usize), Condvar::new()));
        let spawn_waiter = |pair: Arc<(SpinLock<usize>, Condvar)>| {
            thread::spawn(move || {
                let (lock, cv) = &*pair;
                let mut tokens = lock.lock();
                while *tokens == 0 {
                    cv.wait(&mut tokens);
                }
                *tokens -= 1;
            })
        };
        let a = spawn_waiter(pair.clone());
        let b = spawn_waiter(pair.clone());

        while pair.1.waiters() < 2 {
            thread::yield_now();
        }
        {
            *pair.0.lock() += 1;
            pair.1.notify_one();
        }
        while !(a.is_finished() || b.is_finished()) {
            thread::yield_now();
        }
        assert_eq!(pair.1.waiters(), 1);

        {
            *pair.0.lock() += 1;
            pair.1.notify_all();
        }
        a.join().unwrap();
        b.join().unwrap();
        assert_eq!(*pair.0.lock(), 0);
    }
}
