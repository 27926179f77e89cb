use super::*;
use crate::VmResult;
use std::thread::{self, JoinHandle};

fn spawn_fault(h: &Harness, pid: Pid, n: usize) -> JoinHandle<VmResult<Ppn>> {
    let manager = h.manager.clone();
    thread::spawn(move || manager.handle_fault(pid, vpn(n)))
}

fn wait_for_waiters(h: &Harness, n: usize) {
    while h.manager.blocked_waiters() != n {
        thread::yield_now();
    }
}

// With every frame pinned, one unpin lets exactly one blocked fault through.
#[test]
fn test_single_unpin_wakes_single_fault() {
    let h = Harness::new(2, 2, 8);
    let pid = h.register(&[]);
    let first = h.manager.pin(pid, vpn(0)).unwrap();
    h.manager.pin(pid, vpn(1)).unwrap();

    let a = spawn_fault(&h, pid, 2);
    let b = spawn_fault(&h, pid, 3);
    wait_for_waiters(&h, 2);

    h.manager.unpin(pid, vpn(0)).unwrap();
    while !(a.is_finished() || b.is_finished()) {
        thread::yield_now();
    }
    for _ in 0..1000 {
        thread::yield_now();
    }
    assert!(!(a.is_finished() && b.is_finished()));
    assert_eq!(h.manager.blocked_waiters(), 1);
    assert!(!h.valid(pid, 0));
    assert!(h.valid(pid, 1));

    h.manager.unpin(pid, vpn(1)).unwrap();
    let results = [a.join().unwrap(), b.join().unwrap()];
    assert!(results.iter().all(Result::is_ok));
    assert!(results.contains(&Ok(first)));
    assert_eq!(h.manager.blocked_waiters(), 0);
    assert_eq!(h.manager.pinned_frames(), 0);
    assert!(h.manager.registry_consistent());
}

// Pinning a page that is already pinned never waits, even with every frame pinned.
#[test]
fn test_nested_pin_with_all_frames_pinned() {
    let h = Harness::new(2, 2, 8);
    let pid = h.register(&[]);
    let first = h.manager.pin(pid, vpn(0)).unwrap();
    h.manager.pin(pid, vpn(1)).unwrap();
    assert_eq!(h.manager.pinned_frames(), 2);

    assert_eq!(h.manager.pin(pid, vpn(0)), Ok(first));
    assert_eq!(h.manager.pinned_frames(), 2);
    assert_eq!(h.manager.blocked_waiters(), 0);

    h.manager.unpin(pid, vpn(0)).unwrap();
    assert_eq!(h.manager.pinned_frames(), 2);
    h.manager.unpin(pid, vpn(0)).unwrap();
    assert_eq!(h.manager.pinned_frames(), 1);
}

// Releasing a process wakes every waiter, since all of its frames become free at once.
#[test]
fn test_release_wakes_all_waiters() {
    let h = Harness::new(2, 2, 8);
    let holder = h.register(&[]);
    let pid = h.register(&[]);
    h.manager.pin(holder, vpn(0)).unwrap();
    h.manager.pin(holder, vpn(1)).unwrap();

    let a = spawn_fault(&h, pid, 0);
    let b = spawn_fault(&h, pid, 1);
    wait_for_waiters(&h, 2);

    h.manager.release_process(holder);
    assert!(a.join().unwrap().is_ok());
    assert!(b.join().unwrap().is_ok());
    assert_eq!(h.manager.free_frames(), 0);
    assert!(h.valid(pid, 0));
    assert!(h.valid(pid, 1));
    assert!(h.manager.registry_consistent());
}

// Concurrent transfers from several threads keep the shared pool consistent.
#[test]
fn test_concurrent_transfers() {
    let h = Harness::new(3, 4, 6);
    let pids: Vec<Pid> = (0..3).map(|_| h.register(&[])).collect();

    let workers: Vec<_> = pids
        .iter()
        .enumerate()
        .map(|(i, &pid)| {
            let manager = h.manager.clone();
            thread::spawn(move || {
                for round in 0..20usize {
                    let vaddr = (round % 6) * Harness::PAGE + i;
                    let value = (i * 32 + round) as u8;
                    assert_eq!(manager.write_virtual_memory(pid, vaddr, &[value; 8]), 8);
                    let mut back = [0u8; 8];
                    assert_eq!(manager.read_virtual_memory(pid, vaddr, &mut back), 8);
                    assert_eq!(back, [value; 8]);
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    assert_eq!(h.manager.pinned_frames(), 0);
    assert_eq!(h.manager.blocked_waiters(), 0);
    assert!(h.manager.registry_consistent());
}
