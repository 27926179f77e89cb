use super::*;
use crate::{AddressSpace, VmError, VmProcess};

// A failed write-back leaves the victim mapped and its frame owned by it.
#[test]
fn test_swap_write_failure_keeps_victim() {
    let h = Harness::new(1, 2, 3);
    let p = VmProcess::load(h.manager.clone(), executable(&[]), &[]).unwrap();
    let pid = p.pid();
    assert_eq!(p.write_virtual_memory(0, &[3; 16]), 16);

    h.swap.set_fail_writes(true);
    let err = p.handle_fault(vpn(1)).unwrap_err();
    assert_eq!(err, VmError::BackingStore { slot: 0 });
    assert!(err.is_fatal_to_process());
    assert!(h.valid(pid, 0));
    assert!(!h.valid(pid, 1));
    assert_eq!(h.owner_vpn(0), Some(0));
    assert_eq!(h.manager.free_frames(), 0);
    assert_eq!(h.manager.swap_slots_allocated(), 0);
    assert!(h.manager.registry_consistent());

    h.swap.set_fail_writes(false);
    p.handle_fault(vpn(1)).unwrap();
    assert_eq!(h.manager.swap_slot(pid, vpn(0)), Some(0));
    let mut buf = [0u8; 16];
    assert_eq!(p.read_virtual_memory(0, &mut buf), 16);
    assert_eq!(buf, [3; 16]);
}

// A failed swap-in returns the frame to the free list.
#[test]
fn test_swap_read_failure_releases_frame() {
    let h = Harness::new(1, 2, 3);
    let p = VmProcess::load(h.manager.clone(), executable(&[]), &[]).unwrap();
    let pid = p.pid();
    assert_eq!(p.write_virtual_memory(0, &[3; 16]), 16);
    p.handle_fault(vpn(1)).unwrap();

    h.swap.set_fail_reads(true);
    assert_eq!(
        p.handle_fault(vpn(0)),
        Err(VmError::BackingStore { slot: 0 })
    );
    assert!(!h.valid(pid, 0));
    assert!(!h.valid(pid, 1));
    assert_eq!(h.manager.free_frames(), 1);
    assert_eq!(h.manager.frame_owner(Ppn::from_usize(0)), None);
    assert!(h.manager.registry_consistent());

    // transfers stop instead of failing the caller
    let mut buf = [0u8; 16];
    assert_eq!(p.read_virtual_memory(0, &mut buf), 0);

    h.swap.set_fail_reads(false);
    assert_eq!(p.read_virtual_memory(0, &mut buf), 16);
    assert_eq!(buf, [3; 16]);
}

#[test]
fn test_section_load_failure() {
    let h = Harness::new(2, 2, 1);
    let text = Arc::new(MockSection::new(".text", 0, 1, true, 0x10));
    let p = VmProcess::load(h.manager.clone(), executable(&[text.clone()]), &[]).unwrap();

    text.set_fail(true);
    let err = p.handle_fault(vpn(0)).unwrap_err();
    assert_eq!(err, VmError::SectionLoad { vpn: vpn(0) });
    assert!(err.is_fatal_to_process());
    assert_eq!(h.manager.free_frames(), 2);
    assert!(h.manager.registry_consistent());

    text.set_fail(false);
    assert!(p.handle_fault(vpn(0)).is_ok());
}

#[test]
fn test_address_fault_out_of_range() {
    let h = Harness::new(2, 2, 3);
    let pid = h.register(&[]);
    assert_eq!(
        h.manager.handle_fault(pid, vpn(4)),
        Err(VmError::AddressFault { vpn: vpn(4) })
    );
    assert_eq!(
        h.manager.pin(pid, vpn(9)),
        Err(VmError::AddressFault { vpn: vpn(9) })
    );
    assert!(h.manager.translation(pid, vpn(4)).is_err());
    assert_eq!(h.manager.pinned_frames(), 0);
    assert_eq!(h.manager.free_frames(), 2);
}

#[test]
fn test_unknown_process() {
    let h = Harness::new(2, 2, 3);
    let ghost = Pid::from_usize(99);
    assert_eq!(
        h.manager.handle_fault(ghost, vpn(0)),
        Err(VmError::UnknownProcess(ghost))
    );
    assert_eq!(h.manager.read_virtual_memory(ghost, 0, &mut [0u8; 4]), 0);
    assert!(!VmError::UnknownProcess(ghost).is_fatal_to_process());
}

// Transfers copy what they can and report the byte count at the first bad page.
#[test]
fn test_transfer_stops_at_end_of_address_space() {
    let h = Harness::new(2, 2, 3);
    let p = VmProcess::load(h.manager.clone(), executable(&[]), &[]).unwrap();
    let end = 4 * Harness::PAGE;
    assert_eq!(p.write_virtual_memory(end - 10, &[1; 32]), 10);
    let mut buf = [0u8; 32];
    assert_eq!(p.read_virtual_memory(end - 10, &mut buf), 10);
    assert_eq!(&buf[..10], &[1; 10]);
    assert_eq!(p.read_virtual_memory(usize::MAX - 1, &mut buf), 0);
    assert_eq!(h.manager.pinned_frames(), 0);
}
