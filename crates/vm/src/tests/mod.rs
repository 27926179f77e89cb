// Scenario tests for the paging subsystem.
//
// The collaborator traits are implemented here for the `test-support` mocks, so the
// mocks stay free of a dependency on this crate.

use crate::{
    ExecSection, Executable, Machine, MemoryManager, Pid, Ppn, ProcessImage, PteFlags, SwapFile,
    TranslationEntry, VmConfig, Vpn,
};
use alloc::sync::Arc;
use alloc::vec::Vec;
use std::sync::Once;
use test_support::mock::arch::MOCK_ARCH_OPS;
use test_support::mock::machine::{MockMachine, MockTlbEntry};
use test_support::mock::section::MockSection;
use test_support::mock::swap::MockSwapFile;

mod failures;
mod liveness;

impl Machine for MockMachine {
    fn page_size(&self) -> usize {
        MockMachine::page_size(self)
    }

    fn num_phys_pages(&self) -> usize {
        MockMachine::num_phys_pages(self)
    }

    fn tlb_size(&self) -> usize {
        MockMachine::tlb_size(self)
    }

    fn read_tlb_entry(&self, index: usize) -> TranslationEntry {
        from_mock(MockMachine::read_tlb_entry(self, index))
    }

    fn write_tlb_entry(&self, index: usize, entry: TranslationEntry) {
        MockMachine::write_tlb_entry(self, index, to_mock(entry));
    }

    fn read_memory(&self, paddr: usize, buf: &mut [u8]) {
        MockMachine::read_memory(self, paddr, buf);
    }

    fn write_memory(&self, paddr: usize, buf: &[u8]) {
        MockMachine::write_memory(self, paddr, buf);
    }

    fn bad_vaddr(&self) -> usize {
        MockMachine::bad_vaddr(self)
    }
}

impl SwapFile for MockSwapFile {
    fn name(&self) -> &str {
        MockSwapFile::name(self)
    }

    fn read_at(&self, offset: usize, buf: &mut [u8]) -> Result<usize, isize> {
        MockSwapFile::read_at(self, offset, buf)
    }

    fn write_at(&self, offset: usize, buf: &[u8]) -> Result<usize, isize> {
        MockSwapFile::write_at(self, offset, buf)
    }
}

impl ExecSection for MockSection {
    fn name(&self) -> &str {
        self.name
    }

    fn first_vpn(&self) -> usize {
        self.first_vpn
    }

    fn num_pages(&self) -> usize {
        self.num_pages
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn load_page(&self, spn: usize, buf: &mut [u8]) -> Result<(), isize> {
        MockSection::load_page(self, spn, buf)
    }
}

fn from_mock(hw: MockTlbEntry) -> TranslationEntry {
    let mut flags = PteFlags::empty();
    flags.set(PteFlags::VALID, hw.valid);
    flags.set(PteFlags::READ_ONLY, hw.read_only);
    flags.set(PteFlags::USED, hw.used);
    flags.set(PteFlags::DIRTY, hw.dirty);
    TranslationEntry {
        vpn: Vpn::from_usize(hw.vpn),
        ppn: (hw.ppn != usize::MAX).then(|| Ppn::from_usize(hw.ppn)),
        flags,
    }
}

fn to_mock(entry: TranslationEntry) -> MockTlbEntry {
    MockTlbEntry {
        vpn: entry.vpn.as_usize(),
        ppn: entry.ppn.map_or(usize::MAX, Ppn::as_usize),
        valid: entry.is_valid(),
        read_only: entry.is_read_only(),
        used: entry.is_used(),
        dirty: entry.is_dirty(),
    }
}

struct TestArch;

impl sync::ArchOps for TestArch {
    unsafe fn read_and_disable_interrupts(&self) -> usize {
        unsafe { MOCK_ARCH_OPS.read_and_disable_interrupts() }
    }

    unsafe fn restore_interrupts(&self, flags: usize) {
        unsafe { MOCK_ARCH_OPS.restore_interrupts(flags) }
    }

    fn interrupt_enable_mask(&self) -> usize {
        MOCK_ARCH_OPS.interrupt_enable_mask()
    }

    fn yield_now(&self) {
        MOCK_ARCH_OPS.yield_now();
        std::thread::yield_now();
    }
}

static TEST_ARCH: TestArch = TestArch;
static INIT: Once = Once::new();

/// A manager on a mock machine together with handles to the mocks.
pub(crate) struct Harness {
    pub machine: Arc<MockMachine>,
    pub swap: Arc<MockSwapFile>,
    pub manager: Arc<MemoryManager>,
}

impl Harness {
    pub const PAGE: usize = 64;

    pub fn new(frames: usize, tlb_size: usize, stack_pages: usize) -> Self {
        INIT.call_once(|| unsafe { sync::register_arch_ops(&TEST_ARCH) });
        let machine = Arc::new(MockMachine::new(Self::PAGE, frames, tlb_size));
        let swap = Arc::new(MockSwapFile::new("swap"));
        let manager = MemoryManager::new(
            machine.clone(),
            swap.clone(),
            VmConfig::default().with_stack_pages(stack_pages),
        );
        Self {
            machine,
            swap,
            manager,
        }
    }

    /// Registers a process directly with the manager, bypassing argument setup.
    pub fn register(&self, sections: &[Arc<MockSection>]) -> Pid {
        let image = ProcessImage::layout(
            executable(sections),
            &[],
            Self::PAGE,
            self.manager.config().stack_pages,
        )
        .unwrap();
        self.manager.register_process(Arc::new(image))
    }

    pub fn valid(&self, pid: Pid, vpn: usize) -> bool {
        self.manager
            .translation(pid, Vpn::from_usize(vpn))
            .unwrap()
            .is_valid()
    }

    pub fn owner_vpn(&self, ppn: usize) -> Option<usize> {
        self.manager
            .frame_owner(Ppn::from_usize(ppn))
            .map(|owner| owner.vpn.as_usize())
    }
}

pub(crate) fn executable(sections: &[Arc<MockSection>]) -> Executable {
    Executable::new(
        sections
            .iter()
            .map(|s| s.clone() as Arc<dyn ExecSection>)
            .collect::<Vec<_>>(),
        0x10,
    )
}

pub(crate) fn vpn(n: usize) -> Vpn {
    Vpn::from_usize(n)
}

pub(crate) fn page(byte: u8) -> [u8; Harness::PAGE] {
    [byte; Harness::PAGE]
}
