use super::*;
use crate::{
    FAULT_EXIT_STATUS, Initializer, PageTarget, PageType, STACK_GROWTH_CEILING, VmError,
    VmResult, VmType, handle_user_fault,
};
use std::sync::atomic::{AtomicUsize, Ordering};

fn counting_initializer(runs: &Arc<AtomicUsize>) -> Initializer {
    let runs = runs.clone();
    Arc::new(move |_vpn: Vpn, frame: &mut [u8]| -> VmResult<()> {
        runs.fetch_add(1, Ordering::SeqCst);
        frame[0] = 0xab;
        Ok(())
    })
}

#[test]
fn test_lazy_page_initializes_once() {
    let h = Harness::new(4, 4);
    let space = h.space();
    let addr = data_page(0);
    let runs = Arc::new(AtomicUsize::new(0));

    space
        .alloc_page_with_initializer(PageTarget::Anon, addr, true, Some(counting_initializer(&runs)))
        .unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 0);
    assert!(space.translate(addr).is_none());

    space.handle_fault(&user_fault(addr, false)).unwrap();
    space.handle_fault(&user_fault(addr, true)).unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(space.page_type(addr), Some(PageType::Anon));
    assert_eq!(read_user(&space, addr, 2), vec![0xab, 0x00]);
}

#[test]
fn test_failed_initializer_leaves_page_uninit() {
    let h = Harness::new(2, 2);
    let space = h.space();
    let addr = data_page(0);
    let init: Initializer = Arc::new(|_vpn: Vpn, _frame: &mut [u8]| -> VmResult<()> {
        Err(VmError::Io(-5))
    });

    space
        .alloc_page_with_initializer(PageTarget::Anon, addr, true, Some(init))
        .unwrap();
    assert_eq!(
        space.handle_fault(&user_fault(addr, false)),
        Err(VmError::Io(-5))
    );
    assert_eq!(space.page_type(addr), Some(PageType::Uninit(VmType::Anon)));
    assert!(space.translate(addr).is_none());
    assert_eq!(h.pool.available(), 2);
}

#[test]
fn test_write_to_read_only_page_is_rejected() {
    let h = Harness::new(2, 2);
    let space = h.space();
    let addr = data_page(0);
    space.alloc_page(PageTarget::Anon, addr, false).unwrap();

    assert_eq!(
        space.handle_fault(&user_fault(addr, true)),
        Err(VmError::AccessViolation)
    );
    space.handle_fault(&user_fault(addr, false)).unwrap();
    assert!(space.translate(addr).is_some());
}

#[test]
fn test_present_fault_is_rejected() {
    let h = Harness::new(2, 2);
    let space = h.space();
    let addr = data_page(0);
    space.alloc_page(PageTarget::Anon, addr, false).unwrap();
    space.claim_page(addr).unwrap();

    let fault = PageFault {
        cause: FaultCause::USER | FaultCause::WRITE,
        ..user_fault(addr, true)
    };
    assert_eq!(space.handle_fault(&fault), Err(VmError::AccessViolation));
}

#[test]
fn test_null_and_kernel_faults_are_rejected() {
    let h = Harness::new(1, 1);
    let space = h.space();
    let kernel = Vaddr::from_usize(MOCK_VM_CONFIG.user_space_end() + PAGE);

    assert_eq!(
        space.handle_fault(&user_fault(Vaddr::from_usize(0), false)),
        Err(VmError::InvalidAddress)
    );
    assert_eq!(
        space.handle_fault(&user_fault(kernel, false)),
        Err(VmError::InvalidAddress)
    );
}

#[test]
fn test_unmapped_access_is_rejected() {
    let h = Harness::new(1, 1);
    let space = h.space();
    assert_eq!(
        space.handle_fault(&user_fault(data_page(7), false)),
        Err(VmError::AccessViolation)
    );
    assert_eq!(space.page_count(), 0);
}

#[test]
fn test_push_below_stack_pointer_grows_stack() {
    let h = Harness::new(2, 2);
    let space = h.space();
    let sp = stack_top() - PAGE - 0x10;
    let addr = Vaddr::from_usize(sp - 8);
    let fault = PageFault {
        addr,
        cause: FaultCause::USER | FaultCause::WRITE | FaultCause::NOT_PRESENT,
        sp: Vaddr::from_usize(sp),
    };

    space.handle_fault(&fault).unwrap();
    assert_eq!(space.page_type(addr), Some(PageType::Anon));
    assert!(space.translate(addr).is_some());
    assert_eq!(read_user(&space, addr, 8), vec![0; 8]);
}

#[test]
fn test_access_far_below_stack_pointer_is_rejected() {
    let h = Harness::new(2, 2);
    let space = h.space();
    let sp = stack_top() - 0x100;
    let fault = PageFault {
        addr: Vaddr::from_usize(sp - 2 * PAGE),
        cause: FaultCause::USER | FaultCause::NOT_PRESENT,
        sp: Vaddr::from_usize(sp),
    };

    assert_eq!(space.handle_fault(&fault), Err(VmError::AccessViolation));
    assert_eq!(space.page_count(), 0);
}

#[test]
fn test_stack_growth_stops_at_ceiling() {
    let h = Harness::new(2, 2);
    let space = h.space();
    let task = MockTask::new();
    let addr = stack_top() - STACK_GROWTH_CEILING - PAGE;
    let fault = PageFault {
        addr: Vaddr::from_usize(addr),
        cause: FaultCause::USER | FaultCause::WRITE | FaultCause::NOT_PRESENT,
        sp: Vaddr::from_usize(addr + 8),
    };

    assert!(!handle_user_fault(&space, &fault, &task));
    assert_eq!(task.exit_status(), Some(FAULT_EXIT_STATUS));
    assert_eq!(space.page_count(), 0);
}

#[test]
fn test_lowest_page_inside_ceiling_grows() {
    let h = Harness::new(2, 2);
    let space = h.space();
    let addr = stack_top() - STACK_GROWTH_CEILING;
    let fault = PageFault {
        addr: Vaddr::from_usize(addr),
        cause: FaultCause::USER | FaultCause::WRITE | FaultCause::NOT_PRESENT,
        sp: Vaddr::from_usize(addr + 8),
    };

    space.handle_fault(&fault).unwrap();
    assert_eq!(space.page_count(), 1);
}

#[test]
fn test_kernel_fault_uses_recorded_stack_pointer() {
    let h = Harness::new(2, 2);
    let space = h.space();
    let sp = stack_top() - 0x40;
    let fault = PageFault {
        addr: Vaddr::from_usize(sp - 8),
        cause: FaultCause::WRITE | FaultCause::NOT_PRESENT,
        sp: Vaddr::from_usize(usize::MAX - 0xfff),
    };

    // 没有记录过用户栈指针时无法判断栈增长
    assert_eq!(space.handle_fault(&fault), Err(VmError::AccessViolation));

    space.record_user_sp(Vaddr::from_usize(sp));
    space.handle_fault(&fault).unwrap();
    assert_eq!(space.page_type(fault.addr), Some(PageType::Anon));
}

#[test]
fn test_unresolved_user_fault_exits_task() {
    let h = Harness::new(1, 1);
    let space = h.space();
    let task = MockTask::new();

    assert!(!handle_user_fault(&space, &user_fault(data_page(0), false), &task));
    assert_eq!(task.exit_status(), Some(FAULT_EXIT_STATUS));
}

#[test]
fn test_resolved_user_fault_keeps_task_running() {
    let h = Harness::new(1, 1);
    let space = h.space();
    let task = MockTask::new();
    space.alloc_page(PageTarget::Anon, data_page(0), true).unwrap();

    assert!(handle_user_fault(&space, &user_fault(data_page(0), true), &task));
    assert_eq!(task.exit_status(), None);
}
