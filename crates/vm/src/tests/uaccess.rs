use super::*;
use crate::{PageTarget, VmError};

#[test]
fn test_check_user_addr() {
    let h = Harness::new(2, 2);
    let space = h.space();
    space.alloc_page(PageTarget::Anon, data_page(0), true).unwrap();

    assert_eq!(space.check_user_addr(Vaddr::from_usize(0)), Err(VmError::InvalidAddress));
    assert_eq!(
        space.check_user_addr(Vaddr::from_usize(MOCK_VM_CONFIG.user_space_end())),
        Err(VmError::InvalidAddress)
    );
    assert_eq!(space.check_user_addr(data_page(1)), Err(VmError::InvalidAddress));
    // 已登记但尚未装入的页同样合法
    space.check_user_addr(data_page(0)).unwrap();
    space
        .check_user_addr(Vaddr::from_usize(data_page(0).as_usize() + PAGE - 1))
        .unwrap();
}

#[test]
fn test_copy_straddles_page_boundary() {
    let h = Harness::new(2, 2);
    let space = h.space();
    space.alloc_page(PageTarget::Anon, data_page(0), true).unwrap();
    space.alloc_page(PageTarget::Anon, data_page(1), true).unwrap();
    let addr = Vaddr::from_usize(data_page(1).as_usize() - 4);

    space.copy_to_user(addr, b"abcdefgh").unwrap();
    assert!(space.is_dirty(data_page(0)));
    assert!(space.is_dirty(data_page(1)));
    assert_eq!(read_user(&space, addr, 8), b"abcdefgh".to_vec());
    assert_eq!(read_user(&space, data_page(1), 4), b"efgh".to_vec());
}

#[test]
fn test_copy_into_unmapped_memory_fails() {
    let h = Harness::new(2, 2);
    let space = h.space();
    space.alloc_page(PageTarget::Anon, data_page(0), true).unwrap();
    let addr = Vaddr::from_usize(data_page(1).as_usize() - 2);

    assert_eq!(space.copy_to_user(addr, b"spill"), Err(VmError::AccessViolation));
    let mut buf = [0u8; 4];
    assert_eq!(
        space.copy_from_user(data_page(5), &mut buf),
        Err(VmError::AccessViolation)
    );
}

#[test]
fn test_copy_faults_in_swapped_pages() {
    let h = Harness::new(1, 2);
    let space = h.space();
    space.alloc_page(PageTarget::Anon, data_page(0), true).unwrap();
    space.alloc_page(PageTarget::Anon, data_page(1), true).unwrap();

    space.copy_to_user(data_page(0), b"first").unwrap();
    space.copy_to_user(data_page(1), b"second").unwrap();
    assert!(space.translate(data_page(0)).is_none());
    assert_eq!(read_user(&space, data_page(0), 5), b"first".to_vec());
    assert_eq!(read_user(&space, data_page(1), 6), b"second".to_vec());
}

#[test]
fn test_copy_grows_stack_below_recorded_sp() {
    let h = Harness::new(2, 2);
    let space = h.space();
    let sp = stack_top() - 0x20;
    space.record_user_sp(Vaddr::from_usize(sp));

    space
        .copy_to_user(Vaddr::from_usize(sp - 8), &7usize.to_ne_bytes())
        .unwrap();
    assert_eq!(space.user_sp(), Some(Vaddr::from_usize(sp)));
    assert_eq!(space.page_count(), 1);
}
