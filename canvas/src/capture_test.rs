use std::cell::RefCell;
use std::rc::Rc;

use super::*;

#[derive(Default)]
struct RecordingHost {
    log: RefCell<Vec<String>>,
}

impl CaptureHost for RecordingHost {
    fn capture(&self, pointer: PointerId) {
        self.log.borrow_mut().push(format!("capture {}", pointer.0));
    }

    fn release(&self, pointer: PointerId) {
        self.log.borrow_mut().push(format!("release {}", pointer.0));
    }
}

#[test]
fn acquire_captures_and_drop_releases_once() {
    let host = Rc::new(RecordingHost::default());
    let guard = PointerCapture::acquire(host.clone(), PointerId(7));
    assert_eq!(guard.pointer(), PointerId(7));
    assert_eq!(*host.log.borrow(), vec!["capture 7"]);

    drop(guard);
    assert_eq!(*host.log.borrow(), vec!["capture 7", "release 7"]);
}

#[test]
fn guard_released_when_owner_is_dropped() {
    let host = Rc::new(RecordingHost::default());
    let owner = Some(PointerCapture::acquire(host.clone(), PointerId(1)));
    drop(owner);
    assert_eq!(host.log.borrow().len(), 2);
}

#[test]
fn debug_shows_pointer() {
    let guard = PointerCapture::acquire(Rc::new(NoCapture), PointerId(3));
    assert!(format!("{guard:?}").contains("PointerId(3)"));
}
