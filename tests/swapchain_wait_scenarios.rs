//! Swapchain wait-on-released-image scenario, exercised directly against
//! `render::swapchain::ImageUseCount` (the piece `wait_image` delegates
//! to) since spinning up a full `wgpu::Device` isn't needed to exercise
//! the wait/timeout semantics.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use compositor_core::render::swapchain::{ImageUseCount, WaitResult};

#[test]
fn wait_on_released_image_succeeds_immediately() {
    let use_count = ImageUseCount::new();
    // acquire(0); release(0) leaves use_count at 0.
    assert_eq!(use_count.wait(Duration::from_nanos(0)), WaitResult::Success);
}

#[test]
fn wait_times_out_while_in_use_unless_dec_races_first() {
    let use_count = Arc::new(ImageUseCount::new());
    use_count.inc();

    let waiter = {
        let use_count = use_count.clone();
        thread::spawn(move || use_count.wait(Duration::from_millis(10)))
    };

    assert_eq!(waiter.join().unwrap(), WaitResult::Timeout);
}

#[test]
fn dec_before_deadline_unblocks_a_concurrent_waiter() {
    let use_count = Arc::new(ImageUseCount::new());
    use_count.inc();

    let waiter = {
        let use_count = use_count.clone();
        thread::spawn(move || use_count.wait(Duration::from_secs(2)))
    };

    thread::sleep(Duration::from_millis(20));
    use_count.dec();

    assert_eq!(waiter.join().unwrap(), WaitResult::Success);
}
