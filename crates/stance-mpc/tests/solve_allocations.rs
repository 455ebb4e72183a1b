//! Heap traffic of a warmed-up `BalanceMpc::solve`.
//!
//! Lives in its own test binary because it installs a counting global
//! allocator. Only allocations made on the measuring thread are counted.

use std::alloc::{GlobalAlloc, Layout, System};
use std::cell::Cell;

use nalgebra::Vector3;

use stance_core::{BodyState, N_LEGS};
use stance_mpc::{BalanceMpc, MpcConfig, RigidBody};

struct CountingAllocator;

thread_local! {
    static COUNTING: Cell<bool> = const { Cell::new(false) };
    static ALLOCATIONS: Cell<usize> = const { Cell::new(0) };
}

fn record() {
    let _ = COUNTING.try_with(|on| {
        if on.get() {
            let _ = ALLOCATIONS.try_with(|n| n.set(n.get() + 1));
        }
    });
}

unsafe impl GlobalAlloc for CountingAllocator {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        record();
        unsafe { System.alloc(layout) }
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        record();
        unsafe { System.alloc_zeroed(layout) }
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        record();
        unsafe { System.realloc(ptr, layout, new_size) }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        unsafe { System.dealloc(ptr, layout) }
    }
}

#[global_allocator]
static ALLOCATOR: CountingAllocator = CountingAllocator;

fn count_allocations<R>(f: impl FnOnce() -> R) -> (R, usize) {
    ALLOCATIONS.with(|n| n.set(0));
    COUNTING.with(|on| on.set(true));
    let out = f();
    COUNTING.with(|on| on.set(false));
    (out, ALLOCATIONS.with(Cell::get))
}

fn standing_feet() -> [Vector3<f64>; N_LEGS] {
    [
        Vector3::new(0.4535, 0.207, -0.58),
        Vector3::new(0.4535, -0.207, -0.58),
        Vector3::new(-0.4535, 0.207, -0.58),
        Vector3::new(-0.4535, -0.207, -0.58),
    ]
}

#[test]
fn warmed_solve_stays_off_the_heap() {
    let body = BodyState::at_rest(Vector3::new(0.0, 0.0, 0.58));
    let mut mpc = BalanceMpc::new(MpcConfig::default(), &RigidBody::default(), 0.001).unwrap();
    mpc.set_reference(&body, &standing_feet());
    mpc.set_state(&body, &standing_feet());
    for _ in 0..3 {
        mpc.solve().unwrap();
    }

    let mut pushed = body;
    pushed.linear_velocity = Vector3::new(0.2, -0.1, -0.3);
    pushed.angular_velocity = Vector3::new(0.0, 0.4, 0.0);
    mpc.set_state(&pushed, &standing_feet());

    let (solution, allocations) = count_allocations(|| mpc.solve());
    let solution = solution.unwrap();
    assert!(solution.forces.total().z > 0.0);

    // Clarabel rebuilds one nested timer map per call; nothing else may
    // touch the heap.
    assert!(
        allocations <= 8,
        "{allocations} heap allocations in one warmed solve"
    );
}
