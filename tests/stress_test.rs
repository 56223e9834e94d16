//! Large dispatches. Run with `--ignored` on a machine with a device.

use offload_rs::prelude::*;

const KERNEL: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/kernels/vector_ops.wgsl");

fn run_verified(elements: usize, iterations: u32) -> Option<RunOutcome> {
    if let Err(err) = ComputeSession::open(&DeviceRequest::default()) {
        eprintln!("skipping, no compute device: {err}");
        return None;
    }

    let config = Config::builder()
        .element_count(elements)
        .kernel_path(KERNEL)
        .iterations(iterations)
        .seed(5)
        .verify(true)
        .build()
        .unwrap();
    let a = HostArray::random(elements, Some(5));
    let b = HostArray::random(elements, Some(6));

    Some(run(&config, &a, &b).unwrap())
}

#[test]
#[ignore]
fn stress_test_two_dimensional_grid() {
    // More workgroups than fit in one dispatch dimension at a workgroup size of 64.
    let Some(outcome) = run_verified(5_000_000, 1) else {
        return;
    };
    assert_eq!(outcome.verified, Some(true));
}

#[test]
#[ignore]
fn stress_test_repeated_dispatches() {
    let Some(outcome) = run_verified(1 << 20, 50) else {
        return;
    };
    assert_eq!(outcome.timings.count(), 50);
    assert!(outcome.timings.summary().max_ms >= outcome.timings.summary().min_ms);
}

#[test]
#[ignore]
fn stress_test_many_sessions() {
    for _ in 0..20 {
        let Ok(mut session) = ComputeSession::open(&DeviceRequest::default()) else {
            return;
        };
        session.build_program(KERNEL).unwrap();
        session.create_kernel("vector_add").unwrap();
        session.allocate(1 << 16).unwrap();
        // Dropped without an explicit release.
    }
}
