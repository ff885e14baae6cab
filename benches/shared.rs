#![allow(dead_code)]

//! Shared utilities for benchmarks in Sjoin.
//!
//! This module provides the benchmark parameters, seeded dataset generators,
//! and the Criterion configuration used by all benchmark groups.

use criterion::Criterion;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sjoin::geometry::Vertex;
use sjoin::objects::SpatialObject;
use tracing::info;

//
// Benchmark Parameters
//
pub const BENCH_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);
pub const BENCH_DATASET_SIZE: usize = 2000;
pub const BENCH_EXTENT: f32 = 50.0;
pub const BENCH_EPSILON: f64 = 0.5;

//
// Data Generation
//
pub fn generate_points(n: usize, seed: u64) -> Vec<SpatialObject> {
    info!("Generating {n} benchmark points");
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| {
            SpatialObject::Point(Vertex::new(
                rng.gen_range(0.0..BENCH_EXTENT),
                rng.gen_range(0.0..BENCH_EXTENT),
                rng.gen_range(0.0..BENCH_EXTENT),
            ))
        })
        .collect()
}

// Configure Criterion with a timeout for benchmarks
pub fn configure_criterion() -> Criterion {
    Criterion::default().measurement_time(BENCH_TIMEOUT)
}
