// ─────────────────────────────────────────────────────────────────────
// Principia Kernel — Runner Benchmarks
// ─────────────────────────────────────────────────────────────────────
//! Criterion benchmarks for planning, running, and certifying formula
//! graphs of increasing size.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use pm_core::{Certifier, FnFormula, FormulaOutput, ParamRegistry, SimulationRunner};
use pm_types::{ExperimentalBound, KernelConfig, ParamStatus};

/// `n` formulas, each doubling the previous stage: seed → s0 → s1 → …
fn chain(n: usize) -> SimulationRunner {
    let mut runner = SimulationRunner::default();
    for i in 0..n {
        let input = if i == 0 {
            "chain.seed".to_string()
        } else {
            format!("chain.s{}", i - 1)
        };
        let output = format!("chain.s{i}");
        let (read, write) = (input.clone(), output.clone());
        let formula = FnFormula::new(format!("stage_{i}"), [input], [output], move |inputs| {
            Ok(vec![FormulaOutput::derived(
                write.as_str(),
                inputs.get(&read)? * 2.0,
            )])
        });
        runner
            .register(Arc::new(formula))
            .expect("bench formula registers");
    }
    runner
}

/// `n` independent formulas all reading the same seed.
fn fan(n: usize) -> SimulationRunner {
    let mut runner = SimulationRunner::default();
    for i in 0..n {
        let output = format!("fan.p{i}");
        let write = output.clone();
        let formula = FnFormula::new(format!("leaf_{i}"), ["fan.seed"], [output], move |inputs| {
            Ok(vec![FormulaOutput::predicted(
                write.as_str(),
                inputs.get("fan.seed")? + i as f64,
            )])
        });
        runner
            .register(Arc::new(formula))
            .expect("bench formula registers");
    }
    runner
}

fn seeded_registry() -> ParamRegistry {
    let registry = ParamRegistry::new();
    registry
        .set("chain.seed", 1.0, "bench", ParamStatus::Seed)
        .expect("seed chain");
    registry
        .set("fan.seed", 24.0, "bench", ParamStatus::Seed)
        .expect("seed fan");
    registry
}

// ── SimulationRunner.plan() ─────────────────────────────────────────

fn bench_plan_chain_100(c: &mut Criterion) {
    let runner = chain(100);
    c.bench_function("plan_chain_100", |b| b.iter(|| black_box(&runner).plan()));
}

// ── SimulationRunner.run() ──────────────────────────────────────────

fn bench_run_chain_50(c: &mut Criterion) {
    let runner = chain(50);
    let registry = seeded_registry();
    c.bench_function("run_chain_50", |b| {
        b.iter(|| runner.run(black_box(&registry)))
    });
}

fn bench_run_fan_200(c: &mut Criterion) {
    let runner = fan(200);
    let registry = seeded_registry();
    c.bench_function("run_fan_200", |b| b.iter(|| runner.run(black_box(&registry))));
}

// ── Certifier.certify_registry() ────────────────────────────────────

fn bench_certify_200(c: &mut Criterion) {
    let runner = fan(200);
    let registry = seeded_registry();
    runner.run(&registry).expect("fan plan");
    for i in 0..200 {
        let bound = ExperimentalBound::new(24.0 + i as f64, 0.5, "bench");
        registry
            .attach_experimental(&format!("fan.p{i}"), bound)
            .expect("attach bound");
    }
    let certifier = Certifier::new(&registry, KernelConfig::default());
    c.bench_function("certify_registry_200", |b| {
        b.iter(|| certifier.certify_registry(black_box("fan")))
    });
}

criterion_group!(
    benches,
    bench_plan_chain_100,
    bench_run_chain_50,
    bench_run_fan_200,
    bench_certify_200,
);
criterion_main!(benches);
