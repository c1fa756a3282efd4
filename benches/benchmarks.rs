//! Performance benchmarks for Repowhisper.
//!
//! Covers the per-cycle bookkeeping of the workflow engine (routing and
//! validation) and the repository extraction that feeds the analyze step.
//!
//! Run with: `cargo bench`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use repowhisper::repo::{self, Dependencies, RepoStructure, SampleOptions};
use repowhisper::workflow::{
    route, DecisionEntry, RepoAnalysis, RunState, StepName, ValidationRecord, Validator, Verdict,
};

// ============================================================================
// Fixtures
// ============================================================================

mod fixtures {
    use super::*;

    /// Decision log alternating analyze/draft entries.
    pub fn decisions(len: usize) -> Vec<DecisionEntry> {
        (0..len)
            .map(|i| {
                let step = if i % 2 == 0 { StepName::Analyze } else { StepName::Draft };
                DecisionEntry::by_step(step, format!("decision {i}"))
            })
            .collect()
    }

    /// State right after an analyze step that filled every slot.
    pub fn analyzed_state() -> RunState {
        let mut state = RunState::new("https://example.com/acme/widget", "/tmp/widget");
        state.begin_step(StepName::Analyze);
        state.structure = Some(RepoStructure::default());
        state.dependencies = Some(Dependencies::new());
        state.analysis = Some(RepoAnalysis::default());
        state
    }

    /// Repository tree with `num_files` source files spread over a few directories.
    pub fn repo_tree(root: &std::path::Path, num_files: usize) {
        for i in 0..num_files {
            let dir = root.join(format!("src/module_{}", i % 10));
            std::fs::create_dir_all(&dir).expect("Failed to create dir");
            std::fs::write(dir.join(format!("file_{i}.rs")), format!("pub fn f{i}() {{}}\n"))
                .expect("Failed to write file");
        }
        std::fs::write(root.join("Cargo.toml"), "[dependencies]\nserde = \"1\"\ntokio = \"1\"\n")
            .expect("Failed to write Cargo.toml");
    }
}

// ============================================================================
// Workflow Benchmarks
// ============================================================================

fn bench_route(c: &mut Criterion) {
    let mut group = c.benchmark_group("workflow/route");
    let redo = ValidationRecord {
        decision: Verdict::Redo,
        step: Some(StepName::Draft),
        issues: vec!["missing required output: document".to_string()],
        suggestions: Vec::new(),
    };

    for len in [1, 50, 500] {
        let decisions = fixtures::decisions(len);
        group.throughput(Throughput::Elements(len as u64));
        group.bench_with_input(BenchmarkId::new("redo", len), &decisions, |b, decisions| {
            b.iter(|| route(black_box(decisions), black_box(Some(&redo))));
        });
    }

    group.finish();
}

fn bench_validate(c: &mut Criterion) {
    let validator = Validator::default();
    let state = fixtures::analyzed_state();

    c.bench_function("workflow/validate", |b| {
        b.iter(|| validator.validate(black_box(&state)));
    });
}

// ============================================================================
// Extraction Benchmarks
// ============================================================================

fn bench_extraction(c: &mut Criterion) {
    let mut group = c.benchmark_group("repo/extraction");
    let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let ignore = repowhisper::core::AnalysisConfig::default().ignore_dirs;

    for num_files in [10, 100, 500] {
        let root = temp_dir.path().join(format!("repo_{num_files}"));
        fixtures::repo_tree(&root, num_files);

        group.throughput(Throughput::Elements(num_files as u64));
        group.bench_with_input(BenchmarkId::new("build_structure", num_files), &root, |b, root| {
            b.iter(|| repo::build_structure(black_box(root), &ignore));
        });
        group.bench_with_input(BenchmarkId::new("sample_files", num_files), &root, |b, root| {
            b.iter(|| repo::sample_files(black_box(root), &ignore, SampleOptions::default()));
        });
    }

    group.finish();
}

criterion_group!(workflow_benches, bench_route, bench_validate,);

criterion_group!(extraction_benches, bench_extraction,);

criterion_main!(workflow_benches, extraction_benches,);
