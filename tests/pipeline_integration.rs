// tests/pipeline_integration.rs
//
// End-to-end runs of the dispatch pipeline with real `sh` jobs.

#![cfg(unix)]

use std::cell::Cell;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

use rand::Rng;

use ferrous_lastz::PipelineError;
use ferrous_lastz::pipeline::{
    MergeOrder, Orchestrator, PipelineConfig, RunState, RunSummary, WorkItem,
};

fn fast_config(threads: usize) -> PipelineConfig {
    let mut config = PipelineConfig::with_threads(threads).with_throttle(Duration::ZERO);
    config.poll_interval = Duration::from_millis(5);
    config
}

// Job that sleeps for `delay_ms` and then writes `body` to its own output
fn job(dir: &Path, name: &str, body: &str, delay_ms: u64) -> WorkItem {
    let out = dir.join(format!("{name}.out"));
    let command = format!(
        "sleep {}; printf '{}' > '{}'",
        delay_ms as f64 / 1000.0,
        body,
        out.display()
    );
    WorkItem::new(command, &out).with_cleanup([out.clone()])
}

fn failing_job(dir: &Path, name: &str) -> WorkItem {
    let out = dir.join(format!("{name}.out"));
    // Output file exists before the job runs, as partitioned jobs' do
    fs::write(&out, b"").unwrap();
    WorkItem::new("sleep 0.1; echo 'error: bad seed' >&2", &out).with_cleanup([out.clone()])
}

// Job that leaves a marker behind if it is ever executed
fn marker_job(dir: &Path, i: usize) -> WorkItem {
    let marker = dir.join(format!("ran-{i}"));
    let out = dir.join(format!("marker-{i}.out"));
    fs::write(&out, b"").unwrap();
    WorkItem::new(format!("touch '{}'", marker.display()), &out).with_cleanup([out.clone()])
}

fn run(
    config: PipelineConfig,
    merged: &Path,
    items: Vec<WorkItem>,
) -> (Orchestrator, Result<RunSummary, PipelineError>) {
    let mut orch = Orchestrator::new(config);
    let result = orch.run(
        Box::new(fs::File::create(merged).unwrap()),
        items.into_iter().map(Ok),
    );
    (orch, result)
}

// Merged text must be whole partials from `allowed`, none repeated
fn assert_whole_partials(text: &str, allowed: &[&str]) {
    assert!(text.is_empty() || text.ends_with('\n'), "fragment in {text:?}");
    let lines: Vec<&str> = text.lines().collect();
    for line in &lines {
        assert!(allowed.contains(line), "unexpected partial {line:?} in {text:?}");
        assert_eq!(lines.iter().filter(|&&l| l == *line).count(), 1, "{line:?} merged twice");
    }
}

fn bad_seed_scenario(dir: &Path) -> Vec<WorkItem> {
    vec![
        job(dir, "a", "A\\n", 0),
        job(dir, "b", "B\\n", 0),
        failing_job(dir, "c"),
        job(dir, "d", "D\\n", 0),
    ]
}

fn leftovers(paths: &[PathBuf]) -> usize {
    paths.iter().filter(|p| p.exists()).count()
}

#[test]
fn test_out_of_order_completion_merges_every_partial() {
    let dir = tempfile::tempdir().unwrap();
    let merged = dir.path().join("merged.sam");
    let mut rng = rand::thread_rng();

    let bodies: Vec<String> = (0..16).map(|i| format!("job{i:02}-line\\n")).collect();
    let items: Vec<WorkItem> = bodies
        .iter()
        .enumerate()
        .map(|(i, body)| job(dir.path(), &format!("j{i}"), body, rng.gen_range(0..40)))
        .collect();
    let outputs: Vec<PathBuf> = items.iter().map(|i| i.output().to_path_buf()).collect();

    let (orch, result) = run(fast_config(4), &merged, items);
    let summary = result.unwrap();

    assert_eq!(orch.state(), RunState::Done);
    assert_eq!(summary.submitted, 16);
    assert_eq!(summary.combined, 16);

    let text = fs::read_to_string(&merged).unwrap();
    let expected_len: usize = bodies.iter().map(|b| b.len() - 1).sum();
    assert_eq!(text.len(), expected_len);
    assert_eq!(summary.bytes_written as usize, expected_len);
    for i in 0..16 {
        assert_eq!(text.matches(&format!("job{i:02}-line\n")).count(), 1);
    }
    assert_eq!(leftovers(&outputs), 0);
}

#[test]
fn test_diagnostic_output_fails_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let merged = dir.path().join("merged.sam");
    let items = bad_seed_scenario(dir.path());

    let (orch, result) = run(fast_config(2), &merged, items);

    match result {
        Err(err @ PipelineError::Execution { .. }) => assert_eq!(err.to_string(), "error: bad seed"),
        other => panic!("expected an execution failure, got {other:?}"),
    }
    assert_eq!(orch.state(), RunState::Aborted);
    assert_whole_partials(&fs::read_to_string(&merged).unwrap(), &["A", "B", "D"]);
}

#[test]
fn test_diagnostic_output_fails_the_run_in_submission_order() {
    let dir = tempfile::tempdir().unwrap();
    let merged = dir.path().join("merged.sam");
    let mut config = fast_config(2);
    config.merge_order = MergeOrder::Submission;
    let items = bad_seed_scenario(dir.path());

    let (_, result) = run(config, &merged, items);

    assert!(matches!(result, Err(PipelineError::Execution { .. })));
    // Nothing after the failed index may be merged
    let text = fs::read_to_string(&merged).unwrap();
    assert!(["", "A\n", "A\nB\n"].contains(&text.as_str()), "merged {text:?}");
}

#[test]
fn test_buffered_items_are_not_merged_after_a_failure() {
    let dir = tempfile::tempdir().unwrap();
    let merged = dir.path().join("merged.sam");
    let mut config = fast_config(2);
    config.merge_order = MergeOrder::Submission;
    let slow_failure = {
        let out = dir.path().join("slow.out");
        fs::write(&out, b"").unwrap();
        WorkItem::new("sleep 0.5; echo 'error: bad seed' >&2", &out).with_cleanup([out.clone()])
    };
    let late = job(dir.path(), "late", "LATE", 0);
    let late_output = late.output().to_path_buf();

    let (_, result) = run(config, &merged, vec![slow_failure, late]);

    assert!(matches!(result, Err(PipelineError::Execution { .. })));
    assert_eq!(fs::read_to_string(&merged).unwrap(), "");
    assert!(!late_output.exists(), "buffered temporaries are swept");
}

#[test]
fn test_nothing_new_starts_after_a_failure() {
    let dir = tempfile::tempdir().unwrap();
    let merged = dir.path().join("merged.sam");

    let mut config = fast_config(1);
    config.execution.capacity = Some(1);

    let pulled = Rc::new(Cell::new(0usize));
    let counter = Rc::clone(&pulled);
    let root = dir.path().to_path_buf();
    let items = (0..10).map(move |i| {
        counter.set(counter.get() + 1);
        Ok(if i == 0 {
            failing_job(&root, "first")
        } else {
            marker_job(&root, i)
        })
    });

    let mut orch = Orchestrator::new(config);
    let result = orch.run(Box::new(fs::File::create(&merged).unwrap()), items);

    assert!(matches!(result, Err(PipelineError::Execution { .. })));
    let ran = (1..10).filter(|i| dir.path().join(format!("ran-{i}")).exists()).count();
    assert_eq!(ran, 0);
    // The producer stops once the queue closes; at most one item queued and
    // one blocked in the put.
    assert!(pulled.get() <= 3, "pulled {} items", pulled.get());
}

#[test]
fn test_abort_sweeps_unmerged_temporaries() {
    let dir = tempfile::tempdir().unwrap();
    let merged = dir.path().join("merged.sam");

    let mut config = fast_config(1);
    config.execution.capacity = Some(8);
    let mut items = vec![failing_job(dir.path(), "first")];
    items.extend((1..5).map(|i| marker_job(dir.path(), i)));
    let temps: Vec<PathBuf> = items.iter().flat_map(|i| i.cleanup().to_vec()).collect();
    assert_eq!(leftovers(&temps), temps.len());

    let (_, result) = run(config, &merged, items);

    assert!(result.is_err());
    assert_eq!(leftovers(&temps), 0);
}

#[test]
fn test_keeping_orphans_leaves_unmerged_temporaries() {
    let dir = tempfile::tempdir().unwrap();
    let merged = dir.path().join("merged.sam");

    let mut config = fast_config(1);
    config.sweep_on_abort = false;
    let failed = failing_job(dir.path(), "first");
    let failed_output = failed.output().to_path_buf();

    let (_, result) = run(config, &merged, vec![failed, marker_job(dir.path(), 1)]);

    assert!(result.is_err());
    assert!(failed_output.exists());
}

#[test]
fn test_submission_order_despite_reverse_completion() {
    let dir = tempfile::tempdir().unwrap();
    let merged = dir.path().join("merged.sam");

    let mut config = fast_config(4);
    config.merge_order = MergeOrder::Submission;
    // Earlier jobs take longer, so they finish last
    let items: Vec<WorkItem> = (0..4)
        .map(|i| job(dir.path(), &format!("s{i}"), &format!("{i}\\n"), (3 - i) * 60))
        .collect();

    let (_, result) = run(config, &merged, items);

    assert_eq!(result.unwrap().combined, 4);
    assert_eq!(fs::read_to_string(&merged).unwrap(), "0\n1\n2\n3\n");
}

#[test]
fn test_parallel_combine_keeps_partials_whole() {
    let dir = tempfile::tempdir().unwrap();
    let merged = dir.path().join("merged.sam");

    let mut config = fast_config(3);
    config.combine.workers = 2;
    let items: Vec<WorkItem> = (0..6)
        .map(|i| job(dir.path(), &format!("p{i}"), &format!("p{i}a\\np{i}b\\np{i}c\\n"), 0))
        .collect();

    let (_, result) = run(config, &merged, items);
    assert_eq!(result.unwrap().combined, 6);

    let text = fs::read_to_string(&merged).unwrap();
    for i in 0..6 {
        assert!(text.contains(&format!("p{i}a\np{i}b\np{i}c\n")));
    }
}
