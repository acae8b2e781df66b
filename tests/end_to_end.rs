extern crate quern;
extern crate uuid;

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use uuid::Uuid;

use quern::{run_job, HashPartitioner, Job, JobOptions, JobStatus, Map, Record, WordCountMap,
            WordCountReduce};
use quern::data_layer::{DataLayer, LocalDataLayer, MemoryDataLayer};
use quern::emitter::EmitIntermediate;
use quern::errors::Result;
use quern::scheduler::Coordinator;
use quern::worker::run_worker_pool;

fn memory_layer(files: Vec<(&str, &str)>) -> Arc<DataLayer + Send + Sync> {
    let layer = MemoryDataLayer::new();
    for (path, content) in files {
        layer
            .write_file(Path::new(path), content.as_bytes())
            .unwrap();
    }
    Arc::new(layer)
}

fn word_count_options(shards: u64) -> JobOptions {
    JobOptions {
        input_paths: vec!["/input".to_owned()],
        output_directory: "/output".to_owned(),
        reduce_shard_count: shards,
        // Small splits so a single file exercises several map tasks.
        split_size: 8,
        worker_count: 2,
        ..Default::default()
    }
}

fn parse_counts(content: &str) -> HashMap<String, u64> {
    content
        .lines()
        .map(|line| {
            let mut fields = line.splitn(2, '\t');
            let word = fields.next().unwrap().to_owned();
            let count = fields.next().unwrap().parse().unwrap();
            (word, count)
        })
        .collect()
}

fn expected_counts(pairs: Vec<(&str, u64)>) -> HashMap<String, u64> {
    pairs
        .into_iter()
        .map(|(word, count)| (word.to_owned(), count))
        .collect()
}

#[test]
fn word_count_over_one_shard() {
    let layer = memory_layer(vec![
        ("/input/one.txt", "word1 word2\n"),
        ("/input/two.txt", "word2 word3\n"),
    ]);

    let report = run_job(
        word_count_options(1),
        WordCountMap,
        WordCountReduce,
        HashPartitioner::new(1),
        Arc::clone(&layer),
    ).unwrap();

    assert!(report.is_success());
    assert_eq!(vec!["/output/part-r-00000".to_owned()], report.output_files);

    let content =
        String::from_utf8(layer.read_file(Path::new("/output/part-r-00000")).unwrap()).unwrap();
    // One shard means one file, keys ascending.
    assert_eq!("word1\t1\nword2\t2\nword3\t1\n", content);
}

#[test]
fn word_count_shards_partition_the_key_space() {
    let layer = memory_layer(vec![
        ("/input/one.txt", "ant bee cat ant\n"),
        ("/input/two.txt", "dog bee emu fox\n"),
    ]);

    let report = run_job(
        word_count_options(2),
        WordCountMap,
        WordCountReduce,
        HashPartitioner::new(2),
        Arc::clone(&layer),
    ).unwrap();

    assert!(report.is_success());
    assert_eq!(
        vec![
            "/output/part-r-00000".to_owned(),
            "/output/part-r-00001".to_owned(),
        ],
        report.output_files
    );

    let mut combined = HashMap::new();
    for output_file in &report.output_files {
        let content =
            String::from_utf8(layer.read_file(Path::new(output_file)).unwrap()).unwrap();
        for (word, count) in parse_counts(&content) {
            // Each word lives in exactly one shard.
            assert!(combined.insert(word, count).is_none());
        }
    }

    assert_eq!(
        expected_counts(vec![
            ("ant", 2),
            ("bee", 2),
            ("cat", 1),
            ("dog", 1),
            ("emu", 1),
            ("fox", 1),
        ]),
        combined
    );
}

struct FlakyWordCountMap {
    failed_once: AtomicBool,
}

impl Map for FlakyWordCountMap {
    type Key = String;
    type Value = u64;

    fn map<E>(&self, record: Record, emitter: E) -> Result<()>
    where
        E: EmitIntermediate<String, u64>,
    {
        if !self.failed_once.swap(true, Ordering::SeqCst) {
            return Err("transient map failure".into());
        }
        WordCountMap.map(record, emitter)
    }
}

#[test]
fn retried_map_failure_produces_the_same_output_as_a_clean_run() {
    let files = vec![
        ("/input/one.txt", "word1 word2\n"),
        ("/input/two.txt", "word2 word3\n"),
    ];

    let clean_layer = memory_layer(files.clone());
    let clean_report = run_job(
        word_count_options(1),
        WordCountMap,
        WordCountReduce,
        HashPartitioner::new(1),
        Arc::clone(&clean_layer),
    ).unwrap();
    assert!(clean_report.is_success());

    let flaky_layer = memory_layer(files);
    let flaky_report = run_job(
        word_count_options(1),
        FlakyWordCountMap {
            failed_once: AtomicBool::new(false),
        },
        WordCountReduce,
        HashPartitioner::new(1),
        Arc::clone(&flaky_layer),
    ).unwrap();
    assert!(flaky_report.is_success());

    // The retry must neither lose nor duplicate any record's contribution.
    let clean_output = clean_layer
        .read_file(Path::new("/output/part-r-00000"))
        .unwrap();
    let flaky_output = flaky_layer
        .read_file(Path::new("/output/part-r-00000"))
        .unwrap();
    assert_eq!(clean_output, flaky_output);
}

#[test]
fn empty_input_yields_empty_output_files() {
    let layer = memory_layer(vec![("/input/empty.txt", "")]);

    let report = run_job(
        word_count_options(2),
        WordCountMap,
        WordCountReduce,
        HashPartitioner::new(2),
        Arc::clone(&layer),
    ).unwrap();

    assert!(report.is_success());
    assert_eq!(2, report.output_files.len());
    for output_file in &report.output_files {
        assert!(layer.read_file(Path::new(output_file)).unwrap().is_empty());
    }
}

struct CountingSlowMap {
    calls: Arc<AtomicUsize>,
}

impl Map for CountingSlowMap {
    type Key = String;
    type Value = u64;

    fn map<E>(&self, record: Record, emitter: E) -> Result<()>
    where
        E: EmitIntermediate<String, u64>,
    {
        self.calls.fetch_add(1, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(1500));
        WordCountMap.map(record, emitter)
    }
}

#[test]
fn long_map_does_not_trip_the_health_check() {
    let layer = memory_layer(vec![("/input/one.txt", "word\n")]);
    let options = JobOptions {
        input_paths: vec!["/input".to_owned()],
        output_directory: "/output".to_owned(),
        worker_timeout_s: 1,
        worker_count: 1,
        ..Default::default()
    };
    let calls = Arc::new(AtomicUsize::new(0));

    let report = run_job(
        options,
        CountingSlowMap {
            calls: Arc::clone(&calls),
        },
        WordCountReduce,
        HashPartitioner::new(1),
        Arc::clone(&layer),
    ).unwrap();

    assert!(report.is_success());
    // The busy worker kept heartbeating, so its one record was mapped exactly once:
    // no spurious timeout, no retried attempt.
    assert_eq!(1, calls.load(Ordering::SeqCst));
}

struct SlowWordCountMap {
    started: Arc<AtomicBool>,
}

impl Map for SlowWordCountMap {
    type Key = String;
    type Value = u64;

    fn map<E>(&self, record: Record, emitter: E) -> Result<()>
    where
        E: EmitIntermediate<String, u64>,
    {
        self.started.store(true, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(10));
        WordCountMap.map(record, emitter)
    }
}

#[test]
fn cancellation_abandons_in_flight_work() {
    let mut lines = String::new();
    for i in 0..30 {
        lines.push_str(&format!("line number {}\n", i));
    }
    let layer = memory_layer(vec![("/input/lines.txt", lines.as_str())]);

    let job = Job::new(JobOptions {
        input_paths: vec!["/input".to_owned()],
        output_directory: "/output".to_owned(),
        reduce_shard_count: 1,
        split_size: 32,
        worker_count: 1,
        ..Default::default()
    });
    let coordinator = Arc::new(Coordinator::new(job, Arc::clone(&layer)).unwrap());

    let started = Arc::new(AtomicBool::new(false));
    let handles = run_worker_pool(
        Arc::clone(&coordinator),
        Arc::new(SlowWordCountMap {
            started: Arc::clone(&started),
        }),
        Arc::new(WordCountReduce),
        Arc::new(HashPartitioner::new(1)),
        Arc::clone(&layer),
        1,
    );

    while !started.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(1));
    }
    coordinator.cancel_job();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(JobStatus::Cancelled, coordinator.job_status());
    assert!(!layer.exists(Path::new("/output/part-r-00000")).unwrap());
}

#[test]
fn missing_input_path_fails_the_job_submission() {
    let layer = memory_layer(vec![]);

    let result = run_job(
        word_count_options(1),
        WordCountMap,
        WordCountReduce,
        HashPartitioner::new(1),
        layer,
    );

    assert!(result.is_err());
}

#[test]
fn word_count_on_the_local_filesystem() {
    let root = Path::new("/tmp").join("quern").join(Uuid::new_v4().to_string());
    fs::create_dir_all(root.join("input")).unwrap();
    fs::write(
        root.join("input").join("lines.txt"),
        "the quick brown fox\nThe quick red fox\n",
    ).unwrap();

    let layer: Arc<DataLayer + Send + Sync> = Arc::new(LocalDataLayer::new(&root));
    let options = JobOptions {
        input_paths: vec!["input".to_owned()],
        output_directory: "output".to_owned(),
        ..Default::default()
    };

    let report = run_job(
        options,
        WordCountMap,
        WordCountReduce,
        HashPartitioner::new(1),
        layer,
    ).unwrap();

    assert!(report.is_success());
    let content = fs::read_to_string(root.join("output").join("part-r-00000")).unwrap();
    assert_eq!(
        expected_counts(vec![
            ("the", 2),
            ("quick", 2),
            ("brown", 1),
            ("red", 1),
            ("fox", 2),
        ]),
        parse_counts(&content)
    );

    fs::remove_dir_all(&root).unwrap();
}
