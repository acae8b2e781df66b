use chrono::prelude::*;
use uuid::Uuid;

use reader::DEFAULT_RECORD_DELIMITER;

const DEFAULT_SPLIT_SIZE: u64 = 64 * 1000 * 1000;
const DEFAULT_SPILL_THRESHOLD: usize = 100_000;
const DEFAULT_MAX_TASK_FAILURES: u16 = 3;
const DEFAULT_WORKER_COUNT: usize = 4;
const DEFAULT_WORKER_TIMEOUT_S: i64 = 60;

/// `JobOptions` stores the parameters of one engine invocation.
#[derive(Clone, Debug)]
pub struct JobOptions {
    /// The input files (or directories of input files) to be read by the job.
    pub input_paths: Vec<String>,
    /// The directory the `part-r-000NN` output files are written to.
    pub output_directory: String,
    /// Scratch space for intermediate spill runs. Derived from `output_directory`
    /// when empty.
    pub scratch_directory: String,

    /// The number of reduce shards the key space is partitioned into.
    pub reduce_shard_count: u64,
    /// The maximum byte length of one map split.
    pub split_size: u64,
    /// Buffered intermediate pairs above which a map task spills a sorted run.
    pub spill_threshold: usize,
    /// Failures after which a task, and with it the job, is failed for good.
    pub max_task_failures: u16,

    /// Worker threads executing tasks.
    pub worker_count: usize,
    /// Seconds of heartbeat silence before a worker is considered lost.
    pub worker_timeout_s: i64,

    /// Record delimiter byte for the input, newline unless configured otherwise.
    pub record_delimiter: u8,
    /// Separator between key and value on each output line.
    pub output_delimiter: char,
}

impl Default for JobOptions {
    fn default() -> Self {
        JobOptions {
            input_paths: Vec::new(),
            output_directory: String::new(),
            scratch_directory: String::new(),

            reduce_shard_count: 1,
            split_size: DEFAULT_SPLIT_SIZE,
            spill_threshold: DEFAULT_SPILL_THRESHOLD,
            max_task_failures: DEFAULT_MAX_TASK_FAILURES,

            worker_count: DEFAULT_WORKER_COUNT,
            worker_timeout_s: DEFAULT_WORKER_TIMEOUT_S,

            record_delimiter: DEFAULT_RECORD_DELIMITER,
            output_delimiter: '\t',
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum JobStatus {
    Queued,
    InProgress,
    Done,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        match *self {
            JobStatus::Done | JobStatus::Failed | JobStatus::Cancelled => true,
            JobStatus::Queued | JobStatus::InProgress => false,
        }
    }
}

/// A `Job` is the aggregate of all map and reduce tasks for one invocation.
#[derive(Clone, Debug)]
pub struct Job {
    pub id: String,
    pub options: JobOptions,
    pub status: JobStatus,

    pub time_requested: DateTime<Utc>,
    pub time_started: Option<DateTime<Utc>>,
    pub time_completed: Option<DateTime<Utc>>,

    pub failure_details: Option<String>,
}

impl Job {
    pub fn new(mut options: JobOptions) -> Self {
        if options.scratch_directory.is_empty() {
            options.scratch_directory =
                format!("{}/_scratch", options.output_directory.trim_end_matches('/'));
        }

        Job {
            id: Uuid::new_v4().to_string(),
            options,
            status: JobStatus::Queued,

            time_requested: Utc::now(),
            time_started: None,
            time_completed: None,

            failure_details: None,
        }
    }
}

/// A `JobReport` is what the driver hands back: the terminal status, the committed
/// output files on success, and the locating failure detail otherwise.
#[derive(Clone, Debug)]
pub struct JobReport {
    pub job_id: String,
    pub status: JobStatus,
    pub output_files: Vec<String>,
    pub failure_details: Option<String>,
}

impl JobReport {
    pub fn is_success(&self) -> bool {
        self.status == JobStatus::Done
    }
}
