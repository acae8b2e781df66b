use std::collections::HashMap;

use chrono::prelude::*;
use uuid::Uuid;

use reader::Split;

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum TaskStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum TaskType {
    Map,
    Reduce,
}

/// The payload of a map task: the split its record reader will consume.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MapTaskPayload {
    pub split: Split,
}

/// The payload of a reduce task: its shard of the key space, the spill runs committed
/// for that shard by the succeeding map attempts, and where the final output goes.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReduceTaskPayload {
    pub shard: u64,
    pub input_runs: Vec<String>,
    pub output_directory: String,
}

/// The `Task` is a struct that represents a map or reduce task.
/// This is the unit of work that is processed by a worker.
#[derive(Clone, Debug)]
pub struct Task {
    pub task_type: TaskType,
    pub job_id: String,
    pub id: String,

    // This will only exist if task_type is Map.
    pub map_payload: Option<MapTaskPayload>,
    // This will only exist if task_type is Reduce.
    pub reduce_payload: Option<ReduceTaskPayload>,

    // A map of shard to committed run files, filled in when a map attempt succeeds.
    pub map_output_runs: HashMap<u64, Vec<String>>,

    pub assigned_worker_id: String,
    pub status: TaskStatus,

    // Attempt currently (or last) running. Status reports carrying an older attempt
    // number are from superseded attempts and are ignored.
    pub attempt: u16,

    // Number of times this task has failed in the past.
    pub failure_count: u16,
    pub failure_details: Option<String>,

    pub time_started: Option<DateTime<Utc>>,
    pub time_completed: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new_map_task<S: Into<String>>(job_id: S, split: Split) -> Self {
        Task {
            task_type: TaskType::Map,
            job_id: job_id.into(),
            id: Uuid::new_v4().to_string(),

            map_payload: Some(MapTaskPayload { split }),
            reduce_payload: None,

            map_output_runs: HashMap::new(),

            assigned_worker_id: String::new(),
            status: TaskStatus::Pending,

            attempt: 0,
            failure_count: 0,
            failure_details: None,

            time_started: None,
            time_completed: None,
        }
    }

    pub fn new_reduce_task<S: Into<String>>(
        job_id: S,
        shard: u64,
        input_runs: Vec<String>,
        output_directory: S,
    ) -> Self {
        Task {
            task_type: TaskType::Reduce,
            job_id: job_id.into(),
            id: Uuid::new_v4().to_string(),

            map_payload: None,
            reduce_payload: Some(ReduceTaskPayload {
                shard,
                input_runs,
                output_directory: output_directory.into(),
            }),

            map_output_runs: HashMap::new(),

            assigned_worker_id: String::new(),
            status: TaskStatus::Pending,

            attempt: 0,
            failure_count: 0,
            failure_details: None,

            time_started: None,
            time_completed: None,
        }
    }

    // A retryable failure is re-queued as Pending straight away, so an observed Failed
    // status means the retries are spent.
    pub fn is_terminal(&self) -> bool {
        match self.status {
            TaskStatus::Succeeded | TaskStatus::Failed | TaskStatus::Cancelled => true,
            TaskStatus::Pending | TaskStatus::Running => false,
        }
    }
}

/// A `TaskReport` is a worker's terminal verdict on one task attempt, sent back to the
/// coordinator through `report_status`.
#[derive(Clone, Debug)]
pub struct TaskReport {
    pub task_id: String,
    pub attempt: u16,
    pub status: TaskStatus,

    // Shard to committed run files, for a succeeded map attempt.
    pub map_output_runs: HashMap<u64, Vec<String>>,
    // Committed output file, for a succeeded reduce attempt.
    pub output_file: Option<String>,

    pub failure_details: Option<String>,
}

impl TaskReport {
    pub fn map_succeeded(
        task_id: String,
        attempt: u16,
        map_output_runs: HashMap<u64, Vec<String>>,
    ) -> Self {
        TaskReport {
            task_id,
            attempt,
            status: TaskStatus::Succeeded,
            map_output_runs,
            output_file: None,
            failure_details: None,
        }
    }

    pub fn reduce_succeeded(task_id: String, attempt: u16, output_file: String) -> Self {
        TaskReport {
            task_id,
            attempt,
            status: TaskStatus::Succeeded,
            map_output_runs: HashMap::new(),
            output_file: Some(output_file),
            failure_details: None,
        }
    }

    pub fn failed(task_id: String, attempt: u16, failure_details: String) -> Self {
        TaskReport {
            task_id,
            attempt,
            status: TaskStatus::Failed,
            map_output_runs: HashMap::new(),
            output_file: None,
            failure_details: Some(failure_details),
        }
    }
}
