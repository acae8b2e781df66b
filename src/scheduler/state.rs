use std::collections::{HashMap, VecDeque};

use chrono::prelude::*;

use errors::*;
use job::{Job, JobStatus};
use task::{Task, TaskReport, TaskStatus, TaskType};

/// Coordinator-side record of one registered worker.
pub struct WorkerRecord {
    pub worker_id: String,
    pub last_heartbeat: DateTime<Utc>,
    pub current_task_id: Option<String>,
}

/// The `State` object owns the job, its tasks and the worker registry. It is the only
/// shared mutable state in the engine and every mutation goes through the coordinator
/// holding its lock, so task transitions are serialised through a single writer.
pub struct State {
    job: Job,
    tasks: HashMap<String, Task>,
    pending_queue: VecDeque<String>,
    workers: HashMap<String, WorkerRecord>,

    map_task_count: usize,
    succeeded_map_count: usize,
    reduce_task_count: usize,
    succeeded_reduce_count: usize,
    reduce_phase_started: bool,

    output_files: Vec<String>,
}

impl State {
    pub fn new(job: Job) -> Self {
        State {
            job,
            tasks: HashMap::new(),
            pending_queue: VecDeque::new(),
            workers: HashMap::new(),

            map_task_count: 0,
            succeeded_map_count: 0,
            reduce_task_count: 0,
            succeeded_reduce_count: 0,
            reduce_phase_started: false,

            output_files: Vec::new(),
        }
    }

    pub fn job(&self) -> &Job {
        &self.job
    }

    pub fn job_status(&self) -> JobStatus {
        self.job.status.clone()
    }

    pub fn output_files(&self) -> Vec<String> {
        let mut output_files = self.output_files.clone();
        output_files.sort();
        output_files
    }

    pub fn add_tasks(&mut self, tasks: Vec<Task>) {
        for task in tasks {
            match task.task_type {
                TaskType::Map => self.map_task_count += 1,
                TaskType::Reduce => self.reduce_task_count += 1,
            }
            self.pending_queue.push_back(task.id.clone());
            self.tasks.insert(task.id.clone(), task);
        }
    }

    pub fn get_task(&self, task_id: &str) -> Result<&Task> {
        self.tasks.get(task_id).ok_or_else(|| {
            format!("Task with ID {} is not found.", task_id).into()
        })
    }

    pub fn add_worker(&mut self, worker_id: &str) -> Result<()> {
        if self.workers.contains_key(worker_id) {
            return Err(
                format!("Worker with ID {} is already registered.", worker_id).into(),
            );
        }
        self.workers.insert(
            worker_id.to_owned(),
            WorkerRecord {
                worker_id: worker_id.to_owned(),
                last_heartbeat: Utc::now(),
                current_task_id: None,
            },
        );
        Ok(())
    }

    pub fn has_worker(&self, worker_id: &str) -> bool {
        self.workers.contains_key(worker_id)
    }

    pub fn update_heartbeat(&mut self, worker_id: &str) -> Result<()> {
        let worker = self.workers.get_mut(worker_id).ok_or_else(|| {
            format!("Worker with ID {} is not registered.", worker_id)
        })?;
        worker.last_heartbeat = Utc::now();
        Ok(())
    }

    /// Returns the workers whose last heartbeat is older than `timeout_s` seconds,
    /// along with the task each was running.
    pub fn timed_out_workers(&self, timeout_s: i64) -> Vec<(String, Option<String>)> {
        let now = Utc::now();
        self.workers
            .values()
            .filter(|worker| {
                now.signed_duration_since(worker.last_heartbeat).num_seconds() >= timeout_s
            })
            .map(|worker| {
                (worker.worker_id.clone(), worker.current_task_id.clone())
            })
            .collect()
    }

    pub fn remove_worker(&mut self, worker_id: &str) -> Result<()> {
        self.workers.remove(worker_id).ok_or_else(|| {
            format!("Worker with ID {} is not registered.", worker_id)
        })?;
        Ok(())
    }

    pub fn pop_pending_task(&mut self) -> Option<String> {
        self.pending_queue.pop_front()
    }

    /// Moves a pending task to Running on the given worker, stamping a fresh attempt
    /// number.
    pub fn assign_task(&mut self, task_id: &str, worker_id: &str) -> Result<Task> {
        if self.job.status == JobStatus::Queued {
            self.job.status = JobStatus::InProgress;
            self.job.time_started = Some(Utc::now());
        }

        let assigned = {
            let task = self.tasks.get_mut(task_id).ok_or_else(|| {
                format!("Task with ID {} is not found.", task_id)
            })?;
            if task.status != TaskStatus::Pending {
                return Err(
                    format!("Task {} is not pending assignment.", task_id).into(),
                );
            }
            task.status = TaskStatus::Running;
            task.attempt += 1;
            task.assigned_worker_id = worker_id.to_owned();
            task.time_started = Some(Utc::now());
            task.clone()
        };

        if let Some(worker) = self.workers.get_mut(worker_id) {
            worker.current_task_id = Some(assigned.id.clone());
        }
        Ok(assigned)
    }

    /// Applies a worker's terminal report for one attempt. Reports whose attempt
    /// number does not match the task's current attempt come from a superseded
    /// attempt; they are dropped here, which is what keeps invalidated map output
    /// invisible to the reduce phase.
    pub fn process_report(&mut self, report: &TaskReport) -> Result<()> {
        let accepted = {
            let task = self.get_task(&report.task_id)?;
            task.status == TaskStatus::Running && task.attempt == report.attempt
        };
        if !accepted {
            debug!(
                "Ignoring stale report for task {} attempt {}",
                report.task_id,
                report.attempt
            );
            return Ok(());
        }

        let worker_id = {
            let task = self.get_task(&report.task_id)?;
            task.assigned_worker_id.clone()
        };
        if let Some(worker) = self.workers.get_mut(&worker_id) {
            worker.current_task_id = None;
        }

        match report.status {
            TaskStatus::Succeeded => {
                let task = self.tasks.get_mut(&report.task_id).ok_or_else(|| {
                    format!("Task with ID {} is not found.", report.task_id)
                })?;
                task.status = TaskStatus::Succeeded;
                task.time_completed = Some(Utc::now());
                match task.task_type {
                    TaskType::Map => {
                        task.map_output_runs = report.map_output_runs.clone();
                        self.succeeded_map_count += 1;
                    }
                    TaskType::Reduce => {
                        if let Some(ref output_file) = report.output_file {
                            self.output_files.push(output_file.clone());
                        }
                        self.succeeded_reduce_count += 1;
                    }
                }
                Ok(())
            }
            TaskStatus::Failed => {
                let detail = report
                    .failure_details
                    .clone()
                    .unwrap_or_else(|| "unknown failure".to_owned());
                self.fail_task(&report.task_id, &detail)
            }
            _ => Err(
                format!("Unexpected report status {:?}", report.status).into(),
            ),
        }
    }

    /// Records a failed attempt: the task goes back to Pending until its failures
    /// reach the job's limit, at which point the task and the job fail for good.
    pub fn fail_task(&mut self, task_id: &str, detail: &str) -> Result<()> {
        let max_task_failures = self.job.options.max_task_failures;

        let locating_detail = {
            let task = self.tasks.get_mut(task_id).ok_or_else(|| {
                format!("Task with ID {} is not found.", task_id)
            })?;
            if task.is_terminal() {
                return Ok(());
            }
            task.failure_count += 1;
            task.failure_details = Some(detail.to_owned());
            task.assigned_worker_id = String::new();

            if task.failure_count < max_task_failures {
                task.status = TaskStatus::Pending;
                None
            } else {
                task.status = TaskStatus::Failed;
                task.time_completed = Some(Utc::now());
                Some(match task.task_type {
                    TaskType::Map => {
                        match task.map_payload {
                            Some(ref payload) => format!(
                                "map task over bytes {}..{} of {}: {}",
                                payload.split.start_byte,
                                payload.split.end_byte,
                                payload.split.input_path,
                                detail
                            ),
                            None => format!("map task: {}", detail),
                        }
                    }
                    TaskType::Reduce => {
                        match task.reduce_payload {
                            Some(ref payload) => {
                                format!("reduce task for shard {}: {}", payload.shard, detail)
                            }
                            None => format!("reduce task: {}", detail),
                        }
                    }
                })
            }
        };

        match locating_detail {
            None => {
                warn!("Task {} failed, requeueing: {}", task_id, detail);
                self.pending_queue.push_back(task_id.to_owned());
            }
            Some(locating_detail) => {
                error!("Task {} permanently failed: {}", task_id, locating_detail);
                self.job.status = JobStatus::Failed;
                self.job.failure_details = Some(
                    ErrorKind::RetriesExhausted(task_id.to_owned(), locating_detail).to_string(),
                );
                self.job.time_completed = Some(Utc::now());
            }
        }
        Ok(())
    }

    pub fn all_maps_succeeded(&self) -> bool {
        self.succeeded_map_count == self.map_task_count
    }

    pub fn all_reduces_succeeded(&self) -> bool {
        self.reduce_task_count > 0 && self.succeeded_reduce_count == self.reduce_task_count
    }

    pub fn reduce_phase_started(&self) -> bool {
        self.reduce_phase_started
    }

    pub fn set_reduce_phase_started(&mut self) {
        self.reduce_phase_started = true;
    }

    pub fn succeeded_map_tasks(&self) -> Vec<&Task> {
        self.tasks
            .values()
            .filter(|task| {
                task.task_type == TaskType::Map && task.status == TaskStatus::Succeeded
            })
            .collect()
    }

    pub fn set_job_completed(&mut self) {
        if self.job.status.is_terminal() {
            return;
        }
        self.job.status = JobStatus::Done;
        self.job.time_completed = Some(Utc::now());
    }

    /// Marks every non-terminal task Cancelled and the job with it. Already committed
    /// reduce outputs are left in place; the caller must treat a cancelled job's
    /// output directory as invalid.
    pub fn cancel_all(&mut self) {
        if self.job.status.is_terminal() {
            return;
        }
        self.job.status = JobStatus::Cancelled;
        self.job.time_completed = Some(Utc::now());
        self.pending_queue.clear();
        for task in self.tasks.values_mut() {
            if !task.is_terminal() {
                task.status = TaskStatus::Cancelled;
            }
        }
        for worker in self.workers.values_mut() {
            worker.current_task_id = None;
        }
    }
}
