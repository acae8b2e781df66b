use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};

use data_layer::DataLayer;
use errors::*;
use job::{Job, JobOptions, JobReport, JobStatus};
use logging::output_error;
use scheduler::state::State;
use scheduler::task_processor::TaskProcessor;
use task::{Task, TaskReport};

/// The `Coordinator` owns all job and task state and exposes the worker protocol:
/// `assign_task`, `report_status` and `heartbeat`. Workers never share memory with one
/// another; they only read their assignment from here and report terminal status back.
///
/// Map tasks are created at construction. Reduce tasks are created at the phase
/// barrier, once every map task has succeeded, from the committed output of each map
/// task's succeeding attempt; that is the single point deciding which map output is
/// valid, so a superseded attempt's files are never seen by a reducer.
pub struct Coordinator {
    state: Arc<Mutex<State>>,
    task_processor: TaskProcessor,
    cancelled: Arc<AtomicBool>,
}

impl Coordinator {
    pub fn new(job: Job, data_layer: Arc<DataLayer + Send + Sync>) -> Result<Self> {
        let task_processor = TaskProcessor::new(data_layer);

        let map_tasks = task_processor.create_map_tasks(&job).chain_err(
            || "Error creating map tasks for job.",
        )?;
        info!("Job {} has {} map tasks.", job.id, map_tasks.len());

        let mut state = State::new(job);
        if map_tasks.is_empty() {
            // Nothing to read. The reduce phase still runs so that every shard gets
            // its (empty) output file.
            let reduce_tasks = task_processor
                .create_reduce_tasks(state.job(), &[])
                .chain_err(|| "Error creating reduce tasks for job.")?;
            state.set_reduce_phase_started();
            state.add_tasks(reduce_tasks);
        } else {
            state.add_tasks(map_tasks);
        }

        Ok(Coordinator {
            state: Arc::new(Mutex::new(state)),
            task_processor,
            cancelled: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn register_worker(&self, worker_id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.add_worker(worker_id).chain_err(
            || "Error registering worker.",
        )?;
        debug!("Registered worker {}", worker_id);
        Ok(())
    }

    pub fn heartbeat(&self, worker_id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.update_heartbeat(worker_id)
    }

    /// Hands the next pending task to an available worker, or `None` when there is
    /// nothing to run. Because reduce tasks are only created once every map task has
    /// succeeded, a reducer can never start before the map barrier.
    pub fn assign_task(&self, worker_id: &str) -> Result<Option<Task>> {
        let mut state = self.state.lock().unwrap();
        if state.job_status().is_terminal() {
            return Ok(None);
        }
        // A worker the health check has removed must re-register before it can be
        // tracked, and with it assigned work, again.
        if !state.has_worker(worker_id) {
            return Err(
                format!("Worker with ID {} is not registered.", worker_id).into(),
            );
        }
        match state.pop_pending_task() {
            None => Ok(None),
            Some(task_id) => {
                let task = state.assign_task(&task_id, worker_id).chain_err(|| {
                    format!("Error assigning task {} to worker {}", task_id, worker_id)
                })?;
                info!(
                    "Assigned {:?} task {} (attempt {}) to worker {}",
                    task.task_type,
                    task.id,
                    task.attempt,
                    worker_id
                );
                Ok(Some(task))
            }
        }
    }

    /// Accepts a worker's terminal report for one attempt. Stale reports from
    /// superseded attempts are ignored.
    pub fn report_status(&self, report: TaskReport) -> Result<()> {
        let mut state = self.state.lock().unwrap();

        state.process_report(&report).chain_err(
            || "Error processing task report.",
        )?;

        if !state.reduce_phase_started() && state.all_maps_succeeded() {
            let reduce_tasks = {
                let job = state.job();
                let completed_map_tasks = state.succeeded_map_tasks();
                self.task_processor
                    .create_reduce_tasks(job, &completed_map_tasks)
                    .chain_err(|| "Error creating reduce tasks for job.")?
            };
            info!(
                "All map tasks for job {} succeeded, scheduling {} reduce tasks.",
                state.job().id,
                reduce_tasks.len()
            );
            state.set_reduce_phase_started();
            state.add_tasks(reduce_tasks);
        } else if state.reduce_phase_started() && state.all_reduces_succeeded() {
            info!("Job {} is complete.", state.job().id);
            state.set_job_completed();
        }

        Ok(())
    }

    /// Fails and requeues the running task of any worker that has been silent longer
    /// than the job's worker timeout.
    pub fn perform_health_check(&self) {
        let mut state = self.state.lock().unwrap();
        let timeout_s = state.job().options.worker_timeout_s;

        for (worker_id, current_task_id) in state.timed_out_workers(timeout_s) {
            info!(
                "Removing worker {} from list of active workers due to health check failure.",
                worker_id
            );
            if let Err(err) = state.remove_worker(&worker_id) {
                output_error(&err.chain_err(|| "Error removing worker."));
                continue;
            }
            if let Some(task_id) = current_task_id {
                let detail = ErrorKind::WorkerTimeout(worker_id.clone()).to_string();
                if let Err(err) = state.fail_task(&task_id, &detail) {
                    output_error(&err.chain_err(|| "Error reassigning task."));
                }
            }
        }
    }

    /// Cancels the job: every non-terminal task is marked Cancelled and in-flight
    /// workers observe the cancellation flag and abandon their work. Reduce outputs
    /// already committed are not rolled back.
    pub fn cancel_job(&self) {
        info!("Cancelling job.");
        self.cancelled.store(true, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        state.cancel_all();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    pub fn job_status(&self) -> JobStatus {
        let state = self.state.lock().unwrap();
        state.job_status()
    }

    pub fn job_options(&self) -> JobOptions {
        let state = self.state.lock().unwrap();
        state.job().options.clone()
    }

    pub fn job_report(&self) -> JobReport {
        let state = self.state.lock().unwrap();
        JobReport {
            job_id: state.job().id.clone(),
            status: state.job_status(),
            output_files: state.output_files(),
            failure_details: state.job().failure_details.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::path::Path;

    use data_layer::MemoryDataLayer;
    use task::{TaskStatus, TaskType};

    fn test_coordinator(input: &[u8], split_size: u64, shards: u64) -> Coordinator {
        let layer = MemoryDataLayer::new();
        layer.write_file(Path::new("/input/data.txt"), input).unwrap();
        let job = Job::new(::job::JobOptions {
            input_paths: vec!["/input/data.txt".to_owned()],
            output_directory: "/output".to_owned(),
            split_size,
            reduce_shard_count: shards,
            max_task_failures: 2,
            ..Default::default()
        });
        Coordinator::new(job, Arc::new(layer)).unwrap()
    }

    fn drain_map_assignments(coordinator: &Coordinator, worker_id: &str) -> Vec<Task> {
        let mut tasks = Vec::new();
        while let Some(task) = coordinator.assign_task(worker_id).unwrap() {
            tasks.push(task);
        }
        tasks
    }

    #[test]
    fn maps_run_before_any_reduce_is_created() {
        let coordinator = test_coordinator(b"line one\nline two\n", 9, 2);
        coordinator.register_worker("worker-1").unwrap();

        let tasks = drain_map_assignments(&coordinator, "worker-1");

        assert_eq!(2, tasks.len());
        assert!(tasks.iter().all(|t| t.task_type == TaskType::Map));
        // The queue is empty until the last map succeeds: the phase barrier.
        assert!(coordinator.assign_task("worker-1").unwrap().is_none());
    }

    #[test]
    fn reduce_tasks_appear_after_the_barrier() {
        let coordinator = test_coordinator(b"line one\nline two\n", 9, 2);
        coordinator.register_worker("worker-1").unwrap();
        let tasks = drain_map_assignments(&coordinator, "worker-1");

        for task in &tasks {
            coordinator
                .report_status(TaskReport::map_succeeded(
                    task.id.clone(),
                    task.attempt,
                    HashMap::new(),
                ))
                .unwrap();
        }

        let reduce_tasks = drain_map_assignments(&coordinator, "worker-1");
        assert_eq!(2, reduce_tasks.len());
        assert!(reduce_tasks.iter().all(|t| t.task_type == TaskType::Reduce));
    }

    #[test]
    fn failed_task_is_requeued_with_a_new_attempt() {
        let coordinator = test_coordinator(b"some input\n", 1024, 1);
        coordinator.register_worker("worker-1").unwrap();
        let task = coordinator.assign_task("worker-1").unwrap().unwrap();
        assert_eq!(1, task.attempt);

        coordinator
            .report_status(TaskReport::failed(
                task.id.clone(),
                task.attempt,
                "Couldn't open input file.".to_owned(),
            ))
            .unwrap();

        assert_eq!(JobStatus::InProgress, coordinator.job_status());
        let retried = coordinator.assign_task("worker-1").unwrap().unwrap();
        assert_eq!(task.id, retried.id);
        assert_eq!(2, retried.attempt);
    }

    #[test]
    fn superseded_attempt_reports_are_ignored() {
        let coordinator = test_coordinator(b"some input\n", 1024, 1);
        coordinator.register_worker("worker-1").unwrap();
        let task = coordinator.assign_task("worker-1").unwrap().unwrap();

        coordinator
            .report_status(TaskReport::failed(task.id.clone(), task.attempt, "lost".to_owned()))
            .unwrap();
        let retried = coordinator.assign_task("worker-1").unwrap().unwrap();

        // The first attempt comes back from the dead and claims success with output.
        let mut zombie_runs = HashMap::new();
        zombie_runs.insert(0u64, vec!["/scratch/zombie/run".to_owned()]);
        coordinator
            .report_status(TaskReport::map_succeeded(task.id.clone(), task.attempt, zombie_runs))
            .unwrap();

        // No reduce task exists yet: the zombie report must not have counted.
        assert!(coordinator.assign_task("worker-1").unwrap().is_none());

        // The live attempt succeeds and the barrier opens, without the zombie's runs.
        coordinator
            .report_status(TaskReport::map_succeeded(
                retried.id.clone(),
                retried.attempt,
                HashMap::new(),
            ))
            .unwrap();
        let reduce_task = coordinator.assign_task("worker-1").unwrap().unwrap();
        assert_eq!(TaskType::Reduce, reduce_task.task_type);
        assert!(reduce_task.reduce_payload.unwrap().input_runs.is_empty());
    }

    #[test]
    fn exhausted_retries_fail_the_job_with_locating_detail() {
        let coordinator = test_coordinator(b"some input\n", 1024, 1);
        coordinator.register_worker("worker-1").unwrap();

        for _ in 0..2 {
            let task = coordinator.assign_task("worker-1").unwrap().unwrap();
            coordinator
                .report_status(TaskReport::failed(
                    task.id.clone(),
                    task.attempt,
                    "Couldn't open input file.".to_owned(),
                ))
                .unwrap();
        }

        assert_eq!(JobStatus::Failed, coordinator.job_status());
        let report = coordinator.job_report();
        let details = report.failure_details.unwrap();
        assert!(details.contains("exhausted its retries"));
        assert!(details.contains("/input/data.txt"));
        assert!(coordinator.assign_task("worker-1").unwrap().is_none());
    }

    #[test]
    fn worker_timeout_requeues_its_running_task() {
        let layer = MemoryDataLayer::new();
        layer.write_file(Path::new("/input/data.txt"), b"some input\n").unwrap();
        let job = Job::new(::job::JobOptions {
            input_paths: vec!["/input/data.txt".to_owned()],
            output_directory: "/output".to_owned(),
            // Any silence at all counts as a timeout.
            worker_timeout_s: 0,
            ..Default::default()
        });
        let coordinator = Coordinator::new(job, Arc::new(layer)).unwrap();
        coordinator.register_worker("worker-1").unwrap();
        let task = coordinator.assign_task("worker-1").unwrap().unwrap();

        coordinator.perform_health_check();

        coordinator.register_worker("worker-2").unwrap();
        let retried = coordinator.assign_task("worker-2").unwrap().unwrap();
        assert_eq!(task.id, retried.id);
        assert_eq!(2, retried.attempt);
        let failed_task_details = {
            let state = coordinator.state.lock().unwrap();
            state.get_task(&task.id).unwrap().failure_details.clone()
        };
        assert!(failed_task_details.unwrap().contains("worker-1 timed out"));
    }

    #[test]
    fn unregistered_workers_are_refused_assignment() {
        let coordinator = test_coordinator(b"some input\n", 1024, 1);

        assert!(coordinator.assign_task("ghost-worker").is_err());

        coordinator.register_worker("ghost-worker").unwrap();
        assert!(coordinator.assign_task("ghost-worker").unwrap().is_some());
    }

    #[test]
    fn fresh_heartbeat_survives_the_health_check() {
        let layer = MemoryDataLayer::new();
        layer.write_file(Path::new("/input/data.txt"), b"some input\n").unwrap();
        let job = Job::new(::job::JobOptions {
            input_paths: vec!["/input/data.txt".to_owned()],
            output_directory: "/output".to_owned(),
            worker_timeout_s: 1,
            ..Default::default()
        });
        let coordinator = Coordinator::new(job, Arc::new(layer)).unwrap();
        coordinator.register_worker("worker-1").unwrap();
        let task = coordinator.assign_task("worker-1").unwrap().unwrap();

        coordinator.heartbeat("worker-1").unwrap();
        coordinator.perform_health_check();

        // The worker heartbeated within the timeout, so its task stays assigned.
        coordinator.register_worker("worker-2").unwrap();
        assert!(coordinator.assign_task("worker-2").unwrap().is_none());

        // Its report is still current and opens the barrier.
        coordinator
            .report_status(TaskReport::map_succeeded(task.id, task.attempt, HashMap::new()))
            .unwrap();
        let reduce_task = coordinator.assign_task("worker-2").unwrap().unwrap();
        assert_eq!(TaskType::Reduce, reduce_task.task_type);
    }

    #[test]
    fn cancellation_is_terminal_and_stops_assignment() {
        let coordinator = test_coordinator(b"some input\n", 1024, 1);
        coordinator.register_worker("worker-1").unwrap();
        let task = coordinator.assign_task("worker-1").unwrap().unwrap();

        coordinator.cancel_job();

        assert!(coordinator.is_cancelled());
        assert_eq!(JobStatus::Cancelled, coordinator.job_status());
        assert!(coordinator.assign_task("worker-1").unwrap().is_none());
        // A report for the abandoned task is dropped without effect.
        coordinator
            .report_status(TaskReport::map_succeeded(task.id, task.attempt, HashMap::new()))
            .unwrap();
        assert_eq!(JobStatus::Cancelled, coordinator.job_status());
    }

    #[test]
    fn empty_input_still_completes_with_reduce_tasks() {
        let layer = MemoryDataLayer::new();
        layer.write_file(Path::new("/input/empty.txt"), b"").unwrap();
        let job = Job::new(::job::JobOptions {
            input_paths: vec!["/input/empty.txt".to_owned()],
            output_directory: "/output".to_owned(),
            reduce_shard_count: 2,
            ..Default::default()
        });
        let coordinator = Coordinator::new(job, Arc::new(layer)).unwrap();
        coordinator.register_worker("worker-1").unwrap();

        let tasks = drain_map_assignments(&coordinator, "worker-1");

        assert_eq!(2, tasks.len());
        assert!(tasks.iter().all(|t| t.task_type == TaskType::Reduce));
    }
}
