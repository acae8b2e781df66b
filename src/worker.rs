use std::collections::HashMap;
use std::mem;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread;
use std::thread::JoinHandle;
use std::time::Duration;

use serde::Serialize;
use uuid::Uuid;

use data_layer::DataLayer;
use emitter::{FinalVecEmitter, IntermediateVecEmitter};
use errors::*;
use job::JobOptions;
use logging::output_error;
use mapper::Map;
use partition::Partition;
use reader::RecordReader;
use reducer::Reduce;
use scheduler::Coordinator;
use serialise::{encode_run, format_output_line, IntermediatePair, SpillRun};
use shuffle::{read_shard_runs, ShuffleStream};
use task::{MapTaskPayload, ReduceTaskPayload, Task, TaskReport, TaskType};

const WORKER_POLL_MS: u64 = 20;

pub fn failure_details_from_error(err: &Error) -> String {
    let mut failure_details = format!("{}", err);

    for e in err.iter().skip(1) {
        failure_details.push_str("\ncaused by: ");
        failure_details.push_str(&format!("{}", e));
    }
    failure_details
}

fn spill_buffers<K, V>(
    buffers: &mut [Vec<IntermediatePair<K, V>>],
    run_names: &mut HashMap<u64, Vec<String>>,
    run_seq: u64,
    staging_dir: &Path,
    data_layer: &Arc<DataLayer + Send + Sync>,
) -> Result<()>
where
    K: Serialize + Ord,
    V: Serialize,
{
    for (shard, buffer) in buffers.iter_mut().enumerate() {
        if buffer.is_empty() {
            continue;
        }
        let run = SpillRun::from_pairs(mem::replace(buffer, Vec::new()));
        let run_name = format!("shard{:05}-run{:05}.json", shard, run_seq);
        let encoded = encode_run(&run).chain_err(
            || "Failed to encode spill run.",
        )?;
        data_layer
            .write_file(&staging_dir.join(&run_name), &encoded)
            .chain_err(|| "Failed to write map output file.")?;
        run_names
            .entry(shard as u64)
            .or_insert_with(Vec::new)
            .push(run_name);
    }
    Ok(())
}

fn map_split_to_runs<M, P>(
    payload: &MapTaskPayload,
    options: &JobOptions,
    mapper: &M,
    partitioner: &P,
    data_layer: &Arc<DataLayer + Send + Sync>,
    cancelled: &AtomicBool,
    staging_dir: &Path,
) -> Result<HashMap<u64, Vec<String>>>
where
    M: Map,
    P: Partition<M::Key>,
{
    let shard_count = partitioner.partition_count();
    let mut buffers: Vec<Vec<IntermediatePair<M::Key, M::Value>>> =
        (0..shard_count).map(|_| Vec::new()).collect();
    let mut run_names: HashMap<u64, Vec<String>> = HashMap::new();
    let mut buffered_pairs = 0;
    let mut run_seq = 0;

    let mut reader = RecordReader::with_delimiter(
        Arc::clone(data_layer),
        payload.split.clone(),
        options.record_delimiter,
    ).chain_err(|| "Couldn't open map input.")?;

    let mut emitted: Vec<(M::Key, M::Value)> = Vec::new();
    while let Some(record) = reader.next_record().chain_err(
        || "Couldn't read map input.",
    )?
    {
        if cancelled.load(Ordering::SeqCst) {
            return Err("Map task abandoned: job was cancelled.".into());
        }

        mapper
            .map(record, IntermediateVecEmitter::new(&mut emitted))
            .chain_err(|| "Error running map operation.")?;

        for (key, value) in emitted.drain(..) {
            let shard = partitioner.partition(&key).chain_err(
                || "Error partitioning map output.",
            )?;
            let buffer = buffers.get_mut(shard as usize).ok_or_else(|| {
                format!(
                    "Partitioner sent a key to shard {} of {}.",
                    shard,
                    shard_count
                )
            })?;
            buffer.push(IntermediatePair { key, value });
            buffered_pairs += 1;
        }

        if buffered_pairs >= options.spill_threshold {
            spill_buffers(&mut buffers, &mut run_names, run_seq, staging_dir, data_layer)?;
            run_seq += 1;
            buffered_pairs = 0;
        }
    }
    spill_buffers(&mut buffers, &mut run_names, run_seq, staging_dir, data_layer)?;

    Ok(run_names)
}

/// Runs one map attempt: reads the split's records in order, routes every emitted pair
/// to its shard buffer, spills sorted runs once the buffer threshold is crossed, and
/// commits all runs at a single visibility point by renaming the attempt's staging
/// directory into place. A failed attempt never commits, so it leaves nothing visible.
///
/// The task's scratch directory is swept first: whatever an earlier attempt left there,
/// staged or committed, is invalidated by this attempt existing at all. A failed attempt
/// removes its own staging directory on the way out.
///
/// Returns the committed run files per shard, for the coordinator to hand to reducers.
pub fn perform_map<M, P>(
    task: &Task,
    options: &JobOptions,
    mapper: &M,
    partitioner: &P,
    data_layer: &Arc<DataLayer + Send + Sync>,
    cancelled: &AtomicBool,
) -> Result<HashMap<u64, Vec<String>>>
where
    M: Map,
    P: Partition<M::Key>,
{
    let payload = task.map_payload.as_ref().ok_or(
        "Map task has no split payload.",
    )?;
    info!(
        "Performing map operation. task={} split={}..{} of {}",
        task.id,
        payload.split.start_byte,
        payload.split.end_byte,
        payload.split.input_path
    );

    let attempt_base = PathBuf::from(&options.scratch_directory).join(&task.id);
    let staging_dir = attempt_base.join(format!("attempt-{}.staging", task.attempt));
    let committed_dir = attempt_base.join(format!("attempt-{}", task.attempt));

    data_layer.remove_dir_all(&attempt_base).chain_err(
        || "Failed to clear output of earlier map attempts.",
    )?;
    data_layer.create_dir_all(&staging_dir).chain_err(
        || "Failed to create map staging directory.",
    )?;

    let result = map_split_to_runs(
        payload,
        options,
        mapper,
        partitioner,
        data_layer,
        cancelled,
        &staging_dir,
    ).and_then(|run_names| {
        // The single visibility point: before this rename nothing of the attempt can
        // be observed, after it everything can.
        data_layer.rename(&staging_dir, &committed_dir).chain_err(
            || "Failed to commit map output.",
        )?;
        Ok(run_names)
    });

    let run_names = match result {
        Ok(run_names) => run_names,
        Err(err) => {
            if data_layer.remove_dir_all(&staging_dir).is_err() {
                warn!("Unable to remove staging directory {:?}", staging_dir);
            }
            return Err(err);
        }
    };

    let mut output_runs = HashMap::new();
    for (shard, names) in run_names {
        let paths = names
            .iter()
            .map(|name| committed_dir.join(name).to_string_lossy().into_owned())
            .collect();
        output_runs.insert(shard, paths);
    }
    Ok(output_runs)
}

fn reduce_shard_to_lines<R>(
    payload: &ReduceTaskPayload,
    options: &JobOptions,
    reducer: &R,
    data_layer: &Arc<DataLayer + Send + Sync>,
    cancelled: &AtomicBool,
) -> Result<Vec<u8>>
where
    R: Reduce,
{
    let runs: Vec<SpillRun<R::Key, R::Value>> =
        read_shard_runs(data_layer, &payload.input_runs).chain_err(
            || "Error fetching reduce inputs.",
        )?;

    let mut output = Vec::new();
    let mut results: Vec<(R::Key, R::Value)> = Vec::new();
    for group in ShuffleStream::from_runs(runs) {
        if cancelled.load(Ordering::SeqCst) {
            return Err("Reduce task abandoned: job was cancelled.".into());
        }

        reducer
            .reduce(group, FinalVecEmitter::new(&mut results))
            .chain_err(|| "Error running reduce operation.")?;

        for (key, value) in results.drain(..) {
            let line = format_output_line(&key, &value, options.output_delimiter)
                .chain_err(|| "Error formatting reduce output.")?;
            output.extend(line.into_bytes());
        }
    }
    Ok(output)
}

/// Runs one reduce attempt: merges the shard's committed runs into grouped streams,
/// applies the reduce function per group, and commits the shard's `part-r-000NN`
/// output file with a staging-then-rename so a failed attempt leaves no partial file.
/// A failed attempt removes its staging file.
pub fn perform_reduce<R>(
    task: &Task,
    options: &JobOptions,
    reducer: &R,
    data_layer: &Arc<DataLayer + Send + Sync>,
    cancelled: &AtomicBool,
) -> Result<String>
where
    R: Reduce,
{
    let payload = task.reduce_payload.as_ref().ok_or(
        "Reduce task has no shard payload.",
    )?;
    info!(
        "Performing reduce operation. task={} shard={}",
        task.id,
        payload.shard
    );

    let file_name = format!("part-r-{:05}", payload.shard);
    let output_dir = Path::new(&payload.output_directory);
    let staging_path = output_dir.join(format!(
        ".{}-attempt-{}.staging",
        file_name,
        task.attempt
    ));
    let committed_path = output_dir.join(&file_name);

    let result = reduce_shard_to_lines(payload, options, reducer, data_layer, cancelled)
        .and_then(|output| {
            data_layer.write_file(&staging_path, &output).chain_err(
                || "Failed to write reduce output file.",
            )?;
            data_layer.rename(&staging_path, &committed_path).chain_err(
                || "Failed to commit reduce output.",
            )
        });

    match result {
        Ok(()) => Ok(committed_path.to_string_lossy().into_owned()),
        Err(err) => {
            if data_layer.remove_file(&staging_path).is_err() {
                warn!("Unable to remove staging file {:?}", staging_path);
            }
            Err(err)
        }
    }
}

fn execute_task<M, R, P>(
    task: &Task,
    options: &JobOptions,
    mapper: &M,
    reducer: &R,
    partitioner: &P,
    data_layer: &Arc<DataLayer + Send + Sync>,
    cancelled: &AtomicBool,
) -> TaskReport
where
    M: Map,
    R: Reduce<Key = M::Key, Value = M::Value>,
    P: Partition<M::Key>,
{
    match task.task_type {
        TaskType::Map => {
            match perform_map(task, options, mapper, partitioner, data_layer, cancelled) {
                Ok(output_runs) => {
                    info!("Map operation completed sucessfully.");
                    TaskReport::map_succeeded(task.id.clone(), task.attempt, output_runs)
                }
                Err(err) => {
                    let err = err.chain_err(|| "Error running map operation.");
                    output_error(&err);
                    TaskReport::failed(
                        task.id.clone(),
                        task.attempt,
                        failure_details_from_error(&err),
                    )
                }
            }
        }
        TaskType::Reduce => {
            match perform_reduce(task, options, reducer, data_layer, cancelled) {
                Ok(output_file) => {
                    info!("Reduce operation completed sucessfully.");
                    TaskReport::reduce_succeeded(task.id.clone(), task.attempt, output_file)
                }
                Err(err) => {
                    let err = err.chain_err(|| "Error running reduce operation.");
                    output_error(&err);
                    TaskReport::failed(
                        task.id.clone(),
                        task.attempt,
                        failure_details_from_error(&err),
                    )
                }
            }
        }
    }
}

// The operation gets its own thread so the worker keeps heartbeating while a long map
// or reduce is in flight; otherwise a busy but healthy worker would be declared lost
// the moment one task outlives the heartbeat timeout.
fn run_task_with_heartbeats<M, R, P>(
    coordinator: &Coordinator,
    worker_id: &str,
    task: Task,
    options: &JobOptions,
    mapper: &Arc<M>,
    reducer: &Arc<R>,
    partitioner: &Arc<P>,
    data_layer: &Arc<DataLayer + Send + Sync>,
    cancelled: &Arc<AtomicBool>,
) -> TaskReport
where
    M: Map + Send + Sync + 'static,
    R: Reduce<Key = M::Key, Value = M::Value> + Send + Sync + 'static,
    P: Partition<M::Key> + Send + Sync + 'static,
{
    let task_id = task.id.clone();
    let attempt = task.attempt;

    let (sender, receiver) = mpsc::channel();
    {
        let options = options.clone();
        let mapper = Arc::clone(mapper);
        let reducer = Arc::clone(reducer);
        let partitioner = Arc::clone(partitioner);
        let data_layer = Arc::clone(data_layer);
        let cancelled = Arc::clone(cancelled);
        thread::spawn(move || {
            let report = execute_task(
                &task,
                &options,
                &*mapper,
                &*reducer,
                &*partitioner,
                &data_layer,
                &cancelled,
            );
            // A send failure means the worker loop is gone; the report has nowhere
            // to go either way.
            let _ = sender.send(report);
        });
    }

    loop {
        match receiver.recv_timeout(Duration::from_millis(WORKER_POLL_MS)) {
            Ok(report) => return report,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                if let Err(err) = coordinator.heartbeat(worker_id) {
                    output_error(&err.chain_err(|| "Error sending heartbeat."));
                }
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                return TaskReport::failed(
                    task_id,
                    attempt,
                    "operation thread panicked".to_owned(),
                );
            }
        }
    }
}

fn worker_loop<M, R, P>(
    coordinator: Arc<Coordinator>,
    mapper: Arc<M>,
    reducer: Arc<R>,
    partitioner: Arc<P>,
    data_layer: Arc<DataLayer + Send + Sync>,
) where
    M: Map + Send + Sync + 'static,
    R: Reduce<Key = M::Key, Value = M::Value> + Send + Sync + 'static,
    P: Partition<M::Key> + Send + Sync + 'static,
{
    let worker_id = Uuid::new_v4().to_string();
    if let Err(err) = coordinator.register_worker(&worker_id) {
        output_error(&err.chain_err(|| "Error registering worker."));
        return;
    }

    let options = coordinator.job_options();
    let cancelled = coordinator.cancel_flag();

    loop {
        if coordinator.job_status().is_terminal() {
            debug!("Worker {} exiting: job is terminal.", worker_id);
            break;
        }

        if coordinator.heartbeat(&worker_id).is_err() {
            // The health check dropped us from the registry; rejoin before asking
            // for work.
            if let Err(err) = coordinator.register_worker(&worker_id) {
                output_error(&err.chain_err(|| "Error re-registering worker."));
                thread::sleep(Duration::from_millis(WORKER_POLL_MS));
                continue;
            }
        }

        let assignment = match coordinator.assign_task(&worker_id) {
            Ok(assignment) => assignment,
            Err(err) => {
                output_error(&err.chain_err(|| "Error requesting a task."));
                None
            }
        };

        match assignment {
            None => thread::sleep(Duration::from_millis(WORKER_POLL_MS)),
            Some(task) => {
                let report = run_task_with_heartbeats(
                    &coordinator,
                    &worker_id,
                    task,
                    &options,
                    &mapper,
                    &reducer,
                    &partitioner,
                    &data_layer,
                    &cancelled,
                );
                if let Err(err) = coordinator.report_status(report) {
                    output_error(&err.chain_err(|| "Error reporting task status."));
                }
            }
        }
    }
}

/// Spawns the worker pool: `worker_count` OS threads that poll the coordinator for
/// work until the job is terminal. Workers share nothing but the coordinator protocol
/// and the data layer.
pub fn run_worker_pool<M, R, P>(
    coordinator: Arc<Coordinator>,
    mapper: Arc<M>,
    reducer: Arc<R>,
    partitioner: Arc<P>,
    data_layer: Arc<DataLayer + Send + Sync>,
    worker_count: usize,
) -> Vec<JoinHandle<()>>
where
    M: Map + Send + Sync + 'static,
    R: Reduce<Key = M::Key, Value = M::Value> + Send + Sync + 'static,
    P: Partition<M::Key> + Send + Sync + 'static,
{
    let mut handles = Vec::new();
    for _ in 0..worker_count.max(1) {
        let coordinator = Arc::clone(&coordinator);
        let mapper = Arc::clone(&mapper);
        let reducer = Arc::clone(&reducer);
        let partitioner = Arc::clone(&partitioner);
        let data_layer = Arc::clone(&data_layer);
        handles.push(thread::spawn(move || {
            worker_loop(coordinator, mapper, reducer, partitioner, data_layer);
        }));
    }
    handles
}
