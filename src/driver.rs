use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use data_layer::DataLayer;
use errors::*;
use job::{Job, JobOptions, JobReport, JobStatus};
use mapper::Map;
use partition::Partition;
use reducer::Reduce;
use scheduler::Coordinator;
use worker::run_worker_pool;

const DRIVER_POLL_MS: u64 = 20;

fn validate_options<P, K>(options: &JobOptions, partitioner: &P) -> Result<()>
where
    P: Partition<K>,
{
    if options.input_paths.is_empty() {
        return Err("No input paths were provided.".into());
    }
    if options.output_directory.is_empty() {
        return Err("No output directory was provided.".into());
    }
    if options.reduce_shard_count == 0 {
        return Err("A job needs at least one reduce shard.".into());
    }
    if partitioner.partition_count() != options.reduce_shard_count {
        return Err(
            format!(
                "Partitioner covers {} shards but the job has {}.",
                partitioner.partition_count(),
                options.reduce_shard_count
            ).into(),
        );
    }
    Ok(())
}

/// Runs a whole job to completion: carves the input into map tasks, drives them through
/// the worker pool, merges the committed map output into per-shard reduce tasks, and
/// returns once every shard's `part-r-000NN` file is committed or the job has failed
/// for good.
///
/// The reduce function must consume the map function's key and value types, and the
/// partitioner's shard count must match `reduce_shard_count`.
pub fn run_job<M, R, P>(
    options: JobOptions,
    mapper: M,
    reducer: R,
    partitioner: P,
    data_layer: Arc<DataLayer + Send + Sync>,
) -> Result<JobReport>
where
    M: Map + Send + Sync + 'static,
    R: Reduce<Key = M::Key, Value = M::Value> + Send + Sync + 'static,
    P: Partition<M::Key> + Send + Sync + 'static,
{
    validate_options(&options, &partitioner)?;

    let job = Job::new(options);
    info!(
        "Starting job {} over {} input paths.",
        job.id,
        job.options.input_paths.len()
    );

    data_layer
        .create_dir_all(Path::new(&job.options.output_directory))
        .chain_err(|| "Unable to create output directory.")?;
    data_layer
        .create_dir_all(Path::new(&job.options.scratch_directory))
        .chain_err(|| "Unable to create scratch directory.")?;

    let worker_count = job.options.worker_count.max(1);
    let coordinator = Arc::new(Coordinator::new(job, Arc::clone(&data_layer))?);

    let handles = run_worker_pool(
        Arc::clone(&coordinator),
        Arc::new(mapper),
        Arc::new(reducer),
        Arc::new(partitioner),
        Arc::clone(&data_layer),
        worker_count,
    );

    while !coordinator.job_status().is_terminal() {
        coordinator.perform_health_check();
        thread::sleep(Duration::from_millis(DRIVER_POLL_MS));
    }

    for handle in handles {
        if handle.join().is_err() {
            warn!("A worker thread panicked while shutting down.");
        }
    }

    let report = coordinator.job_report();
    match report.status {
        JobStatus::Done => {
            info!(
                "Job {} is done with {} output files.",
                report.job_id,
                report.output_files.len()
            )
        }
        ref status => {
            warn!("Job {} finished with status {:?}.", report.job_id, status)
        }
    }
    Ok(report)
}
