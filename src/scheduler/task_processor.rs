use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use data_layer::DataLayer;
use errors::*;
use job::Job;
use reader::Split;
use task::Task;

/// `TaskProcessor` creates the map and reduce tasks of a job.
///
/// Map tasks are created once, at submission time, by carving each input file into
/// contiguous byte-range splits. Reduce tasks are created at the phase barrier, one per
/// shard, from the run files committed by the succeeding map attempts.
pub struct TaskProcessor {
    data_layer: Arc<DataLayer + Send + Sync>,
}

impl TaskProcessor {
    pub fn new(data_layer: Arc<DataLayer + Send + Sync>) -> Self {
        TaskProcessor { data_layer }
    }

    /// Expands the job's input paths: directories become their directly contained
    /// files, sorted for reproducible split assignment.
    fn expand_input_paths(&self, job: &Job) -> Result<Vec<PathBuf>> {
        let mut input_files = Vec::new();
        for input_path in &job.options.input_paths {
            let path = Path::new(input_path);
            if self.data_layer.is_dir(path).chain_err(
                || "Failed to check if path is a directory",
            )?
            {
                let mut entries = self.data_layer.read_dir(path).chain_err(
                    || "Unable to read input directory",
                )?;
                entries.sort();
                for entry in entries {
                    if self.data_layer.is_file(&entry).chain_err(
                        || "Failed to check if path is a file",
                    )?
                    {
                        input_files.push(entry);
                    }
                }
            } else if self.data_layer.is_file(path).chain_err(
                || "Failed to check if path is a file",
            )?
            {
                input_files.push(PathBuf::from(path));
            } else {
                return Err(format!("Input path {} was not found.", input_path).into());
            }
        }
        Ok(input_files)
    }

    /// `create_map_tasks` creates a set of map tasks when given a `Job`.
    pub fn create_map_tasks(&self, job: &Job) -> Result<Vec<Task>> {
        let mut map_tasks = Vec::new();
        let split_size = job.options.split_size.max(1);

        for input_file in self.expand_input_paths(job).chain_err(
            || "Error expanding input paths.",
        )?
        {
            let input_path_str = input_file
                .to_str()
                .ok_or("Invalid input file path.")?
                .to_owned();
            let file_size = self.data_layer.file_size(&input_file).chain_err(|| {
                format!("Error getting size of input file {}", input_path_str)
            })?;

            let mut start_byte = 0;
            while start_byte < file_size {
                let end_byte = (start_byte + split_size).min(file_size);
                map_tasks.push(Task::new_map_task(
                    job.id.as_str(),
                    Split::new(input_path_str.as_str(), start_byte, end_byte),
                ));
                start_byte = end_byte;
            }
        }

        Ok(map_tasks)
    }

    /// `create_reduce_tasks` creates one reduce task per shard from a `Job` and its
    /// succeeded map tasks. Shards that received no map output still get a task, so the
    /// output layout always holds one file per shard.
    pub fn create_reduce_tasks(&self, job: &Job, completed_map_tasks: &[&Task]) -> Result<Vec<Task>> {
        let mut shard_runs: HashMap<u64, Vec<String>> = HashMap::new();

        for completed_map in completed_map_tasks {
            for (shard, run_files) in &completed_map.map_output_runs {
                let shard_files: &mut Vec<String> =
                    shard_runs.entry(*shard).or_insert_with(Vec::new);
                shard_files.extend(run_files.iter().cloned());
            }
        }

        let mut reduce_tasks = Vec::new();
        for shard in 0..job.options.reduce_shard_count {
            let mut input_runs = shard_runs.remove(&shard).unwrap_or_default();
            input_runs.sort();
            reduce_tasks.push(Task::new_reduce_task(
                job.id.as_str(),
                shard,
                input_runs,
                job.options.output_directory.as_str(),
            ));
        }

        Ok(reduce_tasks)
    }
}
