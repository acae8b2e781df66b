#![recursion_limit = "1024"]

extern crate chrono;
extern crate env_logger;
#[macro_use]
extern crate error_chain;
#[macro_use]
extern crate log;
extern crate serde;
#[macro_use]
extern crate serde_derive;
extern crate serde_json;
extern crate uuid;

pub mod errors {
    error_chain! {
        foreign_links {
            Io(::std::io::Error);
        }

        errors {
            /// A worker has not sent a heartbeat within the configured timeout. Its running
            /// task is failed and rescheduled.
            WorkerTimeout(worker_id: String) {
                description("worker timed out")
                display("worker {} timed out", worker_id)
            }

            /// A task has failed more times than the job allows. This is terminal for the job.
            RetriesExhausted(task_id: String, detail: String) {
                description("task exhausted its retries")
                display("task {} exhausted its retries: {}", task_id, detail)
            }

            /// A key, value or record could not be encoded or decoded.
            Serialisation(detail: String) {
                description("serialisation error")
                display("serialisation error: {}", detail)
            }
        }
    }
}

pub mod data_layer;
pub mod driver;
pub mod emitter;
pub mod job;
pub mod logging;
pub mod mapper;
pub mod partition;
pub mod reader;
pub mod reducer;
pub mod scheduler;
pub mod serialise;
pub mod shuffle;
pub mod task;
pub mod wordcount;
pub mod worker;

pub use driver::run_job;
pub use emitter::{EmitFinal, EmitIntermediate};
pub use job::{Job, JobOptions, JobReport, JobStatus};
pub use logging::{init_logger, output_error};
pub use mapper::Map;
pub use partition::{HashPartitioner, Partition};
pub use reader::{Record, RecordReader, Split};
pub use reducer::{Reduce, ReduceInputKV};
pub use wordcount::{WordCountMap, WordCountReduce};
