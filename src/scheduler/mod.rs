mod coordinator;
mod state;
mod task_processor;

pub use self::coordinator::Coordinator;
pub use self::task_processor::TaskProcessor;
