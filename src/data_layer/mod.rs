mod abstraction_layer;
mod local_layer;
mod memory_layer;

pub use self::abstraction_layer::DataLayer;
pub use self::local_layer::LocalDataLayer;
pub use self::memory_layer::MemoryDataLayer;
