pub mod serial;

pub use serial::{channel, ExecutorHandle, SerialExecutor, Task};
