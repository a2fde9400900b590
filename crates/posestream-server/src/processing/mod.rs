//! Frame processing: jobs, the drop-oldest queue, the detector thread and
//! the per-session loop tying them together.

pub mod job;
pub mod pipeline;
pub mod queue;
pub mod worker;

pub use job::{FrameJob, Outcome, ProcessingResult};
pub use pipeline::{LoopContext, ProcessingLoop};
pub use queue::FrameQueue;
