//! Services separating I/O and progress reporting from compositing logic

pub mod format;
pub mod io;
pub mod progress;

pub use format::{OutputFormat, OutputFormatHandler};
pub use io::ImageIOService;
pub use progress::{
    ConsoleProgressReporter, NoOpProgressReporter, ProcessingStage, ProgressReporter,
    ProgressTracker, ProgressUpdate,
};
