pub mod runner;
pub mod upload;

pub use runner::{AnalysisRunner, CommandRunner, InProcessRunner};
pub use upload::UploadService;
