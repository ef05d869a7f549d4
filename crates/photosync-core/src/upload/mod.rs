//! Ordered, single-flight upload pipeline.

mod gate;
mod processor;

pub use gate::{UploadGate, UploadPermit};
pub use processor::{
    AttemptOutcome, CycleOutcome, CycleReport, FailureReason, UploadEvent, UploadProcessor,
};
