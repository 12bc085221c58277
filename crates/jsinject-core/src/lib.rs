pub mod action;
pub mod batch;
pub mod config;
pub mod document;
pub mod engine;
pub mod name_tree;
pub mod security_log;
pub mod summary;
pub mod vectors;

pub use action::{Action, ActionKind, ActionRef};
pub use batch::{process_batch, BatchInput, BatchProgress, CancellationToken, StopReason};
pub use config::{BatchLimits, Config};
pub use document::{DocumentHandle, LoadError, SerializeError, SerializeProfile};
pub use engine::{
    process_document, FailureKind, InjectError, InjectionOptions, ProcessingResult, VectorFailure,
};
pub use summary::{output_file_name, render_summary, SUMMARY_FILE_NAME};
pub use vectors::{find_vector, registry, vector_names, InjectionVector, VectorError, VectorScope};
