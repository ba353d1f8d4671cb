//! Core module containing the workflow engine: task abstraction, task context,
//! human review and the workflow handler.

mod app;
mod handler;
mod llm_binding;
mod registry;
mod result;
mod review;
mod task;
mod task_context;
mod task_data;
mod validation;

pub use app::*;
pub use handler::*;
pub use llm_binding::*;
pub use registry::*;
pub use result::*;
pub use review::*;
pub use task::*;
pub use task_context::*;
pub use task_data::*;
pub use validation::*;
