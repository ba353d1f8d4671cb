mod embedders;
mod llm_client;
mod message;
mod providers;

pub use embedders::*;
pub use llm_client::*;
pub use message::*;
pub use providers::*;
