pub mod correlation;
pub mod directory;
pub mod engine;
pub mod handlers;
pub mod message;

pub use correlation::{CorrelationTable, PendingReply};
pub use directory::{AgentDirectory, AgentInfo, Capability};
pub use engine::{ProtocolEngine, RequestOutcome};
pub use handlers::{Handler, HandlerRegistry};
pub use message::{Envelope, MessageKind, Payload};

// Action served by the news workflow
pub const NEWS_WORKFLOW_ACTION: &str = "workflow.news";
