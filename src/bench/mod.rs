//! Execution collaborators: the coding agent and the test runner

pub mod agent;
pub mod command;
pub mod verifier;

pub use agent::{AgentRun, AgentRunner, CommandAgent, SUBMITTED};
pub use command::{run_json, CommandSpec};
pub use verifier::{CommandTestRunner, TestRunner};
