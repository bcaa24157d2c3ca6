//! Built-in tools and plugins for Ember.
//!
//! Tools give the agent the ability to interact with the world: do math,
//! read and write files inside a sandbox, run allowlisted shell commands
//! or Python snippets, report host stats, and reach injected
//! collaborators (a knowledge source, a summarizing backend). Each is
//! packaged as a plugin in [`builtin_catalog`] so the loader treats
//! built-ins and third-party bundles the same way.

pub mod builtin;
pub mod calculator;
pub mod file_read;
pub mod file_write;
pub mod knowledge_query;
pub mod python_exec;
pub mod sandbox;
pub mod shell;
pub mod summarize;
pub mod system_stats;

pub use builtin::{BuiltinServices, SingleTool, builtin_catalog, hello_world};
pub use calculator::CalculatorTool;
pub use file_read::FileReadTool;
pub use file_write::FileWriteTool;
pub use knowledge_query::KnowledgeQueryTool;
pub use python_exec::PythonExecTool;
pub use sandbox::{Sandbox, SandboxError};
pub use shell::ShellExecTool;
pub use summarize::SummarizeTool;
pub use system_stats::{SystemSnapshot, SystemStatsTool};
