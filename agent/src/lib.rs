pub mod config;
pub mod error;
pub mod logging;
pub mod notify;
pub mod orchestrator;
pub mod report;

pub use config::Settings;
pub use error::AgentError;
pub use notify::{notify_best_effort, LogNotifier, Notifier, NotifyError, TelegramNotifier};
pub use orchestrator::{
    Components, Execution, NetworkReport, Orchestrator, OrchestratorSettings, OrchestratorState,
    TickReport,
};
pub use report::{save_best_effort, GitHubReportSink, JsonlReportSink, NullReportSink, ReportSink};
