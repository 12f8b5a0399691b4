use ai_engine::ClassifierGate;
use anyhow::{anyhow, Context};
use dispatcher::{Account, Dispatcher, RemoteSigner};
use std::any::Any;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use ultron_agent::config::{ReportKind, Settings};
use ultron_agent::{
    logging, notify_best_effort, AgentError, Components, Execution, GitHubReportSink,
    JsonlReportSink, LogNotifier, Notifier, NullReportSink, Orchestrator, OrchestratorSettings,
    ReportSink, TelegramNotifier,
};
use ultron_core::HttpClientFactory;

const COLLABORATOR_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> ExitCode {
    let settings = match Settings::load() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("❌ {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = logging::init(&settings.logging) {
        eprintln!("❌ {}", e);
        return ExitCode::FAILURE;
    }

    info!("Ultron v{} starting", env!("CARGO_PKG_VERSION"));
    settings.log_summary();

    let notifier = build_notifier(&settings);

    match run(settings, Arc::clone(&notifier)).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("❌ Ultron crashed: {:#}", e);
            notify_best_effort(notifier.as_ref(), &format!("❌ Ultron crashed: {}", e)).await;
            ExitCode::FAILURE
        }
    }
}

async fn run(settings: Settings, notifier: Arc<dyn Notifier>) -> anyhow::Result<()> {
    let components = Components {
        gate: Arc::new(ClassifierGate::new(settings.gate.clone())),
        execution: build_execution(&settings)?,
        notifier,
        reports: build_report_sink(&settings)?,
    };

    let orchestrator_settings = OrchestratorSettings {
        poll_interval: settings.agent.poll_interval(),
        poll_timeout: settings.agent.poll_timeout(),
        check_timeout: settings.agent.check_timeout(),
    };

    let factory = Arc::new(HttpClientFactory::new(settings.agent.rpc_timeout()));
    let orchestrator = Arc::new(
        Orchestrator::start(settings.networks(), factory, components, orchestrator_settings).await?,
    );

    let cancel = CancellationToken::new();
    spawn_shutdown_listener(cancel.clone());
    #[cfg(unix)]
    spawn_refresh_listener(Arc::clone(&orchestrator), cancel.clone());

    let main_loop = tokio::spawn({
        let orchestrator = Arc::clone(&orchestrator);
        let cancel = cancel.clone();
        async move { orchestrator.run(cancel).await }
    });

    let outcome = main_loop.await;
    cancel.cancel();

    match outcome {
        Ok(()) => Ok(()),
        Err(e) => {
            orchestrator.mark_failed();
            if e.is_panic() {
                Err(anyhow!(
                    "main loop panicked: {}",
                    panic_message(e.into_panic().as_ref())
                ))
            } else {
                Err(anyhow!("main loop task failed: {}", e))
            }
        }
    }
}

fn build_notifier(settings: &Settings) -> Arc<dyn Notifier> {
    match (&settings.telegram.bot_token, &settings.telegram.chat_id) {
        (Some(token), Some(chat_id)) => {
            match TelegramNotifier::new(token.clone(), chat_id.clone(), COLLABORATOR_TIMEOUT) {
                Ok(notifier) => {
                    info!("Telegram notifications enabled");
                    Arc::new(notifier)
                }
                Err(e) => {
                    warn!("❌ Telegram error: {}, notifications go to the log", e);
                    Arc::new(LogNotifier)
                }
            }
        }
        _ => {
            info!("Telegram not configured, notifications go to the log");
            Arc::new(LogNotifier)
        }
    }
}

fn build_execution(settings: &Settings) -> anyhow::Result<Option<Execution>> {
    let Some(url) = &settings.signer.url else {
        warn!("No signer configured, running observe-only");
        return Ok(None);
    };

    let address = settings
        .signer
        .address
        .ok_or_else(|| AgentError::Config("signer.address is required".to_string()))?;

    let signer = RemoteSigner::new(url.clone(), Duration::from_secs(settings.signer.timeout_secs))
        .context("failed to build remote signer")?;

    let mut dispatcher = Dispatcher::new(Arc::new(signer));
    if let Some(limit) = settings.agent.dispatch_timeout() {
        dispatcher = dispatcher.with_timeout(limit);
    }

    info!(%address, signer = %url, "Dispatch enabled");
    Ok(Some(Execution {
        dispatcher,
        account: Account::new(address, settings.signer.key_ref.clone()),
    }))
}

fn build_report_sink(settings: &Settings) -> anyhow::Result<Arc<dyn ReportSink>> {
    let report = &settings.report;
    let sink: Arc<dyn ReportSink> = match report.kind {
        ReportKind::None => Arc::new(NullReportSink),
        ReportKind::Jsonl => {
            info!(path = %report.path.display(), "Tick reports appended to file");
            Arc::new(JsonlReportSink::new(report.path.clone()))
        }
        ReportKind::Github => {
            let repo = report
                .github_repo
                .clone()
                .ok_or_else(|| AgentError::Config("report.github_repo is required".to_string()))?;
            let token = report.github_token.clone().unwrap_or_default();
            info!(%repo, "Tick reports saved to GitHub");
            Arc::new(
                GitHubReportSink::new(repo, token, COLLABORATOR_TIMEOUT)
                    .context("failed to build GitHub report sink")?,
            )
        }
    };
    Ok(sink)
}

fn spawn_shutdown_listener(cancel: CancellationToken) {
    tokio::spawn(async move {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                match result {
                    Ok(()) => info!("Shutdown signal received, finishing in-flight work"),
                    Err(e) => {
                        error!("Failed to listen for shutdown signal: {}", e);
                        return;
                    }
                }
                cancel.cancel();
            }
            _ = cancel.cancelled() => {}
        }
    });
}

/// SIGHUP re-checks every network missing from the registry.
#[cfg(unix)]
fn spawn_refresh_listener(orchestrator: Arc<Orchestrator>, cancel: CancellationToken) {
    use tokio::signal::unix::{signal, SignalKind};

    tokio::spawn(async move {
        let mut hangup = match signal(SignalKind::hangup()) {
            Ok(stream) => stream,
            Err(e) => {
                warn!("SIGHUP handler unavailable: {}", e);
                return;
            }
        };

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                received = hangup.recv() => {
                    if received.is_none() {
                        break;
                    }
                    info!("SIGHUP received, refreshing missing networks");
                    for (network, state) in orchestrator.registry().refresh_missing().await {
                        info!(%network, ?state, "Refresh result");
                    }
                }
            }
        }
    });
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
