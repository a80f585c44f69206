use std::sync::Arc;

use anyhow::Result;
use followup_core::EngineConfig;
use followup_llm::LlmClient;
use followup_service::{
    AssumeConfirmed, CalendarSource, DefaultComposer, DryRunNotifier, Executor, ExecutorSettings,
    HttpCalendarSource, Notifier, Poller, PollerSettings, ReminderPoller, Stores, WebhookNotifier,
};
use followup_storage::StorageBackend;
use tokio::sync::watch;

fn build_executor(config: &EngineConfig, stores: Stores) -> Result<Executor> {
    let llm = match &config.llm {
        Some(llm) => {
            let client = LlmClient::new(llm.api_key.clone(), llm.api_url.clone(), llm.model.clone())?;
            tracing::info!(model = client.model(), "LLM composition enabled");
            Some(client)
        },
        None => {
            tracing::info!("FOLLOWUP_LLM_API_KEY not set, reengagement messages use templates");
            None
        },
    };
    let composer = Arc::new(DefaultComposer::new(
        llm,
        Arc::clone(&stores.conversations),
        config.business_hours.timezone(),
        config.max_nurture_attempts,
    ));

    let notifier: Arc<dyn Notifier> = match &config.notifier {
        Some(webhook) => {
            tracing::info!(url = %webhook.url, "webhook notifier enabled");
            Arc::new(WebhookNotifier::new(webhook, config.send_timeout)?)
        },
        None => {
            tracing::warn!("FOLLOWUP_NOTIFIER_URL not set, messages are logged and not sent");
            Arc::new(DryRunNotifier)
        },
    };

    let calendar: Arc<dyn CalendarSource> = match &config.calendar_url {
        Some(url) => Arc::new(HttpCalendarSource::new(url, config.calendar_timeout)?),
        None => {
            tracing::info!("FOLLOWUP_CALENDAR_URL not set, meeting events assumed confirmed");
            Arc::new(AssumeConfirmed)
        },
    };

    Ok(Executor::new(stores, composer, notifier, ExecutorSettings::from_config(config))
        .with_calendar(calendar))
}

pub(crate) async fn run(config: EngineConfig) -> Result<()> {
    let backend = StorageBackend::connect(config.database_url.as_deref())
        .await?
        .with_create_grace(config.create_grace);
    let stores = Stores::from_backend(Arc::new(backend));
    let executor = Arc::new(build_executor(&config, stores)?);

    let jobs = Poller::new(Arc::clone(&executor), PollerSettings::jobs(&config));
    let reminders = ReminderPoller::new(executor, PollerSettings::reminders(&config));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let signal = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl-C, shutting down");
        }
        tracing::info!("shutdown requested, draining running jobs");
        shutdown_tx.send_replace(true);
    };

    tracing::info!(
        poll_secs = config.poll_interval.as_secs(),
        reminder_poll_secs = config.reminder_poll_interval.as_secs(),
        max_workers = config.max_workers,
        "follow-up engine started"
    );
    tokio::join!(jobs.run(shutdown_rx.clone()), reminders.run(shutdown_rx), signal);
    tracing::info!("follow-up engine stopped");
    Ok(())
}
