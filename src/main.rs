use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use color_eyre::eyre::{Result, WrapErr};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use webp_redirect::application::services::{
    InterceptDecision, PageSession, RequestInterceptor, ResourceType, SettingsService,
    TelemetryReporter, UrlTranscoder,
};
use webp_redirect::domain::entities::ExtensionMessage;
use webp_redirect::domain::ports::{
    CdnProbePort, PagePort, SettingsStorePort, TelemetryTransportPort,
};
use webp_redirect::infrastructure::{
    AppConfig, CliArgs, Command, HttpCdnProbe, HttpTelemetryTransport, LogTelemetryTransport,
    PageRuntime, PageScript, StorageManager, TomlSettingsStore,
};

fn init_logging(config: &AppConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.to_string()));

    if let Some(log_path) = &config.log_path {
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)?;

        let file_layer = fmt::layer()
            .with_writer(file)
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(false);

        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .init();

        info!(path = %log_path.display(), "Logging initialized");
    } else {
        let stderr_layer = fmt::layer().with_writer(std::io::stderr).with_target(false);
        tracing_subscriber::registry()
            .with(filter)
            .with(stderr_layer)
            .init();
    }

    Ok(())
}

fn load_config(args: &CliArgs) -> Result<(AppConfig, StorageManager)> {
    let storage = StorageManager::new().wrap_err("Failed to locate config directory")?;
    let mut config = storage
        .load_config(args.config.as_deref())
        .wrap_err("Failed to load config")?;
    config.merge_with_args(args);
    Ok((config, storage))
}

async fn settings_service(storage: &StorageManager) -> Arc<SettingsService> {
    let store: Arc<dyn SettingsStorePort> =
        Arc::new(TomlSettingsStore::with_path(storage.settings_path()));
    Arc::new(SettingsService::load(store).await)
}

fn rewrite(config: &AppConfig, urls: &[String]) {
    let mut transcoder = UrlTranscoder::new(config.transcoder_config());
    for url in urls {
        match transcoder.to_cdn_url(url) {
            Some(cdn_url) => println!("{url}\t{cdn_url}"),
            None => println!("{url}\t-"),
        }
    }
}

fn reconstruct(config: &AppConfig, urls: &[String]) {
    let transcoder = UrlTranscoder::new(config.transcoder_config());
    for url in urls {
        println!("{url}");
        for candidate in transcoder.reconstruct_original(url) {
            println!("  {candidate}");
        }
    }
}

async fn intercept(
    config: &AppConfig,
    storage: &StorageManager,
    url: &str,
    resource_type: &str,
) -> Result<()> {
    let probe: Option<Arc<dyn CdnProbePort>> = if config.intercept.verify_cdn {
        let timeout = Duration::from_secs(config.intercept.probe_timeout_secs);
        Some(Arc::new(HttpCdnProbe::new(timeout).wrap_err("Failed to create CDN probe")?))
    } else {
        None
    };

    let interceptor = RequestInterceptor::new(config.transcoder_config(), probe);
    interceptor.set_enabled(settings_service(storage).await.current().is_enabled);

    let resource_type: ResourceType = resource_type.parse().unwrap_or(ResourceType::Other);
    match interceptor.decide(url, resource_type).await {
        InterceptDecision::Allow => println!("allow"),
        InterceptDecision::Redirect(target) => println!("redirect {target}"),
    }
    Ok(())
}

async fn apply_message(storage: &StorageManager, json: &str) -> Result<()> {
    let message: ExtensionMessage =
        serde_json::from_str(json).wrap_err("Failed to parse extension message")?;
    let service = settings_service(storage).await;

    let outcome = service.handle(&message).await?;
    match outcome.response {
        Some(response) => println!("{}", serde_json::to_string(&response)?),
        None => println!("ok"),
    }
    Ok(())
}

async fn replay(
    config: &AppConfig,
    storage: &StorageManager,
    script: &std::path::Path,
    dry_run: bool,
) -> Result<()> {
    let script = PageScript::load(script)
        .await
        .wrap_err("Failed to load page script")?;

    let transport: Arc<dyn TelemetryTransportPort> = if dry_run {
        Arc::new(LogTelemetryTransport)
    } else {
        Arc::new(HttpTelemetryTransport::new(
            config.telemetry.endpoint.clone(),
            Duration::from_secs(config.telemetry.timeout_secs),
        )?)
    };

    let service = settings_service(storage).await;
    let (page, feed) = script.into_parts();
    let host = page.hostname().to_string();

    let reporter = TelemetryReporter::new(config.reporter_config(), page.page_url(), transport);
    let session = PageSession::new(config.session_config(), &service.current(), &host, reporter);

    let report = PageRuntime::new(page, session)
        .with_settings(service)
        .run(feed)
        .await;

    info!(
        events = report.events,
        assignments = report.page.assignments().len(),
        mappings = %report.session.transcoder().cache().stats(),
        "Replay finished"
    );
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "assignments": report.page.assignments(),
            "sources": report.page.sources(),
            "responses": report.responses,
        }))?
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = CliArgs::parse();
    let (config, storage) = load_config(&args)?;

    init_logging(&config)?;

    info!(version = webp_redirect::VERSION, "Starting webp-redirect");

    match &args.command {
        Command::Rewrite { urls } => rewrite(&config, urls),
        Command::Reconstruct { urls } => reconstruct(&config, urls),
        Command::Intercept { url, resource_type } => {
            intercept(&config, &storage, url, resource_type).await?;
        }
        Command::Message { json } => apply_message(&storage, json).await?,
        Command::Settings => {
            let settings = settings_service(&storage).await.current();
            print!("{}", toml::to_string_pretty(&settings)?);
        }
        Command::Replay { script, dry_run } => {
            replay(&config, &storage, script, *dry_run).await?;
        }
    }

    Ok(())
}
