#![forbid(unsafe_code)]

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use gatewarden_lib::admin::{self, AdminState};
use gatewarden_lib::config::{load_from_path, ConfigCache, Settings};
use gatewarden_lib::limiter::{CounterService, MemoryCounterStore};
use gatewarden_lib::proxy::forwarding::build_client;
use gatewarden_lib::proxy::{server, DefaultRateLimitPage, Pipeline};
use gatewarden_lib::rules::{normalize_ruleset, MemoryRuleStore, RuleStore, Ruleset};
use gatewarden_lib::telemetry::init_metrics;

#[derive(Parser, Debug)]
#[command(author, version, about = "Gatewarden edge rate-limiting gateway")]
struct Cli {
    /// Path to settings TOML file
    #[arg(short, long, value_name = "FILE", default_value = "gatewarden.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let settings = match load_from_path(&cli.config) {
        Ok(settings) => settings,
        Err(err) => {
            init_tracing("info", false);
            error!(%err, "failed to load settings");
            std::process::exit(1);
        }
    };
    init_tracing(&settings.logging.level, settings.logging.show_target);

    let rule_store: Arc<dyn RuleStore> = match seed_rule_store(&settings) {
        Ok(store) => store,
        Err(err) => {
            error!(%err, "failed to seed rule store");
            std::process::exit(1);
        }
    };

    let cache = Arc::new(ConfigCache::new(
        rule_store.clone(),
        Duration::from_secs(settings.cache.ttl_secs),
    ));
    let counters = Arc::new(CounterService::new(Arc::new(MemoryCounterStore::new())));

    let (metrics, registry) = match init_metrics() {
        Ok((metrics, registry)) => (Some(Arc::new(metrics)), Some(Arc::new(registry))),
        Err(err) => {
            warn!(%err, "metrics init failed, continuing without");
            (None, None)
        }
    };

    let pipeline = Arc::new(Pipeline::new(
        cache.clone(),
        counters,
        build_client(),
        settings.origin.clone(),
        Arc::new(DefaultRateLimitPage),
        settings.rate_limit_info_path.clone(),
        settings.limits.body_buffer_bytes,
        metrics,
    ));

    if let Some(admin_addr) = settings.admin_listen {
        let state = Arc::new(AdminState { store: rule_store.clone(), cache: cache.clone() });
        tokio::spawn(async move {
            if let Err(err) = admin::run(admin_addr, state, registry).await {
                error!(%err, "admin API exited with error");
            }
        });
    }

    info!(listen = ?settings.listen, "starting gateway");
    let settings = Arc::new(settings);
    if let Err(err) = server::run(settings, pipeline).await {
        error!(%err, "gateway exited with error");
        std::process::exit(1);
    }
}

fn seed_rule_store(
    settings: &Settings,
) -> Result<Arc<dyn RuleStore>, Box<dyn std::error::Error + Send + Sync>> {
    let Some(rules_file) = &settings.rules_file else {
        return Ok(Arc::new(MemoryRuleStore::new()));
    };
    let txt = std::fs::read_to_string(rules_file)?;
    let mut doc: serde_json::Value = serde_json::from_str(&txt)?;
    normalize_ruleset(&mut doc);
    let ruleset: Ruleset = serde_json::from_value(doc)?;
    info!(rules = ruleset.rules.len(), file = %rules_file.display(), "seeded ruleset");
    Ok(Arc::new(MemoryRuleStore::with_ruleset(&ruleset)?))
}

fn init_tracing(level: &str, show_target: bool) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(show_target)
        .init();
}
