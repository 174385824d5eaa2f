//! Service entry point: configuration, migrations, service wiring,
//! job registration, HTTP server.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use scoutbot_backend::ai::DiscoveryEngine;
use scoutbot_backend::amazon::{
    AmazonNotifier, ListingSyncChecker, OrderMonitor, SpApiClient,
};
use scoutbot_backend::api::build_router;
use scoutbot_backend::config::Config;
use scoutbot_backend::keepa::KeepaClient;
use scoutbot_backend::matcher::MatcherOverrides;
use scoutbot_backend::monitor::{DealScanner, MonitorLoop, Scheduler};
use scoutbot_backend::notifier::{LogNotifier, Notifier, WebhookNotifier};
use scoutbot_backend::scraper::{AuctionClient, AuctionScraper};
use scoutbot_backend::services::Services;
use scoutbot_backend::store::Store;

#[derive(Parser, Debug)]
#[command(name = "scoutbot", about = "Auction→marketplace arbitrage discovery backend")]
struct Args {
    /// Bind address override
    #[arg(long, env = "HOST")]
    host: Option<String>,
    /// Port override
    #[arg(long, env = "PORT")]
    port: Option<u16>,
    /// Database path override
    #[arg(long, env = "DATABASE_URL")]
    database: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut config = Config::from_env();
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(database) = args.database {
        config.database_url = database;
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone())),
        )
        .init();

    info!("Running database migrations...");
    // A failed migration must stop the process here, before any job runs
    let store = Arc::new(Store::open(&config.database_url)?);

    let overrides = Arc::new(MatcherOverrides::new());
    overrides.reload(&store.list_active_patterns()?);

    let scraper = Arc::new(AuctionScraper::new(AuctionClient::new(
        &config.scraper_user_agent,
        config.scraper_request_timeout,
        config.scraper_use_browser_fallback,
    )?));

    // Notifiers always include the log; webhook and marketplace sync
    // join when configured
    let mut notifiers: Vec<Arc<dyn Notifier>> = vec![Arc::new(LogNotifier)];
    if !config.webhook_url.is_empty() {
        notifiers.push(Arc::new(WebhookNotifier::new(
            config.webhook_url.clone(),
            config.webhook_type.clone(),
        )));
    }

    let sp_api: Option<Arc<SpApiClient>> = if config.sp_api_enabled() {
        let client = Arc::new(SpApiClient::new(&config)?);
        notifiers.push(Arc::new(AmazonNotifier::new(
            Arc::clone(&client),
            config.sp_api_seller_id.clone(),
        )));
        info!("Amazon SP-API integration enabled");
        Some(client)
    } else {
        info!("Amazon SP-API not configured — skipping");
        None
    };

    let keepa: Option<Arc<KeepaClient>> = if config.keepa_enabled() {
        info!("Keepa API integration enabled");
        Some(Arc::new(KeepaClient::new(
            config.keepa_api_key.clone(),
            config.keepa_default_stats_days,
        )?))
    } else {
        info!("Keepa API not configured — skipping");
        None
    };

    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install metrics recorder")?;

    let scheduler = Arc::new(Scheduler::new());

    // Monitor loop + alert cleanup
    let monitor = Arc::new(MonitorLoop::new(
        Arc::clone(&store),
        Arc::clone(&scraper),
        notifiers,
        config.min_check_interval,
    ));
    {
        let monitor = Arc::clone(&monitor);
        scheduler.add_job(
            "monitor_loop",
            Duration::from_secs(config.min_check_interval),
            move || {
                let monitor = Arc::clone(&monitor);
                async move { monitor.check_all().await }
            },
        );
    }
    {
        let monitor = Arc::clone(&monitor);
        scheduler.add_job("alert_cleanup", Duration::from_secs(1800), move || {
            let monitor = Arc::clone(&monitor);
            async move { monitor.expire_ended_alerts().await }
        });
    }

    // Deal scanner and discovery need the analytics provider
    let deal_scanner: Option<Arc<DealScanner>> = keepa.as_ref().map(|keepa| {
        Arc::new(DealScanner::new(
            Arc::clone(&store),
            Arc::clone(&scraper),
            Arc::clone(keepa),
            sp_api.clone(),
            Arc::clone(&overrides),
            config.clone(),
        ))
    });
    if let Some(scanner) = &deal_scanner {
        let scanner = Arc::clone(scanner);
        scheduler.add_job(
            "deal_scan",
            Duration::from_secs(config.deal_scan_interval),
            move || {
                let scanner = Arc::clone(&scanner);
                async move { scanner.scan_all().await }
            },
        );
        info!(interval = config.deal_scan_interval, "Deal scanner enabled");
    }

    let discovery_engine: Option<Arc<DiscoveryEngine>> =
        match (&keepa, config.discovery_enabled) {
            (Some(keepa), true) => {
                let engine = Arc::new(DiscoveryEngine::new(
                    Arc::clone(&store),
                    Arc::clone(&scraper),
                    Arc::clone(keepa),
                    Arc::clone(&overrides),
                    config.clone(),
                ));
                let job_engine = Arc::clone(&engine);
                scheduler.add_job(
                    "ai_discovery",
                    Duration::from_secs(config.discovery_interval),
                    move || {
                        let engine = Arc::clone(&job_engine);
                        async move {
                            engine.run_discovery_cycle().await;
                        }
                    },
                );
                info!(interval = config.discovery_interval, "AI discovery enabled");
                Some(engine)
            }
            _ => None,
        };

    // Listing reconciliation + order polling need the marketplace client
    if let Some(sp_api) = &sp_api {
        let checker = Arc::new(ListingSyncChecker::new(
            Arc::clone(sp_api),
            Arc::clone(&store),
            &config,
        ));
        scheduler.add_job("listing_sync", Duration::from_secs(3600), move || {
            let checker = Arc::clone(&checker);
            async move {
                if let Err(e) = checker.check_all().await {
                    warn!(error = ?e, "Listing sync failed");
                }
            }
        });

        let order_webhook = if config.order_webhook_url.is_empty() {
            config.webhook_url.clone()
        } else {
            config.order_webhook_url.clone()
        };
        if config.order_monitor_enabled && !order_webhook.is_empty() {
            let order_monitor = Arc::new(OrderMonitor::new(
                Arc::clone(sp_api),
                Arc::clone(&store),
                order_webhook,
                config.webhook_type.clone(),
            ));
            scheduler.add_job(
                "order_monitor",
                Duration::from_secs(config.order_monitor_interval),
                move || {
                    let order_monitor = Arc::clone(&order_monitor);
                    async move { order_monitor.check_orders().await }
                },
            );
            info!(
                interval = config.order_monitor_interval,
                "Order monitor enabled"
            );
        }
    }

    let services = Arc::new(Services {
        config: config.clone(),
        store,
        scraper,
        keepa,
        sp_api,
        overrides,
        scheduler: Arc::clone(&scheduler),
        deal_scanner,
        discovery_engine,
    });

    let app = build_router(Arc::clone(&services), metrics_handle);
    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(addr = %addr, "Server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutdown signal received");
        })
        .await?;

    scheduler.shutdown();
    info!("Server stopped");
    Ok(())
}
