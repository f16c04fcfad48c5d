//! Run command - start the join workers
//!
//! Clients are created here and injected: one producer and, in the shared
//! topology, one store client are shared by every controller, while each
//! controller gets its own consumer in the profile's group.

use clap::Args;
use fanin_config::{ConfigError, WorkerConfig};
use fanin_types::AggregationMode;
use joiner::{
    connect_with_retry, transform, Aggregator, ControllerSettings, ControllerStats,
    DeliveryController, KafkaRecordSink, KafkaRecordSource, ListStore, RecordSink, RedisConfig,
    RedisListStore,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};

use crate::CliResult;

#[derive(Args, Debug, Clone)]
pub struct RunCommand {
    /// Number of poll loops, overrides the configuration
    #[arg(long, short = 'w')]
    pub workers: Option<usize>,
}

impl RunCommand {
    pub async fn execute(&self, mut config: WorkerConfig) -> CliResult<()> {
        if let Some(workers) = self.workers {
            config.workers = workers;
        }

        let profile = config.resolve_profile()?;
        config.validate(&profile)?;
        let transform = transform::lookup(&config.transform)?;
        let profile = Arc::new(profile);

        info!(
            consumer = %profile.consumer_name,
            group = %profile.group_id,
            inputs = ?profile.topics_input,
            outputs = ?profile.topics_output,
            mode = ?profile.mode,
            workers = config.workers,
            "Starting fan-in worker"
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Received shutdown signal"),
                Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
            }
            let _ = shutdown_tx.send(true);
        });

        let retry_delay = Duration::from_secs(config.kafka.connect_retry_delay_secs);
        let mut shutdown = shutdown_rx.clone();

        let store: Option<Arc<dyn ListStore>> = match profile.mode {
            AggregationMode::Local => None,
            AggregationMode::Shared => {
                let redis = RedisConfig::from_settings(&config.redis).ok_or_else(|| {
                    ConfigError::ValidationError("shared aggregation requires redis.url".to_string())
                })?;
                let Some(store) = connect_with_retry("join store", retry_delay, &mut shutdown, || {
                    RedisListStore::connect(redis.clone())
                })
                .await
                else {
                    info!("Shutdown before the join store connected");
                    return Ok(());
                };
                let store: Arc<dyn ListStore> = Arc::new(store);
                Some(store)
            }
        };

        let Some(sink) = connect_with_retry("producer", retry_delay, &mut shutdown, || {
            KafkaRecordSink::connect(&profile, &config.kafka)
        })
        .await
        else {
            info!("Shutdown before the producer connected");
            return Ok(());
        };
        let sink: Arc<dyn RecordSink> = Arc::new(sink);

        let settings = ControllerSettings::from_config(&config);
        let mut handles = Vec::with_capacity(config.workers);

        for worker_id in 0..config.workers {
            let Some(source) = connect_with_retry("consumer", retry_delay, &mut shutdown, || {
                KafkaRecordSource::connect(&profile, &config.kafka)
            })
            .await
            else {
                info!(worker = worker_id, "Shutdown before the consumer connected");
                break;
            };

            let aggregator =
                Aggregator::for_profile(&profile, store.clone(), &config.redis.key_prefix)?;
            let controller = DeliveryController::new(
                worker_id,
                profile.clone(),
                source,
                sink.clone(),
                aggregator,
                transform.clone(),
                settings.clone(),
            );
            handles.push(tokio::spawn(controller.run(shutdown_rx.clone())));
        }

        let mut totals = ControllerStats::default();
        for handle in handles {
            totals.merge(&handle.await?);
        }

        // Controllers flush on exit; this covers a shutdown before any started.
        if let Err(e) = sink.flush().await {
            error!(error = %e, "Failed to flush producer");
        }

        totals.log(&profile.consumer_name);
        info!("Fan-in worker stopped");
        Ok(())
    }
}
