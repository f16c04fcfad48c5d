//! Check-config command - load, validate and print the resolved profile

use clap::Args;
use colored::Colorize;
use fanin_config::WorkerConfig;
use fanin_types::ConsumerProfile;
use joiner::transform;
use serde_json::json;

use crate::CliResult;

#[derive(Args, Debug, Clone)]
pub struct CheckConfigCommand {
    /// Print the resolved settings as JSON
    #[arg(long)]
    pub json: bool,
}

impl CheckConfigCommand {
    pub fn execute(&self, config: &WorkerConfig) -> CliResult<()> {
        let profile = config.resolve_profile()?;
        config.validate(&profile)?;
        if let Err(e) = transform::lookup(&config.transform) {
            let known: Vec<&str> = transform::names().collect();
            eprintln!("{} {}", "Known transforms:".yellow(), known.join(", "));
            return Err(e.into());
        }

        if self.json {
            let rendered = serde_json::to_string_pretty(&summary(config, &profile))
                .unwrap_or_else(|_| "{}".to_string());
            println!("{}", rendered);
            return Ok(());
        }

        println!("{}", "Configuration OK".green().bold());
        println!();
        println!("  {:<16} {}", "consumer".bold(), profile.consumer_name);
        println!("  {:<16} {}", "group".bold(), profile.group_id);
        println!("  {:<16} {}", "inputs".bold(), profile.topics_input.join(", "));
        println!("  {:<16} {}", "outputs".bold(), profile.topics_output.join(", "));
        println!("  {:<16} {}", "brokers".bold(), profile.bootstrap_servers_joined());
        println!("  {:<16} {:?}", "mode".bold(), profile.mode);
        println!("  {:<16} {}s", "join timeout".bold(), profile.join_timeout.as_secs());
        println!("  {:<16} {}", "transform".bold(), config.transform);
        println!("  {:<16} {}", "workers".bold(), config.workers);
        println!("  {:<16} {}", "retry ceiling".bold(), config.delivery.retry_ceiling);
        match &config.delivery.dead_letter_topic {
            Some(topic) => println!("  {:<16} {}", "dead letters".bold(), topic),
            None => println!("  {:<16} {}", "dead letters".bold(), "dropped".yellow()),
        }
        Ok(())
    }
}

fn summary(config: &WorkerConfig, profile: &ConsumerProfile) -> serde_json::Value {
    json!({
        "consumer_name": profile.consumer_name,
        "group_id": profile.group_id,
        "topics_input": profile.topics_input,
        "topics_output": profile.topics_output,
        "bootstrap_servers": profile.bootstrap_servers,
        "mode": profile.mode,
        "join_timeout_seconds": profile.join_timeout.as_secs(),
        "metadata": profile.metadata,
        "transform": config.transform,
        "workers": config.workers,
        "delivery": config.delivery,
    })
}
