//! Run command - executes an unsaved chain once and prints the result

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Args;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::config::AppConfig;
use crate::domain::chain::ChainStep;
use crate::infrastructure::http::ServiceRegistry;
use crate::infrastructure::logging;
use crate::infrastructure::services::AdHocExecuteRequest;

/// Arguments for the run command
#[derive(Args, Clone, Debug)]
pub struct RunArgs {
    /// Chain definition (JSON)
    pub file: PathBuf,

    /// Run input as a JSON document
    #[arg(long, default_value = "{}")]
    pub input: String,

    /// Environment value as KEY=VALUE, repeatable
    #[arg(long = "env", value_parser = parse_env_pair)]
    pub env: Vec<(String, String)>,

    /// Owner recorded in the execution history
    #[arg(long, default_value = "cli")]
    pub owner: String,
}

/// Chain file layout
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChainFile {
    name: String,

    #[serde(default, alias = "userId", alias = "user_id")]
    owner: Option<String>,

    steps: Vec<ChainStep>,

    #[serde(default, alias = "output_template")]
    output_template: Option<Value>,
}

fn parse_env_pair(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got '{}'", raw)),
    }
}

fn build_request(args: &RunArgs, chain_json: &str) -> anyhow::Result<AdHocExecuteRequest> {
    let chain: ChainFile = serde_json::from_str(chain_json)
        .with_context(|| format!("Invalid chain file {}", args.file.display()))?;

    let input: Value = serde_json::from_str(&args.input).context("--input is not valid JSON")?;

    let env: Map<String, Value> = args
        .env
        .iter()
        .map(|(key, value)| (key.clone(), Value::String(value.clone())))
        .collect();

    Ok(AdHocExecuteRequest {
        name: chain.name,
        owner: chain.owner.unwrap_or_else(|| args.owner.clone()),
        steps: chain.steps,
        input,
        env,
        output_template: chain.output_template,
    })
}

/// Execute the chain file; fails when the run does not succeed
pub async fn run(args: RunArgs) -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load().unwrap_or_default();
    logging::init_logging(&config.logging);

    let chain_json = tokio::fs::read_to_string(&args.file)
        .await
        .with_context(|| format!("Failed to read {}", args.file.display()))?;
    let request = build_request(&args, &chain_json)?;

    let registry = Arc::new(ServiceRegistry::from_config(&config.services));
    let service = crate::create_chain_service(&config, registry).await?;

    let result = service.execute_ad_hoc(request).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);

    if !result.success {
        anyhow::bail!("Chain '{}' did not succeed", result.chain_name);
    }

    Ok(())
}
