use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use kubemend::clients::{create_llm_client, KubectlDriver};
use kubemend::models::ClusterSnapshot;
use kubemend::{AppConfig, ReflexiveWorkflow};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    info!("Starting kubemend - self-learning Kubernetes remediation");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 4 {
        eprintln!("Usage: kubemend <pod-name> <namespace> <error-class> [snapshot.json]");
        eprintln!("  error-class: ImagePullBackOff | CrashLoopBackOff | OOMKilled | ...");
        std::process::exit(2);
    }

    let config = AppConfig::from_env()?;
    let llm = create_llm_client(&config.llm)?;
    let driver = Arc::new(KubectlDriver::new());
    if !config.executor.dry_run {
        driver.probe().await?;
    }

    let workflow = ReflexiveWorkflow::new(config, llm, driver)?;
    let seeded = workflow.install_seed_strategies().await?;
    if seeded > 0 {
        info!("Seeded {} built-in strategies", seeded);
    }

    let snapshot = match args.get(4) {
        Some(path) => {
            let raw = std::fs::read_to_string(path)?;
            Some(serde_json::from_str::<ClusterSnapshot>(&raw)?)
        }
        None => None,
    };

    let result = workflow
        .process(&args[1], &args[2], &args[3], snapshot, None)
        .await?;

    println!("{}", serde_json::to_string_pretty(&result)?);

    if result.requires_human_intervention {
        std::process::exit(1);
    }
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,kubemend=debug"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .init();
}
