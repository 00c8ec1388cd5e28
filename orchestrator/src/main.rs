use clap::{Parser, Subcommand};
use orchestrator::{
    Dispatcher, InMemoryStore, OrchestratorConfig, ProjectRecord, TestService, TestStore,
    TestSubmission,
};
use runner::{SimulatedRunner, SimulatedRunnerConfig, TestRunner, TestType};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::warn;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "checkmate")]
#[command(about = "Test execution orchestrator for the checkmate QA platform")]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a test against a target URL and follow it to completion
    Run {
        /// The site to test
        #[arg(long)]
        target_url: String,
        /// Which test suite to run
        #[arg(long, default_value = "full")]
        test_type: String,
        /// Simulated engine delay in milliseconds
        #[arg(long, default_value = "5000")]
        delay_ms: u64,
        /// Simulate an engine failure instead of the canned success
        #[arg(long)]
        fail: bool,
        /// Cancel the test after this many milliseconds
        #[arg(long)]
        cancel_after_ms: Option<u64>,
    },
    /// List the recognized test types
    Types,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path)?;
            OrchestratorConfig::from_toml_str(&raw)?
        }
        None => OrchestratorConfig::default(),
    };
    config.validate()?;

    match cli.command {
        Commands::Run {
            target_url,
            test_type,
            delay_ms,
            fail,
            cancel_after_ms,
        } => {
            run_test(
                config,
                &target_url,
                &test_type,
                Duration::from_millis(delay_ms),
                fail,
                cancel_after_ms.map(Duration::from_millis),
            )
            .await?;
        }
        Commands::Types => {
            list_types();
        }
    }

    Ok(())
}

async fn run_test(
    config: OrchestratorConfig,
    target_url: &str,
    test_type: &str,
    delay: Duration,
    fail: bool,
    cancel_after: Option<Duration>,
) -> Result<(), Box<dyn std::error::Error>> {
    let runner_config = SimulatedRunnerConfig::new().with_delay(delay);
    runner_config.validate()?;

    let engine: Arc<dyn TestRunner> = if fail {
        Arc::new(SimulatedRunner::failing(
            runner_config,
            "simulated engine failure",
        ))
    } else {
        Arc::new(SimulatedRunner::new(runner_config))
    };

    let store: Arc<dyn TestStore> = Arc::new(InMemoryStore::new());
    let dispatcher = Arc::new(Dispatcher::start(Arc::clone(&store), engine, config).await?);
    let service = TestService::new(store, dispatcher);

    let user_id = Uuid::new_v4();
    let project = service
        .create_project(ProjectRecord::new(user_id, "cli", target_url))
        .await?;

    let mut events = service.subscribe();
    let record = service
        .submit_test(
            user_id,
            TestSubmission {
                project_id: project.id,
                test_type: test_type.to_string(),
                config: None,
            },
        )
        .await?;
    println!("Submitted {} test {}", record.test_type, record.id);

    if let Some(after) = cancel_after {
        let canceller = service.clone();
        let test_id = record.id;
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            if let Err(err) = canceller.cancel_test(user_id, test_id).await {
                warn!("Cancellation request failed: {}", err);
            }
        });
    }

    loop {
        match events.recv().await {
            Ok(ev) if ev.test_id == record.id => {
                println!("  status: {}", ev.status);
                if ev.status.is_terminal() {
                    break;
                }
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }

    let finished = service.get_test(user_id, record.id).await?;
    println!("{}", serde_json::to_string_pretty(&finished)?);

    let issues = service.list_test_issues(user_id, record.id).await?;
    if !issues.is_empty() {
        println!("Discovered issues:");
        for issue in issues {
            println!("  [{}] {}: {}", issue.severity, issue.category, issue.title);
        }
    }

    let summary = service.project_summary(user_id, project.id).await?;
    println!("Project summary: {}", serde_json::to_string_pretty(&summary)?);

    Ok(())
}

fn list_types() {
    println!("Recognized test types:");
    for test_type in TestType::all() {
        println!("  - {}", test_type);
    }
}
