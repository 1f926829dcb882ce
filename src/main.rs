use slog::{error, info, o, warn, Logger};
use std::{process::ExitCode, sync::Arc, time::Duration};
use vecchaos::{
    api,
    args::{parse_args, ChaosArgs, Command, SmokeArgs, Target},
    client::{
        http::HttpClient,
        memory::{FaultInjector, InMemoryClient},
        VectorClient,
    },
    config::ChaosConfig,
    error::ChaosError,
    logging::terminal_logger,
    scenario::{Scenario, ScenarioRunner},
    suites::{run_has_collection, Fixtures},
};

/// A connected client for `target` and, for the in-process target, its fault switch.
async fn connect(
    target: &Target,
) -> Result<(Arc<dyn VectorClient>, Option<Arc<dyn FaultInjector>>), ChaosError> {
    match target {
        Target::Memory => {
            let client = InMemoryClient::new();
            Ok((Arc::new(client.clone()), Some(Arc::new(client))))
        }
        Target::Remote(uri) => {
            let client = HttpClient::new(uri);
            client.connect().await?;
            Ok((Arc::new(client), None))
        }
    }
}

async fn run_chaos(args: ChaosArgs, logger: Logger) -> Result<(), ChaosError> {
    let mut config = match &args.config {
        Some(path) => ChaosConfig::load(path)?,
        None => ChaosConfig::default(),
    };
    if let Some(entities) = args.entities {
        config.entities_for_search = entities;
    }

    let scenario = match &args.scenario {
        Some(path) => Scenario::load(path)?,
        None => Scenario::default_for(&args.ops, Duration::from_secs(args.phase_secs as u64)),
    };

    let (client, injector) = connect(&args.target.uri).await?;
    info!(logger, "Connected"; "target" => format!("{:?}", args.target.uri));

    let mut runner = ScenarioRunner::new(client, Arc::new(config), logger.clone());
    runner.injector = injector;
    runner.ops = args.ops;
    runner.p9 = args.p9;
    runner.show_progress = !args.no_progress;

    let status = match args.status_addr {
        Some(addr) => {
            info!(logger, "Serving checker status on {addr}");
            Some(api::serve(addr, runner.state.clone())?)
        }
        None => None,
    };

    let report = runner.run(&scenario).await;

    if let Some(handle) = status {
        handle.stop(true).await;
    }

    let report = report?;
    match serde_json::to_string_pretty(&report) {
        Ok(json) => println!("{json}"),
        Err(e) => warn!(logger, "Failed to serialize report: {e}"),
    }

    report.into_result().map(|_| ())
}

async fn fixtures(target: &Target) -> Result<Fixtures, ChaosError> {
    match target {
        Target::Memory => {
            let client = InMemoryClient::new();
            let dis_connect = client.session();
            dis_connect.disconnect();
            Ok(Fixtures {
                connect: Arc::new(client),
                dis_connect: Arc::new(dis_connect),
            })
        }
        Target::Remote(uri) => {
            let client = HttpClient::new(uri);
            client.connect().await?;

            let dis_connect = HttpClient::new(uri);
            dis_connect.connect().await?;
            dis_connect.disconnect();

            Ok(Fixtures {
                connect: Arc::new(client),
                dis_connect: Arc::new(dis_connect),
            })
        }
    }
}

async fn run_smoke(args: SmokeArgs, logger: Logger) -> Result<(), ChaosError> {
    let fixtures = fixtures(&args.target.uri).await?;

    let report = run_has_collection(&fixtures, &args.label.labels(), &logger).await;
    let failed = report.failed();
    info!(logger, "Cases finished";
        "total" => report.outcomes.len(), "failed" => failed.len());

    if let Some(first) = failed.first() {
        return Err(ChaosError::Case {
            case: first.name.clone(),
            reason: first.error.clone().unwrap_or_default(),
        });
    }

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = parse_args();
    let logger = terminal_logger(args.log_level);

    let result = match args.command {
        Command::Chaos(chaos) => run_chaos(chaos, logger.new(o!("cmd" => "chaos"))).await,
        Command::Smoke(smoke) => run_smoke(smoke, logger.new(o!("cmd" => "smoke"))).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(logger, "{e}");
            ExitCode::FAILURE
        }
    }
}
