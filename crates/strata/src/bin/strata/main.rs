mod cli;

use anyhow::Context;
use strata::engine::{provision, DryRunEngine};
use strata::namespace::Namespace;
use strata::secrets::MemorySecretStore;
use strata::stacks::Unit;

fn main() {
    use clap::Parser;
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_env("STRATA_LOG"))
        .with_writer(std::io::stderr)
        .init();

    for new_path in cli.directory.iter() {
        match new_path.canonicalize() {
            Err(e) => {
                eprintln!(
                    "Failed to resolve path for -C/--directory {}\n{}",
                    new_path.display(),
                    e
                );
                std::process::exit(1);
            }
            Ok(cwd) => {
                if let Err(err) = std::env::set_current_dir(&cwd) {
                    eprintln!("Failed to set work directory to {}\n{}", cwd.display(), err);
                    std::process::exit(1);
                }

                tracing::info!(directory=%cwd.display(), "Changed working directory");
            }
        }
    }

    let command_result = match cli.command {
        cli::Command::Plan(plan_cli) => plan(plan_cli),
        cli::Command::Flatten(flatten_cli) => flatten(flatten_cli),
    };

    if let Err(e) = command_result {
        for error in e.chain() {
            eprintln!("{error}")
        }
        std::process::exit(1);
    }
}

pub fn plan(cli: cli::PlanCommand) -> anyhow::Result<()> {
    let unit = Unit::from(cli.unit);

    let shared = Namespace::load_file(Unit::Shared.namespace(), &cli.shared)
        .with_context(|| format!("Unable to load {}", cli.shared.display()))?;
    let local_path = cli.local.as_ref().unwrap_or(&cli.shared);
    let local = Namespace::load_file(unit.namespace(), local_path)
        .with_context(|| format!("Unable to load {}", local_path.display()))?;
    let secrets = match &cli.secrets {
        Some(path) => Namespace::load_file(unit.namespace(), path)
            .with_context(|| format!("Unable to load {}", path.display()))?,
        None => local.clone(),
    };
    let store = MemorySecretStore::from_namespace(&secrets);

    let stack = unit
        .build(&shared, &local, &store)
        .with_context(|| match local.source() {
            Some(path) => format!(
                "Unable to build unit {} from {}",
                unit.namespace(),
                path.display()
            ),
            None => format!("Unable to build unit {}", unit.namespace()),
        })?;

    if !cli.dry_run {
        return output(&cli.output, &stack);
    }

    let mut engine = cli
        .fail
        .iter()
        .fold(DryRunEngine::new(), |engine, name| engine.failing(name.as_str()));
    let report = provision(&stack, &mut engine);
    output(&cli.output, &report)?;
    anyhow::ensure!(
        report.is_complete(),
        "{} descriptor(s) could not be materialized",
        report.failures().count()
    );
    Ok(())
}

pub fn flatten(cli: cli::FlattenCommand) -> anyhow::Result<()> {
    let document = Namespace::load_file(cli.namespace.as_str(), &cli.file)
        .with_context(|| format!("Unable to load {}", cli.file.display()))?;

    let settings: indexmap::IndexMap<String, String> = strata::flatten::flatten_with_prefix(
        cli.prefix.as_deref(),
        document.values(),
        &cli.separator,
    )
    .into_iter()
    .map(|setting| (setting.key, setting.value))
    .collect();

    output(&cli.output, &settings)
}

fn output(output: &cli::OutputArgs, value: &impl serde::Serialize) -> anyhow::Result<()> {
    match output.format {
        cli::OutputFormat::Yaml => serde_yaml::to_writer(std::io::stdout(), value)?,
        cli::OutputFormat::Json => serde_json::to_writer_pretty(std::io::stdout(), value)?,
    };

    Ok(())
}
