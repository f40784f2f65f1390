use anyhow::Result;
use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use omni_source::{output, utils, AcquisitionPipeline, Cli, Config, PlatformRegistry};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{:#}", err);
            eprintln!("Error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(cli: &Cli) {
    let default_directive = if cli.verbose {
        "omni_source=debug"
    } else {
        "omni_source=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_directive.into());

    // Logs go to stderr; stdout is reserved for the manifest.
    let registry = tracing_subscriber::registry().with(filter);
    if cli.log_json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

async fn run(cli: Cli) -> Result<()> {
    if cli.list_platforms {
        print_platforms(&PlatformRegistry::new());
        return Ok(());
    }

    if cli.init_config {
        let path = Config::default().save(cli.config.as_deref())?;
        println!("Default configuration written to: {}", path.display());
        return Ok(());
    }

    let mut config = Config::load(cli.config.as_deref())?;
    config.apply_cli(&cli);
    config.validate()?;

    if cli.show_config {
        config.display();
        return Ok(());
    }

    let missing_deps = utils::check_dependencies();
    if !missing_deps.is_empty() && !cli.quiet {
        eprintln!("⚠️  Dependency check warnings:");
        for dep in missing_deps {
            eprintln!("   • {}", dep);
        }
        eprintln!("   (Continuing anyway - affected stages will be skipped)");
    }

    let input = cli
        .input
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("--input is required"))?;

    let pipeline = AcquisitionPipeline::new(config).show_progress(!cli.quiet);
    let summary = pipeline.run(input, &cli.outdir, cli.asr_fallback).await?;

    if !cli.quiet {
        output::print_manifest(&summary.manifest, &summary.manifest_path)?;
    }
    Ok(())
}

fn print_platforms(registry: &PlatformRegistry) {
    println!("Supported platforms:");
    for (platform, domains) in registry.list_platforms() {
        if domains.is_empty() {
            println!("  • {} ({}): any other http(s) URL", platform.display_name(), platform);
        } else {
            println!(
                "  • {} ({}): {}",
                platform.display_name(),
                platform,
                domains.join(", ")
            );
        }
    }
    println!("  • Anything else is treated as a search topic");
}
