mod cli;

use std::fs::File;
use std::path::Path;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::Parser;
use hds::{CancellationToken, FetchOptions, HdsConfig, HdsDownloader, HdsError, ProxyConfig, Sink};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{Level, debug, error};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use cli::CliArgs;

fn main() {
    if let Err(err) = bootstrap() {
        if matches!(err.downcast_ref::<HdsError>(), Some(HdsError::Aborted)) {
            eprintln!("Stopped");
            process::exit(130);
        }
        error!(error = ?err, "download failed");
        eprintln!("Error: {err:#}");
        process::exit(1);
    }
}

#[tokio::main]
async fn bootstrap() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    init_logging(args.verbose, args.quiet);

    let mut config = HdsConfig::builder().timeout(Duration::from_secs(args.timeout));
    if let Some(user_agent) = &args.user_agent {
        config = config.user_agent(user_agent);
    }
    if let Some(proxy) = &args.proxy {
        config = config.proxy(ProxyConfig::new(proxy));
    }
    if let Some(player_hash) = &args.player_hash {
        config = config.player(player_hash);
    }
    if let Some(key) = &args.akamai_key {
        use base64::Engine;
        let key = base64::engine::general_purpose::STANDARD
            .decode(key)
            .context("--akamai-key is not valid base64")?;
        config = config.akamai_key(key);
    }

    let output = match &args.output {
        Some(output) => output.clone(),
        None => default_filename(&args.url)?,
    };

    // "-" means stdout in binary mode, which cannot be resumed.
    let (mut sink, allow_resume) = if output == "-" {
        (Sink::stream(std::io::stdout()), false)
    } else {
        let file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&output)
            .with_context(|| format!("cannot open output file {output:?}"))?;
        (Sink::file(file), !args.no_resume)
    };
    debug!(output = %output, allow_resume, "destination ready");

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        }
    });

    let progress = (!args.quiet && output != "-").then(|| {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner} {msg}").expect("static progress template"),
        );
        bar
    });
    let on_progress = progress.clone().map(|bar| {
        Arc::new(move |progress: &hds::Progress| {
            let duration = match progress.duration {
                Some(duration) => format!("/{duration:.1}"),
                None => String::new(),
            };
            bar.set_message(format!(
                "{:.1}{} s; {:.1} MB",
                progress.seconds,
                duration,
                progress.bytes_written as f64 / 1e6
            ));
            bar.tick();
        }) as hds::OnProgress
    });

    let downloader = HdsDownloader::with_config(config.build())?;
    let options = FetchOptions {
        hdnea: args.hdnea.clone(),
        allow_resume,
        on_progress,
        cancel,
    };
    let result = downloader.fetch(&args.url, &mut sink, &options).await;

    if let Some(bar) = progress {
        match &result {
            Ok(bytes) => bar.finish_with_message(format!(
                "done; {:.1} MB written to {output}",
                *bytes as f64 / 1e6
            )),
            Err(_) => bar.abandon(),
        }
    }
    result?;
    Ok(())
}

/// Derives an output name from the media URL: the second-to-last path
/// segment, which the service names after the programme.
fn default_filename(url: &str) -> anyhow::Result<String> {
    let parsed = url::Url::parse(url).context("invalid manifest URL")?;
    let segments: Vec<&str> = parsed
        .path()
        .split('/')
        .filter(|segment| !segment.is_empty())
        .collect();
    if segments.len() < 2 {
        bail!("cannot derive an output name from {url:?}; use --output");
    }
    let name = segments[segments.len() - 2];
    let name = Path::new(name)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(name);
    Ok(format!("{name}.flv"))
}

fn init_logging(verbose: bool, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .init();
}
