use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::runtime::Builder as TokioBuilder;
use workflow::config::{DeviceKind, Overrides, WorkflowConfig};
use workflow::runner::Runner;

mod generator;
mod workflow;

#[derive(Parser)]
#[command(author, version, about = "Republishes radar tape beams as gate-data packets over TCP")]
struct Args {
    /// YAML parameter file
    #[arg(long)]
    params: Option<PathBuf>,
    #[arg(long, value_enum)]
    device_type: Option<DeviceKind>,
    /// Tape device or disk image path
    #[arg(long)]
    device: Option<PathBuf>,
    #[arg(long)]
    port: Option<u16>,
    /// Log a beam header line every N transmitted beams
    #[arg(long)]
    header_print: Option<u64>,
    /// Log a running summary every N transmitted beams
    #[arg(long)]
    summary_print: Option<u64>,
    /// List the files on the tape and exit
    #[arg(long, default_value_t = false)]
    filelist: bool,
    #[arg(long, default_value_t = false)]
    debug: bool,
}

/// Sets `shutdown` on SIGINT, SIGTERM or SIGQUIT.
fn spawn_signal_watcher(shutdown: Arc<AtomicBool>) -> anyhow::Result<()> {
    let runtime = TokioBuilder::new_current_thread()
        .enable_all()
        .build()
        .context("creating runtime for signal handling")?;
    std::thread::Builder::new()
        .name("signals".into())
        .spawn(move || {
            runtime.block_on(async {
                if let Err(err) = wait_for_signal().await {
                    log::error!("signal handling failed: {}", err);
                    return;
                }
                log::info!("signal received, finishing current beam");
                shutdown.store(true, Ordering::Relaxed);
            })
        })
        .context("spawning signal thread")?;
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut quit = signal(SignalKind::quit())?;
    tokio::select! {
        _ = interrupt.recv() => {}
        _ = terminate.recv() => {}
        _ = quit.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let level = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let base = match &args.params {
        Some(path) => WorkflowConfig::load(path)?,
        None => WorkflowConfig::default(),
    };
    let config = base.apply(Overrides {
        device_type: args.device_type,
        device: args.device,
        port: args.port,
        header_print: args.header_print,
        summary_print: args.summary_print,
    });
    config.validate().context("invalid parameters")?;
    let runner = Runner::new(config);

    if args.filelist {
        for summary in runner.list_files()? {
            println!("{}", serde_json::to_string(&summary)?);
        }
        return Ok(());
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    spawn_signal_watcher(shutdown.clone())?;
    let stats = runner.serve(shutdown)?;
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}
