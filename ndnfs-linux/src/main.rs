// ndnfs-linux: copy a remote file out of an NDN file namespace.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context};
use ndnfs_linux::{config, face, Consumer};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const VERSION: &str = env!("CARGO_PKG_VERSION");

const USAGE: &str = "usage: ndnfs-linux <remote-path> [output]";

fn main() -> anyhow::Result<()> {
    let mut positional = Vec::new();
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("ndnfs-linux {}", VERSION);
                return Ok(());
            }
            "--help" | "-h" => {
                println!("{}", USAGE);
                return Ok(());
            }
            _ => positional.push(arg),
        }
    }
    let (remote, output) = match positional.as_slice() {
        [remote] => (remote.clone(), default_output(remote)?),
        [remote, output] => (remote.clone(), PathBuf::from(output)),
        _ => bail!(USAGE),
    };

    let cfg = config::load();
    init_tracing(&cfg.log_level);

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    rt.block_on(async {
        let face = face::connect(cfg.forwarder.as_str())
            .await
            .with_context(|| format!("cannot reach forwarder at {}", cfg.forwarder))?;
        let mut consumer = Consumer::new(face, &cfg.fetch_config())?;

        let result = tokio::select! {
            r = copy_file(&mut consumer, &remote, &output, cfg.read_chunk_size) => r,
            r = shutdown_signal() => {
                warn!("interrupted, stopping copy");
                r.and_then(|()| Err(anyhow::anyhow!("copy of {} interrupted", remote)))
            }
        };
        consumer.close().await;
        result
    })
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn default_output(remote: &str) -> anyhow::Result<PathBuf> {
    match Path::new(remote).file_name() {
        Some(name) => Ok(PathBuf::from(name)),
        None => bail!("no file name in {}, give an output path", remote),
    }
}

async fn copy_file(
    consumer: &mut Consumer,
    remote: &str,
    output: &Path,
    chunk_size: usize,
) -> anyhow::Result<()> {
    let started = Instant::now();
    let info = consumer
        .stat(remote)
        .await
        .with_context(|| format!("stat {}", remote))?;
    info!(path = remote, size = info.size, "remote file");

    let mut out =
        File::create(output).with_context(|| format!("create {}", output.display()))?;
    let mut buf = vec![0u8; chunk_size.max(1)];
    let mut offset = 0u64;
    while offset < info.size {
        let want = (info.size - offset).min(buf.len() as u64) as usize;
        let n = consumer
            .read_at(&mut buf[..want], offset, remote)
            .await
            .with_context(|| format!("read {} at {}", remote, offset))?;
        if n == 0 {
            warn!(offset, size = info.size, "remote file ended early");
            break;
        }
        out.write_all(&buf[..n])?;
        offset += n as u64;
    }
    out.flush()?;

    let secs = started.elapsed().as_secs_f64();
    let mbps = if secs > 0.0 {
        offset as f64 * 8.0 / secs / 1e6
    } else {
        0.0
    };
    info!(bytes = offset, seconds = secs, goodput_mbps = mbps, "copy finished");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM (Unix).
async fn shutdown_signal() -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
    }
    Ok(())
}
