//! Sweep command - triggers an inactivity sweep on a running service and
//! prints the report.

use crate::cli::args::SweepArgs;
use anyhow::{bail, Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

pub async fn run_sweep(args: SweepArgs) -> Result<()> {
    let path = match args.inactive_minutes {
        Some(minutes) => format!("/sweep?inactive_minutes={minutes}"),
        None => "/sweep".to_string(),
    };
    let request = format!(
        "POST {path} HTTP/1.1\r\nHost: {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        args.endpoint
    );

    let mut stream = TcpStream::connect(&args.endpoint)
        .await
        .with_context(|| format!("unable to reach control endpoint {}", args.endpoint))?;
    stream.write_all(request.as_bytes()).await?;

    let mut response = Vec::new();
    stream.read_to_end(&mut response).await?;
    let response = String::from_utf8_lossy(&response);

    let status = response
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(0);
    let body = response
        .split_once("\r\n\r\n")
        .map_or("", |(_, body)| body)
        .trim();

    if status != 200 {
        bail!("sweep failed with status {status}: {body}");
    }
    println!("{body}");
    Ok(())
}
