//! TurboPool Demo
//!
//! Starts a local TCP echo server, pools connections to it, pushes a few
//! requests through leased connections and prints the pool statistics.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{info, warn};
use turbopool::{Connection, Pool, PoolConfigBuilder, PoolError, TcpConnector, TcpTemplate};

const WORKERS: usize = 6;
const REQUESTS_PER_WORKER: usize = 5;

async fn start_echo_server() -> Result<SocketAddr> {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .context("binding echo listener")?;
    let addr = listener.local_addr()?;

    tokio::spawn(async move {
        while let Ok((mut socket, peer)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                loop {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            if socket.write_all(&buf[..n]).await.is_err() {
                                break;
                            }
                        }
                    }
                }
                tracing::debug!(%peer, "Echo client disconnected");
            });
        }
    });

    Ok(addr)
}

async fn echo(pool: &Pool<TcpConnector>, message: &str) -> Result<String> {
    let conn = loop {
        match pool.lease() {
            Ok(lease) => break lease.await?,
            Err(PoolError::CapacityExceeded) => {
                // backpressure: wait for a connection to come back
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            Err(e) => return Err(e.into()),
        }
    };

    let reply = async {
        let mut guard = conn.lock().await;
        let stream = guard.as_mut().context("connection closed")?;
        stream.write_all(message.as_bytes()).await?;
        let mut buf = vec![0u8; message.len()];
        stream.read_exact(&mut buf).await?;
        Ok::<_, anyhow::Error>(String::from_utf8(buf)?)
    }
    .await;

    pool.revert(&conn.id())?;
    reply
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,turbopool=debug".into()),
        )
        .with_target(true)
        .init();

    let addr = start_echo_server().await?;
    info!(%addr, "Echo server listening");

    let config = PoolConfigBuilder::new()
        .core_size(2)
        .max_size(4)
        .keep_alive(Duration::from_millis(300))
        .build()?;
    let pool = Pool::new(config, TcpConnector::new(), TcpTemplate::new(addr.to_string()))?;
    info!(state = %pool.stats(), "Pool ready");

    let mut workers = Vec::new();
    for worker in 0..WORKERS {
        let pool = pool.clone();
        workers.push(tokio::spawn(async move {
            for request in 0..REQUESTS_PER_WORKER {
                let message = format!("worker-{worker} request-{request}");
                match echo(&pool, &message).await {
                    Ok(reply) if reply == message => {}
                    Ok(reply) => warn!(%message, %reply, "Unexpected echo"),
                    Err(e) => warn!(error = %e, "Request failed"),
                }
            }
        }));
    }
    for worker in workers {
        worker.await?;
    }
    info!(state = %pool.stats(), "Burst finished");

    // let the sweeper trim back to the core floor
    tokio::time::sleep(Duration::from_secs(1)).await;
    info!(state = %pool.stats(), "After idle eviction");

    println!("{}", serde_json::to_string_pretty(&pool.stats())?);

    pool.shutdown()?;
    info!(state = %pool.stats(), "Pool shut down");
    Ok(())
}
