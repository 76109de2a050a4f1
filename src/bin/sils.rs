use clap::{App, Arg};
use satcore::executive::OnboardExecutive;
use satcore::services::{install_services, SimHardware};
use satcore::{settings, ExecutiveConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, oneshot, Mutex};
use tokio::time;
use tracing::{error, info, warn};

const DEFAULT_PORT: &str = "8080";
const DEFAULT_TELEMETRY_TICKS: &str = "100";
const TELEMETRY_BROADCAST_BUFFER_SIZE: usize = 256;
const UPLINK_QUEUE_SIZE: usize = 32;

/// One uplinked JSON line and the channel its ack goes back on.
struct Uplink {
    line: String,
    reply: oneshot::Sender<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let matches = App::new("satcore-sils")
        .version("0.1.0")
        .author("Space Systems Engineering Team")
        .about("Software-in-the-loop runner for the satcore executive with simulated drivers")
        .arg(
            Arg::with_name("port")
                .short("p")
                .long("port")
                .value_name("PORT")
                .help("TCP port for uplink and telemetry")
                .takes_value(true)
                .default_value(DEFAULT_PORT),
        )
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("FILE")
                .help("Executive configuration (JSON); the built-in initial mode is used otherwise")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("tick-ms")
                .long("tick-ms")
                .value_name("MS")
                .help("Tick period in milliseconds (overrides the configuration)")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("telemetry-ticks")
                .long("telemetry-ticks")
                .value_name("TICKS")
                .help("Ticks between telemetry frames")
                .takes_value(true)
                .default_value(DEFAULT_TELEMETRY_TICKS),
        )
        .get_matches();

    let port: u16 = matches.value_of("port").unwrap_or(DEFAULT_PORT).parse()?;
    let telemetry_ticks: u32 = matches
        .value_of("telemetry-ticks")
        .unwrap_or(DEFAULT_TELEMETRY_TICKS)
        .parse()?;

    let config = match matches.value_of("config") {
        Some(path) => ExecutiveConfig::from_json(&std::fs::read_to_string(path)?)?,
        None => settings::default_config(),
    };
    let tick_ms = match matches.value_of("tick-ms") {
        Some(ms) => ms.parse()?,
        None => config.tick_period_ms,
    };

    let hardware = SimHardware::new();
    let mut exec = OnboardExecutive::new();
    install_services(&mut exec, &hardware.drivers())?;
    exec.apply_config(&config)?;
    let summary = exec.start()?;
    info!(
        initialized = summary.initialized,
        failed = summary.failed.len(),
        tick_ms,
        port,
        "satcore SILS running"
    );

    let (telemetry_tx, _) = broadcast::channel::<String>(TELEMETRY_BROADCAST_BUFFER_SIZE);
    let (uplink_tx, mut uplink_rx) = mpsc::channel::<Uplink>(UPLINK_QUEUE_SIZE);

    let listener = TcpListener::bind(("127.0.0.1", port)).await?;
    info!("TCP server listening on port {}", port);
    let server = tokio::spawn(accept_clients(listener, uplink_tx, telemetry_tx.clone()));

    // The executive never leaves this task: ticks and uplinks are serialized here.
    let mut interval = time::interval(Duration::from_millis(tick_ms.max(1)));
    let mut ticks_since_frame = 0u32;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let report = exec.tick()?;
                if report.block_failures > 0 {
                    warn!(tick = report.tick, failures = report.block_failures, "block failures");
                }

                ticks_since_frame += 1;
                if ticks_since_frame >= telemetry_ticks {
                    ticks_since_frame = 0;
                    match exec.telemetry_frame().to_json() {
                        Ok(json) => {
                            // No subscribers is fine.
                            let _ = telemetry_tx.send(json);
                        }
                        Err(e) => warn!("Failed to encode telemetry: {}", e),
                    }
                }
            }
            Some(uplink) = uplink_rx.recv() => {
                let reply = match exec.receive_json(&uplink.line) {
                    Ok(ack) => match ack.to_json() {
                        Ok(json) => json,
                        Err(e) => serde_json::json!({ "error": e.to_string() }).to_string(),
                    },
                    Err(e) => serde_json::json!({ "error": e.to_string() }).to_string(),
                };
                if uplink.reply.send(reply).is_err() {
                    warn!("Client went away before its ack");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown requested");
                break;
            }
        }
    }

    server.abort();
    info!(
        resets_requested = hardware.btmgr.reset_requests(),
        "satcore SILS stopped"
    );
    Ok(())
}

async fn accept_clients(
    listener: TcpListener,
    uplink_tx: mpsc::Sender<Uplink>,
    telemetry_tx: broadcast::Sender<String>,
) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                info!("New client connected: {}", addr);
                let client_uplink = uplink_tx.clone();
                let client_telemetry_rx = telemetry_tx.subscribe();

                tokio::spawn(async move {
                    if let Err(e) = handle_client(stream, client_uplink, client_telemetry_rx).await {
                        warn!("Client {} error: {}", addr, e);
                    }
                    info!("Client {} disconnected", addr);
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}

async fn handle_client(
    stream: TcpStream,
    uplink_tx: mpsc::Sender<Uplink>,
    mut telemetry_rx: broadcast::Receiver<String>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let (reader, writer) = stream.into_split();
    let mut buf_reader = BufReader::new(reader);
    let writer = Arc::new(Mutex::new(writer));

    let telemetry_writer = Arc::clone(&writer);
    let telemetry_task = tokio::spawn(async move {
        loop {
            match telemetry_rx.recv().await {
                Ok(frame) => {
                    let mut writer_guard = telemetry_writer.lock().await;
                    if let Err(e) = writer_guard.write_all(frame.as_bytes()).await {
                        warn!("Failed to send telemetry: {}", e);
                        break;
                    }
                    if writer_guard.write_all(b"\n").await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Telemetry subscriber lagged, {} frames dropped", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let mut line = String::new();
    loop {
        line.clear();
        if buf_reader.read_line(&mut line).await? == 0 {
            break;
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        uplink_tx
            .send(Uplink {
                line: trimmed.to_string(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| "executive stopped")?;
        let ack = reply_rx.await.map_err(|_| "executive dropped the uplink")?;

        let mut writer_guard = writer.lock().await;
        writer_guard.write_all(ack.as_bytes()).await?;
        writer_guard.write_all(b"\n").await?;
        info!("Sent ack: {}", ack);
    }

    telemetry_task.abort();
    Ok(())
}
