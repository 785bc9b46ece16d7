//! Session engine (§4.7): runs one active connection to a resolved host —
//! the UDP send/recv loops, the TCP loop, and the independent NT connector —
//! until any of them errors or the caller signals a stop.

use std::io;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::{Duration, Instant};

use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::watch;
use tokio::time::timeout;

use crate::error::BridgeError;
use crate::proto::nt::codec::{self as nt, NtEntries, NtEvent};
use crate::proto::tcp::{inbound as tcp_inbound, outbound as tcp_outbound};
use crate::proto::udp::{inbound as udp_inbound, outbound as udp_outbound};
use crate::state::{JoystickSnapshot, KeyedStore, OperatorIntent};
use crate::telemetry::TelemetryAggregator;
use crate::ui::channel::UiChannel;
use crate::ui::message::Message;

const UDP_SEND_PERIOD: Duration = Duration::from_millis(20);
const TCP_SEND_PERIOD: Duration = Duration::from_millis(100);
const NT_KEEPALIVE_PERIOD: Duration = Duration::from_millis(100);
const UDP_RECV_DEADLINE: Duration = Duration::from_millis(300);
const UDP_STALE_AFTER: Duration = Duration::from_millis(600);
const TCP_CONNECT_TIMEOUT: Duration = Duration::from_millis(300);
const NT_CONNECT_TIMEOUT: Duration = Duration::from_millis(300);
const DS_TX_STALE_AFTER: Duration = Duration::from_secs(2);
const CLOCK_TAG_PACKET_COUNT: u32 = 10;

/// Everything a session needs that outlives any single connection attempt.
pub struct SessionDeps {
    pub intent: Arc<OperatorIntent>,
    pub joysticks: Arc<KeyedStore<u8, JoystickSnapshot>>,
    pub ui: Arc<UiChannel>,
    pub telemetry: Arc<TelemetryAggregator>,
    pub nt_entries: Arc<NtEntries>,
    pub nt_last_delivered: Arc<KeyedStore<String, String>>,
    last_udp_send: StdMutex<Option<Instant>>,
}

impl SessionDeps {
    pub fn new(intent: Arc<OperatorIntent>, ui: Arc<UiChannel>) -> SessionDeps {
        SessionDeps {
            intent,
            joysticks: Arc::new(KeyedStore::default()),
            ui,
            telemetry: Arc::new(TelemetryAggregator::default()),
            nt_entries: Arc::new(NtEntries::default()),
            nt_last_delivered: Arc::new(KeyedStore::default()),
            last_udp_send: StdMutex::new(None),
        }
    }

    fn ds_tx_label(&self) -> &'static str {
        match *self.last_udp_send.lock().unwrap() {
            Some(t) if t.elapsed() <= DS_TX_STALE_AFTER => "Active",
            Some(_) => "Stale",
            None => "—",
        }
    }
}

fn snapshot_joysticks(store: &KeyedStore<u8, JoystickSnapshot>) -> [Option<JoystickSnapshot>; 6] {
    std::array::from_fn(|i| store.get(&(i as u8)))
}

/// Runs one session against `host` until a transport errors or `stop_rx`
/// reports true. Tears down cleanly either way: sockets drop, the UI is
/// told `link: disconnected`, and NT/stats caches are reset.
pub async fn run_session(
    host: &str,
    deps: Arc<SessionDeps>,
    stop_rx: watch::Receiver<bool>,
) -> Result<(), BridgeError> {
    let udp_tx_sock = UdpSocket::bind("0.0.0.0:0")
        .await
        .map_err(|source| BridgeError::TransportOpen {
            transport: "udp-tx",
            source,
        })?;
    udp_tx_sock
        .connect((host, 1110))
        .await
        .map_err(|source| BridgeError::TransportOpen {
            transport: "udp-tx",
            source,
        })?;

    let udp_rx_sock = UdpSocket::bind("0.0.0.0:1150")
        .await
        .map_err(|source| BridgeError::TransportOpen {
            transport: "udp-rx",
            source,
        })?;

    let tcp_stream = timeout(TCP_CONNECT_TIMEOUT, TcpStream::connect((host, 1740)))
        .await
        .map_err(|_| BridgeError::TransportOpen {
            transport: "tcp",
            source: io::Error::new(io::ErrorKind::TimedOut, "tcp connect timed out"),
        })?
        .map_err(|source| BridgeError::TransportOpen {
            transport: "tcp",
            source,
        })?;

    deps.ui.broadcast(Message::Link { value: "connected" });

    {
        let deps = deps.clone();
        let host = host.to_string();
        let stop = stop_rx.clone();
        tokio::spawn(async move { run_nt(&host, deps, stop).await });
    }

    let mut udp_send = tokio::spawn(udp_send_loop(udp_tx_sock, deps.clone(), stop_rx.clone()));
    let mut udp_recv = tokio::spawn(udp_recv_loop(udp_rx_sock, deps.clone(), stop_rx.clone()));
    let mut tcp = tokio::spawn(tcp_loop(tcp_stream, deps.clone(), stop_rx.clone()));

    let mut stop_rx = stop_rx;
    let result = tokio::select! {
        r = &mut udp_send => r.unwrap_or(Ok(())),
        r = &mut udp_recv => r.unwrap_or(Ok(())),
        r = &mut tcp => r.unwrap_or(Ok(())),
        _ = stop_rx.changed() => Ok(()),
    };

    udp_send.abort();
    udp_recv.abort();
    tcp.abort();

    deps.telemetry.reset();
    deps.nt_entries.clear();
    deps.nt_last_delivered.clear();
    deps.ui.broadcast(Message::StatsExtra {
        value: String::new(),
    });
    deps.ui.broadcast(Message::NtClear);
    deps.ui.broadcast(Message::Link {
        value: "disconnected",
    });

    result
}

async fn udp_send_loop(
    sock: UdpSocket,
    deps: Arc<SessionDeps>,
    mut stop_rx: watch::Receiver<bool>,
) -> Result<(), BridgeError> {
    let mut interval = tokio::time::interval(UDP_SEND_PERIOD);
    let mut seq: u16 = 0;
    let mut sent: u32 = 0;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let joysticks = snapshot_joysticks(&deps.joysticks);
                let datagram = udp_outbound::build_control_datagram(
                    seq,
                    deps.intent.estop(),
                    deps.intent.enabled(),
                    deps.intent.mode(),
                    deps.intent.alliance(),
                    deps.intent.take_restart_code(),
                    deps.intent.take_restart_rio(),
                    sent < CLOCK_TAG_PACKET_COUNT,
                    &joysticks,
                );
                sock.send(&datagram).await.map_err(|source| BridgeError::TransportIo {
                    transport: "udp-tx",
                    source,
                })?;
                *deps.last_udp_send.lock().unwrap() = Some(Instant::now());
                seq = seq.wrapping_add(2);
                sent = sent.saturating_add(1);
            }
            _ = stop_rx.changed() => return Ok(()),
        }
    }
}

async fn udp_recv_loop(
    sock: UdpSocket,
    deps: Arc<SessionDeps>,
    mut stop_rx: watch::Receiver<bool>,
) -> Result<(), BridgeError> {
    let mut buf = [0u8; 2048];
    let mut last_seen = Instant::now();
    broadcast_disconnected_stats(&deps);

    loop {
        tokio::select! {
            result = timeout(UDP_RECV_DEADLINE, sock.recv(&mut buf)) => {
                match result {
                    Ok(Ok(n)) => {
                        last_seen = Instant::now();
                        if let Some(packet) = udp_inbound::decode(&buf[..n]) {
                            broadcast_stats(&deps, &packet);
                            for (key, value) in packet.telemetry {
                                if let Some(line) = deps.telemetry.update(&key, &value) {
                                    deps.ui.broadcast(Message::StatsExtra { value: line });
                                }
                            }
                        }
                    }
                    Ok(Err(source)) => {
                        return Err(BridgeError::TransportIo { transport: "udp-rx", source });
                    }
                    Err(_) => {
                        if last_seen.elapsed() > UDP_STALE_AFTER {
                            broadcast_disconnected_stats(&deps);
                        }
                    }
                }
            }
            _ = stop_rx.changed() => return Ok(()),
        }
    }
}

fn broadcast_disconnected_stats(deps: &SessionDeps) {
    deps.ui.broadcast(Message::Stats {
        robot: "Disconnected",
        code: "—",
        estop: "—",
        brownout: "—",
        enabled: "—",
        battery: "—".to_string(),
        ds_tx: "—",
        match_time: String::new(),
    });
}

fn broadcast_stats(deps: &SessionDeps, packet: &udp_inbound::UdpStatusPacket) {
    let code = if packet.trace.contains(udp_inbound::Trace::ROBOT_CODE) {
        "Running"
    } else if packet.status.contains(udp_inbound::Status::CODE_START) {
        "Initializing"
    } else {
        "—"
    };
    let robot = if packet.trace.contains(udp_inbound::Trace::IS_ROBORIO) {
        "Connected"
    } else {
        "Simulated"
    };
    deps.ui.broadcast(Message::Stats {
        robot,
        code,
        estop: if packet.status.contains(udp_inbound::Status::ESTOP) {
            "ESTOP"
        } else {
            "OK"
        },
        brownout: if packet.status.contains(udp_inbound::Status::BROWNOUT) {
            "Yes"
        } else {
            "No"
        },
        enabled: if packet.status.contains(udp_inbound::Status::ENABLED) {
            "Enabled"
        } else {
            "Disabled"
        },
        battery: format!("{:.2} V", packet.battery),
        ds_tx: deps.ds_tx_label(),
        match_time: packet
            .match_time
            .map(|t| t.to_string())
            .unwrap_or_default(),
    });
}

async fn tcp_loop(
    mut stream: TcpStream,
    deps: Arc<SessionDeps>,
    mut stop_rx: watch::Receiver<bool>,
) -> Result<(), BridgeError> {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let mut interval = tokio::time::interval(TCP_SEND_PERIOD);
    let mut carry: Vec<u8> = Vec::new();
    let mut read_buf = [0u8; 4096];

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let joysticks = snapshot_joysticks(&deps.joysticks);
                let frame = tcp_outbound::build_tcp_frame(&deps.intent.game_data(), &joysticks);
                stream.write_all(&frame).await.map_err(|source| BridgeError::TransportIo {
                    transport: "tcp",
                    source,
                })?;
            }
            result = stream.read(&mut read_buf) => {
                let n = result.map_err(|source| BridgeError::TransportIo { transport: "tcp", source })?;
                if n == 0 {
                    return Err(BridgeError::TransportIo {
                        transport: "tcp",
                        source: io::Error::new(io::ErrorKind::UnexpectedEof, "tcp stream closed"),
                    });
                }
                carry.extend_from_slice(&read_buf[..n]);
                let (events, consumed) = tcp_inbound::parse_frames(&carry);
                carry.drain(..consumed);
                for event in events {
                    apply_tcp_event(&deps, event);
                }
            }
            _ = stop_rx.changed() => return Ok(()),
        }
    }
}

fn apply_tcp_event(deps: &SessionDeps, event: tcp_inbound::TcpEvent) {
    match event {
        tcp_inbound::TcpEvent::Log { level, message } => {
            match level {
                "error" => tracing::error!("{message}"),
                _ => tracing::info!("{message}"),
            }
            deps.ui.broadcast(Message::Log { level, message });
        }
        tcp_inbound::TcpEvent::Stat { key, value } => {
            if let Some(line) = deps.telemetry.update(&key, &value) {
                deps.ui.broadcast(Message::StatsExtra { value: line });
            }
        }
    }
}

/// Logs `source` as a [`BridgeError::NtOpen`] and tells the UI the NT link is
/// down. NT failure is never fatal to the session (§4.7 step 3).
fn nt_disconnected(deps: &SessionDeps, source: io::Error) {
    let err = BridgeError::NtOpen { source };
    tracing::debug!("{err}");
    deps.ui.broadcast(Message::NtStatus {
        value: "Disconnected".to_string(),
    });
}

async fn run_nt(host: &str, deps: Arc<SessionDeps>, mut stop_rx: watch::Receiver<bool>) {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let connect = timeout(NT_CONNECT_TIMEOUT, TcpStream::connect((host, 1735))).await;
    let mut stream = match connect {
        Ok(Ok(stream)) => stream,
        Ok(Err(source)) => {
            nt_disconnected(&deps, source);
            return;
        }
        Err(_) => {
            nt_disconnected(
                &deps,
                io::Error::new(io::ErrorKind::TimedOut, "nt connect timed out"),
            );
            return;
        }
    };

    let hello = nt::client_hello("opends-bridge");
    let mut scratch = [0u8; 2048];
    if let Err(source) = stream.write_all(&hello).await {
        nt_disconnected(&deps, source);
        return;
    }
    let _ = stream.read(&mut scratch).await;
    if let Err(source) = stream.write_all(&[0x05]).await {
        nt_disconnected(&deps, source);
        return;
    }
    let _ = stream.read(&mut scratch).await;

    let mut interval = tokio::time::interval(NT_KEEPALIVE_PERIOD);
    let mut carry: Vec<u8> = Vec::new();

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(source) = stream.write_all(&[0x00]).await {
                    nt_disconnected(&deps, source);
                    return;
                }
            }
            result = stream.read(&mut scratch) => {
                match result {
                    Err(source) => {
                        nt_disconnected(&deps, source);
                        return;
                    }
                    Ok(0) => {
                        nt_disconnected(&deps, io::Error::new(io::ErrorKind::UnexpectedEof, "nt stream closed"));
                        return;
                    }
                    Ok(n) => {
                        carry.extend_from_slice(&scratch[..n]);
                        let (events, consumed) = nt::parse_stream(&carry, &deps.nt_entries);
                        carry.drain(..consumed);
                        for event in events {
                            apply_nt_event(&deps, event);
                        }
                    }
                }
            }
            _ = stop_rx.changed() => return,
        }
    }
}

fn apply_nt_event(deps: &SessionDeps, event: NtEvent) {
    match event {
        NtEvent::Status(value) => deps.ui.broadcast(Message::NtStatus { value }),
        NtEvent::Entry { key, value } => {
            if deps.nt_last_delivered.set_if_changed(key.clone(), value.clone()) {
                deps.ui.broadcast(Message::NtEntry {
                    value: format!("{key} = {value}"),
                });
            }
        }
        NtEvent::Delete { key } => {
            deps.nt_last_delivered.remove(&key);
            deps.ui.broadcast(Message::NtDelete { value: key });
        }
        NtEvent::Clear => {
            deps.nt_last_delivered.clear();
            deps.ui.broadcast(Message::NtClear);
        }
    }
}
