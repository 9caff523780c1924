//! End-to-end session tests against fake strips on localhost

use maxsmart_sdk::{
    ChangeEvent, DeviceSession, ErrorKind, PollingMode, Protocol, SdkError, SessionConfig, WattUnit,
};
use mockito::Matcher;
use serde_json::{json, Value};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;

const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);
const SERIAL: &str = "SWP6023002003697";

/// UDP strip answering the discovery handshake and V3 commands 20 and 90
struct FakeStrip {
    port: u16,
    switches: Arc<Mutex<Vec<u8>>>,
    commands: Arc<Mutex<Vec<Value>>>,
    stuck: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl FakeStrip {
    async fn spawn(version: &str, watts: Value) -> Self {
        let socket = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let port = socket.local_addr().unwrap().port();
        let switches = Arc::new(Mutex::new(vec![0u8; 6]));
        let commands = Arc::new(Mutex::new(Vec::new()));
        let stuck = Arc::new(AtomicBool::new(false));

        let announcement = json!({
            "response": 0,
            "data": {
                "sn": SERIAL,
                "name": "Office",
                "pname": ["Desk", "Monitor", "Printer", "Lamp", "Router", "Heater"],
                "ver": version,
            }
        })
        .to_string();

        let task = {
            let switches = Arc::clone(&switches);
            let commands = Arc::clone(&commands);
            let stuck = Arc::clone(&stuck);
            tokio::spawn(async move {
                let mut buf = vec![0u8; 1024];
                loop {
                    let Ok((len, from)) = socket.recv_from(&mut buf).await else {
                        return;
                    };
                    let text = String::from_utf8_lossy(&buf[..len]).to_string();

                    let reply = if text.starts_with("00sw=all,") {
                        announcement.clone()
                    } else if let Some(body) = text.strip_prefix("V3") {
                        let request: Value = serde_json::from_str(body).unwrap();
                        commands.lock().unwrap().push(request.clone());
                        match request["cmd"].as_u64() {
                            Some(90) => json!({
                                "code": 200,
                                "response": 90,
                                "data": {"switch": *switches.lock().unwrap(), "watt": watts},
                            })
                            .to_string(),
                            Some(20) => {
                                if !stuck.load(Ordering::SeqCst) {
                                    let port = request["port"].as_u64().unwrap() as usize;
                                    let state = request["state"].as_u64().unwrap() as u8;
                                    let mut switches = switches.lock().unwrap();
                                    if port == 0 {
                                        switches.iter_mut().for_each(|s| *s = state);
                                    } else {
                                        switches[port - 1] = state;
                                    }
                                }
                                json!({"code": 200, "response": 20}).to_string()
                            }
                            _ => json!({"code": 400}).to_string(),
                        }
                    } else {
                        continue;
                    };

                    let _ = socket.send_to(reply.as_bytes(), from).await;
                }
            })
        };

        Self {
            port,
            switches,
            commands,
            stuck,
            task,
        }
    }

    fn commands_with_id(&self, cmd: u64) -> usize {
        self.commands
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c["cmd"].as_u64() == Some(cmd))
            .count()
    }
}

impl Drop for FakeStrip {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn config_for(strip: &FakeStrip) -> SessionConfig {
    SessionConfig::default()
        .with_udp_port(strip.port)
        .with_discovery_timeout(Duration::from_secs(2))
        .with_probe_timeout(Duration::from_secs(1))
        .with_retries(0)
}

fn http_port(server: &mockito::ServerGuard) -> u16 {
    server
        .host_with_port()
        .rsplit(':')
        .next()
        .and_then(|p| p.parse().ok())
        .unwrap()
}

/// A local TCP port with nothing listening on it
fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
    listener.local_addr().unwrap().port()
}

async fn udp_session() -> (FakeStrip, DeviceSession) {
    let strip = FakeStrip::spawn("5.11", json!([5200, 0, 0, 0, 0, 0])).await;
    let mut session = DeviceSession::new(LOCALHOST, config_for(&strip));
    session.initialize().await.unwrap();
    (strip, session)
}

#[tokio::test]
async fn test_initialize_over_udp_detects_milliwatts() {
    let (_strip, session) = udp_session().await;

    assert!(session.is_initialized());
    assert_eq!(session.protocol(), Some(Protocol::UdpV3));
    assert_eq!(session.watt_unit(), Some(WattUnit::Milliwatts));

    let descriptor = session.descriptor().unwrap();
    assert_eq!(descriptor.serial, SERIAL);
    assert_eq!(descriptor.firmware_version, "5.11");

    let mapping = session.port_mapping().unwrap();
    assert_eq!(mapping[&0], "Office");
    assert_eq!(mapping[&4], "Lamp");

    let state = session.read_state().await.unwrap();
    assert_eq!(state.watt_values[0], 5.2);
    assert_eq!(session.port_power(1).await.unwrap(), 5.2);
}

#[tokio::test]
async fn test_turn_on_and_off_verify_state() {
    let (strip, session) = udp_session().await;

    session.turn_on(3).await.unwrap();
    assert_eq!(strip.switches.lock().unwrap().clone(), vec![0, 0, 1, 0, 0, 0]);
    assert_eq!(session.check_state(3).await.unwrap(), 1);

    session.turn_off(3).await.unwrap();
    assert_eq!(session.check_state(3).await.unwrap(), 0);

    let set = strip
        .commands
        .lock()
        .unwrap()
        .iter()
        .find(|c| c["cmd"] == 20)
        .cloned()
        .unwrap();
    assert_eq!(set["sn"], SERIAL);
    assert_eq!(set["port"], 3);
    assert_eq!(set["state"], 1);
}

#[tokio::test]
async fn test_master_port_switches_everything() {
    let (strip, session) = udp_session().await;

    session.turn_on(0).await.unwrap();
    assert_eq!(strip.switches.lock().unwrap().clone(), vec![1; 6]);

    session.turn_off(0).await.unwrap();
    assert_eq!(strip.switches.lock().unwrap().clone(), vec![0; 6]);
}

#[tokio::test]
async fn test_stuck_relay_is_state_not_converged() {
    let (strip, session) = udp_session().await;
    strip.stuck.store(true, Ordering::SeqCst);
    let reads_before = strip.commands_with_id(90);

    let err = session.turn_on(2).await.unwrap_err();
    assert!(
        matches!(err, SdkError::StateNotConverged { port: 2, expected: 1, attempts: 3 }),
        "{:?}",
        err
    );
    assert_eq!(strip.commands_with_id(90) - reads_before, 3);
    assert!(err.kind().is_none());
}

#[tokio::test]
async fn test_rename_is_unsupported_over_udp() {
    let (strip, session) = udp_session().await;
    let sent_before = strip.commands.lock().unwrap().len();

    let err = session.rename_port(1, "Kettle").await.unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::UnsupportedOnProtocol));
    assert_eq!(strip.commands.lock().unwrap().len(), sent_before);
    assert!(session.describe_error(&err).contains("does not support"));
    assert_eq!(session.port_mapping().unwrap()[&1], "Desk");
}

#[tokio::test]
async fn test_switch_command_triggers_burst() {
    let (_strip, session) = udp_session().await;

    session.start_polling().unwrap();
    session.turn_on(1).await.unwrap();
    assert_eq!(session.polling_stats().unwrap().mode, PollingMode::Burst);

    session.stop_polling().await.unwrap();
    assert_eq!(session.polling_stats().unwrap().mode, PollingMode::Stopped);
}

#[tokio::test]
async fn test_change_detection_through_session() {
    let (strip, session) = udp_session().await;
    let mut changes = session.watch_changes("changes").await.unwrap();

    strip.switches.lock().unwrap()[5] = 1;
    let snapshot = session.force_poll().await.unwrap();
    assert_eq!(snapshot.switch_states[5], 1);
    assert_eq!(session.latest_snapshot(), Some(snapshot));

    match changes.try_recv().unwrap() {
        ChangeEvent::State { port, port_name, previous_state, current_state, .. } => {
            assert_eq!((port, previous_state, current_state), (6, 0, 1));
            assert_eq!(port_name.as_deref(), Some("Heater"));
        }
        other => panic!("unexpected event {:?}", other),
    }
    assert!(changes.try_recv().is_err());
    assert!(session.unregister_observer("changes").unwrap());
}

#[tokio::test]
async fn test_health_check_and_reinitialize() {
    let (_strip, mut session) = udp_session().await;

    let report = session.health_check().await.unwrap();
    assert!(report.healthy);
    assert!(report.error.is_none());
    assert_eq!(report.name, "Office");
    assert_eq!(report.firmware_version, "5.11");

    session.start_polling().unwrap();
    session.initialize().await.unwrap();
    assert!(session.is_initialized());
    assert_eq!(session.polling_stats().unwrap().mode, PollingMode::Stopped);

    session.close().await.unwrap();
    assert!(!session.is_initialized());
    assert!(matches!(session.health_check().await, Err(SdkError::NotInitialized(_))));
}

#[tokio::test]
async fn test_silent_device_fails_discovery() {
    let socket = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
    let port = socket.local_addr().unwrap().port();
    let config = SessionConfig::default()
        .with_udp_port(port)
        .with_discovery_timeout(Duration::from_millis(300));

    let mut session = DeviceSession::new(LOCALHOST, config);
    let err = session.initialize().await.unwrap_err();
    assert!(matches!(err, SdkError::Discovery(_)), "{:?}", err);
    assert!(!session.is_initialized());
}

#[tokio::test]
async fn test_probe_falls_back_to_alternate_protocol() {
    // Firmware 2.11 implies HTTP, but only the V3 link answers
    let strip = FakeStrip::spawn("2.11", json!([45, 0, 0, 0, 0, 0])).await;
    let config = config_for(&strip).with_http_port(closed_port());

    let mut session = DeviceSession::new(LOCALHOST, config);
    session.initialize().await.unwrap();

    assert_eq!(session.descriptor().unwrap().protocol, Protocol::Http);
    assert_eq!(session.protocol(), Some(Protocol::UdpV3));
    assert_eq!(session.watt_unit(), Some(WattUnit::Watts));
}

#[tokio::test]
async fn test_http_session_controls_and_renames() {
    let strip = FakeStrip::spawn("2.11", json!([])).await;
    let mut server = mockito::Server::new_async().await;

    server
        .mock("GET", "/")
        .match_query(Matcher::UrlEncoded("cmd".into(), "511".into()))
        .with_body(r#"{"code":200,"data":{"switch":[1,0,0,0,0,0],"watt":["5.20","0.00","0.00","0.00","0.00","0.00"]}}"#)
        .create_async()
        .await;
    let set = server
        .mock("GET", "/")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("cmd".into(), "200".into()),
            Matcher::UrlEncoded("json".into(), r#"{"port":1,"state":1}"#.into()),
        ]))
        .with_body(r#"{"code":200}"#)
        .create_async()
        .await;
    let rename = server
        .mock("GET", "/")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("cmd".into(), "201".into()),
            Matcher::UrlEncoded("json".into(), r#"{"name":"Kettle","port":2}"#.into()),
        ]))
        .with_body(r#"{"code":200}"#)
        .create_async()
        .await;
    server
        .mock("GET", "/")
        .match_query(Matcher::UrlEncoded("cmd".into(), "124".into()))
        .with_body(r#"{"code":200,"data":{"pclmac":"AA:BB:CC:00:11:22","pcldak":"","cpuid":"","server":"www.maxsmart.ch"}}"#)
        .create_async()
        .await;

    let config = config_for(&strip).with_http_port(http_port(&server));
    let mut session = DeviceSession::new(LOCALHOST, config);
    session.initialize().await.unwrap();

    assert_eq!(session.protocol(), Some(Protocol::Http));
    assert_eq!(session.watt_unit(), Some(WattUnit::Watts));
    // The V3 link was never needed
    assert_eq!(strip.commands.lock().unwrap().len(), 0);

    session.turn_on(1).await.unwrap();
    set.assert_async().await;

    session.rename_port(2, "Kettle").await.unwrap();
    rename.assert_async().await;
    assert_eq!(session.port_mapping().unwrap()[&2], "Kettle");

    assert_eq!(session.unique_id().await.unwrap(), "mac_aabbcc001122");
    assert_eq!(session.read_state().await.unwrap().watt_values[0], 5.2);
}

#[tokio::test]
async fn test_http_rejection_surfaces_kind() {
    let strip = FakeStrip::spawn("1.30", json!([])).await;
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/")
        .match_query(Matcher::UrlEncoded("cmd".into(), "511".into()))
        .with_body(r#"{"code":200,"data":{"switch":[0,0,0,0,0,0],"watt":[0,0,0,0,0,0]}}"#)
        .create_async()
        .await;
    server
        .mock("GET", "/")
        .match_query(Matcher::UrlEncoded("cmd".into(), "200".into()))
        .with_body(r#"{"code":400}"#)
        .create_async()
        .await;

    let config = config_for(&strip).with_http_port(http_port(&server));
    let mut session = DeviceSession::new(LOCALHOST, config);
    session.initialize().await.unwrap();

    let err = session.turn_on(4).await.unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::DeviceRejected));
    assert!(session.describe_error(&err).contains("rejected"));
}
