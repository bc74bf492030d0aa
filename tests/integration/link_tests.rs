//! TelemetryLink lifecycle against the simulated websocket transport and
//! mDNS browser.

use crate::mock_hw::RecordingSink;
use fluiddash::adapters::mdns::MdnsBrowser;
use fluiddash::adapters::ws_transport::WsTransport;
use fluiddash::app::events::AppEvent;
use fluiddash::app::ports::{ServiceRecord, TransportError, TransportEvent};
use fluiddash::config::SystemConfig;
use fluiddash::telemetry::MachineState;
use fluiddash::telemetry::link::{DiscoveryOutcome, LinkState, STATUS_REQUEST, TelemetryLink};

fn link() -> TelemetryLink<WsTransport> {
    TelemetryLink::new(WsTransport::new(), &SystemConfig::default())
}

fn connected_link(sink: &mut RecordingSink) -> TelemetryLink<WsTransport> {
    let mut l = link();
    l.connect("cnc.local", 81, 0);
    l.transport_mut().sim_push(TransportEvent::Connected);
    l.pump(10, sink);
    assert_eq!(l.state(), LinkState::Connected);
    l
}

#[test]
fn connect_opens_ws_url_and_reports_states() {
    let mut sink = RecordingSink::new();
    let mut l = link();
    l.connect("cnc.local", 81, 0);
    assert_eq!(l.transport_mut().sim_opened(), &["ws://cnc.local:81/ws".to_string()]);
    assert_eq!(l.state(), LinkState::Connecting);

    l.transport_mut().sim_push(TransportEvent::Connected);
    l.pump(10, &mut sink);

    assert!(sink.events.contains(&AppEvent::LinkStateChanged(LinkState::Connecting)));
    assert!(sink.events.contains(&AppEvent::LinkStateChanged(LinkState::Connected)));
    assert_eq!(l.status().state, MachineState::Idle);
}

#[test]
fn poll_respects_interval() {
    let mut sink = RecordingSink::new();
    let mut l = connected_link(&mut sink);

    assert!(l.poll(100));
    assert!(!l.poll(200));
    assert!(l.poll(300));
    assert_eq!(
        l.transport_mut().sim_sent(),
        &[STATUS_REQUEST.to_string(), STATUS_REQUEST.to_string()]
    );
    assert_eq!(l.stats().polls_sent, 2);
}

#[test]
fn poll_is_silent_while_offline() {
    let mut l = link();
    assert!(!l.poll(1000));
    l.connect("cnc.local", 81, 0);
    assert!(!l.poll(1000));
}

#[test]
fn frames_update_status_and_job_lifecycle() {
    let mut sink = RecordingSink::new();
    let mut l = connected_link(&mut sink);
    sink.clear();

    l.transport_mut()
        .sim_push_text("<Run|MPos:1.000,2.000,3.000|FS:500,12000|Ov:100,100,100>\nok\n");
    l.pump(1_000, &mut sink);
    assert_eq!(l.status().state, MachineState::Run);
    assert!(l.status().job_running);
    assert!(sink.events.contains(&AppEvent::JobStarted));
    assert!(sink.events.contains(&AppEvent::MachineStateChanged {
        from: MachineState::Idle,
        to: MachineState::Run
    }));

    l.transport_mut()
        .sim_push(TransportEvent::Binary(b"<Idle|MPos:1.000,2.000,3.000>".to_vec()));
    l.pump(61_000, &mut sink);
    assert!(!l.status().job_running);
    assert!(sink.events.contains(&AppEvent::JobFinished { duration_ms: 60_000 }));

    let stats = l.stats();
    assert_eq!(stats.lines_accepted, 2);
    assert_eq!(stats.lines_ignored, 1);
}

#[test]
fn disconnect_goes_offline_and_retries_on_interval() {
    let mut sink = RecordingSink::new();
    let mut l = connected_link(&mut sink);
    l.transport_mut().sim_push_text("<Run|MPos:0,0,0>");
    l.pump(100, &mut sink);

    l.transport_mut().sim_push(TransportEvent::Disconnected);
    l.pump(2_100, &mut sink);
    assert_eq!(l.state(), LinkState::Disconnected);
    assert_eq!(l.status().state, MachineState::Offline);
    assert!(sink.events.contains(&AppEvent::JobFinished { duration_ms: 2_000 }));

    // Default reconnect interval is 5 s.
    l.pump(7_000, &mut sink);
    assert_eq!(l.state(), LinkState::Disconnected);
    l.pump(7_100, &mut sink);
    assert_eq!(l.state(), LinkState::Connecting);
    assert_eq!(l.stats().connect_attempts, 2);
}

#[test]
fn connect_timeout_closes_and_goes_offline() {
    let mut sink = RecordingSink::new();
    let mut l = link();
    l.set_connect_timeout(1_000);
    l.connect("cnc.local", 81, 0);

    l.pump(999, &mut sink);
    assert_eq!(l.state(), LinkState::Connecting);
    l.pump(1_000, &mut sink);
    assert_eq!(l.state(), LinkState::Disconnected);
    assert!(!l.transport_mut().sim_is_open());
}

#[test]
fn transport_error_while_connecting_goes_offline() {
    let mut sink = RecordingSink::new();
    let mut l = link();
    l.connect("cnc.local", 81, 0);
    l.transport_mut()
        .sim_push(TransportEvent::Error(TransportError::Protocol));
    l.pump(50, &mut sink);
    assert_eq!(l.state(), LinkState::Disconnected);
}

#[test]
fn failed_open_is_retried() {
    let mut sink = RecordingSink::new();
    let mut l = link();
    l.transport_mut().sim_fail_open(true);
    l.connect("cnc.local", 81, 0);
    assert_eq!(l.state(), LinkState::Disconnected);

    l.transport_mut().sim_fail_open(false);
    l.pump(5_000, &mut sink);
    assert_eq!(l.state(), LinkState::Connecting);
    assert_eq!(l.transport_mut().sim_opened().len(), 2);
}

#[test]
fn discovery_prefers_controller_hostname() {
    let mut l = link();
    let mut mdns = MdnsBrowser::new(heapless::String::try_from("fluiddash-aabbcc").unwrap());
    mdns.sim_set_records(vec![
        ServiceRecord {
            hostname: "printer".into(),
            address: "192.168.1.20".into(),
            port: 80,
        },
        ServiceRecord {
            hostname: "FluidNC-shop".into(),
            address: "192.168.1.42".into(),
            port: 80,
        },
    ]);

    let outcome = l.discover(&mut mdns, 0);
    assert_eq!(
        outcome,
        DiscoveryOutcome::Found {
            hostname: "FluidNC-shop".into(),
            address: "192.168.1.42".into()
        }
    );
    // Websocket port stays the configured one.
    assert_eq!(l.url(), "ws://192.168.1.42:81/ws");
}

#[test]
fn discovery_falls_back_to_configured_host() {
    let mut l = link();
    let mut mdns = MdnsBrowser::new(heapless::String::try_from("fluiddash-aabbcc").unwrap());
    assert_eq!(l.discover(&mut mdns, 0), DiscoveryOutcome::Fallback);
    assert_eq!(l.host(), SystemConfig::default().controller_host.as_str());
    assert_eq!(l.state(), LinkState::Connecting);
}

#[test]
fn raw_lines_need_a_connection() {
    use fluiddash::error::{Error, LinkError};

    let mut sink = RecordingSink::new();
    let mut l = link();
    assert_eq!(l.send_line("$X"), Err(Error::Link(LinkError::NotConnected)));

    let mut l = connected_link(&mut sink);
    l.send_line("$X").unwrap();
    assert_eq!(l.transport_mut().sim_sent(), &["$X".to_string()]);
}

// ── Session boundaries ────────────────────────────────────────

#[test]
fn reconnect_mid_job_finishes_the_job_once() {
    let mut sink = RecordingSink::new();
    let mut l = connected_link(&mut sink);
    l.transport_mut().sim_push_text("<Run|MPos:1,2,3|WCO:1,1,1>");
    l.pump(1_000, &mut sink);
    assert!(sink.events.contains(&AppEvent::JobStarted));
    sink.clear();

    l.connect("other.local", 81, 5_000);
    assert_eq!(l.state(), LinkState::Connecting);
    assert!(!l.status().job_running);
    assert_eq!(l.status().state, MachineState::Offline);

    l.pump(5_010, &mut sink);
    l.pump(5_020, &mut sink);
    assert_eq!(
        sink.count(|e| *e == AppEvent::JobFinished { duration_ms: 4_000 }),
        1
    );
    assert_eq!(
        l.transport_mut().sim_opened().last().map(String::as_str),
        Some("ws://other.local:81/ws")
    );
}

#[test]
fn new_session_starts_without_work_offset() {
    let mut sink = RecordingSink::new();
    let mut l = connected_link(&mut sink);
    l.transport_mut().sim_push_text("<Idle|MPos:10,10,10|WCO:1,1,1>");
    l.pump(100, &mut sink);
    assert_eq!(l.status().work.as_slice(), &[9.0, 9.0, 9.0]);

    l.connect("cnc.local", 81, 200);
    l.transport_mut().sim_push(TransportEvent::Connected);
    l.transport_mut().sim_push_text("<Idle|MPos:5.000,5.000,5.000>");
    l.pump(300, &mut sink);

    assert_eq!(l.state(), LinkState::Connected);
    assert_eq!(l.status().work.as_slice(), &[5.0, 5.0, 5.0]);
}

#[test]
fn frames_after_close_are_dropped() {
    let mut sink = RecordingSink::new();
    let mut l = connected_link(&mut sink);
    l.transport_mut().sim_push(TransportEvent::Disconnected);
    l.pump(100, &mut sink);
    assert_eq!(l.state(), LinkState::Disconnected);
    let accepted = l.stats().lines_accepted;
    sink.clear();

    l.transport_mut().sim_push_text("<Run|MPos:0,0,0>");
    l.pump(200, &mut sink);

    assert_eq!(l.state(), LinkState::Disconnected);
    assert_eq!(l.status().state, MachineState::Offline);
    assert!(!sink.events.contains(&AppEvent::JobStarted));
    assert_eq!(l.stats().lines_accepted, accepted);
}
