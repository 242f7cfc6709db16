//! `RoutingGraph` over a real UDP socket against a scripted bridge.

use std::collections::HashMap;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use rosc::{OscMessage, OscPacket, OscType};
use sendgraph_core::surface::{OscSurface, REPLY_ADDR, REQUEST_PREFIX};
use sendgraph_core::{RouteValidator, RoutingError, RoutingGraph};
use sendgraph_types::{NodeHandle, ProblemKind};

/// Tiny bridge: two tracks (1 = "Kick" stereo, 2 = "Bass" 4ch with ReaComp),
/// master = 0, no sends. Echoes each request's sequence number and answers
/// until `stop` is set.
struct Bridge {
    addr: SocketAddr,
    stop: Arc<AtomicBool>,
    seen: Arc<Mutex<Vec<String>>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl Bridge {
    fn spawn() -> Self {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        socket
            .set_read_timeout(Some(Duration::from_millis(50)))
            .unwrap();
        let addr = socket.local_addr().unwrap();
        let stop = Arc::new(AtomicBool::new(false));
        let seen = Arc::new(Mutex::new(Vec::new()));

        let names: HashMap<i64, (&str, i32, Vec<&str>)> = HashMap::from([
            (0, ("MASTER", 2, vec![])),
            (1, ("Kick", 2, vec![])),
            (2, ("Bass", 4, vec!["ReaComp"])),
        ]);

        let thread_stop = Arc::clone(&stop);
        let thread_seen = Arc::clone(&seen);
        let handle = thread::spawn(move || {
            let mut buf = vec![0u8; 64 * 1024];
            while !thread_stop.load(Ordering::Relaxed) {
                let Ok((n, from)) = socket.recv_from(&mut buf) else {
                    continue;
                };
                let Ok((_, OscPacket::Message(mut msg))) = rosc::decoder::decode_udp(&buf[..n])
                else {
                    continue;
                };
                if msg.args.is_empty() {
                    continue;
                }
                let seq = msg.args.remove(0);
                let op = msg.addr.trim_start_matches(REQUEST_PREFIX).to_string();
                thread_seen.lock().unwrap().push(op.clone());
                let node = match msg.args.first() {
                    Some(OscType::Long(id)) => names.get(id),
                    _ => None,
                };
                let mut args = vec![seq];
                args.extend(match (op.as_str(), node) {
                    ("nodes", _) => vec![OscType::Int(0), OscType::Long(1), OscType::Long(2)],
                    ("master", _) => vec![OscType::Int(0), OscType::Long(0)],
                    ("sample_rate", _) => vec![OscType::Int(0), OscType::Double(48_000.0)],
                    ("contains", Some(_)) => vec![OscType::Int(0), OscType::Bool(true)],
                    ("contains", None) => vec![OscType::Int(0), OscType::Bool(false)],
                    ("insert_node", _) => {
                        vec![OscType::Int(2), OscType::String("insert_node unsupported".into())]
                    }
                    (_, None) => vec![OscType::Int(1)],
                    ("node_name", Some((name, _, _))) => {
                        vec![OscType::Int(0), OscType::String(name.to_string())]
                    }
                    ("channel_count", Some((_, ch, _))) => vec![OscType::Int(0), OscType::Int(*ch)],
                    ("main_output", Some(_)) => vec![OscType::Int(0), OscType::Bool(true)],
                    ("send_count", Some(_)) => vec![OscType::Int(0), OscType::Int(0)],
                    ("unit_count", Some((_, _, units))) => {
                        vec![OscType::Int(0), OscType::Int(units.len() as i32)]
                    }
                    ("unit_name", Some((_, _, units))) => match msg.args.get(1) {
                        Some(OscType::Int(i)) if (*i as usize) < units.len() => {
                            vec![OscType::Int(0), OscType::String(units[*i as usize].to_string())]
                        }
                        _ => vec![OscType::Int(1)],
                    },
                    ("unit_enabled", Some(_)) => vec![OscType::Int(0), OscType::Bool(true)],
                    _ => vec![OscType::Int(2), OscType::String(format!("{} unsupported", op))],
                });
                let reply = OscPacket::Message(OscMessage {
                    addr: REPLY_ADDR.to_string(),
                    args,
                });
                let _ = socket.send_to(&rosc::encoder::encode(&reply).unwrap(), from);
            }
        });

        Self {
            addr,
            stop,
            seen,
            handle: Some(handle),
        }
    }

    fn graph(&self) -> RoutingGraph {
        let surface =
            OscSurface::connect(&self.addr.to_string(), Some(Duration::from_secs(5))).unwrap();
        RoutingGraph::new(surface)
    }

    fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[test]
fn analyze_over_udp() {
    let bridge = Bridge::spawn();
    let graph = bridge.graph();

    let analysis = RouteValidator::new(&graph)
        .analyze(NodeHandle::from_raw(1), NodeHandle::from_raw(2));
    assert!(analysis.valid, "{:?}", analysis.errors);
    let map = analysis.channel_map.unwrap();
    assert_eq!(map.source_channels, 2);
    assert!(map.sidechain_available);
    // (0 + 1 + 2) samples at 48 kHz
    assert!((analysis.latency_ms - 3.0 / 48.0).abs() < 1e-9);

    let seen = bridge.seen();
    assert!(seen.iter().any(|op| op == "unit_name"));
    assert!(seen.iter().any(|op| op == "sample_rate"));
}

#[test]
fn missing_node_over_udp() {
    let bridge = Bridge::spawn();
    let graph = bridge.graph();

    let analysis = RouteValidator::new(&graph)
        .analyze(NodeHandle::from_raw(1), NodeHandle::from_raw(999));
    assert!(!analysis.valid);
    assert!(analysis.only_errors_of(ProblemKind::NotFound));

    let err = graph.node_info(NodeHandle::from_raw(999)).unwrap_err();
    assert!(matches!(err, RoutingError::NotFound(_)));
}

#[test]
fn refused_request_is_external_failure() {
    let bridge = Bridge::spawn();
    let graph = bridge.graph();
    let err = graph
        .create_node(&sendgraph_types::NodeKind::Track)
        .unwrap_err();
    assert!(matches!(err, RoutingError::ExternalCallFailure(ref m) if m.contains("unsupported")));
}
