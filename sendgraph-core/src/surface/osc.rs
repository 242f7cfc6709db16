//! [`ControlSurface`] over OSC/UDP, talking to a bridge script inside the DAW.
//!
//! Every trait call is one synchronous round trip: a `/sendgraph/<op>` message
//! whose first argument is a request sequence number followed by typed
//! arguments, answered by a single `/sendgraph/reply` message carrying
//! `[sequence, status, values...]`. Status is `0` ok, `1` not found or
//! `2` refused. Node handles travel as OSC `Long`s.
//!
//! Replies whose sequence does not match the outstanding request (late
//! answers to a call that already timed out) are dropped.
//!
//! There is no retry. By default there is also no reply timeout: a bridge that
//! never answers blocks the caller, matching a synchronous control API.

use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicI32, Ordering};
use std::time::Duration;

use rosc::{OscMessage, OscPacket, OscType};
use sendgraph_types::{NodeHandle, SendParam};

use super::{ControlSurface, SurfaceError, SurfaceResult};

pub const REQUEST_PREFIX: &str = "/sendgraph/";
pub const REPLY_ADDR: &str = "/sendgraph/reply";

const STATUS_OK: i32 = 0;
const STATUS_NOT_FOUND: i32 = 1;
const STATUS_REFUSED: i32 = 2;

/// Largest datagram we accept from the bridge.
const RECV_BUFFER_SIZE: usize = 64 * 1024;

pub struct OscSurface {
    socket: UdpSocket,
    server_addr: SocketAddr,
    next_seq: AtomicI32,
}

impl OscSurface {
    /// Bind an ephemeral local socket and target the bridge at `server_addr`.
    pub fn connect(server_addr: &str, reply_timeout: Option<Duration>) -> std::io::Result<Self> {
        let server_addr: SocketAddr = server_addr.parse().map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, format!("{}: {}", server_addr, e))
        })?;
        let bind_addr = if server_addr.ip().is_loopback() {
            "127.0.0.1:0"
        } else {
            "0.0.0.0:0"
        };
        let socket = UdpSocket::bind(bind_addr)?;
        socket.set_read_timeout(reply_timeout)?;
        log::info!(target: "surface::osc", "bridge at {} (local {})", server_addr, socket.local_addr()?);
        Ok(Self {
            socket,
            server_addr,
            next_seq: AtomicI32::new(1),
        })
    }

    pub fn server_addr(&self) -> SocketAddr {
        self.server_addr
    }

    fn send_message(&self, addr: &str, args: Vec<OscType>) -> SurfaceResult {
        let msg = OscPacket::Message(OscMessage {
            addr: addr.to_string(),
            args,
        });
        let buf = rosc::encoder::encode(&msg).map_err(|e| SurfaceError::Protocol(format!("{:?}", e)))?;
        self.socket.send_to(&buf, self.server_addr)?;
        Ok(())
    }

    /// Wait for the reply to request `seq`, skipping anything else.
    /// The returned values start at the status code.
    fn recv_reply(&self, seq: i32) -> SurfaceResult<Vec<OscType>> {
        let mut buf = vec![0u8; RECV_BUFFER_SIZE];
        loop {
            let (n, from) = self.socket.recv_from(&mut buf)?;
            if from != self.server_addr {
                log::debug!(target: "surface::osc", "ignoring datagram from {}", from);
                continue;
            }
            let (_, packet) = rosc::decoder::decode_udp(&buf[..n])
                .map_err(|e| SurfaceError::Protocol(format!("{:?}", e)))?;
            let Some(mut args) = find_reply(packet) else {
                continue;
            };
            let got = match args.first() {
                Some(OscType::Int(got)) => *got,
                other => {
                    return Err(SurfaceError::Protocol(format!(
                        "reply without sequence number ({:?})",
                        other
                    )))
                }
            };
            if got == seq {
                args.remove(0);
                return Ok(args);
            }
            log::debug!(target: "surface::osc", "dropping stale reply {} (waiting for {})", got, seq);
        }
    }

    /// One round trip. `not_found` builds the error for a status-1 reply.
    fn call(
        &self,
        op: &str,
        args: Vec<OscType>,
        not_found: impl FnOnce() -> SurfaceError,
    ) -> SurfaceResult<Reply> {
        let addr = format!("{}{}", REQUEST_PREFIX, op);
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        log::trace!(target: "surface::osc", "-> {} #{} {:?}", addr, seq, args);
        let mut request = Vec::with_capacity(args.len() + 1);
        request.push(OscType::Int(seq));
        request.extend(args);
        self.send_message(&addr, request)?;
        let mut values = self.recv_reply(seq)?.into_iter();
        let status = match values.next() {
            Some(OscType::Int(s)) => s,
            other => {
                return Err(SurfaceError::Protocol(format!(
                    "{}: reply without status ({:?})",
                    op, other
                )))
            }
        };
        match status {
            STATUS_OK => Ok(Reply {
                op: op.to_string(),
                values: values.collect(),
                pos: 0,
            }),
            STATUS_NOT_FOUND => Err(not_found()),
            STATUS_REFUSED => {
                let reason = match values.next() {
                    Some(OscType::String(s)) => s,
                    _ => format!("{} refused", op),
                };
                Err(SurfaceError::Rejected(reason))
            }
            other => Err(SurfaceError::Protocol(format!("{}: unknown status {}", op, other))),
        }
    }

    fn node_call(&self, op: &str, node: NodeHandle, mut extra: Vec<OscType>) -> SurfaceResult<Reply> {
        let mut args = vec![node_arg(node)];
        args.append(&mut extra);
        self.call(op, args, || SurfaceError::UnknownNode(node))
    }

    fn send_call(
        &self,
        op: &str,
        source: NodeHandle,
        index: u32,
        mut extra: Vec<OscType>,
    ) -> SurfaceResult<Reply> {
        let mut args = vec![node_arg(source), OscType::Int(index as i32)];
        args.append(&mut extra);
        self.call(op, args, || SurfaceError::UnknownSend {
            node: source,
            index,
        })
    }

    fn unit_call(
        &self,
        op: &str,
        node: NodeHandle,
        unit: u32,
        mut extra: Vec<OscType>,
    ) -> SurfaceResult<Reply> {
        let mut args = vec![node_arg(node), OscType::Int(unit as i32)];
        args.append(&mut extra);
        self.call(op, args, || SurfaceError::UnknownUnit { node, index: unit })
    }
}

fn node_arg(node: NodeHandle) -> OscType {
    OscType::Long(node.get() as i64)
}

fn find_reply(packet: OscPacket) -> Option<Vec<OscType>> {
    match packet {
        OscPacket::Message(msg) if msg.addr == REPLY_ADDR => Some(msg.args),
        OscPacket::Message(_) => None,
        OscPacket::Bundle(bundle) => bundle.content.into_iter().find_map(find_reply),
    }
}

/// Cursor over the values of a successful reply.
struct Reply {
    op: String,
    values: Vec<OscType>,
    pos: usize,
}

impl Reply {
    fn next(&mut self) -> SurfaceResult<OscType> {
        let value = self.values.get(self.pos).cloned().ok_or_else(|| {
            SurfaceError::Protocol(format!("{}: missing reply value {}", self.op, self.pos))
        })?;
        self.pos += 1;
        Ok(value)
    }

    fn mismatch(&self, expected: &str, got: &OscType) -> SurfaceError {
        SurfaceError::Protocol(format!("{}: expected {}, got {:?}", self.op, expected, got))
    }

    fn int(&mut self) -> SurfaceResult<i32> {
        match self.next()? {
            OscType::Int(v) => Ok(v),
            OscType::Long(v) => i32::try_from(v).map_err(|_| {
                SurfaceError::Protocol(format!("{}: {} does not fit in an int", self.op, v))
            }),
            other => Err(self.mismatch("int", &other)),
        }
    }

    fn count(&mut self) -> SurfaceResult<u32> {
        let v = self.int()?;
        u32::try_from(v)
            .map_err(|_| SurfaceError::Protocol(format!("{}: negative count {}", self.op, v)))
    }

    fn node(&mut self) -> SurfaceResult<NodeHandle> {
        let raw = match self.next()? {
            OscType::Long(v) => v,
            OscType::Int(v) => v as i64,
            other => return Err(self.mismatch("node handle", &other)),
        };
        u64::try_from(raw)
            .map(NodeHandle::from_raw)
            .map_err(|_| SurfaceError::Protocol(format!("{}: negative node handle {}", self.op, raw)))
    }

    fn float(&mut self) -> SurfaceResult<f64> {
        match self.next()? {
            OscType::Double(v) => Ok(v),
            OscType::Float(v) => Ok(v as f64),
            OscType::Int(v) => Ok(v as f64),
            other => Err(self.mismatch("number", &other)),
        }
    }

    fn boolean(&mut self) -> SurfaceResult<bool> {
        match self.next()? {
            OscType::Bool(v) => Ok(v),
            OscType::Int(v) => Ok(v != 0),
            other => Err(self.mismatch("bool", &other)),
        }
    }

    fn string(&mut self) -> SurfaceResult<String> {
        match self.next()? {
            OscType::String(v) => Ok(v),
            other => Err(self.mismatch("string", &other)),
        }
    }

    fn optional_float(&mut self) -> SurfaceResult<Option<f64>> {
        if self.pos >= self.values.len() {
            return Ok(None);
        }
        self.float().map(Some)
    }

    fn nodes(mut self) -> SurfaceResult<Vec<NodeHandle>> {
        let mut out = Vec::with_capacity(self.values.len());
        while self.pos < self.values.len() {
            out.push(self.node()?);
        }
        Ok(out)
    }
}

impl ControlSurface for OscSurface {
    fn nodes(&self) -> SurfaceResult<Vec<NodeHandle>> {
        self.call("nodes", Vec::new(), || SurfaceError::Rejected("nodes".into()))?
            .nodes()
    }

    fn master(&self) -> SurfaceResult<NodeHandle> {
        self.call("master", Vec::new(), || SurfaceError::Rejected("master".into()))?
            .node()
    }

    fn contains(&self, node: NodeHandle) -> SurfaceResult<bool> {
        match self.node_call("contains", node, Vec::new()) {
            Ok(mut reply) => reply.boolean(),
            Err(SurfaceError::UnknownNode(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn insert_node(&self) -> SurfaceResult<NodeHandle> {
        self.call("insert_node", Vec::new(), || {
            SurfaceError::Rejected("insert_node".into())
        })?
        .node()
    }

    fn delete_node(&self, node: NodeHandle) -> SurfaceResult<bool> {
        match self.node_call("delete_node", node, Vec::new()) {
            Ok(mut reply) => reply.boolean(),
            Err(SurfaceError::UnknownNode(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn node_name(&self, node: NodeHandle) -> SurfaceResult<String> {
        self.node_call("node_name", node, Vec::new())?.string()
    }

    fn set_node_name(&self, node: NodeHandle, name: &str) -> SurfaceResult {
        self.node_call("set_node_name", node, vec![OscType::String(name.to_string())])?;
        Ok(())
    }

    fn channel_count(&self, node: NodeHandle) -> SurfaceResult<u32> {
        self.node_call("channel_count", node, Vec::new())?.count()
    }

    fn set_channel_count(&self, node: NodeHandle, channels: u32) -> SurfaceResult {
        self.node_call("set_channel_count", node, vec![OscType::Int(channels as i32)])?;
        Ok(())
    }

    fn main_output(&self, node: NodeHandle) -> SurfaceResult<bool> {
        self.node_call("main_output", node, Vec::new())?.boolean()
    }

    fn set_main_output(&self, node: NodeHandle, enabled: bool) -> SurfaceResult {
        self.node_call("set_main_output", node, vec![OscType::Bool(enabled)])?;
        Ok(())
    }

    fn folder_depth(&self, node: NodeHandle) -> SurfaceResult<i32> {
        self.node_call("folder_depth", node, Vec::new())?.int()
    }

    fn set_folder_depth(&self, node: NodeHandle, depth: i32) -> SurfaceResult {
        self.node_call("set_folder_depth", node, vec![OscType::Int(depth)])?;
        Ok(())
    }

    fn send_count(&self, node: NodeHandle) -> SurfaceResult<u32> {
        self.node_call("send_count", node, Vec::new())?.count()
    }

    fn create_send(&self, source: NodeHandle, destination: NodeHandle) -> SurfaceResult<i32> {
        // The bridge cannot say which side was missing; report the destination
        // only when the source is known to exist.
        let reply = self.call(
            "create_send",
            vec![node_arg(source), node_arg(destination)],
            || SurfaceError::UnknownNode(destination),
        );
        match reply {
            Ok(mut r) => r.int(),
            Err(SurfaceError::UnknownNode(_)) if !self.contains(source)? => {
                Err(SurfaceError::UnknownNode(source))
            }
            Err(e) => Err(e),
        }
    }

    fn remove_send(&self, source: NodeHandle, index: u32) -> SurfaceResult<bool> {
        match self.send_call("remove_send", source, index, Vec::new()) {
            Ok(mut reply) => reply.boolean(),
            Err(SurfaceError::UnknownSend { .. }) if self.contains(source)? => Ok(false),
            Err(SurfaceError::UnknownSend { .. }) => Err(SurfaceError::UnknownNode(source)),
            Err(e) => Err(e),
        }
    }

    fn send_destination(&self, source: NodeHandle, index: u32) -> SurfaceResult<NodeHandle> {
        self.send_call("send_destination", source, index, Vec::new())?.node()
    }

    fn send_value(
        &self,
        source: NodeHandle,
        index: u32,
        param: SendParam,
    ) -> SurfaceResult<Option<f64>> {
        self.send_call(
            "send_value",
            source,
            index,
            vec![OscType::String(param.key().to_string())],
        )?
        .optional_float()
    }

    fn set_send_value(
        &self,
        source: NodeHandle,
        index: u32,
        param: SendParam,
        value: f64,
    ) -> SurfaceResult<bool> {
        self.send_call(
            "set_send_value",
            source,
            index,
            vec![OscType::String(param.key().to_string()), OscType::Double(value)],
        )?
        .boolean()
    }

    fn unit_count(&self, node: NodeHandle) -> SurfaceResult<u32> {
        self.node_call("unit_count", node, Vec::new())?.count()
    }

    fn unit_name(&self, node: NodeHandle, unit: u32) -> SurfaceResult<String> {
        self.unit_call("unit_name", node, unit, Vec::new())?.string()
    }

    fn unit_enabled(&self, node: NodeHandle, unit: u32) -> SurfaceResult<bool> {
        self.unit_call("unit_enabled", node, unit, Vec::new())?.boolean()
    }

    fn add_unit(&self, node: NodeHandle, name: &str) -> SurfaceResult<i32> {
        self.node_call("add_unit", node, vec![OscType::String(name.to_string())])?
            .int()
    }

    fn unit_param_count(&self, node: NodeHandle, unit: u32) -> SurfaceResult<u32> {
        self.unit_call("unit_param_count", node, unit, Vec::new())?.count()
    }

    fn unit_param_name(&self, node: NodeHandle, unit: u32, param: u32) -> SurfaceResult<String> {
        self.unit_call("unit_param_name", node, unit, vec![OscType::Int(param as i32)])?
            .string()
    }

    fn unit_param(&self, node: NodeHandle, unit: u32, param: u32) -> SurfaceResult<f64> {
        self.unit_call("unit_param", node, unit, vec![OscType::Int(param as i32)])?
            .float()
    }

    fn set_unit_param(
        &self,
        node: NodeHandle,
        unit: u32,
        param: u32,
        value: f64,
    ) -> SurfaceResult<bool> {
        self.unit_call(
            "set_unit_param",
            node,
            unit,
            vec![OscType::Int(param as i32), OscType::Double(value)],
        )?
        .boolean()
    }

    fn sample_rate(&self) -> SurfaceResult<f64> {
        self.call("sample_rate", Vec::new(), || {
            SurfaceError::Rejected("sample_rate".into())
        })?
        .float()
    }
}
