// PINGSTAT: Fixed-Interval Latency Sampling and Latency Distribution Plots
// Copyright (C) 2024-2025 Roland Schmid <roschmi@ethz.ch> and Tibor Schneider <sctibor@ethz.ch>
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//! Probing a host for its round-trip latency.
//!
//! The sampler only needs a single capability from the network, which is captured by the
//! [`Prober`] trait: send one probe and report the elapsed round-trip time, or fail. The
//! [`IcmpProber`] implements this with ICMPv4 echo requests over a raw transport channel, which
//! requires the `CAP_NET_RAW` capability (or root).

use std::{
    io,
    net::{IpAddr, Ipv4Addr, ToSocketAddrs},
    time::{Duration, Instant},
};

use pnet::{
    packet::{
        icmp::{
            self, echo_reply::EchoReplyPacket, echo_request::MutableEchoRequestPacket, IcmpPacket,
            IcmpTypes,
        },
        ip::IpNextHeaderProtocols,
        Packet,
    },
    transport::{
        icmp_packet_iter, transport_channel, TransportChannelType::Layer4,
        TransportProtocol::Ipv4, TransportReceiver, TransportSender,
    },
};

/// Size of the echo request: 8 bytes ICMP header followed by 8 bytes payload.
const ECHO_REQUEST_SIZE: usize = 16;
/// Buffer size of the raw transport channel.
const CHANNEL_BUFFER_SIZE: usize = 4096;
/// Finest receive timeout the socket honors. Shorter timeouts are truncated to zero, which the
/// socket interprets as blocking forever.
pub const TIMEOUT_RESOLUTION: Duration = Duration::from_micros(1);

/// Reasons why a single probe did not produce a latency measurement.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("no reply within {0:?}")]
    Timeout(Duration),
    #[error("cannot resolve {0} to an IPv4 address")]
    Unresolvable(String),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Something that can measure the round-trip latency towards a host.
pub trait Prober {
    /// Issue one probe towards `host` and wait at most `timeout` for the response. On success, the
    /// returned round-trip time is never larger than `timeout`.
    fn probe(&mut self, host: &str, timeout: Duration) -> Result<Duration, ProbeError>;
}

/// Prober sending ICMPv4 echo requests and waiting for the matching echo reply.
pub struct IcmpProber {
    tx: TransportSender,
    rx: TransportReceiver,
    identifier: u16,
    sequence_number: u16,
}

impl IcmpProber {
    /// Open the raw ICMP channel. Fails if the process lacks the privileges for raw sockets.
    pub fn new() -> io::Result<Self> {
        let (tx, rx) = transport_channel(
            CHANNEL_BUFFER_SIZE,
            Layer4(Ipv4(IpNextHeaderProtocols::Icmp)),
        )?;
        Ok(Self {
            tx,
            rx,
            identifier: std::process::id() as u16,
            sequence_number: 0,
        })
    }

    fn send_echo_request(&mut self, dst: Ipv4Addr) -> io::Result<()> {
        let mut buf = [0u8; ECHO_REQUEST_SIZE];
        let request = build_echo_request(&mut buf, self.identifier, self.sequence_number)
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "echo request buffer too small"))?;
        self.tx.send_to(request, IpAddr::V4(dst))?;
        Ok(())
    }
}

impl Prober for IcmpProber {
    fn probe(&mut self, host: &str, timeout: Duration) -> Result<Duration, ProbeError> {
        let dst = resolve_ipv4(host)?;
        self.sequence_number = self.sequence_number.wrapping_add(1);

        let (identifier, sequence_number) = (self.identifier, self.sequence_number);

        let start = Instant::now();
        self.send_echo_request(dst)?;
        log::trace!("sent echo request {sequence_number} to {dst}");

        let mut replies = icmp_packet_iter(&mut self.rx);
        loop {
            let remaining = timeout.saturating_sub(start.elapsed());
            if remaining < TIMEOUT_RESOLUTION {
                return Err(ProbeError::Timeout(timeout));
            }
            let received = replies.next_with_timeout(remaining)?;
            let rtt = start.elapsed();
            match received {
                Some((packet, src)) if is_reply(&packet, src, dst, identifier, sequence_number) => {
                    return if rtt <= timeout {
                        Ok(rtt)
                    } else {
                        Err(ProbeError::Timeout(timeout))
                    };
                }
                Some((packet, src)) => {
                    log::trace!(
                        "ignoring unrelated ICMP packet {:?} from {src}",
                        packet.get_icmp_type()
                    );
                }
                None => return Err(ProbeError::Timeout(timeout)),
            }
        }
    }
}

/// Write an echo request with the given identifier and sequence number (repeated in the payload)
/// into `buf`, including its checksum. Returns `None` if `buf` is too small.
fn build_echo_request(
    buf: &mut [u8],
    identifier: u16,
    sequence_number: u16,
) -> Option<MutableEchoRequestPacket<'_>> {
    if buf.len() < ECHO_REQUEST_SIZE {
        return None;
    }
    let mut request = MutableEchoRequestPacket::new(&mut buf[..ECHO_REQUEST_SIZE])?;
    request.set_icmp_type(IcmpTypes::EchoRequest);
    request.set_identifier(identifier);
    request.set_sequence_number(sequence_number);
    request.set_payload(&u64::from(sequence_number).to_be_bytes());
    let checksum = IcmpPacket::new(request.packet())
        .map(|p| icmp::checksum(&p))
        .unwrap_or_default();
    request.set_checksum(checksum);
    Some(request)
}

/// Check whether `packet` received from `src` is the echo reply from `dst` matching the given
/// identifier and sequence number.
fn is_reply(
    packet: &IcmpPacket,
    src: IpAddr,
    dst: Ipv4Addr,
    identifier: u16,
    sequence_number: u16,
) -> bool {
    if src != IpAddr::V4(dst) || packet.get_icmp_type() != IcmpTypes::EchoReply {
        return false;
    }
    EchoReplyPacket::new(packet.packet())
        .map(|reply| {
            reply.get_identifier() == identifier && reply.get_sequence_number() == sequence_number
        })
        .unwrap_or(false)
}

/// Resolve `host` (a hostname or an address literal) to its first IPv4 address.
pub fn resolve_ipv4(host: &str) -> Result<Ipv4Addr, ProbeError> {
    if let Ok(addr) = host.parse::<Ipv4Addr>() {
        return Ok(addr);
    }
    (host, 0)
        .to_socket_addrs()
        .map_err(|_| ProbeError::Unresolvable(host.to_string()))?
        .find_map(|addr| match addr.ip() {
            IpAddr::V4(ip) => Some(ip),
            IpAddr::V6(_) => None,
        })
        .ok_or_else(|| ProbeError::Unresolvable(host.to_string()))
}
