use std::io::Read;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use clap::Parser;
use socket2::{Domain, Protocol, Socket, Type};

use mpegts_demux::{DataPayload, DemuxError, Demuxer};

#[derive(Parser)]
#[command(about = "Dump MPEG-TS tables and PES headers as JSON lines")]
struct Opt {
    /// Input: a capture file path, or udp://ADDR:PORT (multicast is joined
    /// automatically)
    input: String,

    /// Frame size (188, 192 or 204); probed from the stream when omitted
    #[clap(long)]
    packet_size: Option<usize>,

    /// Stop after this many data units (0 = unlimited)
    #[clap(long, default_value_t = 0)]
    limit: u64,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let opt = Opt::parse();

    if let Some(addr) = opt.input.strip_prefix("udp://") {
        let socket: std::net::UdpSocket = create_udp_socket(addr)?.into();
        run(build(UdpReader(socket), &opt), opt.limit)
    } else {
        let file = std::fs::File::open(&opt.input)?;
        run(build(file, &opt), opt.limit)
    }
}

fn build<R: Read>(r: R, opt: &Opt) -> Demuxer<R> {
    let mut dmx = Demuxer::new(r);
    if let Some(size) = opt.packet_size {
        dmx = dmx.with_packet_size(size);
    }
    dmx
}

fn run<R: Read>(mut dmx: Demuxer<R>, limit: u64) -> anyhow::Result<()> {
    let mut count = 0u64;
    loop {
        match dmx.next_data() {
            Ok(d) => {
                let (kind, data) = describe(&d.payload);
                let line = serde_json::json!({
                    "time": chrono::Utc::now().to_rfc3339(),
                    "pid": d.pid,
                    "kind": kind,
                    "data": data,
                });
                println!("{line}");
                count += 1;
                if limit > 0 && count >= limit {
                    return Ok(());
                }
            }
            Err(DemuxError::NoMorePackets) => return Ok(()),
            Err(e) if e.is_fatal() => return Err(e.into()),
            Err(e) => log::warn!("skipping unit: {e}"),
        }
    }
}

fn describe(p: &DataPayload) -> (&'static str, serde_json::Value) {
    match p {
        DataPayload::Pat(t) => ("PAT", serde_json::to_value(t).unwrap_or_default()),
        DataPayload::Pmt(t) => ("PMT", serde_json::to_value(t).unwrap_or_default()),
        DataPayload::Nit(t) => ("NIT", serde_json::to_value(t).unwrap_or_default()),
        DataPayload::Sdt(t) => ("SDT", serde_json::to_value(t).unwrap_or_default()),
        DataPayload::Eit(t) => ("EIT", serde_json::to_value(t).unwrap_or_default()),
        DataPayload::Tot(t) => ("TOT", serde_json::to_value(t).unwrap_or_default()),
        // ES bytes stay out of the report; the header is what matters here
        DataPayload::Pes(t) => (
            "PES",
            serde_json::json!({
                "stream_id": t.header.stream_id,
                "packet_length": t.header.packet_length,
                "data_len": t.data.len(),
                "pts": t.header.optional.as_ref().and_then(|o| o.pts),
                "dts": t.header.optional.as_ref().and_then(|o| o.dts),
            }),
        ),
    }
}

/// Join multicast / bind unicast socket helper
fn create_udp_socket(addr: &str) -> anyhow::Result<Socket> {
    let sock_addr: SocketAddr = addr.parse()?;
    let ip = match sock_addr.ip() {
        IpAddr::V4(v4) => v4,
        _ => anyhow::bail!("only IPv4 is supported"),
    };

    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&sock_addr.into())?;

    if ip.is_multicast() {
        let iface = Ipv4Addr::UNSPECIFIED; // default interface
        socket.join_multicast_v4(&ip, &iface)?;
    }
    Ok(socket)
}

/// Blocking reader over a datagram socket; each read returns one datagram.
struct UdpReader(std::net::UdpSocket);

impl Read for UdpReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.0.recv(buf)
    }
}
