//! Packet Capture Reader
//!
//! Primary strategy shells out to tshark with a field-projection request
//! and a caller-enforced timeout; a missing binary, non-zero exit, or a
//! hung process all degrade to the in-process fallback decoder instead of
//! aborting the batch. The fallback handles classic libpcap files (both
//! endiannesses, microsecond and nanosecond magics) down to
//! Ethernet/IPv4/TCP|UDP headers. An individual malformed packet is
//! skipped and counted, never fatal.

use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use serde_json::Value;

use crate::event::RawRecord;

use super::{ReaderOutput, SourceReader};

// ============================================================================
// CONSTANTS
// ============================================================================

/// Classic pcap magics, as they appear on disk
const MAGIC_MICRO_LE: [u8; 4] = [0xd4, 0xc3, 0xb2, 0xa1];
const MAGIC_MICRO_BE: [u8; 4] = [0xa1, 0xb2, 0xc3, 0xd4];
const MAGIC_NANO_LE: [u8; 4] = [0x4d, 0x3c, 0xb2, 0xa1];
const MAGIC_NANO_BE: [u8; 4] = [0xa1, 0xb2, 0x3c, 0x4d];

const GLOBAL_HEADER_LEN: usize = 24;
const RECORD_HEADER_LEN: usize = 16;

/// Ethernet link type in the capture header
const LINKTYPE_ETHERNET: u32 = 1;

/// Poll interval while waiting on the external decoder
const WAIT_POLL: Duration = Duration::from_millis(50);

// ============================================================================
// READER
// ============================================================================

pub struct PcapReader {
    pub tshark_timeout: Duration,
}

impl PcapReader {
    pub fn new(timeout_secs: u64) -> Self {
        Self {
            tshark_timeout: Duration::from_secs(timeout_secs),
        }
    }
}

impl SourceReader for PcapReader {
    fn source_class(&self) -> &'static str {
        "pcap"
    }

    fn read(&self, path: &Path) -> ReaderOutput {
        match read_with_tshark(path, self.tshark_timeout) {
            Ok(output) => {
                log::info!(
                    "Parsed {} packets from {} with tshark",
                    output.records.len(),
                    path.display()
                );
                output
            }
            Err(e) => {
                log::debug!("tshark unavailable for {} ({}), using fallback", path.display(), e);
                let output = read_in_process(path);
                log::info!(
                    "Parsed {} packets from {} with fallback decoder ({} skipped)",
                    output.records.len(),
                    path.display(),
                    output.skipped
                );
                output
            }
        }
    }
}

// ============================================================================
// TSHARK STRATEGY
// ============================================================================

fn read_with_tshark(path: &Path, timeout: Duration) -> std::io::Result<ReaderOutput> {
    let mut cmd = Command::new("tshark");
    cmd.arg("-r")
        .arg(path)
        .args(["-T", "fields"])
        .args(["-e", "frame.time_epoch"])
        .args(["-e", "ip.src"])
        .args(["-e", "ip.dst"])
        .args(["-e", "tcp.srcport"])
        .args(["-e", "tcp.dstport"])
        .args(["-e", "udp.srcport"])
        .args(["-e", "udp.dstport"])
        .args(["-e", "_ws.col.Protocol"])
        .args(["-e", "frame.len"])
        .args(["-E", "header=n"])
        .args(["-E", "separator=|"]);

    let stdout = run_with_timeout(cmd, timeout)?;

    let basename = file_basename(path);
    let mut output = ReaderOutput::empty();
    for line in stdout.lines() {
        if line.trim().is_empty() {
            continue;
        }
        output.records.push(parse_tshark_line(line, &basename));
    }
    Ok(output)
}

/// One `|`-delimited field projection line becomes one loose record.
/// Port fields draw from TCP if present, else UDP, else empty.
fn parse_tshark_line(line: &str, source: &str) -> RawRecord {
    let parts: Vec<&str> = line.split('|').collect();
    let get = |n: usize| parts.get(n).copied().unwrap_or("");

    let tcp_src = get(3);
    let udp_src = get(5);
    let tcp_dst = get(4);
    let udp_dst = get(6);
    let src_port = if !tcp_src.is_empty() { tcp_src } else { udp_src };
    let dst_port = if !tcp_dst.is_empty() { tcp_dst } else { udp_dst };

    packet_record(
        get(0).to_string(),
        get(1).to_string(),
        get(2).to_string(),
        src_port.to_string(),
        dst_port.to_string(),
        get(7).to_string(),
        get(8).to_string(),
        source,
    )
}

/// Run a blocking external decode with a hard deadline. Expiry kills the
/// child and surfaces as an error, which the caller treats as "no rows
/// from this strategy".
fn run_with_timeout(mut cmd: Command, timeout: Duration) -> std::io::Result<String> {
    let mut child = cmd.stdout(Stdio::piped()).stderr(Stdio::null()).spawn()?;

    let mut stdout = child.stdout.take().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::Other, "no stdout handle")
    })?;
    let reader = std::thread::spawn(move || {
        let mut buf = String::new();
        let _ = stdout.read_to_string(&mut buf);
        buf
    });

    let deadline = Instant::now() + timeout;
    loop {
        match child.try_wait()? {
            Some(status) => {
                let out = reader.join().unwrap_or_default();
                if status.success() {
                    return Ok(out);
                }
                return Err(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    format!("external decoder exited with {}", status),
                ));
            }
            None => {
                if Instant::now() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::TimedOut,
                        "external decoder timed out",
                    ));
                }
                std::thread::sleep(WAIT_POLL);
            }
        }
    }
}

// ============================================================================
// IN-PROCESS FALLBACK DECODER
// ============================================================================

#[derive(Debug, Clone, Copy)]
struct PcapFormat {
    little_endian: bool,
    nanos: bool,
}

fn read_in_process(path: &Path) -> ReaderOutput {
    let data = match std::fs::read(path) {
        Ok(d) => d,
        Err(e) => {
            log::warn!("Cannot read capture {}: {}", path.display(), e);
            return ReaderOutput::empty();
        }
    };
    parse_capture(&data, &file_basename(path))
}

fn parse_capture(data: &[u8], source: &str) -> ReaderOutput {
    let mut output = ReaderOutput::empty();

    if data.len() < GLOBAL_HEADER_LEN {
        log::warn!("Capture {} too short for a pcap header", source);
        return output;
    }

    let format = match identify_magic(&data[0..4]) {
        Some(f) => f,
        None => {
            // pcapng and anything else the fallback does not decode
            log::warn!("Capture {} is not a classic pcap file; fallback cannot decode it", source);
            return output;
        }
    };

    let linktype = read_u32(&data[20..24], format.little_endian);
    let ethernet = linktype == LINKTYPE_ETHERNET;
    if !ethernet {
        log::debug!("Capture {} has link type {}; decoding timestamps and lengths only", source, linktype);
    }

    let mut offset = GLOBAL_HEADER_LEN;
    while offset + RECORD_HEADER_LEN <= data.len() {
        let ts_sec = read_u32(&data[offset..offset + 4], format.little_endian) as f64;
        let ts_frac = read_u32(&data[offset + 4..offset + 8], format.little_endian) as f64;
        let incl_len = read_u32(&data[offset + 8..offset + 12], format.little_endian) as usize;
        let orig_len = read_u32(&data[offset + 12..offset + 16], format.little_endian);
        offset += RECORD_HEADER_LEN;

        if offset + incl_len > data.len() {
            log::debug!("Truncated record in {} at offset {}", source, offset);
            output.skipped += 1;
            break;
        }
        let frame = &data[offset..offset + incl_len];
        offset += incl_len;

        let divisor = if format.nanos { 1e9 } else { 1e6 };
        let ts = format!("{:.6}", ts_sec + ts_frac / divisor);

        if ethernet {
            match decode_ethernet(frame) {
                Some(net) => output.records.push(packet_record(
                    ts,
                    net.src_ip,
                    net.dst_ip,
                    net.src_port,
                    net.dst_port,
                    net.proto,
                    orig_len.to_string(),
                    source,
                )),
                None => output.skipped += 1,
            }
        } else {
            output.records.push(packet_record(
                ts,
                String::new(),
                String::new(),
                String::new(),
                String::new(),
                String::new(),
                orig_len.to_string(),
                source,
            ));
        }
    }

    output
}

fn identify_magic(magic: &[u8]) -> Option<PcapFormat> {
    match [magic[0], magic[1], magic[2], magic[3]] {
        MAGIC_MICRO_LE => Some(PcapFormat { little_endian: true, nanos: false }),
        MAGIC_MICRO_BE => Some(PcapFormat { little_endian: false, nanos: false }),
        MAGIC_NANO_LE => Some(PcapFormat { little_endian: true, nanos: true }),
        MAGIC_NANO_BE => Some(PcapFormat { little_endian: false, nanos: true }),
        _ => None,
    }
}

#[derive(Debug, Default)]
struct NetFields {
    src_ip: String,
    dst_ip: String,
    src_port: String,
    dst_port: String,
    proto: String,
}

/// Decode an Ethernet frame down to transport ports where possible.
/// Returns None only for frames too malformed to describe at all.
fn decode_ethernet(frame: &[u8]) -> Option<NetFields> {
    if frame.len() < 14 {
        return None;
    }
    let ethertype = u16::from_be_bytes([frame[12], frame[13]]);

    match ethertype {
        0x0800 => decode_ipv4(&frame[14..]),
        0x0806 => Some(NetFields { proto: "ARP".to_string(), ..Default::default() }),
        0x86dd => Some(NetFields { proto: "IPv6".to_string(), ..Default::default() }),
        _ => Some(NetFields::default()),
    }
}

fn decode_ipv4(ip: &[u8]) -> Option<NetFields> {
    if ip.len() < 20 || ip[0] >> 4 != 4 {
        return None;
    }
    let ihl = ((ip[0] & 0x0f) as usize) * 4;
    if ihl < 20 || ip.len() < ihl {
        return None;
    }

    let mut net = NetFields {
        src_ip: format_ipv4(&ip[12..16]),
        dst_ip: format_ipv4(&ip[16..20]),
        ..Default::default()
    };

    let protocol = ip[9];
    let transport = &ip[ihl..];
    net.proto = match protocol {
        6 => "TCP".to_string(),
        17 => "UDP".to_string(),
        1 => "ICMP".to_string(),
        _ => "IPv4".to_string(),
    };
    if (protocol == 6 || protocol == 17) && transport.len() >= 4 {
        net.src_port = u16::from_be_bytes([transport[0], transport[1]]).to_string();
        net.dst_port = u16::from_be_bytes([transport[2], transport[3]]).to_string();
    }
    Some(net)
}

fn format_ipv4(octets: &[u8]) -> String {
    format!("{}.{}.{}.{}", octets[0], octets[1], octets[2], octets[3])
}

fn read_u32(bytes: &[u8], little_endian: bool) -> u32 {
    let arr = [bytes[0], bytes[1], bytes[2], bytes[3]];
    if little_endian {
        u32::from_le_bytes(arr)
    } else {
        u32::from_be_bytes(arr)
    }
}

// ============================================================================
// RECORD ASSEMBLY
// ============================================================================

#[allow(clippy::too_many_arguments)]
fn packet_record(
    ts: String,
    src_ip: String,
    dst_ip: String,
    src_port: String,
    dst_port: String,
    proto: String,
    frame_len: String,
    source: &str,
) -> RawRecord {
    let mut record = RawRecord::new();
    record.insert("ts".to_string(), Value::String(ts));
    record.insert("src_ip".to_string(), Value::String(src_ip));
    record.insert("dst_ip".to_string(), Value::String(dst_ip));
    record.insert("src_port".to_string(), Value::String(src_port));
    record.insert("dst_port".to_string(), Value::String(dst_port));
    record.insert("proto".to_string(), Value::String(proto));
    record.insert("event_type".to_string(), Value::String("pcap_packet".to_string()));
    record.insert("payload_size".to_string(), Value::String(frame_len));
    record.insert(
        "raw_message".to_string(),
        Value::String(format!("pcap:{}", source)),
    );
    record
}

fn file_basename(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::CanonicalEvent;

    /// Classic little-endian microsecond global header, Ethernet link type.
    fn pcap_header() -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&MAGIC_MICRO_LE);
        buf.extend_from_slice(&2u16.to_le_bytes()); // version major
        buf.extend_from_slice(&4u16.to_le_bytes()); // version minor
        buf.extend_from_slice(&0i32.to_le_bytes()); // thiszone
        buf.extend_from_slice(&0u32.to_le_bytes()); // sigfigs
        buf.extend_from_slice(&65535u32.to_le_bytes()); // snaplen
        buf.extend_from_slice(&LINKTYPE_ETHERNET.to_le_bytes());
        buf
    }

    /// A single TCP SYN: 192.168.1.10:12345 -> 8.8.8.8:53
    fn syn_frame() -> Vec<u8> {
        let mut frame = Vec::new();
        frame.extend_from_slice(&[0u8; 12]); // dst/src mac
        frame.extend_from_slice(&[0x08, 0x00]); // IPv4
        // IPv4 header
        frame.push(0x45); // version 4, ihl 5
        frame.push(0x00); // tos
        frame.extend_from_slice(&40u16.to_be_bytes()); // total length
        frame.extend_from_slice(&[0x00, 0x00, 0x40, 0x00]); // id, flags
        frame.push(64); // ttl
        frame.push(6); // TCP
        frame.extend_from_slice(&[0x00, 0x00]); // checksum
        frame.extend_from_slice(&[192, 168, 1, 10]);
        frame.extend_from_slice(&[8, 8, 8, 8]);
        // TCP header
        frame.extend_from_slice(&12345u16.to_be_bytes());
        frame.extend_from_slice(&53u16.to_be_bytes());
        frame.extend_from_slice(&[0u8; 8]); // seq, ack
        frame.push(0x50); // data offset
        frame.push(0x02); // SYN
        frame.extend_from_slice(&[0u8; 6]); // window, checksum, urgent
        frame
    }

    fn record_for(frame: &[u8], ts_sec: u32) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&ts_sec.to_le_bytes());
        buf.extend_from_slice(&0u32.to_le_bytes());
        buf.extend_from_slice(&(frame.len() as u32).to_le_bytes());
        buf.extend_from_slice(&(frame.len() as u32).to_le_bytes());
        buf.extend_from_slice(frame);
        buf
    }

    #[test]
    fn test_single_syn_packet_scenario() {
        let mut capture = pcap_header();
        capture.extend(record_for(&syn_frame(), 1700000000));

        let output = parse_capture(&capture, "test.pcap");
        assert_eq!(output.records.len(), 1);
        assert_eq!(output.skipped, 0);

        let event = CanonicalEvent::from_raw(&output.records[0]);
        assert_eq!(event.event_type, "pcap_packet");
        assert_eq!(event.src_ip, "192.168.1.10");
        assert_eq!(event.dst_ip, "8.8.8.8");
        assert_eq!(event.src_port, "12345");
        assert_eq!(event.dst_port, "53");
        assert!(event.proto.contains("TCP"));
        assert_eq!(event.payload_size, "54");
        assert_eq!(event.raw_message, "pcap:test.pcap");
        assert!(event.ts.starts_with("2023-11-14T22:13:20"));
    }

    #[test]
    fn test_n_valid_packets_yield_n_rows() {
        let mut capture = pcap_header();
        for i in 0..5 {
            capture.extend(record_for(&syn_frame(), 1700000000 + i));
        }
        let output = parse_capture(&capture, "multi.pcap");
        assert_eq!(output.records.len(), 5);
        assert_eq!(output.skipped, 0);
    }

    #[test]
    fn test_truncated_record_skipped_not_fatal() {
        let mut capture = pcap_header();
        capture.extend(record_for(&syn_frame(), 1700000000));
        // Second record claims more bytes than the file holds
        let mut bad = record_for(&syn_frame(), 1700000001);
        bad.truncate(RECORD_HEADER_LEN + 10);
        capture.extend(bad);

        let output = parse_capture(&capture, "trunc.pcap");
        assert_eq!(output.records.len(), 1);
        assert_eq!(output.skipped, 1);
    }

    #[test]
    fn test_runt_frame_skipped() {
        let mut capture = pcap_header();
        capture.extend(record_for(&[0u8; 6], 1700000000)); // shorter than Ethernet
        capture.extend(record_for(&syn_frame(), 1700000001));

        let output = parse_capture(&capture, "runt.pcap");
        assert_eq!(output.records.len(), 1);
        assert_eq!(output.skipped, 1);
    }

    #[test]
    fn test_non_ethernet_linktype_keeps_time_and_length() {
        let mut capture = pcap_header();
        capture[20..24].copy_from_slice(&101u32.to_le_bytes()); // raw IP linktype
        capture.extend(record_for(&syn_frame(), 1700000000));

        let output = parse_capture(&capture, "rawip.pcap");
        assert_eq!(output.records.len(), 1);
        let event = CanonicalEvent::from_raw(&output.records[0]);
        assert_eq!(event.src_ip, "");
        assert_eq!(event.payload_size, "54");
    }

    #[test]
    fn test_pcapng_yields_zero_rows() {
        let mut data = vec![0x0a, 0x0d, 0x0d, 0x0a];
        data.extend_from_slice(&[0u8; 40]);
        let output = parse_capture(&data, "cap.pcapng");
        assert!(output.records.is_empty());
    }

    #[test]
    fn test_tshark_line_port_precedence_tcp_wins() {
        // Both TCP and UDP port columns populated: TCP takes precedence
        let record = parse_tshark_line("1700000000.5|1.1.1.1|2.2.2.2|80|443|53|53|TCP|60", "x.pcap");
        let event = CanonicalEvent::from_raw(&record);
        assert_eq!(event.src_port, "80");
        assert_eq!(event.dst_port, "443");
    }

    #[test]
    fn test_tshark_line_udp_fallback_and_short_lines() {
        let record = parse_tshark_line("1700000000.5|1.1.1.1|2.2.2.2|||53|54|UDP|60", "x.pcap");
        let event = CanonicalEvent::from_raw(&record);
        assert_eq!(event.src_port, "53");
        assert_eq!(event.dst_port, "54");

        // Missing trailing columns never panic
        let record = parse_tshark_line("1700000000.5|1.1.1.1", "x.pcap");
        let event = CanonicalEvent::from_raw(&record);
        assert_eq!(event.dst_ip, "");
        assert_eq!(event.src_port, "");
    }

    #[test]
    fn test_timeout_kills_hung_decoder() {
        let mut cmd = Command::new("sleep");
        cmd.arg("30");
        let start = Instant::now();
        let result = run_with_timeout(cmd, Duration::from_millis(200));
        assert!(result.is_err());
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}
