//! Classification of reassembled payload units and the emitted data shape.

use serde::Serialize;

use crate::constants::{PID_CAT, PID_PAT};
use crate::errors::Result;
use crate::packet::Packet;
use crate::packet_pool::PacketGroup;
use crate::pes::{is_pes_payload, parse_pes, PesData};
use crate::program_map::ProgramMap;
use crate::psi::{
    parse_psi, EitSection, NitSection, PatSection, PmtSection, PsiData, SdtSection, TableBody,
    TotSection,
};

/// One demultiplexed unit: a table or PES packet, the PID it came from, and
/// the packet that started the group (for byte-level inspection downstream).
#[derive(Debug, Clone, PartialEq)]
pub struct DemuxedData {
    pub pid: u16,
    pub first_packet: Packet,
    pub payload: DataPayload,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum DataPayload {
    Pat(PatSection),
    Pmt(PmtSection),
    Nit(NitSection),
    Sdt(SdtSection),
    Eit(EitSection),
    Tot(TotSection),
    Pes(PesData),
}

/// PIDs routed to the PSI pipeline: PAT, the DVB service-information PIDs,
/// and any PMT PID learned from a PAT.
pub fn is_psi_pid(pid: u16, program_map: &ProgramMap) -> bool {
    pid == PID_PAT
        || (0x10..=0x14).contains(&pid)
        || pid == 0x1E
        || pid == 0x1F
        || program_map.exists(pid)
}

/// Turns a completed packet group into zero or more data units.
pub fn parse_group(group: &PacketGroup, program_map: &ProgramMap) -> Result<Vec<DemuxedData>> {
    // conditional access tables are out of scope
    if group.pid == PID_CAT {
        return Ok(Vec::new());
    }
    if is_psi_pid(group.pid, program_map) {
        let psi = parse_psi(&group.payload)?;
        return Ok(psi_to_data(psi, group));
    }
    if is_pes_payload(&group.payload) {
        let pes = parse_pes(&group.payload)?;
        return Ok(vec![DemuxedData {
            pid: group.pid,
            first_packet: group.first_packet.clone(),
            payload: DataPayload::Pes(pes),
        }]);
    }
    // neither PSI nor PES; discarded
    Ok(Vec::new())
}

fn psi_to_data(psi: PsiData, group: &PacketGroup) -> Vec<DemuxedData> {
    psi.sections
        .into_iter()
        .filter_map(|s| s.body)
        .map(|body| {
            let payload = match body {
                TableBody::Pat(t) => DataPayload::Pat(t),
                TableBody::Pmt(t) => DataPayload::Pmt(t),
                TableBody::Nit(t) => DataPayload::Nit(t),
                TableBody::Sdt(t) => DataPayload::Sdt(t),
                TableBody::Eit(t) => DataPayload::Eit(t),
                TableBody::Tot(t) => DataPayload::Tot(t),
            };
            DemuxedData {
                pid: group.pid,
                first_packet: group.first_packet.clone(),
                payload,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{PacketHeader, ScramblingControl};

    fn group(pid: u16, payload: &[u8]) -> PacketGroup {
        PacketGroup {
            pid,
            first_packet: Packet {
                header: PacketHeader {
                    transport_error_indicator: false,
                    payload_unit_start_indicator: true,
                    transport_priority: false,
                    pid,
                    scrambling_control: ScramblingControl::NotScrambled,
                    has_adaptation_field: false,
                    has_payload: true,
                    continuity_counter: 0,
                },
                adaptation_field: None,
                payload: payload.to_vec(),
            },
            payload: payload.to_vec(),
        }
    }

    #[test]
    fn psi_pid_set_matches_dvb() {
        let pm = ProgramMap::new();
        let pids: Vec<u16> = (0..=255).filter(|p| is_psi_pid(*p, &pm)).collect();
        assert_eq!(pids, vec![0, 16, 17, 18, 19, 20, 30, 31]);

        let mut pm = ProgramMap::new();
        pm.set(256, 1);
        assert!(is_psi_pid(256, &pm));
    }

    #[test]
    fn cat_groups_are_ignored() {
        let pm = ProgramMap::new();
        let g = group(PID_CAT, &[0x00, 0x01, 0xB0, 0x00]);
        assert!(parse_group(&g, &pm).unwrap().is_empty());
    }

    #[test]
    fn pes_prefix_routes_to_pes() {
        let pm = ProgramMap::new();
        let g = group(
            0x111,
            &[0x00, 0x00, 0x01, 0xBE, 0x00, 0x02, 0xAA, 0xBB],
        );
        let ds = parse_group(&g, &pm).unwrap();
        assert_eq!(ds.len(), 1);
        let DataPayload::Pes(pes) = &ds[0].payload else {
            panic!("expected PES");
        };
        assert_eq!(pes.data, [0xAA, 0xBB]);
    }

    #[test]
    fn unclassified_payloads_are_discarded() {
        let pm = ProgramMap::new();
        let g = group(0x111, &[0x12, 0x34, 0x56]);
        assert!(parse_group(&g, &pm).unwrap().is_empty());
    }
}
