//! Register packing: coalescing many small register reads into as few
//! multi-register reads as possible.
//!
//! Registers are sorted by `(access, base)` and greedily merged into
//! groups as long as the gap to the next register ("hole") stays
//! within a transport-specific budget and the group doesn't exceed the
//! 125-register-per-request limit the Modbus read functions allow.
//! `hole_max` trades the per-request protocol overhead of the
//! transport against the cost of reading a few unused registers to
//! bridge a gap — a wider overhead (TCP's MBAP header + TCP/IP
//! headers) affords a bigger hole before a second request becomes
//! cheaper than padding through one.

use mbx_core::devspec::TransportMethod;
use mbx_register::{AccessKind, Register};
use std::collections::BTreeSet;

pub const MAX_GROUP_SPAN: u16 = 125;

/// Per-transaction overhead, in bytes, used to derive `hole_max`.
fn overhead_bytes(method: TransportMethod) -> u32 {
    match method {
        // MBAP header (7) + function/byte-count (2) + two IP/TCP
        // header round trips (20 IP + 7 TCP hdr worth of framing on
        // each side of the exchange).
        TransportMethod::Tcp => 5 + 2 + 2 * (20 + 7),
        // UDP has no connection-oriented per-segment headers to repeat
        // on each side, just the datagram header twice.
        TransportMethod::Udp => 2 * (8 + 7),
        // RTU: address + function byte, doubled for request/response.
        TransportMethod::Rtu | TransportMethod::Ascii => 2 * (1 + 2),
    }
}

/// Maximum hole (in registers) worth bridging with a single read,
/// given the transport's per-request overhead.
pub fn hole_max(method: TransportMethod) -> u16 {
    ((overhead_bytes(method) + 1) / 2) as u16
}

#[derive(Debug, Clone)]
pub struct RegisterGroup {
    pub access: AccessKind,
    pub base: u16,
    pub count: u16,
    /// Indices into the original register slice belonging to this group,
    /// in the order they were merged (ascending base).
    pub indices: Vec<usize>,
}

fn access_rank(a: AccessKind) -> u8 {
    match a {
        AccessKind::Input => 0,
        AccessKind::Holding => 1,
    }
}

/// Packs `registers` into the fewest groups satisfying the span and
/// hole-budget constraints, skipping any merge that would span across
/// a `barrier` address (registers whose read side-effects on the
/// device must not be triggered by an unrelated neighboring read).
pub fn pack_registers(
    registers: &[Register],
    method: TransportMethod,
    barrier: &BTreeSet<u16>,
) -> Vec<RegisterGroup> {
    let hmax = hole_max(method) as i32;
    let mut order: Vec<usize> = (0..registers.len()).collect();
    order.sort_by_key(|&i| (access_rank(registers[i].access), registers[i].base));

    let mut groups: Vec<RegisterGroup> = Vec::new();
    let mut current: Option<RegisterGroup> = None;

    for i in order {
        let reg = &registers[i];
        let reg_end = reg.base + reg.word_count();

        if let Some(g) = current.as_mut() {
            let group_end = g.base + g.count;
            let hole = reg.base as i32 - group_end as i32;
            let span = reg_end as i32 - g.base as i32;
            let crosses_barrier = barrier.range(group_end..reg.base).next().is_some();

            if reg.access == g.access && hole >= 0 && hole <= hmax && span <= MAX_GROUP_SPAN as i32
                && !crosses_barrier
            {
                g.count = reg_end - g.base;
                g.indices.push(i);
                continue;
            }
            groups.push(current.take().unwrap());
        }

        current = Some(RegisterGroup {
            access: reg.access,
            base: reg.base,
            count: reg.word_count(),
            indices: vec![i],
        });
    }
    if let Some(g) = current {
        groups.push(g);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use mbx_register::Coding;

    fn holding_u16(base: u16) -> Register {
        Register::new(base, format!("/r{base}"), Coding::U16, AccessKind::Holding)
    }

    #[test]
    fn adjacent_registers_merge_into_one_group() {
        let regs = vec![holding_u16(0), holding_u16(1), holding_u16(2)];
        let groups = pack_registers(&regs, TransportMethod::Tcp, &BTreeSet::new());
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].base, 0);
        assert_eq!(groups[0].count, 3);
    }

    #[test]
    fn gap_within_hole_max_is_bridged() {
        // TCP hole_max = (61+1)/2 = 31
        let regs = vec![holding_u16(0), holding_u16(20)];
        let groups = pack_registers(&regs, TransportMethod::Tcp, &BTreeSet::new());
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].count, 21);
    }

    #[test]
    fn gap_beyond_hole_max_splits_groups() {
        let regs = vec![holding_u16(0), holding_u16(9999)];
        let groups = pack_registers(&regs, TransportMethod::Rtu, &BTreeSet::new());
        assert_eq!(groups.len(), 2);
    }

    #[test]
    fn different_access_kinds_never_merge() {
        let regs = vec![
            holding_u16(0),
            Register::new(1, "/in", Coding::U16, AccessKind::Input),
        ];
        let groups = pack_registers(&regs, TransportMethod::Tcp, &BTreeSet::new());
        assert_eq!(groups.len(), 2);
    }

    #[test]
    fn group_never_exceeds_125_words() {
        let regs: Vec<Register> = (0..200u16).map(holding_u16).collect();
        let groups = pack_registers(&regs, TransportMethod::Tcp, &BTreeSet::new());
        for g in &groups {
            assert!(g.count <= MAX_GROUP_SPAN);
        }
    }

    #[test]
    fn barrier_forces_a_split_even_within_hole_budget() {
        let regs = vec![holding_u16(0), holding_u16(5)];
        let mut barrier = BTreeSet::new();
        barrier.insert(2);
        let groups = pack_registers(&regs, TransportMethod::Tcp, &barrier);
        assert_eq!(groups.len(), 2);
    }
}
