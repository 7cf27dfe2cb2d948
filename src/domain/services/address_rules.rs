//! Address Rule Service
//!
//! Pure domain logic for deciding whether a host-based access rule set
//! admits a replication connection from a given address. No external
//! dependencies - the catalog rows come in, a verdict comes out.

use crate::domain::entities::HbaRule;
use std::net::IpAddr;

/// Whether any rule's address range contains the given address.
///
/// Rules are the `pg_hba_file_rules` rows scoped to the `replication`
/// keyword. Keyword rules (`all`, `samehost`) admit everything from our
/// point of view; hostname rules cannot be evaluated without resolving
/// them and are skipped.
pub fn any_rule_admits(rules: &[HbaRule], address: IpAddr) -> bool {
    rules.iter().any(|rule| rule_admits(rule, address))
}

fn rule_admits(rule: &HbaRule, address: IpAddr) -> bool {
    match rule.address.as_str() {
        "all" | "samehost" | "samenet" => return true,
        _ => {}
    }

    // `a.b.c.d/n` form: mask folded into the address column.
    if let Some((base, prefix)) = rule.address.split_once('/') {
        let (Ok(base), Ok(prefix)) = (base.parse::<IpAddr>(), prefix.parse::<u32>()) else {
            return false;
        };
        return network_contains(base, prefix, address);
    }

    let Ok(base) = rule.address.parse::<IpAddr>() else {
        // Hostname rule; not resolvable here.
        return false;
    };

    match &rule.netmask {
        Some(netmask) => match netmask.parse::<IpAddr>() {
            Ok(mask) => masked_network_contains(base, mask, address),
            Err(_) => false,
        },
        // No mask reported: exact host rule.
        None => base == address,
    }
}

fn network_contains(base: IpAddr, prefix: u32, address: IpAddr) -> bool {
    match (base, address) {
        (IpAddr::V4(base), IpAddr::V4(address)) => {
            let mask = prefix_mask_v4(prefix);
            u32::from(base) & mask == u32::from(address) & mask
        }
        (IpAddr::V6(base), IpAddr::V6(address)) => {
            let mask = prefix_mask_v6(prefix);
            u128::from(base) & mask == u128::from(address) & mask
        }
        _ => false,
    }
}

fn masked_network_contains(base: IpAddr, mask: IpAddr, address: IpAddr) -> bool {
    match (base, mask, address) {
        (IpAddr::V4(base), IpAddr::V4(mask), IpAddr::V4(address)) => {
            let mask = u32::from(mask);
            u32::from(base) & mask == u32::from(address) & mask
        }
        (IpAddr::V6(base), IpAddr::V6(mask), IpAddr::V6(address)) => {
            let mask = u128::from(mask);
            u128::from(base) & mask == u128::from(address) & mask
        }
        _ => false,
    }
}

fn prefix_mask_v4(prefix: u32) -> u32 {
    if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - prefix.min(32))
    }
}

fn prefix_mask_v6(prefix: u32) -> u128 {
    if prefix == 0 {
        0
    } else {
        u128::MAX << (128 - prefix.min(128))
    }
}
