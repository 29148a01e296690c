//! Local port bookkeeping for dev servers.
//!
//! Reservations are advisory and in-process only: ports held by unrelated
//! programs on the machine are not probed.

use std::collections::HashSet;

/// Default first port handed out, matching the theme CLI's own default.
pub const DEFAULT_BASE_PORT: u16 = 9292;

/// Table of ports reserved by live dev servers.
#[derive(Debug, Clone)]
pub struct PortTable {
    base: u16,
    reserved: HashSet<u16>,
}

impl PortTable {
    pub fn new(base: u16) -> Self {
        Self {
            base,
            reserved: HashSet::new(),
        }
    }

    /// Returns the lowest port `>= base` that is not reserved.
    ///
    /// Does not reserve it; callers reserve under the same lock they picked it with.
    pub fn next_free(&self) -> u16 {
        let mut port = self.base;
        while self.is_reserved(port) && port < u16::MAX {
            port += 1;
        }
        port
    }

    /// Marks a port as held. Returns `false` if it already was.
    pub fn reserve(&mut self, port: u16) -> bool {
        self.reserved.insert(port)
    }

    /// Releases a port. Returns `false` if it was not reserved.
    pub fn release(&mut self, port: u16) -> bool {
        self.reserved.remove(&port)
    }

    pub fn is_reserved(&self, port: u16) -> bool {
        self.reserved.contains(&port)
    }

    pub fn clear(&mut self) {
        self.reserved.clear();
    }
}

impl Default for PortTable {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_PORT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_lowest_free_port_from_base() {
        let mut table = PortTable::default();
        assert_eq!(table.next_free(), 9292);
        table.reserve(9292);
        table.reserve(9293);
        assert_eq!(table.next_free(), 9294);
        table.release(9292);
        assert_eq!(table.next_free(), 9292);
    }

    #[test]
    fn next_free_does_not_reserve() {
        let table = PortTable::new(4000);
        assert_eq!(table.next_free(), 4000);
        assert_eq!(table.next_free(), 4000);
        assert!(!table.is_reserved(4000));
    }

    #[test]
    fn release_reports_double_release() {
        let mut table = PortTable::default();
        assert!(table.reserve(9292));
        assert!(!table.reserve(9292));
        assert!(table.release(9292));
        assert!(!table.release(9292));
        assert!(!table.is_reserved(9292));
        assert_eq!(table.next_free(), 9292);
    }
}
