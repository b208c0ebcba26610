//! Vendor/product ID registry
//!
//! Instead of a process-wide static table of device names to VID/PID
//! pairs, the registry is an explicit object the application constructs
//! once and passes into
//! [`FtdiLink::open`](crate::FtdiLink::open), so its lifetime and contents
//! are visible.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A USB vendor/product ID pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VidPid {
    pub vid: u16,
    pub pid: u16,
}

impl VidPid {
    pub const fn new(vid: u16, pid: u16) -> Self {
        Self { vid, pid }
    }
}

/// Candidate VID/PID list plus name bindings consulted when opening a device
#[derive(Debug, Clone)]
pub struct VidPidRegistry {
    candidates: Vec<VidPid>,
    by_name: HashMap<String, VidPid>,
}

impl Default for VidPidRegistry {
    /// Registry pre-seeded with the stock FTDI product IDs
    /// (FT232R, FT2232x, FT232H, FT-X).
    fn default() -> Self {
        Self {
            candidates: vec![
                VidPid::new(0x0403, 0x6001),
                VidPid::new(0x0403, 0x6010),
                VidPid::new(0x0403, 0x6014),
                VidPid::new(0x0403, 0x6015),
            ],
            by_name: HashMap::new(),
        }
    }
}

impl VidPidRegistry {
    /// Empty registry, no candidates
    pub fn new() -> Self {
        Self {
            candidates: Vec::new(),
            by_name: HashMap::new(),
        }
    }

    /// Add a candidate VID/PID (deduplicated)
    pub fn add(&mut self, vid: u16, pid: u16) {
        let vp = VidPid::new(vid, pid);
        if !self.candidates.contains(&vp) {
            self.candidates.push(vp);
        }
    }

    /// Bind a device name or serial to a specific VID/PID
    pub fn bind_name(&mut self, name: impl Into<String>, vid: u16, pid: u16) {
        self.by_name.insert(name.into(), VidPid::new(vid, pid));
    }

    /// Resolve a previously bound name
    pub fn lookup(&self, name: &str) -> Option<VidPid> {
        self.by_name.get(name).copied()
    }

    /// All candidate IDs, in insertion order
    pub fn candidates(&self) -> &[VidPid] {
        &self.candidates
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_carries_stock_ids() {
        let reg = VidPidRegistry::default();
        assert_eq!(reg.candidates().len(), 4);
        assert!(reg.candidates().contains(&VidPid::new(0x0403, 0x6014)));
    }

    #[test]
    fn add_deduplicates() {
        let mut reg = VidPidRegistry::new();
        reg.add(0x0403, 0x6001);
        reg.add(0x0403, 0x6001);
        assert_eq!(reg.candidates().len(), 1);
    }

    #[test]
    fn name_binding_wins_lookup() {
        let mut reg = VidPidRegistry::default();
        reg.bind_name("FITPIX 01", 0x0403, 0x6010);
        assert_eq!(reg.lookup("FITPIX 01"), Some(VidPid::new(0x0403, 0x6010)));
        assert_eq!(reg.lookup("unknown"), None);
    }
}
