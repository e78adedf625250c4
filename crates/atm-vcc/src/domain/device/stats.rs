//! Per-AAL traffic counters of a device.

use std::sync::atomic::{AtomicU64, Ordering};

use atm_types::Aal;

/// Live counters for one adaptation layer.
#[derive(Debug, Default)]
pub struct AalStats {
    tx: AtomicU64,
    tx_err: AtomicU64,
    rx: AtomicU64,
    rx_err: AtomicU64,
    rx_drop: AtomicU64,
}

/// Point-in-time copy of [`AalStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AalCounters {
    pub tx: u64,
    pub tx_err: u64,
    pub rx: u64,
    pub rx_err: u64,
    pub rx_drop: u64,
}

impl AalStats {
    pub fn record_tx(&self) {
        self.tx.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_tx_error(&self) {
        self.tx_err.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rx(&self) {
        self.rx.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rx_error(&self) {
        self.rx_err.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rx_drop(&self) {
        self.rx_drop.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> AalCounters {
        AalCounters {
            tx: self.tx.load(Ordering::Relaxed),
            tx_err: self.tx_err.load(Ordering::Relaxed),
            rx: self.rx.load(Ordering::Relaxed),
            rx_err: self.rx_err.load(Ordering::Relaxed),
            rx_drop: self.rx_drop.load(Ordering::Relaxed),
        }
    }

    /// Returns the counters and subtracts exactly what was returned, so
    /// increments racing with the read are kept for the next call.
    pub fn take(&self) -> AalCounters {
        let copy = self.snapshot();
        self.tx.fetch_sub(copy.tx, Ordering::Relaxed);
        self.tx_err.fetch_sub(copy.tx_err, Ordering::Relaxed);
        self.rx.fetch_sub(copy.rx, Ordering::Relaxed);
        self.rx_err.fetch_sub(copy.rx_err, Ordering::Relaxed);
        self.rx_drop.fetch_sub(copy.rx_drop, Ordering::Relaxed);
        copy
    }
}

/// Counters of all adaptation layers of one device.
#[derive(Debug, Default)]
pub struct DeviceStats {
    pub aal0: AalStats,
    pub aal34: AalStats,
    pub aal5: AalStats,
}

/// Point-in-time copy of [`DeviceStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceCounters {
    pub aal0: AalCounters,
    pub aal34: AalCounters,
    pub aal5: AalCounters,
}

impl DeviceStats {
    pub fn for_aal(&self, aal: Aal) -> &AalStats {
        match aal {
            Aal::Aal0 => &self.aal0,
            Aal::Aal34 => &self.aal34,
            Aal::Aal5 => &self.aal5,
        }
    }

    pub fn snapshot(&self) -> DeviceCounters {
        DeviceCounters {
            aal0: self.aal0.snapshot(),
            aal34: self.aal34.snapshot(),
            aal5: self.aal5.snapshot(),
        }
    }

    /// Get-and-zero of every bucket.
    pub fn take(&self) -> DeviceCounters {
        DeviceCounters {
            aal0: self.aal0.take(),
            aal34: self.aal34.take(),
            aal5: self.aal5.take(),
        }
    }
}
