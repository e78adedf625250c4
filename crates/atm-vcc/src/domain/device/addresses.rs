//! Address lists of one device.
//!
//! Every device carries the local SVC addresses registered by the signaling
//! authority and the addresses of LAN-emulation configuration servers.
//! Entries are compared with [`SvcAddr::identical`].

use atm_types::SvcAddr;

use crate::domain::errors::VccError;

/// Which list of a device an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressList {
    Local,
    Lecs,
}

#[derive(Debug, Default)]
pub struct AddressRegistry {
    local: Vec<SvcAddr>,
    lecs: Vec<SvcAddr>,
}

impl AddressRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self, list: AddressList) -> &Vec<SvcAddr> {
        match list {
            AddressList::Local => &self.local,
            AddressList::Lecs => &self.lecs,
        }
    }

    fn entries_mut(&mut self, list: AddressList) -> &mut Vec<SvcAddr> {
        match list {
            AddressList::Local => &mut self.local,
            AddressList::Lecs => &mut self.lecs,
        }
    }

    pub fn reset(&mut self, list: AddressList) {
        self.entries_mut(list).clear();
    }

    pub fn add(&mut self, list: AddressList, addr: SvcAddr) -> Result<(), VccError> {
        addr.check()?;
        let entries = self.entries_mut(list);
        if entries.iter().any(|existing| existing.identical(&addr)) {
            return Err(VccError::DuplicateAddress);
        }
        entries.push(addr);
        Ok(())
    }

    pub fn delete(&mut self, list: AddressList, addr: &SvcAddr) -> Result<(), VccError> {
        addr.check()?;
        let entries = self.entries_mut(list);
        let index = entries
            .iter()
            .position(|existing| existing.identical(addr))
            .ok_or(VccError::AddressNotFound)?;
        entries.remove(index);
        Ok(())
    }

    pub fn list(&self, list: AddressList) -> Vec<SvcAddr> {
        self.entries(list).clone()
    }

    pub fn contains(&self, list: AddressList, addr: &SvcAddr) -> bool {
        self.entries(list).iter().any(|existing| existing.identical(addr))
    }
}
