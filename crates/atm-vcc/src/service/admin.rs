//! # Administrative Commands
//!
//! Device inspection and configuration for management tools. Commands arrive
//! either typed ([`AdminCommand`]) or as a numeric code with a bincode
//! encoded argument buffer ([`AdminCommand::from_raw`]).
//!
//! Mutating commands require the administrative privilege. Changes to a
//! device's local address list are announced to the signaling authority with
//! INTERFACE_NOTIFY.

use atm_types::{Action, Esi, SignalingRequest, SvcAddr};
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use super::stack::StackContext;
use crate::domain::credentials::Credentials;
use crate::domain::device::{AddressList, AtmDevice, CiRange, DeviceCounters};
use crate::domain::errors::VccError;

/// Numeric command codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum CommandCode {
    GetStats = 0x6150,
    GetStatsZero = 0x6151,
    GetLinkRate = 0x6181,
    GetNames = 0x6183,
    GetType = 0x6184,
    GetEsi = 0x6185,
    GetAddresses = 0x6186,
    ResetAddresses = 0x6187,
    AddAddress = 0x6188,
    DeleteAddress = 0x6189,
    GetCiRange = 0x618a,
    SetCiRange = 0x618b,
    SetEsi = 0x618c,
    SetEsiForce = 0x618d,
    AddLecsAddress = 0x618e,
    DeleteLecsAddress = 0x618f,
    GetLecsAddresses = 0x6190,
}

impl TryFrom<u32> for CommandCode {
    /// The code that was not recognised.
    type Error = u32;

    fn try_from(code: u32) -> Result<Self, Self::Error> {
        Ok(match code {
            0x6150 => CommandCode::GetStats,
            0x6151 => CommandCode::GetStatsZero,
            0x6181 => CommandCode::GetLinkRate,
            0x6183 => CommandCode::GetNames,
            0x6184 => CommandCode::GetType,
            0x6185 => CommandCode::GetEsi,
            0x6186 => CommandCode::GetAddresses,
            0x6187 => CommandCode::ResetAddresses,
            0x6188 => CommandCode::AddAddress,
            0x6189 => CommandCode::DeleteAddress,
            0x618a => CommandCode::GetCiRange,
            0x618b => CommandCode::SetCiRange,
            0x618c => CommandCode::SetEsi,
            0x618d => CommandCode::SetEsiForce,
            0x618e => CommandCode::AddLecsAddress,
            0x618f => CommandCode::DeleteLecsAddress,
            0x6190 => CommandCode::GetLecsAddresses,
            other => return Err(other),
        })
    }
}

/// A decoded administrative command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCommand {
    /// Numbers of all registered devices.
    GetNames,
    GetType { itf: u32 },
    GetEsi { itf: u32 },
    SetEsi { itf: u32, esi: Esi, force: bool },
    /// Counter snapshot; with `zero` the returned amounts are subtracted.
    GetStats { itf: u32, zero: bool },
    GetCiRange { itf: u32 },
    SetCiRange { itf: u32, range: CiRange },
    GetLinkRate { itf: u32 },
    ResetAddresses { itf: u32 },
    AddAddress { itf: u32, list: AddressList, addr: SvcAddr },
    DeleteAddress { itf: u32, list: AddressList, addr: SvcAddr },
    GetAddresses { itf: u32, list: AddressList },
    /// Anything else, handed to the device driver.
    DeviceSpecific { itf: u32, code: u32, arg: Vec<u8> },
}

impl AdminCommand {
    /// Decodes a numeric command. Unknown codes become
    /// [`AdminCommand::DeviceSpecific`].
    pub fn from_raw(code: u32, itf: u32, arg: &[u8]) -> Result<Self, VccError> {
        let Ok(command) = CommandCode::try_from(code) else {
            return Ok(AdminCommand::DeviceSpecific {
                itf,
                code,
                arg: arg.to_vec(),
            });
        };
        Ok(match command {
            CommandCode::GetStats => AdminCommand::GetStats { itf, zero: false },
            CommandCode::GetStatsZero => AdminCommand::GetStats { itf, zero: true },
            CommandCode::GetLinkRate => AdminCommand::GetLinkRate { itf },
            CommandCode::GetNames => AdminCommand::GetNames,
            CommandCode::GetType => AdminCommand::GetType { itf },
            CommandCode::GetEsi => AdminCommand::GetEsi { itf },
            CommandCode::GetAddresses => AdminCommand::GetAddresses {
                itf,
                list: AddressList::Local,
            },
            CommandCode::ResetAddresses => AdminCommand::ResetAddresses { itf },
            CommandCode::AddAddress => AdminCommand::AddAddress {
                itf,
                list: AddressList::Local,
                addr: decode(arg)?,
            },
            CommandCode::DeleteAddress => AdminCommand::DeleteAddress {
                itf,
                list: AddressList::Local,
                addr: decode(arg)?,
            },
            CommandCode::GetCiRange => AdminCommand::GetCiRange { itf },
            CommandCode::SetCiRange => {
                let (vpi_bits, vci_bits): (u8, u8) = decode(arg)?;
                AdminCommand::SetCiRange {
                    itf,
                    range: CiRange::new(vpi_bits, vci_bits)?,
                }
            }
            CommandCode::SetEsi | CommandCode::SetEsiForce => AdminCommand::SetEsi {
                itf,
                esi: decode(arg)?,
                force: command == CommandCode::SetEsiForce,
            },
            CommandCode::AddLecsAddress => AdminCommand::AddAddress {
                itf,
                list: AddressList::Lecs,
                addr: decode(arg)?,
            },
            CommandCode::DeleteLecsAddress => AdminCommand::DeleteAddress {
                itf,
                list: AddressList::Lecs,
                addr: decode(arg)?,
            },
            CommandCode::GetLecsAddresses => AdminCommand::GetAddresses {
                itf,
                list: AddressList::Lecs,
            },
        })
    }

    fn requires_admin(&self) -> bool {
        matches!(
            self,
            AdminCommand::SetEsi { .. }
                | AdminCommand::GetStats { zero: true, .. }
                | AdminCommand::SetCiRange { .. }
                | AdminCommand::ResetAddresses { .. }
                | AdminCommand::AddAddress { .. }
                | AdminCommand::DeleteAddress { .. }
        )
    }
}

fn decode<T: DeserializeOwned>(arg: &[u8]) -> Result<T, VccError> {
    bincode::deserialize(arg).map_err(|_| VccError::InvalidArgument("malformed command argument"))
}

/// Result of an administrative command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminOutput {
    Done,
    Names(Vec<u32>),
    Type(String),
    Esi(Option<Esi>),
    Stats(DeviceCounters),
    CiRange(CiRange),
    LinkRate(u32),
    Addresses(Vec<SvcAddr>),
    /// Answer bytes of a device-specific command.
    Control(Vec<u8>),
}

pub(crate) fn execute(
    ctx: &StackContext,
    credentials: Credentials,
    command: AdminCommand,
) -> Result<AdminOutput, VccError> {
    if command.requires_admin() && !credentials.net_admin {
        return Err(VccError::PermissionDenied);
    }
    debug!(?command, "admin command");
    let device = |itf: u32| ctx.registry.find(itf).ok_or(VccError::NoSuchDevice(itf));

    match command {
        AdminCommand::GetNames => Ok(AdminOutput::Names(ctx.registry.ids())),
        AdminCommand::GetType { itf } => Ok(AdminOutput::Type(device(itf)?.kind().to_string())),
        AdminCommand::GetEsi { itf } => Ok(AdminOutput::Esi(device(itf)?.esi())),
        AdminCommand::SetEsi { itf, esi, force } => {
            device(itf)?.set_esi(esi, force)?;
            info!(itf, force, "ESI set");
            Ok(AdminOutput::Done)
        }
        AdminCommand::GetStats { itf, zero } => {
            let dev = device(itf)?;
            let counters = if zero {
                dev.stats().take()
            } else {
                dev.stats().snapshot()
            };
            Ok(AdminOutput::Stats(counters))
        }
        AdminCommand::GetCiRange { itf } => Ok(AdminOutput::CiRange(device(itf)?.ci_range())),
        AdminCommand::SetCiRange { itf, range } => {
            device(itf)?.set_ci_range(range);
            info!(
                itf,
                vpi_bits = range.vpi_bits(),
                vci_bits = range.vci_bits(),
                "channel range set"
            );
            Ok(AdminOutput::Done)
        }
        AdminCommand::GetLinkRate { itf } => Ok(AdminOutput::LinkRate(device(itf)?.link_rate())),
        AdminCommand::ResetAddresses { itf } => {
            let dev = device(itf)?;
            dev.with_addresses(|lists| lists.reset(AddressList::Local));
            notify_interface(ctx, &dev);
            Ok(AdminOutput::Done)
        }
        AdminCommand::AddAddress { itf, list, addr } => {
            let dev = device(itf)?;
            dev.with_addresses(|lists| lists.add(list, addr))?;
            if list == AddressList::Local {
                notify_interface(ctx, &dev);
            }
            Ok(AdminOutput::Done)
        }
        AdminCommand::DeleteAddress { itf, list, addr } => {
            let dev = device(itf)?;
            dev.with_addresses(|lists| lists.delete(list, &addr))?;
            if list == AddressList::Local {
                notify_interface(ctx, &dev);
            }
            Ok(AdminOutput::Done)
        }
        AdminCommand::GetAddresses { itf, list } => Ok(AdminOutput::Addresses(
            device(itf)?.with_addresses(|lists| lists.list(list)),
        )),
        AdminCommand::DeviceSpecific { itf, code, mut arg } => {
            let dev = device(itf)?;
            if !dev.capabilities().control {
                return Err(VccError::NotSupported);
            }
            let len = dev.ops().control(code, &mut arg)?;
            arg.truncate(len);
            Ok(AdminOutput::Control(arg))
        }
    }
}

fn notify_interface(ctx: &StackContext, device: &AtmDevice) {
    let sent = ctx
        .hub
        .enqueue(SignalingRequest::new(Action::InterfaceNotify).with_itf(device.number()));
    debug!(itf = device.number(), sent, "local address list changed");
}
