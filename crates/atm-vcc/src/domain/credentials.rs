//! Caller privileges attached to every session and administrative call.

/// Privileges held by the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Credentials {
    /// Administrative privilege: device configuration, address lists,
    /// signaling attachment, raw AAL0 headers.
    pub net_admin: bool,
    /// May bind reserved VCIs.
    pub bind_service: bool,
}

impl Credentials {
    pub const fn unprivileged() -> Self {
        Self {
            net_admin: false,
            bind_service: false,
        }
    }

    pub const fn admin() -> Self {
        Self {
            net_admin: true,
            bind_service: true,
        }
    }
}
