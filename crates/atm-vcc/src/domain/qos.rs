//! # QoS Validator
//!
//! Pure checks and adjustments of traffic parameters. Nothing here touches
//! a device or a VCC; callers run these before any binding so a rejected
//! QoS never leaves partial state behind.

use atm_types::{Aal, Qos, TrafficClass, TrafficParams, DEFAULT_MAX_CDV, UNBOUNDED_PCR};

use crate::domain::errors::VccError;

/// Checks the rate bounds of one direction.
///
/// Inactive and wildcard directions always pass. Any other class except UBR
/// needs at least one of min/peak/max PCR.
pub fn check_traffic(tp: &TrafficParams) -> Result<(), VccError> {
    if matches!(tp.class, TrafficClass::None | TrafficClass::Any) {
        return Ok(());
    }
    if tp.class != TrafficClass::Ubr
        && tp.min_pcr.is_none()
        && tp.pcr.is_none()
        && tp.max_pcr.is_none()
    {
        return Err(VccError::InvalidQos);
    }
    if tp.min_pcr == Some(UNBOUNDED_PCR) {
        return Err(VccError::InvalidQos);
    }
    if let (Some(min), Some(max)) = (tp.min_pcr, tp.max_pcr) {
        if max != UNBOUNDED_PCR && min > max {
            return Err(VccError::InvalidQos);
        }
    }
    Ok(())
}

/// Fills unset max-SDU and max-CDV for one direction framed with `aal`.
pub fn adjust(tp: &mut TrafficParams, aal: Aal) -> Result<(), VccError> {
    if !tp.is_active() {
        return Ok(());
    }
    let ceiling = aal.max_sdu();
    match tp.max_sdu {
        None => tp.max_sdu = Some(ceiling),
        Some(requested) if requested > ceiling => {
            return Err(VccError::TooLarge { requested, ceiling });
        }
        Some(_) => {}
    }
    if tp.max_cdv.is_none() {
        tp.max_cdv = Some(DEFAULT_MAX_CDV);
    }
    Ok(())
}

/// Validates a full QoS record.
pub fn validate(qos: &Qos) -> Result<(), VccError> {
    let tx = qos.txtp.class;
    let rx = qos.rxtp.class;
    if tx == TrafficClass::None && rx == TrafficClass::None {
        return Err(VccError::InvalidQos);
    }
    if tx != rx
        && tx != TrafficClass::None
        && rx != TrafficClass::None
        && tx != TrafficClass::Any
        && rx != TrafficClass::Any
    {
        return Err(VccError::InvalidQos);
    }
    check_traffic(&qos.txtp)?;
    check_traffic(&qos.rxtp)
}

/// Adjusts both directions of `qos` for its own AAL.
pub fn adjust_both(qos: &mut Qos) -> Result<(), VccError> {
    let aal = qos.aal;
    adjust(&mut qos.txtp, aal)?;
    adjust(&mut qos.rxtp, aal)
}

/// The single peak cell rate a committed call runs at.
pub fn select_top_pcr(tp: &TrafficParams) -> u32 {
    if let Some(pcr) = tp.pcr.filter(|&p| p != 0) {
        return pcr;
    }
    if let Some(max) = tp.max_pcr.filter(|&m| m != 0 && m != UNBOUNDED_PCR) {
        return max;
    }
    tp.min_pcr.filter(|&m| m != 0).unwrap_or(UNBOUNDED_PCR)
}

/// A QoS change may not alter the AAL or either traffic class.
pub fn ensure_same_shape(current: &Qos, requested: &Qos) -> Result<(), VccError> {
    if current.aal != requested.aal
        || current.txtp.class != requested.txtp.class
        || current.rxtp.class != requested.rxtp.class
    {
        return Err(VccError::InvalidQos);
    }
    Ok(())
}
