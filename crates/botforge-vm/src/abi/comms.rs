//! Radio transmissions between processors.
//!
//! `transmit` and `transmit_beam` push onto the caller's outbound queue;
//! the simulation delivers them into receivers' inbound queues after the VM
//! tick. `receive` pops the caller's inbound queue.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use botforge_core::geometry::{angle_difference, normalize_angle};
use botforge_core::{EntityId, TeamId, Vec2};

use super::{
    arg_f32, arg_u32, check_len, ids, put_u32, signature, AbiError, ExternalBody, ExternalTable,
    Invocation,
};

/// Largest transmission payload in bytes.
pub const MAX_PAYLOAD: usize = 64;

pub type Payload = SmallVec<[u8; MAX_PAYLOAD]>;

/// Angular restriction of a beamed transmission, in world degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Beam {
    pub direction: f32,
    /// Full cone width.
    pub spread: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transmission {
    pub sender: EntityId,
    pub team: TeamId,
    pub origin: Vec2,
    pub payload: Payload,
    pub beam: Option<Beam>,
}

impl Transmission {
    /// Whether a receiver at `target` hears this within `range`.
    pub fn reaches(&self, target: Vec2, range: f32) -> bool {
        if self.origin.distance(target) > range {
            return false;
        }
        match self.beam {
            None => true,
            Some(beam) => {
                if target == self.origin {
                    return true;
                }
                let bearing = (target - self.origin).angle();
                angle_difference(beam.direction, bearing).abs() <= beam.spread / 2.0
            }
        }
    }
}

pub(crate) fn install(table: &mut ExternalTable) {
    table.insert(
        signature(ids::TRANSMIT, "transmit", 8, 0),
        ExternalBody::Scoped(Box::new(transmit)),
    );
    table.insert(
        signature(ids::TRANSMIT_BEAM, "transmit_beam", 16, 0),
        ExternalBody::Scoped(Box::new(transmit_beam)),
    );
    table.insert(
        signature(ids::RECEIVE, "receive", 8, 4),
        ExternalBody::Scoped(Box::new(receive)),
    );
}

fn send(call: &mut Invocation<'_, '_>, ptr: u32, len: u32, beam: Option<Beam>) -> Result<(), AbiError> {
    if len == 0 {
        return Err(AbiError::InvalidArgument("empty transmission"));
    }
    check_len(len, MAX_PAYLOAD as u32)?;
    let (memory, scope) = call.split()?;
    let transmission = Transmission {
        sender: scope.entity,
        team: scope.team,
        origin: scope.transform.position,
        payload: SmallVec::from_slice(memory.read(ptr, len)?),
        beam,
    };
    scope
        .queues
        .outbound
        .push(transmission)
        .map_err(|_| AbiError::QueueFull)
}

/// `transmit(ptr, len)`: omnidirectional broadcast.
fn transmit(call: &mut Invocation<'_, '_>, args: &[u8], _ret: &mut [u8]) -> Result<(), AbiError> {
    send(call, arg_u32(args, 0), arg_u32(args, 1), None)
}

/// `transmit_beam(ptr, len, angle, spread)`: `angle` is relative to the
/// entity's heading.
fn transmit_beam(call: &mut Invocation<'_, '_>, args: &[u8], _ret: &mut [u8]) -> Result<(), AbiError> {
    let (angle, spread) = (arg_f32(args, 2), arg_f32(args, 3));
    if !angle.is_finite() || !spread.is_finite() || spread <= 0.0 {
        return Err(AbiError::InvalidArgument("beam angle"));
    }
    let heading = call.scope()?.transform.heading;
    let beam = Beam {
        direction: normalize_angle(heading + angle),
        spread: spread.min(360.0),
    };
    send(call, arg_u32(args, 0), arg_u32(args, 1), Some(beam))
}

/// `receive(ptr, cap) -> len`: pops the oldest inbound payload. Returns 0
/// when nothing arrived. A payload longer than `cap` stays queued.
fn receive(call: &mut Invocation<'_, '_>, args: &[u8], ret: &mut [u8]) -> Result<(), AbiError> {
    let (ptr, cap) = (arg_u32(args, 0), arg_u32(args, 1));
    let (memory, scope) = call.split()?;
    let Some(message) = scope.queues.inbound.front() else {
        put_u32(ret, 0, 0);
        return Ok(());
    };
    let len = message.payload.len() as u32;
    check_len(len, cap)?;
    memory.write(ptr, &message.payload)?;
    scope.queues.inbound.pop();
    put_u32(ret, 0, len);
    Ok(())
}
