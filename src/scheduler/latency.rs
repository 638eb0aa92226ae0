//! Instruction latency and issue-time estimates.
//!
//! Before register allocation every instruction has a latency of one cycle.
//! After allocation the per-generation tables below apply.

use crate::{
    compiler::DeviceInfo,
    ir::{Instruction, MessageKind, Opcode, Sfid},
};

/// Cycles between issuing `inst` and its result being available.
#[must_use]
pub fn latency(inst: &Instruction, device: &DeviceInfo, post_reg_alloc: bool) -> u32 {
    if !post_reg_alloc {
        1
    } else if device.ver >= 6 {
        latency_gfx7(inst, device)
    } else {
        latency_gfx4(inst)
    }
}

/// Cycles the issuing pipeline is busy with `inst`.
#[must_use]
pub fn issue_time(inst: &Instruction) -> u32 {
    if inst.is_compressed() {
        4
    } else {
        2
    }
}

fn latency_gfx7(inst: &Instruction, device: &DeviceInfo) -> u32 {
    let hsw = device.is_haswell;
    match inst.opcode {
        Opcode::Mad | Opcode::Lrp => {
            if hsw {
                16
            } else {
                18
            }
        }
        Opcode::Pow | Opcode::IntQuotient | Opcode::IntRemainder => {
            if hsw {
                22
            } else {
                24
            }
        }
        op if op.is_math() => {
            if hsw {
                14
            } else {
                16
            }
        }
        Opcode::Txs => 100,
        op if op.is_tex() => 200,
        Opcode::Dpas => match inst.rcount {
            1 => 21,
            2 => 22,
            _ => 32,
        },
        Opcode::Send => inst.send.map_or(200, |desc| send_latency(desc.sfid, desc.kind)),
        _ => 14,
    }
}

fn send_latency(sfid: Sfid, kind: MessageKind) -> u32 {
    match (sfid, kind) {
        (Sfid::Sampler, MessageKind::ResInfo) => 100,
        (Sfid::Sampler, _) => 200,
        (Sfid::DataCache, MessageKind::Atomic | MessageKind::TypedAtomic) => 14000,
        (
            Sfid::DataCache | Sfid::RenderCache,
            MessageKind::Read
            | MessageKind::Write
            | MessageKind::Atomic
            | MessageKind::TypedRead
            | MessageKind::TypedWrite
            | MessageKind::TypedAtomic,
        ) => 600,
        (Sfid::Ugm | Sfid::Slm | Sfid::Tgm, _) => 300,
        (Sfid::PixelInterpolator, _) => 50,
        _ => 200,
    }
}

fn latency_gfx4(inst: &Instruction) -> u32 {
    const CHANS: u32 = 8;
    const MATH_LATENCY: u32 = 22;

    let rounds = match inst.opcode {
        Opcode::Rcp => 1,
        Opcode::Rsq => 2,
        Opcode::IntQuotient | Opcode::Sqrt | Opcode::Log2 => 3,
        Opcode::IntRemainder | Opcode::Exp2 => 4,
        Opcode::Sin | Opcode::Cos => 5,
        Opcode::Pow => 8,
        _ => return 2,
    };
    rounds * CHANS * MATH_LATENCY
}
