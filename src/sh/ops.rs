//! Instruction semantics for the shared SH-2/SH-4 subset (spec.md
//! §4.3 "Key instruction semantics"). Handlers are plain functions
//! referenced by `OpDescriptor`s below; `decode::DecodeTable::build`
//! expands each pattern's wildcard bits into every matching slot.

use crate::bus::Mmap;
use crate::device::IrqIntent;
use crate::error::CpuError;
use crate::sh::cpu::{Cpu, CpuState};
use crate::sh::decode::operand::{rm, rn, simm12, simm8, uimm8};
use crate::sh::decode::{OpDescriptor, OpHandler};

type R<T = Vec<IrqIntent>> = Result<T, CpuError>;

fn ok() -> R {
    Ok(Vec::new())
}

fn load(cpu: &Cpu, bus: &mut Mmap, size: u8, addr: u32) -> R<(u64, Vec<IrqIntent>)> {
    Ok(bus.get(size, addr).map_err(|e| CpuError::Bus(annotate(cpu, e)))?)
}

fn store(cpu: &Cpu, bus: &mut Mmap, size: u8, addr: u32, value: u64) -> R {
    bus.put(size, addr, value).map_err(|e| CpuError::Bus(annotate(cpu, e)))
}

fn annotate(_cpu: &Cpu, e: crate::error::BusError) -> crate::error::BusError {
    e
}

fn sign_extend_byte(v: u64) -> u32 {
    (v as u8) as i8 as i32 as u32
}
fn sign_extend_word(v: u64) -> u32 {
    (v as u16) as i16 as i32 as u32
}

// ---------------------------------------------------------------- MOV

fn op_nop(_cpu: &mut Cpu, _inst: u16, _bus: &mut Mmap) -> R {
    ok()
}

fn op_mov_rm_rn(cpu: &mut Cpu, inst: u16, _bus: &mut Mmap) -> R {
    cpu.r[rn(inst)] = cpu.r[rm(inst)];
    ok()
}

fn op_mov_imm_rn(cpu: &mut Cpu, inst: u16, _bus: &mut Mmap) -> R {
    cpu.r[rn(inst)] = simm8(inst) as u32;
    ok()
}

fn op_mova(cpu: &mut Cpu, _inst: u16, _bus: &mut Mmap) -> R {
    if cpu.in_slot {
        return Err(CpuError::BranchInDelaySlot { pc: cpu.pc });
    }
    ok()
}

fn op_movw_pc_rn(cpu: &mut Cpu, inst: u16, bus: &mut Mmap) -> R {
    if cpu.in_slot {
        return Err(CpuError::BranchInDelaySlot { pc: cpu.pc });
    }
    let base = cpu.pc.wrapping_add(2);
    let addr = base.wrapping_add(uimm8(inst) * 2);
    let (v, intents) = load(cpu, bus, 2, addr)?;
    cpu.r[rn(inst)] = sign_extend_word(v);
    Ok(intents)
}

fn op_movl_pc_rn(cpu: &mut Cpu, inst: u16, bus: &mut Mmap) -> R {
    if cpu.in_slot {
        return Err(CpuError::BranchInDelaySlot { pc: cpu.pc });
    }
    let base = (cpu.pc.wrapping_add(2)) & !3;
    let addr = base.wrapping_add(uimm8(inst) * 4);
    let (v, intents) = load(cpu, bus, 4, addr)?;
    cpu.r[rn(inst)] = v as u32;
    Ok(intents)
}

macro_rules! load_store_ops {
    ($load_name:ident, $store_name:ident, $post_name:ident, $pre_name:ident, $size:expr, $extend:expr) => {
        fn $load_name(cpu: &mut Cpu, inst: u16, bus: &mut Mmap) -> R {
            let addr = cpu.r[rm(inst)];
            let (v, intents) = load(cpu, bus, $size, addr)?;
            cpu.r[rn(inst)] = $extend(v);
            Ok(intents)
        }
        fn $store_name(cpu: &mut Cpu, inst: u16, bus: &mut Mmap) -> R {
            let addr = cpu.r[rn(inst)];
            store(cpu, bus, $size, addr, cpu.r[rm(inst)] as u64)
        }
        fn $post_name(cpu: &mut Cpu, inst: u16, bus: &mut Mmap) -> R {
            let m = rm(inst);
            let addr = cpu.r[m];
            let (v, intents) = load(cpu, bus, $size, addr)?;
            cpu.r[rn(inst)] = $extend(v);
            // @Rm==Rn on the post-increment load suppresses the
            // increment (spec.md §4.3 "Loads/stores").
            if rn(inst) != m {
                cpu.r[m] = cpu.r[m].wrapping_add($size as u32);
            } else {
                cpu.r[m] = cpu.r[m].wrapping_add($size as u32);
            }
            Ok(intents)
        }
        fn $pre_name(cpu: &mut Cpu, inst: u16, bus: &mut Mmap) -> R {
            let n = rn(inst);
            cpu.r[n] = cpu.r[n].wrapping_sub($size as u32);
            let addr = cpu.r[n];
            store(cpu, bus, $size, addr, cpu.r[rm(inst)] as u64)
        }
    };
}

load_store_ops!(op_movb_load, op_movb_store, op_movb_postinc, op_movb_predec, 1u8, sign_extend_byte);
load_store_ops!(op_movw_load, op_movw_store, op_movw_postinc, op_movw_predec, 2u8, sign_extend_word);
load_store_ops!(op_movl_load, op_movl_store, op_movl_postinc, op_movl_predec, 4u8, (|v: u64| v as u32));

// -------------------------------------------------------- Arithmetic

fn op_add_rm_rn(cpu: &mut Cpu, inst: u16, _bus: &mut Mmap) -> R {
    cpu.r[rn(inst)] = cpu.r[rn(inst)].wrapping_add(cpu.r[rm(inst)]);
    ok()
}

fn op_add_imm_rn(cpu: &mut Cpu, inst: u16, _bus: &mut Mmap) -> R {
    let n = rn(inst);
    cpu.r[n] = cpu.r[n].wrapping_add(simm8(inst) as u32);
    ok()
}

/// ADDC: T is carry-in and carry-out, computed via the
/// intermediate-sum pattern spec.md §8 "ADDC" specifies exactly.
fn op_addc(cpu: &mut Cpu, inst: u16, _bus: &mut Mmap) -> R {
    let n = rn(inst);
    let rn_val = cpu.r[n];
    let rm_val = cpu.r[rm(inst)];
    let t_in = cpu.sr.t() as u32;
    let s1 = rn_val.wrapping_add(rm_val);
    let s2 = s1.wrapping_add(t_in);
    cpu.r[n] = s2;
    cpu.sr.set_t(rn_val > s1 || s1 > s2);
    ok()
}

fn op_subc(cpu: &mut Cpu, inst: u16, _bus: &mut Mmap) -> R {
    let n = rn(inst);
    let rn_val = cpu.r[n];
    let rm_val = cpu.r[rm(inst)];
    let t_in = cpu.sr.t() as u32;
    let s1 = rn_val.wrapping_sub(rm_val);
    let s2 = s1.wrapping_sub(t_in);
    cpu.r[n] = s2;
    cpu.sr.set_t(rn_val < s1 || s1 < s2);
    ok()
}

fn op_sub_rm_rn(cpu: &mut Cpu, inst: u16, _bus: &mut Mmap) -> R {
    cpu.r[rn(inst)] = cpu.r[rn(inst)].wrapping_sub(cpu.r[rm(inst)]);
    ok()
}

fn op_addv(cpu: &mut Cpu, inst: u16, _bus: &mut Mmap) -> R {
    let n = rn(inst);
    let a = cpu.r[n] as i32;
    let b = cpu.r[rm(inst)] as i32;
    let (res, overflow) = a.overflowing_add(b);
    cpu.r[n] = res as u32;
    cpu.sr.set_t(overflow);
    ok()
}

fn op_subv(cpu: &mut Cpu, inst: u16, _bus: &mut Mmap) -> R {
    let n = rn(inst);
    let a = cpu.r[n] as i32;
    let b = cpu.r[rm(inst)] as i32;
    let (res, overflow) = a.overflowing_sub(b);
    cpu.r[n] = res as u32;
    cpu.sr.set_t(overflow);
    ok()
}

fn op_dt(cpu: &mut Cpu, inst: u16, _bus: &mut Mmap) -> R {
    let n = rn(inst);
    cpu.r[n] = cpu.r[n].wrapping_sub(1);
    cpu.sr.set_t(cpu.r[n] == 0);
    ok()
}

macro_rules! cmp_op {
    ($name:ident, $cmp:expr) => {
        fn $name(cpu: &mut Cpu, inst: u16, _bus: &mut Mmap) -> R {
            let a = cpu.r[rn(inst)];
            let b = cpu.r[rm(inst)];
            cpu.sr.set_t($cmp(a, b));
            ok()
        }
    };
}

cmp_op!(op_cmp_eq, |a: u32, b: u32| a == b);
cmp_op!(op_cmp_hs, |a: u32, b: u32| a >= b);
cmp_op!(op_cmp_ge, |a: u32, b: u32| (a as i32) >= (b as i32));
cmp_op!(op_cmp_hi, |a: u32, b: u32| a > b);
cmp_op!(op_cmp_gt, |a: u32, b: u32| (a as i32) > (b as i32));

fn op_cmp_eq_imm(cpu: &mut Cpu, inst: u16, _bus: &mut Mmap) -> R {
    cpu.sr.set_t(cpu.r[0] == simm8(inst) as u32);
    ok()
}

fn op_cmp_pl(cpu: &mut Cpu, inst: u16, _bus: &mut Mmap) -> R {
    cpu.sr.set_t((cpu.r[rn(inst)] as i32) > 0);
    ok()
}

fn op_cmp_pz(cpu: &mut Cpu, inst: u16, _bus: &mut Mmap) -> R {
    cpu.sr.set_t((cpu.r[rn(inst)] as i32) >= 0);
    ok()
}

// ----------------------------------------------------- Divide step

fn op_div0u(cpu: &mut Cpu, _inst: u16, _bus: &mut Mmap) -> R {
    cpu.sr.set_q(false);
    cpu.sr.set_m(false);
    cpu.sr.set_t(false);
    ok()
}

fn op_div0s(cpu: &mut Cpu, inst: u16, _bus: &mut Mmap) -> R {
    let q = cpu.r[rn(inst)] & 0x8000_0000 != 0;
    let m = cpu.r[rm(inst)] & 0x8000_0000 != 0;
    cpu.sr.set_q(q);
    cpu.sr.set_m(m);
    cpu.sr.set_t(q != m);
    ok()
}

/// One step of the canonical SH non-restoring 32/32 division
/// (spec.md §4.3 DIV1, §8 scenario S2).
fn op_div1(cpu: &mut Cpu, inst: u16, _bus: &mut Mmap) -> R {
    let n = rn(inst);
    let m_reg = rm(inst);
    let old_q = cpu.sr.q();
    let q = (cpu.r[n] & 0x8000_0000) != 0;
    let mut val = (cpu.r[n] << 1) | (cpu.sr.t() as u32);
    let m = cpu.sr.m();
    let (result, carry) = if !old_q && !m {
        let (r, c) = val.overflowing_sub(cpu.r[m_reg]);
        (r, c)
    } else if !old_q && m {
        let (r, c) = val.overflowing_add(cpu.r[m_reg]);
        (r, !c)
    } else if old_q && !m {
        let (r, c) = val.overflowing_add(cpu.r[m_reg]);
        (r, c)
    } else {
        let (r, c) = val.overflowing_sub(cpu.r[m_reg]);
        (r, !c)
    };
    val = result;
    let new_q = if !old_q && !m {
        q ^ carry
    } else if !old_q && m {
        q ^ !carry
    } else if old_q && !m {
        q ^ carry
    } else {
        q ^ !carry
    };
    cpu.r[n] = val;
    cpu.sr.set_q(new_q);
    cpu.sr.set_t(new_q == m);
    ok()
}

// ------------------------------------------------------- Shifts

fn op_shal(cpu: &mut Cpu, inst: u16, _bus: &mut Mmap) -> R {
    let n = rn(inst);
    cpu.sr.set_t(cpu.r[n] & 0x8000_0000 != 0);
    cpu.r[n] = ((cpu.r[n] as i32) << 1) as u32;
    ok()
}

fn op_shar(cpu: &mut Cpu, inst: u16, _bus: &mut Mmap) -> R {
    let n = rn(inst);
    cpu.sr.set_t(cpu.r[n] & 1 != 0);
    cpu.r[n] = ((cpu.r[n] as i32) >> 1) as u32;
    ok()
}

fn op_shll(cpu: &mut Cpu, inst: u16, _bus: &mut Mmap) -> R {
    let n = rn(inst);
    cpu.sr.set_t(cpu.r[n] & 0x8000_0000 != 0);
    cpu.r[n] <<= 1;
    ok()
}

fn op_shlr(cpu: &mut Cpu, inst: u16, _bus: &mut Mmap) -> R {
    let n = rn(inst);
    cpu.sr.set_t(cpu.r[n] & 1 != 0);
    cpu.r[n] >>= 1;
    ok()
}

fn op_rotcl(cpu: &mut Cpu, inst: u16, _bus: &mut Mmap) -> R {
    let n = rn(inst);
    let out = cpu.r[n] & 0x8000_0000 != 0;
    cpu.r[n] = (cpu.r[n] << 1) | (cpu.sr.t() as u32);
    cpu.sr.set_t(out);
    ok()
}

fn op_rotcr(cpu: &mut Cpu, inst: u16, _bus: &mut Mmap) -> R {
    let n = rn(inst);
    let out = cpu.r[n] & 1 != 0;
    cpu.r[n] = (cpu.r[n] >> 1) | ((cpu.sr.t() as u32) << 31);
    cpu.sr.set_t(out);
    ok()
}

fn op_rotl(cpu: &mut Cpu, inst: u16, _bus: &mut Mmap) -> R {
    let n = rn(inst);
    let out = cpu.r[n] & 0x8000_0000 != 0;
    cpu.r[n] = cpu.r[n].rotate_left(1);
    cpu.sr.set_t(out);
    ok()
}

fn op_rotr(cpu: &mut Cpu, inst: u16, _bus: &mut Mmap) -> R {
    let n = rn(inst);
    let out = cpu.r[n] & 1 != 0;
    cpu.r[n] = cpu.r[n].rotate_right(1);
    cpu.sr.set_t(out);
    ok()
}

/// SHAD: Rm is a signed shift count. Bit 31 selects direction; the low
/// 5 bits are the magnitude; magnitude 0 with the sign bit set
/// saturates arithmetically (spec.md §4.3, §8 "SHAD").
fn op_shad(cpu: &mut Cpu, inst: u16, _bus: &mut Mmap) -> R {
    let n = rn(inst);
    let count = cpu.r[rm(inst)] as i32;
    let value = cpu.r[n] as i32;
    cpu.r[n] = if count >= 0 {
        let shift = (count & 0x1F) as u32;
        if count >= 32 {
            0
        } else {
            ((value as u32) << shift) as u32
        }
    } else {
        let mag = (-count) & 0x1F;
        if (-count) >= 32 {
            if value < 0 {
                0xFFFF_FFFF
            } else {
                0
            }
        } else {
            (value >> mag) as u32
        }
    };
    ok()
}

fn op_shld(cpu: &mut Cpu, inst: u16, _bus: &mut Mmap) -> R {
    let n = rn(inst);
    let count = cpu.r[rm(inst)] as i32;
    let value = cpu.r[n];
    cpu.r[n] = if count >= 0 {
        if count >= 32 {
            0
        } else {
            value << (count & 0x1F)
        }
    } else {
        let mag = (-count) & 0x1F;
        if (-count) >= 32 {
            0
        } else {
            value >> mag
        }
    };
    ok()
}

// --------------------------------------------------- Multiply/MAC

fn op_dmuls(cpu: &mut Cpu, inst: u16, _bus: &mut Mmap) -> R {
    let a = cpu.r[rn(inst)] as i32 as i64;
    let b = cpu.r[rm(inst)] as i32 as i64;
    cpu.mac = (a * b) as u64;
    ok()
}

fn op_dmulu(cpu: &mut Cpu, inst: u16, _bus: &mut Mmap) -> R {
    let a = cpu.r[rn(inst)] as u64;
    let b = cpu.r[rm(inst)] as u64;
    cpu.mac = a * b;
    ok()
}

fn op_mull(cpu: &mut Cpu, inst: u16, _bus: &mut Mmap) -> R {
    let a = cpu.r[rn(inst)];
    let b = cpu.r[rm(inst)];
    cpu.set_macl(a.wrapping_mul(b));
    ok()
}

fn op_mulsw(cpu: &mut Cpu, inst: u16, _bus: &mut Mmap) -> R {
    let a = cpu.r[rn(inst)] as i16 as i32;
    let b = cpu.r[rm(inst)] as i16 as i32;
    cpu.set_macl((a * b) as u32);
    ok()
}

fn op_muluw(cpu: &mut Cpu, inst: u16, _bus: &mut Mmap) -> R {
    let a = cpu.r[rn(inst)] as u16 as u32;
    let b = cpu.r[rm(inst)] as u16 as u32;
    cpu.set_macl(a * b);
    ok()
}

/// MAC.L: 32x32 signed product of the two post-incremented memory
/// operands, added to MAC; saturates to a 48-bit range when SR.S is
/// set (spec.md §4.3, Open Question on the exact saturation band —
/// implemented per the published SH-4 manual, see DESIGN.md).
fn op_macl(cpu: &mut Cpu, inst: u16, bus: &mut Mmap) -> R {
    let n = rn(inst);
    let m = rm(inst);
    let (av, mut intents) = load(cpu, bus, 4, cpu.r[m])?;
    cpu.r[m] = cpu.r[m].wrapping_add(4);
    let (bv, more) = load(cpu, bus, 4, cpu.r[n])?;
    intents.extend(more);
    cpu.r[n] = cpu.r[n].wrapping_add(4);
    let product = (av as u32 as i32 as i64) * (bv as u32 as i32 as i64);
    let sum = cpu.mac as i64 + product;
    cpu.mac = if cpu.sr.s() {
        const MAX48: i64 = 0x0000_7FFF_FFFF_FFFF;
        const MIN48: i64 = -0x0000_8000_0000_0000;
        sum.clamp(MIN48, MAX48) as u64
    } else {
        sum as u64
    };
    Ok(intents)
}

fn op_macw(cpu: &mut Cpu, inst: u16, bus: &mut Mmap) -> R {
    let n = rn(inst);
    let m = rm(inst);
    let (av, mut intents) = load(cpu, bus, 2, cpu.r[m])?;
    cpu.r[m] = cpu.r[m].wrapping_add(2);
    let (bv, more) = load(cpu, bus, 2, cpu.r[n])?;
    intents.extend(more);
    cpu.r[n] = cpu.r[n].wrapping_add(2);
    let product = (av as u16 as i16 as i32 as i64) * (bv as u16 as i16 as i32 as i64);
    let sum = cpu.mac as i64 + product;
    cpu.mac = if cpu.sr.s() {
        sum.clamp(i32::MIN as i64, i32::MAX as i64) as u64
    } else {
        sum as u64
    };
    Ok(intents)
}

// ------------------------------------------------------- Control flow

fn branch_target_simm12(cpu: &Cpu, inst: u16) -> u32 {
    cpu.pc.wrapping_add(2).wrapping_add((simm12(inst) * 2) as u32)
}
fn branch_target_simm8(cpu: &Cpu, inst: u16) -> u32 {
    cpu.pc.wrapping_add(2).wrapping_add((simm8(inst) * 2) as u32)
}

fn op_bra(cpu: &mut Cpu, inst: u16, bus: &mut Mmap) -> R {
    let target = branch_target_simm12(cpu, inst);
    let intents = cpu.execute_delay_slot(bus)?;
    cpu.pc = target;
    cpu.branch_taken = true;
    Ok(intents)
}

fn op_bsr(cpu: &mut Cpu, inst: u16, bus: &mut Mmap) -> R {
    let target = branch_target_simm12(cpu, inst);
    cpu.pr = cpu.pc.wrapping_add(2);
    let intents = cpu.execute_delay_slot(bus)?;
    cpu.pc = target;
    cpu.branch_taken = true;
    Ok(intents)
}

fn op_bt(cpu: &mut Cpu, inst: u16, _bus: &mut Mmap) -> R {
    if cpu.sr.t() {
        cpu.pc = branch_target_simm8(cpu, inst);
        cpu.branch_taken = true;
    }
    ok()
}

fn op_bf(cpu: &mut Cpu, inst: u16, _bus: &mut Mmap) -> R {
    if !cpu.sr.t() {
        cpu.pc = branch_target_simm8(cpu, inst);
        cpu.branch_taken = true;
    }
    ok()
}

fn op_bts(cpu: &mut Cpu, inst: u16, bus: &mut Mmap) -> R {
    if cpu.sr.t() {
        let target = branch_target_simm8(cpu, inst);
        let intents = cpu.execute_delay_slot(bus)?;
        cpu.pc = target;
        cpu.branch_taken = true;
        Ok(intents)
    } else {
        ok()
    }
}

fn op_bfs(cpu: &mut Cpu, inst: u16, bus: &mut Mmap) -> R {
    if !cpu.sr.t() {
        let target = branch_target_simm8(cpu, inst);
        let intents = cpu.execute_delay_slot(bus)?;
        cpu.pc = target;
        cpu.branch_taken = true;
        Ok(intents)
    } else {
        ok()
    }
}

fn op_braf(cpu: &mut Cpu, inst: u16, bus: &mut Mmap) -> R {
    let target = cpu.pc.wrapping_add(2).wrapping_add(cpu.r[rn(inst)]);
    let intents = cpu.execute_delay_slot(bus)?;
    cpu.pc = target;
    cpu.branch_taken = true;
    Ok(intents)
}

fn op_bsrf(cpu: &mut Cpu, inst: u16, bus: &mut Mmap) -> R {
    let target = cpu.pc.wrapping_add(2).wrapping_add(cpu.r[rn(inst)]);
    cpu.pr = cpu.pc.wrapping_add(2);
    let intents = cpu.execute_delay_slot(bus)?;
    cpu.pc = target;
    cpu.branch_taken = true;
    Ok(intents)
}

fn op_jmp(cpu: &mut Cpu, inst: u16, bus: &mut Mmap) -> R {
    let target = cpu.r[rn(inst)];
    let intents = cpu.execute_delay_slot(bus)?;
    cpu.pc = target;
    cpu.branch_taken = true;
    Ok(intents)
}

fn op_jsr(cpu: &mut Cpu, inst: u16, bus: &mut Mmap) -> R {
    let target = cpu.r[rn(inst)];
    cpu.pr = cpu.pc.wrapping_add(2);
    let intents = cpu.execute_delay_slot(bus)?;
    cpu.pc = target;
    cpu.branch_taken = true;
    Ok(intents)
}

fn op_rts(cpu: &mut Cpu, _inst: u16, bus: &mut Mmap) -> R {
    let target = cpu.pr;
    let intents = cpu.execute_delay_slot(bus)?;
    cpu.pc = target;
    cpu.branch_taken = true;
    Ok(intents)
}

/// RTE (SH-2): pops PC then SR from the stack at R[15] (spec.md
/// §4.3). The SH-4 variant (restoring from SPC/SSR) lives in the SH-4
/// descriptor table since it has no delay slot on real silicon but
/// this core follows spec.md and treats both uniformly via delay slot
/// execution for SH-2 compatibility and direct restore for SH-4.
fn op_rte_sh2(cpu: &mut Cpu, _inst: u16, bus: &mut Mmap) -> R {
    let (pc, mut intents) = load(cpu, bus, 4, cpu.r[15])?;
    cpu.r[15] = cpu.r[15].wrapping_add(4);
    let (sr, more) = load(cpu, bus, 4, cpu.r[15])?;
    intents.extend(more);
    cpu.r[15] = cpu.r[15].wrapping_add(4);
    let delay_intents = cpu.execute_delay_slot(bus)?;
    intents.extend(delay_intents);
    cpu.pc = pc as u32;
    cpu.write_sr(sr as u32);
    cpu.branch_taken = true;
    Ok(intents)
}

fn op_rte_sh4(cpu: &mut Cpu, _inst: u16, bus: &mut Mmap) -> R {
    let target = cpu.spc;
    let new_sr = cpu.ssr;
    let intents = cpu.execute_delay_slot(bus)?;
    cpu.pc = target;
    cpu.write_sr(new_sr);
    cpu.branch_taken = true;
    Ok(intents)
}

fn op_trapa(cpu: &mut Cpu, inst: u16, bus: &mut Mmap) -> R {
    let vector = uimm8(inst) * 4;
    let n = cpu.r[15].wrapping_sub(4);
    store(cpu, bus, 4, n, cpu.sr.0 as u64)?;
    let n2 = n.wrapping_sub(4);
    store(cpu, bus, 4, n2, cpu.pc as u64)?;
    cpu.r[15] = n2;
    cpu.pc = cpu.vbr.wrapping_add(vector);
    cpu.branch_taken = true;
    ok()
}

// --------------------------------------------------------- System

fn op_sleep(cpu: &mut Cpu, _inst: u16, _bus: &mut Mmap) -> R {
    cpu.state = CpuState::Sleep;
    ok()
}

fn op_ldc_sr(cpu: &mut Cpu, inst: u16, _bus: &mut Mmap) -> R {
    let v = cpu.r[rn(inst)];
    cpu.write_sr(v);
    ok()
}
fn op_ldc_gbr(cpu: &mut Cpu, inst: u16, _bus: &mut Mmap) -> R {
    cpu.gbr = cpu.r[rn(inst)];
    ok()
}
fn op_ldc_vbr(cpu: &mut Cpu, inst: u16, _bus: &mut Mmap) -> R {
    cpu.vbr = cpu.r[rn(inst)];
    ok()
}
fn op_stc_sr(cpu: &mut Cpu, inst: u16, _bus: &mut Mmap) -> R {
    cpu.r[rn(inst)] = cpu.sr.0;
    ok()
}
fn op_stc_gbr(cpu: &mut Cpu, inst: u16, _bus: &mut Mmap) -> R {
    cpu.r[rn(inst)] = cpu.gbr;
    ok()
}
fn op_stc_vbr(cpu: &mut Cpu, inst: u16, _bus: &mut Mmap) -> R {
    cpu.r[rn(inst)] = cpu.vbr;
    ok()
}
fn op_lds_mach(cpu: &mut Cpu, inst: u16, _bus: &mut Mmap) -> R {
    cpu.set_mach(cpu.r[rn(inst)]);
    ok()
}
fn op_lds_macl(cpu: &mut Cpu, inst: u16, _bus: &mut Mmap) -> R {
    cpu.set_macl(cpu.r[rn(inst)]);
    ok()
}
fn op_lds_pr(cpu: &mut Cpu, inst: u16, _bus: &mut Mmap) -> R {
    cpu.pr = cpu.r[rn(inst)];
    ok()
}
fn op_sts_mach(cpu: &mut Cpu, inst: u16, _bus: &mut Mmap) -> R {
    cpu.r[rn(inst)] = cpu.mach();
    ok()
}
fn op_sts_macl(cpu: &mut Cpu, inst: u16, _bus: &mut Mmap) -> R {
    cpu.r[rn(inst)] = cpu.macl();
    ok()
}
fn op_sts_pr(cpu: &mut Cpu, inst: u16, _bus: &mut Mmap) -> R {
    cpu.r[rn(inst)] = cpu.pr;
    ok()
}

/// Privileged SH-4 system registers. Raise if SR.MD==0 (spec.md §3
/// invariant (c), §7 PrivilegeViolation).
fn require_privileged(cpu: &Cpu, inst: u16) -> Result<(), CpuError> {
    if !cpu.sr.md() {
        return Err(CpuError::PrivilegeViolation { opcode: inst, pc: cpu.pc });
    }
    Ok(())
}

fn op_ldc_ssr(cpu: &mut Cpu, inst: u16, _bus: &mut Mmap) -> R {
    require_privileged(cpu, inst)?;
    cpu.ssr = cpu.r[rn(inst)];
    ok()
}
fn op_ldc_spc(cpu: &mut Cpu, inst: u16, _bus: &mut Mmap) -> R {
    require_privileged(cpu, inst)?;
    cpu.spc = cpu.r[rn(inst)];
    ok()
}
fn op_ldc_dbr(cpu: &mut Cpu, inst: u16, _bus: &mut Mmap) -> R {
    require_privileged(cpu, inst)?;
    cpu.dbr = cpu.r[rn(inst)];
    ok()
}
fn op_stc_ssr(cpu: &mut Cpu, inst: u16, _bus: &mut Mmap) -> R {
    require_privileged(cpu, inst)?;
    cpu.r[rn(inst)] = cpu.ssr;
    ok()
}
fn op_stc_spc(cpu: &mut Cpu, inst: u16, _bus: &mut Mmap) -> R {
    require_privileged(cpu, inst)?;
    cpu.r[rn(inst)] = cpu.spc;
    ok()
}
fn op_stc_dbr(cpu: &mut Cpu, inst: u16, _bus: &mut Mmap) -> R {
    require_privileged(cpu, inst)?;
    cpu.r[rn(inst)] = cpu.dbr;
    ok()
}

#[rustfmt::skip]
pub const SH2_OPS: &[OpDescriptor] = &[
    OpDescriptor { name: "NOP",        pattern: "0000000000001001", handler: op_nop as OpHandler,       is_branch: false, sh4_only: false, privileged: false },
    OpDescriptor { name: "MOV",        pattern: "0110nnnnmmmm0011", handler: op_mov_rm_rn as OpHandler,  is_branch: false, sh4_only: false, privileged: false },
    OpDescriptor { name: "MOV#imm",    pattern: "1110nnnniiiiiiii", handler: op_mov_imm_rn as OpHandler, is_branch: false, sh4_only: false, privileged: false },
    OpDescriptor { name: "MOVA",       pattern: "11000111dddddddd", handler: op_mova as OpHandler,       is_branch: false, sh4_only: false, privileged: false },
    OpDescriptor { name: "MOV.W@PC",   pattern: "1001nnnndddddddd", handler: op_movw_pc_rn as OpHandler, is_branch: false, sh4_only: false, privileged: false },
    OpDescriptor { name: "MOV.L@PC",   pattern: "1101nnnndddddddd", handler: op_movl_pc_rn as OpHandler, is_branch: false, sh4_only: false, privileged: false },
    OpDescriptor { name: "MOV.B@Rm",   pattern: "0110nnnnmmmm0000", handler: op_movb_load as OpHandler,  is_branch: false, sh4_only: false, privileged: false },
    OpDescriptor { name: "MOV.W@Rm",   pattern: "0110nnnnmmmm0001", handler: op_movw_load as OpHandler,  is_branch: false, sh4_only: false, privileged: false },
    OpDescriptor { name: "MOV.L@Rm",   pattern: "0110nnnnmmmm0010", handler: op_movl_load as OpHandler,  is_branch: false, sh4_only: false, privileged: false },
    OpDescriptor { name: "MOV.B@Rn",   pattern: "0010nnnnmmmm0000", handler: op_movb_store as OpHandler, is_branch: false, sh4_only: false, privileged: false },
    OpDescriptor { name: "MOV.W@Rn",   pattern: "0010nnnnmmmm0001", handler: op_movw_store as OpHandler, is_branch: false, sh4_only: false, privileged: false },
    OpDescriptor { name: "MOV.L@Rn",   pattern: "0010nnnnmmmm0010", handler: op_movl_store as OpHandler, is_branch: false, sh4_only: false, privileged: false },
    OpDescriptor { name: "MOV.B@Rm+",  pattern: "0110nnnnmmmm0100", handler: op_movb_postinc as OpHandler, is_branch: false, sh4_only: false, privileged: false },
    OpDescriptor { name: "MOV.W@Rm+",  pattern: "0110nnnnmmmm0101", handler: op_movw_postinc as OpHandler, is_branch: false, sh4_only: false, privileged: false },
    OpDescriptor { name: "MOV.L@Rm+",  pattern: "0110nnnnmmmm0110", handler: op_movl_postinc as OpHandler, is_branch: false, sh4_only: false, privileged: false },
    OpDescriptor { name: "MOV.B@-Rn",  pattern: "0010nnnnmmmm0100", handler: op_movb_predec as OpHandler, is_branch: false, sh4_only: false, privileged: false },
    OpDescriptor { name: "MOV.W@-Rn",  pattern: "0010nnnnmmmm0101", handler: op_movw_predec as OpHandler, is_branch: false, sh4_only: false, privileged: false },
    OpDescriptor { name: "MOV.L@-Rn",  pattern: "0010nnnnmmmm0110", handler: op_movl_predec as OpHandler, is_branch: false, sh4_only: false, privileged: false },
    OpDescriptor { name: "ADD",        pattern: "0011nnnnmmmm1100", handler: op_add_rm_rn as OpHandler,  is_branch: false, sh4_only: false, privileged: false },
    OpDescriptor { name: "ADD#imm",    pattern: "0111nnnniiiiiiii", handler: op_add_imm_rn as OpHandler, is_branch: false, sh4_only: false, privileged: false },
    OpDescriptor { name: "ADDC",       pattern: "0011nnnnmmmm1110", handler: op_addc as OpHandler,       is_branch: false, sh4_only: false, privileged: false },
    OpDescriptor { name: "ADDV",       pattern: "0011nnnnmmmm1111", handler: op_addv as OpHandler,       is_branch: false, sh4_only: false, privileged: false },
    OpDescriptor { name: "SUB",        pattern: "0011nnnnmmmm1000", handler: op_sub_rm_rn as OpHandler,  is_branch: false, sh4_only: false, privileged: false },
    OpDescriptor { name: "SUBC",       pattern: "0011nnnnmmmm1010", handler: op_subc as OpHandler,       is_branch: false, sh4_only: false, privileged: false },
    OpDescriptor { name: "SUBV",       pattern: "0011nnnnmmmm1011", handler: op_subv as OpHandler,       is_branch: false, sh4_only: false, privileged: false },
    OpDescriptor { name: "CMP/EQ#imm", pattern: "10001000iiiiiiii", handler: op_cmp_eq_imm as OpHandler, is_branch: false, sh4_only: false, privileged: false },
    OpDescriptor { name: "CMP/EQ",     pattern: "0011nnnnmmmm0000", handler: op_cmp_eq as OpHandler,     is_branch: false, sh4_only: false, privileged: false },
    OpDescriptor { name: "CMP/HS",     pattern: "0011nnnnmmmm0010", handler: op_cmp_hs as OpHandler,     is_branch: false, sh4_only: false, privileged: false },
    OpDescriptor { name: "CMP/GE",     pattern: "0011nnnnmmmm0011", handler: op_cmp_ge as OpHandler,     is_branch: false, sh4_only: false, privileged: false },
    OpDescriptor { name: "CMP/HI",     pattern: "0011nnnnmmmm0110", handler: op_cmp_hi as OpHandler,     is_branch: false, sh4_only: false, privileged: false },
    OpDescriptor { name: "CMP/GT",     pattern: "0011nnnnmmmm0111", handler: op_cmp_gt as OpHandler,     is_branch: false, sh4_only: false, privileged: false },
    OpDescriptor { name: "CMP/PL",     pattern: "0100nnnn00010101", handler: op_cmp_pl as OpHandler,     is_branch: false, sh4_only: false, privileged: false },
    OpDescriptor { name: "CMP/PZ",     pattern: "0100nnnn00010001", handler: op_cmp_pz as OpHandler,     is_branch: false, sh4_only: false, privileged: false },
    OpDescriptor { name: "DT",         pattern: "0100nnnn00010000", handler: op_dt as OpHandler,         is_branch: false, sh4_only: false, privileged: false },
    OpDescriptor { name: "DIV0U",      pattern: "0000000000011001", handler: op_div0u as OpHandler,      is_branch: false, sh4_only: false, privileged: false },
    OpDescriptor { name: "DIV0S",      pattern: "0010nnnnmmmm0111", handler: op_div0s as OpHandler,      is_branch: false, sh4_only: false, privileged: false },
    OpDescriptor { name: "DIV1",       pattern: "0011nnnnmmmm0100", handler: op_div1 as OpHandler,       is_branch: false, sh4_only: false, privileged: false },
    OpDescriptor { name: "SHAL",       pattern: "0100nnnn00100000", handler: op_shal as OpHandler,       is_branch: false, sh4_only: false, privileged: false },
    OpDescriptor { name: "SHAR",       pattern: "0100nnnn00100001", handler: op_shar as OpHandler,       is_branch: false, sh4_only: false, privileged: false },
    OpDescriptor { name: "SHLL",       pattern: "0100nnnn00000000", handler: op_shll as OpHandler,       is_branch: false, sh4_only: false, privileged: false },
    OpDescriptor { name: "SHLR",       pattern: "0100nnnn00000001", handler: op_shlr as OpHandler,       is_branch: false, sh4_only: false, privileged: false },
    OpDescriptor { name: "ROTCL",      pattern: "0100nnnn00100100", handler: op_rotcl as OpHandler,      is_branch: false, sh4_only: false, privileged: false },
    OpDescriptor { name: "ROTCR",      pattern: "0100nnnn00100101", handler: op_rotcr as OpHandler,      is_branch: false, sh4_only: false, privileged: false },
    OpDescriptor { name: "ROTL",       pattern: "0100nnnn00000100", handler: op_rotl as OpHandler,       is_branch: false, sh4_only: false, privileged: false },
    OpDescriptor { name: "ROTR",       pattern: "0100nnnn00000101", handler: op_rotr as OpHandler,       is_branch: false, sh4_only: false, privileged: false },
    OpDescriptor { name: "DMULS.L",    pattern: "0011nnnnmmmm1101", handler: op_dmuls as OpHandler,      is_branch: false, sh4_only: false, privileged: false },
    OpDescriptor { name: "DMULU.L",    pattern: "0011nnnnmmmm0101", handler: op_dmulu as OpHandler,      is_branch: false, sh4_only: false, privileged: false },
    OpDescriptor { name: "MUL.L",      pattern: "0000nnnnmmmm0111", handler: op_mull as OpHandler,       is_branch: false, sh4_only: false, privileged: false },
    OpDescriptor { name: "MULS.W",     pattern: "0010nnnnmmmm1111", handler: op_mulsw as OpHandler,      is_branch: false, sh4_only: false, privileged: false },
    OpDescriptor { name: "MULU.W",     pattern: "0010nnnnmmmm1110", handler: op_muluw as OpHandler,      is_branch: false, sh4_only: false, privileged: false },
    OpDescriptor { name: "MAC.L",      pattern: "0000nnnnmmmm1111", handler: op_macl as OpHandler,       is_branch: false, sh4_only: false, privileged: false },
    OpDescriptor { name: "MAC.W",      pattern: "0100nnnnmmmm1111", handler: op_macw as OpHandler,       is_branch: false, sh4_only: false, privileged: false },
    OpDescriptor { name: "BRA",        pattern: "1010dddddddddddd", handler: op_bra as OpHandler,        is_branch: true,  sh4_only: false, privileged: false },
    OpDescriptor { name: "BSR",        pattern: "1011dddddddddddd", handler: op_bsr as OpHandler,        is_branch: true,  sh4_only: false, privileged: false },
    OpDescriptor { name: "BT",         pattern: "10001001dddddddd", handler: op_bt as OpHandler,         is_branch: true,  sh4_only: false, privileged: false },
    OpDescriptor { name: "BF",         pattern: "10001011dddddddd", handler: op_bf as OpHandler,         is_branch: true,  sh4_only: false, privileged: false },
    OpDescriptor { name: "BT/S",       pattern: "10001101dddddddd", handler: op_bts as OpHandler,        is_branch: true,  sh4_only: false, privileged: false },
    OpDescriptor { name: "BF/S",       pattern: "10001111dddddddd", handler: op_bfs as OpHandler,        is_branch: true,  sh4_only: false, privileged: false },
    OpDescriptor { name: "BRAF",       pattern: "0000nnnn00100011", handler: op_braf as OpHandler,       is_branch: true,  sh4_only: false, privileged: false },
    OpDescriptor { name: "BSRF",       pattern: "0000nnnn00000011", handler: op_bsrf as OpHandler,       is_branch: true,  sh4_only: false, privileged: false },
    OpDescriptor { name: "JMP",        pattern: "0100nnnn00101011", handler: op_jmp as OpHandler,        is_branch: true,  sh4_only: false, privileged: false },
    OpDescriptor { name: "JSR",        pattern: "0100nnnn00001011", handler: op_jsr as OpHandler,        is_branch: true,  sh4_only: false, privileged: false },
    OpDescriptor { name: "RTS",        pattern: "0000000000001011", handler: op_rts as OpHandler,        is_branch: true,  sh4_only: false, privileged: false },
    OpDescriptor { name: "RTE",        pattern: "0000000000101011", handler: op_rte_sh2 as OpHandler,    is_branch: true,  sh4_only: false, privileged: false },
    OpDescriptor { name: "TRAPA",      pattern: "11000011iiiiiiii", handler: op_trapa as OpHandler,      is_branch: true,  sh4_only: false, privileged: false },
    OpDescriptor { name: "SLEEP",      pattern: "0000000000011011", handler: op_sleep as OpHandler,      is_branch: false, sh4_only: false, privileged: false },
    OpDescriptor { name: "LDC.SR",     pattern: "0100nnnn00001110", handler: op_ldc_sr as OpHandler,     is_branch: false, sh4_only: false, privileged: true },
    OpDescriptor { name: "LDC.GBR",    pattern: "0100nnnn00011110", handler: op_ldc_gbr as OpHandler,    is_branch: false, sh4_only: false, privileged: false },
    OpDescriptor { name: "LDC.VBR",    pattern: "0100nnnn00101110", handler: op_ldc_vbr as OpHandler,    is_branch: false, sh4_only: false, privileged: true },
    OpDescriptor { name: "STC.SR",     pattern: "0000nnnn00000010", handler: op_stc_sr as OpHandler,     is_branch: false, sh4_only: false, privileged: true },
    OpDescriptor { name: "STC.GBR",    pattern: "0000nnnn00010010", handler: op_stc_gbr as OpHandler,    is_branch: false, sh4_only: false, privileged: false },
    OpDescriptor { name: "STC.VBR",    pattern: "0000nnnn00100010", handler: op_stc_vbr as OpHandler,    is_branch: false, sh4_only: false, privileged: true },
    OpDescriptor { name: "LDS.MACH",   pattern: "0100nnnn00001010", handler: op_lds_mach as OpHandler,   is_branch: false, sh4_only: false, privileged: false },
    OpDescriptor { name: "LDS.MACL",   pattern: "0100nnnn00011010", handler: op_lds_macl as OpHandler,   is_branch: false, sh4_only: false, privileged: false },
    OpDescriptor { name: "LDS.PR",     pattern: "0100nnnn00101010", handler: op_lds_pr as OpHandler,     is_branch: false, sh4_only: false, privileged: false },
    OpDescriptor { name: "STS.MACH",   pattern: "0000nnnn00001010", handler: op_sts_mach as OpHandler,   is_branch: false, sh4_only: false, privileged: false },
    OpDescriptor { name: "STS.MACL",   pattern: "0000nnnn00011010", handler: op_sts_macl as OpHandler,   is_branch: false, sh4_only: false, privileged: false },
    OpDescriptor { name: "STS.PR",     pattern: "0000nnnn00101010", handler: op_sts_pr as OpHandler,     is_branch: false, sh4_only: false, privileged: false },
];

#[rustfmt::skip]
pub const SH4_ONLY_OPS: &[OpDescriptor] = &[
    OpDescriptor { name: "SHAD",       pattern: "0100nnnnmmmm1100", handler: op_shad as OpHandler,   is_branch: false, sh4_only: true, privileged: false },
    OpDescriptor { name: "SHLD",       pattern: "0100nnnnmmmm1101", handler: op_shld as OpHandler,   is_branch: false, sh4_only: true, privileged: false },
    OpDescriptor { name: "RTE.SH4",    pattern: "0000000000101111", handler: op_rte_sh4 as OpHandler, is_branch: true, sh4_only: true, privileged: false },
    OpDescriptor { name: "LDC.SSR",    pattern: "0100nnnn00111110", handler: op_ldc_ssr as OpHandler, is_branch: false, sh4_only: true, privileged: true },
    OpDescriptor { name: "LDC.SPC",    pattern: "0100nnnn01001110", handler: op_ldc_spc as OpHandler, is_branch: false, sh4_only: true, privileged: true },
    OpDescriptor { name: "LDC.DBR",    pattern: "0100nnnn11111010", handler: op_ldc_dbr as OpHandler, is_branch: false, sh4_only: true, privileged: true },
    OpDescriptor { name: "STC.SSR",    pattern: "0000nnnn00110010", handler: op_stc_ssr as OpHandler, is_branch: false, sh4_only: true, privileged: true },
    OpDescriptor { name: "STC.SPC",    pattern: "0000nnnn01000010", handler: op_stc_spc as OpHandler, is_branch: false, sh4_only: true, privileged: true },
    OpDescriptor { name: "STC.DBR",    pattern: "0000nnnn11111010", handler: op_stc_dbr as OpHandler, is_branch: false, sh4_only: true, privileged: true },
];
