//! SH-4 floating point unit (spec.md §4.3 "SH-4 FPU"). SH-2 never
//! builds these descriptors into its decode table, so FPU opcodes
//! simply do not exist in the SH-2 dispatch array.

use crate::bus::Mmap;
use crate::device::IrqIntent;
use crate::error::CpuError;
use crate::sh::cpu::Cpu;
use crate::sh::decode::operand::{rm, rn};
use crate::sh::decode::{OpDescriptor, OpHandler};

type R<T = Vec<IrqIntent>> = Result<T, CpuError>;

fn ok() -> R {
    Ok(Vec::new())
}

fn require_fpu_enabled(cpu: &Cpu, inst: u16) -> Result<(), CpuError> {
    if cpu.sr.fd() {
        return Err(CpuError::FpuDisabled { pc: cpu.pc });
    }
    let _ = inst;
    Ok(())
}

fn dr_index(n: usize) -> usize {
    n & !1
}

fn get_dr(cpu: &Cpu, n: usize) -> f64 {
    let hi = cpu.fr[dr_index(n)];
    let lo = cpu.fr[dr_index(n) + 1];
    f64::from_bits(((hi as u64) << 32) | lo as u64)
}

fn set_dr(cpu: &mut Cpu, n: usize, value: f64) {
    let bits = value.to_bits();
    cpu.fr[dr_index(n)] = (bits >> 32) as u32;
    cpu.fr[dr_index(n) + 1] = bits as u32;
}

fn get_fr(cpu: &Cpu, n: usize) -> f32 {
    f32::from_bits(cpu.fr[n])
}
fn set_fr(cpu: &mut Cpu, n: usize, value: f32) {
    cpu.fr[n] = value.to_bits();
}

macro_rules! binop {
    ($name:ident, $op:expr) => {
        fn $name(cpu: &mut Cpu, inst: u16, _bus: &mut Mmap) -> R {
            require_fpu_enabled(cpu, inst)?;
            let n = rn(inst);
            let m = rm(inst);
            if cpu.fpscr.pr() {
                let a = get_dr(cpu, n);
                let b = get_dr(cpu, m);
                set_dr(cpu, n, $op(a, b));
            } else {
                let a = get_fr(cpu, n);
                let b = get_fr(cpu, m);
                set_fr(cpu, n, $op(a, b) as f32);
            }
            ok()
        }
    };
}

binop!(op_fadd, |a, b| a + b);
binop!(op_fsub, |a, b| a - b);
binop!(op_fmul, |a, b| a * b);
binop!(op_fdiv, |a, b| a / b);

fn op_fcmp_eq(cpu: &mut Cpu, inst: u16, _bus: &mut Mmap) -> R {
    require_fpu_enabled(cpu, inst)?;
    let n = rn(inst);
    let m = rm(inst);
    let t = if cpu.fpscr.pr() {
        get_dr(cpu, n) == get_dr(cpu, m)
    } else {
        get_fr(cpu, n) == get_fr(cpu, m)
    };
    cpu.sr.set_t(t);
    ok()
}

fn op_fcmp_gt(cpu: &mut Cpu, inst: u16, _bus: &mut Mmap) -> R {
    require_fpu_enabled(cpu, inst)?;
    let n = rn(inst);
    let m = rm(inst);
    let t = if cpu.fpscr.pr() {
        get_dr(cpu, n) > get_dr(cpu, m)
    } else {
        get_fr(cpu, n) > get_fr(cpu, m)
    };
    cpu.sr.set_t(t);
    ok()
}

fn op_fmac(cpu: &mut Cpu, inst: u16, _bus: &mut Mmap) -> R {
    require_fpu_enabled(cpu, inst)?;
    let n = rn(inst);
    let m = rm(inst);
    let fr0 = get_fr(cpu, 0);
    let value = get_fr(cpu, n) + get_fr(cpu, m) * fr0;
    set_fr(cpu, n, value);
    ok()
}

fn op_fsqrt(cpu: &mut Cpu, inst: u16, _bus: &mut Mmap) -> R {
    require_fpu_enabled(cpu, inst)?;
    let n = rn(inst);
    if cpu.fpscr.pr() {
        let v = get_dr(cpu, n).sqrt();
        set_dr(cpu, n, v);
    } else {
        let v = get_fr(cpu, n).sqrt();
        set_fr(cpu, n, v);
    }
    ok()
}

fn op_fneg(cpu: &mut Cpu, inst: u16, _bus: &mut Mmap) -> R {
    require_fpu_enabled(cpu, inst)?;
    let n = rn(inst);
    if cpu.fpscr.pr() {
        let v = -get_dr(cpu, n);
        set_dr(cpu, n, v);
    } else {
        let v = -get_fr(cpu, n);
        set_fr(cpu, n, v);
    }
    ok()
}

fn op_fabs(cpu: &mut Cpu, inst: u16, _bus: &mut Mmap) -> R {
    require_fpu_enabled(cpu, inst)?;
    let n = rn(inst);
    if cpu.fpscr.pr() {
        let v = get_dr(cpu, n).abs();
        set_dr(cpu, n, v);
    } else {
        let v = get_fr(cpu, n).abs();
        set_fr(cpu, n, v);
    }
    ok()
}

/// FSCA: valid only with FPSCR.PR=0 (spec.md §4.3). FPUL's low 16 bits
/// are an angle in units of 2*pi/65536; writes (sin, cos) into
/// FR[n], FR[n+1] with n = RN & ~1.
fn op_fsca(cpu: &mut Cpu, inst: u16, _bus: &mut Mmap) -> R {
    require_fpu_enabled(cpu, inst)?;
    let n = rn(inst) & !1;
    let angle_units = (cpu.fpul & 0xFFFF) as f64;
    let radians = angle_units * (std::f64::consts::TAU / 65536.0);
    set_fr(cpu, n, radians.sin() as f32);
    set_fr(cpu, n + 1, radians.cos() as f32);
    ok()
}

fn op_fsrra(cpu: &mut Cpu, inst: u16, _bus: &mut Mmap) -> R {
    require_fpu_enabled(cpu, inst)?;
    let n = rn(inst);
    let v = get_fr(cpu, n);
    if v >= 0.0 {
        set_fr(cpu, n, 1.0 / v.sqrt());
    }
    ok()
}

fn fv_index(n: usize) -> usize {
    n & !3
}

/// FIPR: 4-element dot product of FV(n) and FV(m), result in FR[n+3].
fn op_fipr(cpu: &mut Cpu, inst: u16, _bus: &mut Mmap) -> R {
    require_fpu_enabled(cpu, inst)?;
    let n = fv_index(rn(inst));
    let m = fv_index(rm(inst));
    let mut sum = 0.0f32;
    for i in 0..4 {
        sum += get_fr(cpu, n + i) * get_fr(cpu, m + i);
    }
    set_fr(cpu, n + 3, sum);
    ok()
}

/// FTRV: multiplies the 4x4 matrix in XF by FV(n) in place.
fn op_ftrv(cpu: &mut Cpu, inst: u16, _bus: &mut Mmap) -> R {
    require_fpu_enabled(cpu, inst)?;
    let n = fv_index(rn(inst));
    let vec_in: [f32; 4] = [get_fr(cpu, n), get_fr(cpu, n + 1), get_fr(cpu, n + 2), get_fr(cpu, n + 3)];
    let mut out = [0.0f32; 4];
    for row in 0..4 {
        let mut acc = 0.0f32;
        for col in 0..4 {
            // XF holds the matrix column-major per spec.md's row-major
            // modelview convention transposed for FTRV's hardware layout.
            acc += f32::from_bits(cpu.xf[col * 4 + row]) * vec_in[col];
        }
        out[row] = acc;
    }
    for row in 0..4 {
        set_fr(cpu, n + row, out[row]);
    }
    ok()
}

fn op_flds(cpu: &mut Cpu, inst: u16, _bus: &mut Mmap) -> R {
    require_fpu_enabled(cpu, inst)?;
    cpu.fpul = cpu.fr[rn(inst)];
    ok()
}

fn op_fsts(cpu: &mut Cpu, inst: u16, _bus: &mut Mmap) -> R {
    require_fpu_enabled(cpu, inst)?;
    cpu.fr[rn(inst)] = cpu.fpul;
    ok()
}

fn op_fcnvds(cpu: &mut Cpu, inst: u16, _bus: &mut Mmap) -> R {
    require_fpu_enabled(cpu, inst)?;
    let n = rn(inst);
    let v = get_dr(cpu, n) as f32;
    cpu.fpul = v.to_bits();
    ok()
}

fn op_fcnvsd(cpu: &mut Cpu, inst: u16, _bus: &mut Mmap) -> R {
    require_fpu_enabled(cpu, inst)?;
    let n = rn(inst);
    let v = f32::from_bits(cpu.fpul) as f64;
    set_dr(cpu, n, v);
    ok()
}

/// FMOV dispatches on (FPSCR.SZ | FPSCR.PR) to choose a 32-bit or a
/// paired 64-bit register-to-register transfer (spec.md §4.3).
fn op_fmov_reg(cpu: &mut Cpu, inst: u16, _bus: &mut Mmap) -> R {
    require_fpu_enabled(cpu, inst)?;
    let n = rn(inst);
    let m = rm(inst);
    if cpu.fpscr.sz() || cpu.fpscr.pr() {
        let hi = cpu.fr[dr_index(m)];
        let lo = cpu.fr[dr_index(m) + 1];
        cpu.fr[dr_index(n)] = hi;
        cpu.fr[dr_index(n) + 1] = lo;
    } else {
        cpu.fr[n] = cpu.fr[m];
    }
    ok()
}

fn op_lds_fpul(cpu: &mut Cpu, inst: u16, _bus: &mut Mmap) -> R {
    cpu.fpul = cpu.r[rn(inst)];
    ok()
}
fn op_sts_fpul(cpu: &mut Cpu, inst: u16, _bus: &mut Mmap) -> R {
    cpu.r[rn(inst)] = cpu.fpul;
    ok()
}
fn op_lds_fpscr(cpu: &mut Cpu, inst: u16, _bus: &mut Mmap) -> R {
    let v = cpu.r[rn(inst)];
    cpu.write_fpscr(v);
    ok()
}
fn op_sts_fpscr(cpu: &mut Cpu, inst: u16, _bus: &mut Mmap) -> R {
    cpu.r[rn(inst)] = cpu.fpscr.0;
    ok()
}

#[rustfmt::skip]
pub const SH4_FPU_OPS: &[OpDescriptor] = &[
    OpDescriptor { name: "FADD",     pattern: "1111nnnnmmmm0000", handler: op_fadd as OpHandler,     is_branch: false, sh4_only: true, privileged: false },
    OpDescriptor { name: "FSUB",     pattern: "1111nnnnmmmm0001", handler: op_fsub as OpHandler,     is_branch: false, sh4_only: true, privileged: false },
    OpDescriptor { name: "FMUL",     pattern: "1111nnnnmmmm0010", handler: op_fmul as OpHandler,     is_branch: false, sh4_only: true, privileged: false },
    OpDescriptor { name: "FDIV",     pattern: "1111nnnnmmmm0011", handler: op_fdiv as OpHandler,     is_branch: false, sh4_only: true, privileged: false },
    OpDescriptor { name: "FCMP/EQ",  pattern: "1111nnnnmmmm0100", handler: op_fcmp_eq as OpHandler,  is_branch: false, sh4_only: true, privileged: false },
    OpDescriptor { name: "FCMP/GT",  pattern: "1111nnnnmmmm0101", handler: op_fcmp_gt as OpHandler,  is_branch: false, sh4_only: true, privileged: false },
    OpDescriptor { name: "FMAC",     pattern: "1111nnnnmmmm1110", handler: op_fmac as OpHandler,     is_branch: false, sh4_only: true, privileged: false },
    OpDescriptor { name: "FSQRT",    pattern: "1111nnnn01101101", handler: op_fsqrt as OpHandler,    is_branch: false, sh4_only: true, privileged: false },
    OpDescriptor { name: "FNEG",     pattern: "1111nnnn01001101", handler: op_fneg as OpHandler,     is_branch: false, sh4_only: true, privileged: false },
    OpDescriptor { name: "FABS",     pattern: "1111nnnn01011101", handler: op_fabs as OpHandler,     is_branch: false, sh4_only: true, privileged: false },
    OpDescriptor { name: "FSCA",     pattern: "1111nnn011111101", handler: op_fsca as OpHandler,     is_branch: false, sh4_only: true, privileged: false },
    OpDescriptor { name: "FSRRA",    pattern: "1111nnnn01111101", handler: op_fsrra as OpHandler,    is_branch: false, sh4_only: true, privileged: false },
    OpDescriptor { name: "FIPR",     pattern: "1111nnmm11101101", handler: op_fipr as OpHandler,     is_branch: false, sh4_only: true, privileged: false },
    OpDescriptor { name: "FTRV",     pattern: "1111nn0111111101", handler: op_ftrv as OpHandler,     is_branch: false, sh4_only: true, privileged: false },
    OpDescriptor { name: "FMOV",     pattern: "1111nnnnmmmm1100", handler: op_fmov_reg as OpHandler, is_branch: false, sh4_only: true, privileged: false },
    OpDescriptor { name: "FLDS",     pattern: "1111nnnn00011101", handler: op_flds as OpHandler,     is_branch: false, sh4_only: true, privileged: false },
    OpDescriptor { name: "FSTS",     pattern: "1111nnnn00001101", handler: op_fsts as OpHandler,     is_branch: false, sh4_only: true, privileged: false },
    OpDescriptor { name: "FCNVDS",   pattern: "1111nnnn10111101", handler: op_fcnvds as OpHandler,   is_branch: false, sh4_only: true, privileged: false },
    OpDescriptor { name: "FCNVSD",   pattern: "1111nnnn10101101", handler: op_fcnvsd as OpHandler,   is_branch: false, sh4_only: true, privileged: false },
    OpDescriptor { name: "LDS.FPUL", pattern: "0100nnnn01011010", handler: op_lds_fpul as OpHandler, is_branch: false, sh4_only: true, privileged: false },
    OpDescriptor { name: "STS.FPUL", pattern: "0000nnnn01011010", handler: op_sts_fpul as OpHandler, is_branch: false, sh4_only: true, privileged: false },
    OpDescriptor { name: "LDS.FPSCR",pattern: "0100nnnn01101010", handler: op_lds_fpscr as OpHandler,is_branch: false, sh4_only: true, privileged: false },
    OpDescriptor { name: "STS.FPSCR",pattern: "0000nnnn01101010", handler: op_sts_fpscr as OpHandler,is_branch: false, sh4_only: true, privileged: false },
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::Mmap;
    use crate::device::CpuId;
    use crate::sh::cpu::CpuVariant;
    use crate::sh::decode::DecodeTable;
    use std::rc::Rc;

    fn test_cpu() -> Cpu {
        let table = Rc::new(DecodeTable::build(&[]));
        let mut cpu = Cpu::new("test", CpuVariant::Sh4, true, table);
        cpu.write_sr(0);
        cpu
    }

    #[test]
    fn fsca_zero_fpul_yields_sin0_cos1() {
        let mut cpu = test_cpu();
        let mut bus = Mmap::new(CpuId::Master);
        cpu.fpul = 0;
        op_fsca(&mut cpu, 0, &mut bus).unwrap();
        assert!((get_fr(&cpu, 0) - 0.0).abs() < 1e-6);
        assert!((get_fr(&cpu, 1) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn ftrv_identity_leaves_vector_unchanged() {
        let mut cpu = test_cpu();
        let mut bus = Mmap::new(CpuId::Master);
        for i in 0..4 {
            for j in 0..4 {
                let v = if i == j { 1.0f32 } else { 0.0f32 };
                cpu.xf[j * 4 + i] = v.to_bits();
            }
        }
        set_fr(&mut cpu, 0, 1.0);
        set_fr(&mut cpu, 1, 2.0);
        set_fr(&mut cpu, 2, 3.0);
        set_fr(&mut cpu, 3, 4.0);
        op_ftrv(&mut cpu, 0, &mut bus).unwrap();
        assert!((get_fr(&cpu, 0) - 1.0).abs() < 1e-6);
        assert!((get_fr(&cpu, 1) - 2.0).abs() < 1e-6);
        assert!((get_fr(&cpu, 2) - 3.0).abs() < 1e-6);
        assert!((get_fr(&cpu, 3) - 4.0).abs() < 1e-6);
    }
}
