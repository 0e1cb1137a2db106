//! End-to-end CPU scenarios driven through `Machine`'s real bus, not by
//! calling opcode handlers directly: opcode words are poked into master
//! RAM and `Cpu::step` is driven the same way the scheduler drives it.

use hikaru_core::memctl::BankConfig;
use hikaru_core::sh::cpu::CpuState;
use hikaru_core::Machine;

const MASTER_RAM_BASE: u32 = 0x0C00_0000;

fn poke16(machine: &Machine, offset: u32, word: u16) {
    machine.master_ram.borrow_mut().put(2, offset as usize, word as u64);
}

fn step(machine: &mut Machine) {
    let intents = machine.master.step(&mut machine.master_mmap).expect("cpu step failed");
    assert!(intents.is_empty(), "unexpected irq intent from a plain arithmetic/branch op");
}

/// ADDC's carry-out must fold both the `Rn + Rm` overflow and the
/// `+ T` overflow, not just one or the other: `0xFFFFFFFE + 1 + 1`
/// overflows 32 bits, so T must come back set even though the low
/// addition alone (`0xFFFFFFFE + 1 = 0xFFFFFFFF`) does not overflow.
#[test]
fn addc_folds_the_carry_in_and_the_intermediate_overflow() {
    let mut machine = Machine::new(BankConfig::default());
    machine.master.pc = MASTER_RAM_BASE;
    machine.master.r[0] = 0xFFFF_FFFE;
    machine.master.r[1] = 1;
    machine.master.sr.set_t(true);
    // ADDC R1,R0
    poke16(&machine, 0x0000, 0x301E);

    step(&mut machine);

    assert_eq!(machine.master.r[0], 0);
    assert!(machine.master.sr.t());
}

/// DIV0U followed by 32 DIV1 steps implements unsigned 32-bit division
/// through R0 with R1 as divisor, a canonical SH sequence; dividing 32
/// by 3 must leave the quotient (10) in R0.
#[test]
fn div0u_then_32_div1_computes_the_unsigned_quotient() {
    let mut machine = Machine::new(BankConfig::default());
    machine.master.pc = MASTER_RAM_BASE;
    machine.master.r[0] = 0x20;
    machine.master.r[1] = 3;

    // DIV0U
    poke16(&machine, 0x0000, 0x0019);
    // DIV1 R1,R0, repeated 32 times
    for i in 0..32u32 {
        poke16(&machine, 2 + i * 2, 0x3014);
    }

    step(&mut machine);
    for _ in 0..32 {
        step(&mut machine);
    }

    assert_eq!(machine.master.r[0], 0x0000_000A);
}

/// BSR's delay slot runs before the branch takes effect, and PR is set
/// to the address right after the delay slot so RTS returns there —
/// not to the branch target itself.
#[test]
fn bsr_runs_its_delay_slot_then_rts_returns_past_it() {
    let mut machine = Machine::new(BankConfig::default());
    machine.master.pc = MASTER_RAM_BASE;

    // 0x0000: BSR 0x0006 (disp = 1 word past the delay slot)
    poke16(&machine, 0x0000, 0xB001);
    // 0x0002: MOV #0x42,R0 (delay slot)
    poke16(&machine, 0x0002, 0xE042);
    // 0x0006: NOP
    poke16(&machine, 0x0006, 0x0009);
    // 0x0008: RTS
    poke16(&machine, 0x0008, 0x000B);
    // 0x000A: NOP (RTS's own delay slot)
    poke16(&machine, 0x000A, 0x0009);

    step(&mut machine); // BSR + its delay slot
    assert_eq!(machine.master.r[0], 0x42);
    assert_eq!(machine.master.pc, MASTER_RAM_BASE + 0x0006);
    assert_eq!(machine.master.pr, MASTER_RAM_BASE + 0x0004);

    step(&mut machine); // NOP
    assert_eq!(machine.master.pc, MASTER_RAM_BASE + 0x0008);

    step(&mut machine); // RTS + its delay slot
    assert_eq!(machine.master.pc, MASTER_RAM_BASE + 0x0004);
}

/// ADDV/SUBV report signed overflow in T without corrupting the
/// wrapped result: `i32::MAX + 1` overflows into `i32::MIN`, and T
/// must reflect that even though the stored 32-bit pattern is exactly
/// what two's-complement wraparound produces.
#[test]
fn addv_and_subv_detect_signed_overflow_but_still_wrap() {
    let mut machine = Machine::new(BankConfig::default());
    machine.master.pc = MASTER_RAM_BASE;
    machine.master.r[0] = i32::MAX as u32;
    machine.master.r[1] = 1;
    // ADDV R1,R0
    poke16(&machine, 0x0000, 0x301F);
    step(&mut machine);
    assert_eq!(machine.master.r[0], i32::MIN as u32);
    assert!(machine.master.sr.t());

    machine.master.pc = MASTER_RAM_BASE + 0x10;
    machine.master.r[0] = i32::MIN as u32;
    machine.master.r[1] = 1;
    // SUBV R1,R0
    poke16(&machine, 0x0010, 0x301B);
    step(&mut machine);
    assert_eq!(machine.master.r[0], i32::MAX as u32);
    assert!(machine.master.sr.t());
}

/// SHAD treats Rm's sign as the shift direction and its low 5 bits as
/// the magnitude, saturating to all-ones or zero once the shift count
/// reaches or exceeds the register width.
#[test]
fn shad_saturates_a_negative_value_shifted_right_by_32_or_more() {
    let mut machine = Machine::new(BankConfig::default());
    machine.master.pc = MASTER_RAM_BASE;
    machine.master.r[0] = 0x8000_0000; // n = -2^31
    machine.master.r[1] = (-40i32) as u32; // m: shift right by 40 (>= 32)
    // SHAD R1,R0
    poke16(&machine, 0x0000, 0x401C);
    step(&mut machine);
    assert_eq!(machine.master.r[0], 0xFFFF_FFFF);
}

/// MAC.L multiplies the two post-incremented longwords and accumulates
/// into the 64-bit MAC register.
#[test]
fn macl_accumulates_the_signed_product_of_both_operands() {
    let mut machine = Machine::new(BankConfig::default());
    machine.master.pc = MASTER_RAM_BASE;
    machine.master.r[2] = MASTER_RAM_BASE + 0x300;
    machine.master.r[3] = MASTER_RAM_BASE + 0x400;
    machine.master_ram.borrow_mut().put(4, 0x300, 4u64);
    machine.master_ram.borrow_mut().put(4, 0x400, 3u64);
    machine.master.mac = 0;
    // MAC.L @R3+,@R2+
    poke16(&machine, 0x0000, 0x023F);
    step(&mut machine);
    assert_eq!(machine.master.mac, 12);
    assert_eq!(machine.master.r[2], MASTER_RAM_BASE + 0x304);
    assert_eq!(machine.master.r[3], MASTER_RAM_BASE + 0x404);
}

/// A halted CPU does not fetch or execute further instructions; running
/// a frame against one never panics even with nothing mapped past the
/// halt point.
#[test]
fn a_stopped_cpu_stays_parked_across_further_steps() {
    let mut machine = Machine::new(BankConfig::default());
    machine.master.pc = MASTER_RAM_BASE;
    machine.master.state = CpuState::Stop;
    let before = machine.master.pc;

    step(&mut machine);

    assert_eq!(machine.master.pc, before);
    assert_eq!(machine.master.state, CpuState::Stop);
}
