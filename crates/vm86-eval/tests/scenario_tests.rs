//! End-to-end runs of hand-decompiled routines.
//!
//! - `sub_hello`: argument on the stack, host `printf`, jump table dispatch
//! - `sub_6B2B40`: 64-bit right shift split across EDX:EAX
//! - deterministic compilation across independent machines
//! - the process-wide shared machine

use std::sync::Arc;

use parking_lot::Mutex;
use vm86_eval::{host_fn, shared, Machine};
use vm86_types::Reg;

// ══════════════════════════════════════════════════════════════════════════════
// Fixtures
// ══════════════════════════════════════════════════════════════════════════════

const SUB_HELLO: &str = r#"sub_hello	proc near
arg_0		= dword	ptr  8
.data
        format db "hello: %x", 0ah, 0dh, 0

off_5A74B0	dd offset loc_6B2B50	; DATA XREF: sub_589100+1832r
		dd offset loc_58A945	; jump table for switch	statement

.code
        ; hi
        push	ebp ;hello
		mov	ebp, esp

    loc_6B2B50:				; CODE XREF: sub_6B2B40+8j
        push    eax
		mov	eax, [ebp+arg_0]
        push eax
        mov eax, offset format
        push eax
        call printf
        add esp, 4
        pop eax

        mov ecx, 1
        jmp ds:off_5A74B0[ecx*4]

loc_58A945:
        push    eax
		mov	eax, [ebp+arg_0]
        push eax
        mov eax, offset format
        push eax
        call printf
        add esp, 4
        pop eax

  end:
        mov	esp, ebp
		pop	ebp
        retn
sub_hello    endp
"#;

const SUB_6B2B40: &str = r#"
        ; ...
sub_6B2B40	proc near		; CODE XREF: sub_6B2B40+E83p
                    ; sub_526E70+3C7Ap ...
        cmp	cl, 40h
        jnb	short loc_6B2B5A
        cmp	cl, 20h
        jnb	short loc_6B2B50
        shrd	eax, edx, cl
        shr	edx, cl
        retn
; ---------------------------------------------------------------------------

loc_6B2B50:				; CODE XREF: sub_6B2B40+8j
        mov	eax, edx
        xor	edx, edx
        and	cl, 1Fh
        shr	eax, cl
        retn
; ---------------------------------------------------------------------------

loc_6B2B5A:				; CODE XREF: sub_6B2B40+3j
        xor	eax, eax
        xor	edx, edx
        retn
sub_6B2B40	endp
"#;

/// Minimal `printf`: substitutes `%x` in the format with the next argument.
fn install_printf(m: &mut Machine) -> Arc<Mutex<Vec<String>>> {
    let output = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&output);
    m.set_function(
        "printf",
        Some(host_fn(move |m| {
            let format = m.arg(0)?;
            let value = m.arg(1)?;
            let text = String::from_utf8_lossy(m.read_cstr(format)?).into_owned();
            sink.lock().push(text.replacen("%x", &format!("{value:x}"), 1));
            Ok(())
        })),
    );
    output
}

fn sub_hello(m: &mut Machine, value: u32) -> Vec<String> {
    let output = install_printf(m);
    let proc = m.compile(SUB_HELLO).unwrap();
    m.push(value).unwrap();
    m.run(&proc).unwrap();
    assert_eq!(m.pop().unwrap(), value);
    // Bind so the guard drops before `output`.
    let lines = output.lock().clone();
    lines
}

fn sub_6b2b40(m: &mut Machine, a1: u64, a2: u8) -> u64 {
    let proc = m.compile(SUB_6B2B40).unwrap();
    let regs = m.registers_mut();
    regs.set(Reg::EAX, a1 as u32);
    regs.set(Reg::EDX, (a1 >> 32) as u32);
    regs.set(Reg::CL, u32::from(a2));
    m.run(&proc).unwrap();
    let regs = m.registers();
    (u64::from(regs.value(Reg::EDX)) << 32) | u64::from(regs.value(Reg::EAX))
}

const A1: u64 = (0x123 << 32) | 0x321;

// ══════════════════════════════════════════════════════════════════════════════
// sub_hello
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn sub_hello_prints_through_both_table_entries() {
    let mut m = Machine::default();
    let lines = sub_hello(&mut m, 0x31415926);
    assert_eq!(lines, ["hello: 31415926\n\r", "hello: 31415926\n\r"]);
}

#[test]
fn sub_hello_restores_the_caller_frame() {
    let mut m = Machine::default();
    m.registers_mut().set(Reg::EBP, 0xfeed);
    let esp = m.registers().esp();
    sub_hello(&mut m, 1);
    assert_eq!(m.registers().value(Reg::EBP), 0xfeed);
    assert_eq!(m.registers().esp(), esp);
}

#[test]
fn sub_hello_runs_again_from_the_cache() {
    let mut m = Machine::default();
    sub_hello(&mut m, 1);
    let data_used = m.data().len();
    let lines = sub_hello(&mut m, 0xabc);
    assert_eq!(lines[0], "hello: abc\n\r");
    assert_eq!(m.data().len(), data_used);
    assert_eq!(m.text().len(), 1);
}

// ══════════════════════════════════════════════════════════════════════════════
// sub_6B2B40
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn sub_6b2b40_shift_by_8() {
    let mut m = Machine::default();
    assert_eq!(sub_6b2b40(&mut m, A1, 8), 0x1_2300_0003);
}

#[test]
fn sub_6b2b40_shift_by_16() {
    let mut m = Machine::default();
    assert_eq!(sub_6b2b40(&mut m, A1, 16), 0x0123_0000);
}

#[test]
fn sub_6b2b40_shift_by_32() {
    let mut m = Machine::default();
    assert_eq!(sub_6b2b40(&mut m, A1, 32), 0x123);
}

#[test]
fn sub_6b2b40_matches_u64_shift() {
    let mut m = Machine::default();
    for shift in [0u8, 1, 5, 31, 33, 40, 63, 64, 200] {
        let expected = if shift >= 64 { 0 } else { A1 >> shift };
        assert_eq!(sub_6b2b40(&mut m, A1, shift), expected, "shift {shift}");
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Determinism & sharing
// ══════════════════════════════════════════════════════════════════════════════

#[test]
fn independent_machines_compile_identically() {
    let mut a = Machine::default();
    let mut b = Machine::default();
    let pa = a.compile(SUB_HELLO).unwrap();
    let pb = b.compile(SUB_HELLO).unwrap();
    assert_eq!(
        serde_json::to_string(&*pa).unwrap(),
        serde_json::to_string(&*pb).unwrap()
    );
    assert_eq!(a.data().bytes_of("format"), b.data().bytes_of("format"));
    assert_eq!(
        a.data().bytes_of("off_5A74B0"),
        b.data().bytes_of("off_5A74B0")
    );
}

#[test]
fn shared_instance_runs_both_routines() {
    let mut m = shared::instance().lock();
    m.reset();
    assert_eq!(sub_6b2b40(&mut m, A1, 8), 0x1_2300_0003);
    let lines = sub_hello(&mut m, 0x31415926);
    assert_eq!(lines.len(), 2);
    assert_eq!(m.text().len(), 2);
}
