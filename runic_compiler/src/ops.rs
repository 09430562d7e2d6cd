//! Engine-supplied standard operations.
//!
//! Registered into every parser's catalog at construction: register
//! assignment, integer arithmetic in accumulate and three-argument forms,
//! the conditional-branch tests used by `if`, and the control transfers the
//! block statements lower to. Each overload selects its own monomorphic
//! handler, so handlers decode exactly the immediates their signature
//! declared.

use crate::catalog::Catalog;
use runic_core::argkind::{ArgFlags, ArgKind, BaseType};
use runic_core::error::RuntimeError;
use runic_core::exec::{read_i64, read_u16, read_u32, OpResult, ProgPos, WorkerState};
use runic_core::intern::StringInterner;
use runic_core::value::ScriptValue;

/// Writable int register.
pub const INT_VAR: ArgKind = ArgKind::new(BaseType::INT, ArgFlags::VAR);
/// Readable int register.
pub const INT_REG: ArgKind = ArgKind::new(BaseType::INT, ArgFlags::REG);
/// Inline int constant.
pub const INT_CONST: ArgKind = ArgKind::plain(BaseType::INT);
/// Jump target.
pub const LABEL_ARG: ArgKind = ArgKind::plain(BaseType::LABEL);

#[inline]
fn store(st: &mut WorkerState, dst: u16, r: Result<i64, &'static str>) -> OpResult {
    match r {
        Ok(v) => {
            st.regs.set_i64(dst, v);
            OpResult::Continue
        }
        Err(message) => OpResult::Error(RuntimeError::handler(message)),
    }
}

fn add_vals(a: i64, b: i64) -> Result<i64, &'static str> {
    Ok(a.wrapping_add(b))
}

fn sub_vals(a: i64, b: i64) -> Result<i64, &'static str> {
    Ok(a.wrapping_sub(b))
}

fn mul_vals(a: i64, b: i64) -> Result<i64, &'static str> {
    Ok(a.wrapping_mul(b))
}

fn div_vals(a: i64, b: i64) -> Result<i64, &'static str> {
    if b == 0 {
        Err("division by zero")
    } else {
        Ok(a.wrapping_div(b))
    }
}

fn mod_vals(a: i64, b: i64) -> Result<i64, &'static str> {
    if b == 0 {
        Err("modulo by zero")
    } else {
        Ok(a.wrapping_rem(b))
    }
}

fn min_vals(a: i64, b: i64) -> Result<i64, &'static str> {
    Ok(a.min(b))
}

fn max_vals(a: i64, b: i64) -> Result<i64, &'static str> {
    Ok(a.max(b))
}

/// Stamps the handler family of one arithmetic operation: accumulate forms
/// (`dst op= src`) and three-argument forms (`dst = a op b`), over every
/// register/constant operand mix, plus the constant folder.
macro_rules! arith_handlers {
    ($m:ident, $vals:path) => {
        mod $m {
            use super::*;

            pub fn rr2(st: &mut WorkerState, code: &[u8], pc: &mut ProgPos) -> OpResult {
                let dst = read_u16(code, pc);
                let src = read_u16(code, pc);
                let (a, b) = (st.regs.get_i64(dst), st.regs.get_i64(src));
                store(st, dst, $vals(a, b))
            }

            pub fn rc2(st: &mut WorkerState, code: &[u8], pc: &mut ProgPos) -> OpResult {
                let dst = read_u16(code, pc);
                let b = read_i64(code, pc);
                let a = st.regs.get_i64(dst);
                store(st, dst, $vals(a, b))
            }

            pub fn rrr(st: &mut WorkerState, code: &[u8], pc: &mut ProgPos) -> OpResult {
                let dst = read_u16(code, pc);
                let a = st.regs.get_i64(read_u16(code, pc));
                let b = st.regs.get_i64(read_u16(code, pc));
                store(st, dst, $vals(a, b))
            }

            pub fn rrc(st: &mut WorkerState, code: &[u8], pc: &mut ProgPos) -> OpResult {
                let dst = read_u16(code, pc);
                let a = st.regs.get_i64(read_u16(code, pc));
                let b = read_i64(code, pc);
                store(st, dst, $vals(a, b))
            }

            pub fn rcr(st: &mut WorkerState, code: &[u8], pc: &mut ProgPos) -> OpResult {
                let dst = read_u16(code, pc);
                let a = read_i64(code, pc);
                let b = st.regs.get_i64(read_u16(code, pc));
                store(st, dst, $vals(a, b))
            }

            pub fn rcc(st: &mut WorkerState, code: &[u8], pc: &mut ProgPos) -> OpResult {
                let dst = read_u16(code, pc);
                let a = read_i64(code, pc);
                let b = read_i64(code, pc);
                store(st, dst, $vals(a, b))
            }

            pub fn fold(args: &[ScriptValue]) -> Option<ScriptValue> {
                match args {
                    [a, b] => {
                        let (a, b) = (a.as_int()?, b.as_int()?);
                        $vals(a, b).ok().map(ScriptValue::int)
                    }
                    _ => None,
                }
            }
        }
    };
}

arith_handlers!(add_op, add_vals);
arith_handlers!(sub_op, sub_vals);
arith_handlers!(mul_op, mul_vals);
arith_handlers!(div_op, div_vals);
arith_handlers!(mod_op, mod_vals);
arith_handlers!(min_op, min_vals);
arith_handlers!(max_op, max_vals);

fn eq_vals(a: i64, b: i64) -> bool {
    a == b
}

fn neq_vals(a: i64, b: i64) -> bool {
    a != b
}

fn lt_vals(a: i64, b: i64) -> bool {
    a < b
}

fn le_vals(a: i64, b: i64) -> bool {
    a <= b
}

fn gt_vals(a: i64, b: i64) -> bool {
    a > b
}

fn ge_vals(a: i64, b: i64) -> bool {
    a >= b
}

/// Stamps the branch-test family of one comparison: two int operands in
/// every register/constant mix plus the taken/not-taken jump targets.
macro_rules! test_handlers {
    ($m:ident, $vals:path) => {
        mod $m {
            use super::*;

            #[inline]
            fn branch(a: i64, b: i64, code: &[u8], pc: &mut ProgPos) -> OpResult {
                let taken = read_u32(code, pc);
                let fallthrough = read_u32(code, pc);
                pc.0 = if $vals(a, b) { taken } else { fallthrough };
                OpResult::Continue
            }

            pub fn rr(st: &mut WorkerState, code: &[u8], pc: &mut ProgPos) -> OpResult {
                let a = st.regs.get_i64(read_u16(code, pc));
                let b = st.regs.get_i64(read_u16(code, pc));
                branch(a, b, code, pc)
            }

            pub fn rc(st: &mut WorkerState, code: &[u8], pc: &mut ProgPos) -> OpResult {
                let a = st.regs.get_i64(read_u16(code, pc));
                let b = read_i64(code, pc);
                branch(a, b, code, pc)
            }

            pub fn cr(st: &mut WorkerState, code: &[u8], pc: &mut ProgPos) -> OpResult {
                let a = read_i64(code, pc);
                let b = st.regs.get_i64(read_u16(code, pc));
                branch(a, b, code, pc)
            }

            pub fn cc(_st: &mut WorkerState, code: &[u8], pc: &mut ProgPos) -> OpResult {
                let a = read_i64(code, pc);
                let b = read_i64(code, pc);
                branch(a, b, code, pc)
            }
        }
    };
}

test_handlers!(eq_op, eq_vals);
test_handlers!(neq_op, neq_vals);
test_handlers!(lt_op, lt_vals);
test_handlers!(le_op, le_vals);
test_handlers!(gt_op, gt_vals);
test_handlers!(ge_op, ge_vals);

fn set_rr(st: &mut WorkerState, code: &[u8], pc: &mut ProgPos) -> OpResult {
    let dst = read_u16(code, pc);
    let src = read_u16(code, pc);
    let v = st.regs.get_i64(src);
    st.regs.set_i64(dst, v);
    OpResult::Continue
}

fn set_rc(st: &mut WorkerState, code: &[u8], pc: &mut ProgPos) -> OpResult {
    let dst = read_u16(code, pc);
    let v = read_i64(code, pc);
    st.regs.set_i64(dst, v);
    OpResult::Continue
}

fn clear_r(st: &mut WorkerState, code: &[u8], pc: &mut ProgPos) -> OpResult {
    let dst = read_u16(code, pc);
    st.regs.set_i64(dst, 0);
    OpResult::Continue
}

fn goto_l(_st: &mut WorkerState, code: &[u8], pc: &mut ProgPos) -> OpResult {
    pc.0 = read_u32(code, pc);
    OpResult::Continue
}

fn exit_h(_st: &mut WorkerState, _code: &[u8], _pc: &mut ProgPos) -> OpResult {
    OpResult::End
}

/// Register the standard operation set into a fresh catalog.
pub fn register_standard(catalog: &mut Catalog, interner: &StringInterner) {
    macro_rules! op {
        ($name:literal, $args:expr, $h:path) => {
            catalog
                .register_overload(interner.intern($name), $args, $h)
                .expect("standard op registered twice");
        };
    }
    macro_rules! arith {
        ($name:literal, $m:ident) => {
            op!($name, &[INT_REG, INT_REG], $m::rr2);
            op!($name, &[INT_REG, INT_CONST], $m::rc2);
            op!($name, &[INT_REG, INT_REG, INT_REG], $m::rrr);
            op!($name, &[INT_REG, INT_REG, INT_CONST], $m::rrc);
            op!($name, &[INT_REG, INT_CONST, INT_REG], $m::rcr);
            op!($name, &[INT_REG, INT_CONST, INT_CONST], $m::rcc);
            catalog.set_fold($name, $m::fold);
        };
    }
    macro_rules! test {
        ($name:literal, $m:ident) => {
            op!($name, &[INT_REG, INT_REG, LABEL_ARG, LABEL_ARG], $m::rr);
            op!($name, &[INT_REG, INT_CONST, LABEL_ARG, LABEL_ARG], $m::rc);
            op!($name, &[INT_CONST, INT_REG, LABEL_ARG, LABEL_ARG], $m::cr);
            op!($name, &[INT_CONST, INT_CONST, LABEL_ARG, LABEL_ARG], $m::cc);
        };
    }

    op!("set", &[INT_REG, INT_REG], set_rr);
    op!("set", &[INT_REG, INT_CONST], set_rc);
    op!("clear", &[INT_REG], clear_r);

    arith!("add", add_op);
    arith!("sub", sub_op);
    arith!("mul", mul_op);
    arith!("div", div_op);
    arith!("mod", mod_op);
    arith!("min", min_op);
    arith!("max", max_op);

    test!("eq", eq_op);
    test!("neq", neq_op);
    test!("lt", lt_op);
    test!("le", le_op);
    test!("gt", gt_op);
    test!("ge", ge_op);

    op!("goto", &[LABEL_ARG], goto_l);
    op!("exit", &[], exit_h);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_catalog_contents() {
        let interner = StringInterner::new();
        let mut catalog = Catalog::new();
        register_standard(&mut catalog, &interner);

        assert_eq!(catalog.get("add").unwrap().overloads.len(), 6);
        assert_eq!(catalog.get("set").unwrap().overloads.len(), 2);
        assert_eq!(catalog.get("gt").unwrap().overloads.len(), 4);
        assert_eq!(catalog.get("exit").unwrap().overloads[0].args.len(), 0);
        assert!(catalog.get("add").unwrap().fold.is_some());
        assert!(catalog.get("gt").unwrap().fold.is_none());
    }

    #[test]
    fn test_value_fns() {
        assert_eq!(add_vals(3, 4), Ok(7));
        assert_eq!(sub_vals(3, 4), Ok(-1));
        assert_eq!(div_vals(7, 2), Ok(3));
        assert!(div_vals(7, 0).is_err());
        assert!(mod_vals(7, 0).is_err());
        assert_eq!(min_vals(3, -4), Ok(-4));
        assert_eq!(max_vals(3, -4), Ok(3));
    }

    #[test]
    fn test_fold_two_int_constants() {
        let folded = add_op::fold(&[ScriptValue::int(2), ScriptValue::int(3)]).unwrap();
        assert_eq!(folded.as_int(), Some(5));
        assert!(div_op::fold(&[ScriptValue::int(2), ScriptValue::int(0)]).is_none());
        assert!(add_op::fold(&[ScriptValue::int(2)]).is_none());
        assert!(add_op::fold(&[ScriptValue::int(2), ScriptValue::null()]).is_none());
    }

    #[test]
    fn test_set_and_clear_handlers() {
        let mut st = WorkerState::new();
        let mut code = Vec::new();
        code.extend_from_slice(&8u16.to_le_bytes());
        code.extend_from_slice(&42i64.to_le_bytes());
        let mut pc = ProgPos::START;
        assert_eq!(set_rc(&mut st, &code, &mut pc), OpResult::Continue);
        assert_eq!(st.regs.get_i64(8), 42);

        let clear_code = 8u16.to_le_bytes().to_vec();
        let mut pc = ProgPos::START;
        clear_r(&mut st, &clear_code, &mut pc);
        assert_eq!(st.regs.get_i64(8), 0);
    }

    #[test]
    fn test_branch_handler_sets_pc() {
        let mut st = WorkerState::new();
        st.regs.set_i64(0, 5);
        st.regs.set_i64(8, 2);

        let mut code = Vec::new();
        code.extend_from_slice(&0u16.to_le_bytes());
        code.extend_from_slice(&8u16.to_le_bytes());
        code.extend_from_slice(&100u32.to_le_bytes());
        code.extend_from_slice(&200u32.to_le_bytes());

        let mut pc = ProgPos::START;
        gt_op::rr(&mut st, &code, &mut pc);
        assert_eq!(pc.0, 100);

        let mut pc = ProgPos::START;
        le_op::rr(&mut st, &code, &mut pc);
        assert_eq!(pc.0, 200);
    }

    #[test]
    fn test_div_by_zero_is_handler_failure() {
        let mut st = WorkerState::new();
        let mut code = Vec::new();
        code.extend_from_slice(&0u16.to_le_bytes());
        code.extend_from_slice(&0i64.to_le_bytes());
        let mut pc = ProgPos::START;
        let r = div_op::rc2(&mut st, &code, &mut pc);
        assert!(matches!(r, OpResult::Error(RuntimeError::HandlerFailure { .. })));
    }
}
