//! Instruction-stream monitors and the instrumentation pass.
//!
//! A [`Monitor`] reads a code sequence and proposes [`Insertion`]s: short
//! fragments spliced in front of selected instructions that call back into
//! host code and then leave the stack exactly as they found it.
//! [`instrument`] gathers the fragments from several monitors, rejects any
//! that would disturb the stack, and builds the instrumented [`Code`].

pub mod attribute;
pub mod call;

use tracing::{debug, trace, warn};

use crate::vm::{Code, Insertion, Instruction, SpliceError, StackError, StackProfile};

pub use attribute::{attribute_site, AttributeHook, AttributeMonitor};
pub use call::{call_site, split_arguments, CallHook, CallMonitor};

/// A pass that proposes stack-neutral insertions for a code sequence.
pub trait Monitor {
    /// Directives for `code`. Each directive's ops must put back exactly
    /// as many values as they take, and must not branch.
    fn insertion_code(&self, code: &[Instruction]) -> Vec<Insertion>;
}

/// Errors from [`instrument`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InstrumentError {
    #[error("code cannot be analyzed: {0}")]
    Unanalyzable(#[source] StackError),
    #[error(transparent)]
    Splice(#[from] SpliceError),
    #[error("instrumented code cannot be analyzed: {0}")]
    Corrupted(#[source] StackError),
    #[error("instruction {index} entered at depth {found:?} after instrumentation, expected {expected}")]
    Drift {
        index: usize,
        expected: usize,
        found: Option<usize>,
    },
}

/// Instrument `code` with every monitor's directives, verifying stack
/// neutrality before and after splicing.
pub fn instrument(code: &Code, monitors: &[&dyn Monitor]) -> Result<Code, InstrumentError> {
    instrument_with(code, monitors, true)
}

/// Like [`instrument`]; with `verify` off the directives are spliced
/// without any stack analysis.
pub fn instrument_with(
    code: &Code,
    monitors: &[&dyn Monitor],
    verify: bool,
) -> Result<Code, InstrumentError> {
    let proposed: Vec<Insertion> = monitors
        .iter()
        .flat_map(|monitor| monitor.insertion_code(code.instructions()))
        .collect();

    if !verify {
        debug!(code = code.name(), sites = proposed.len(), "instrumenting unverified");
        return Ok(code.splice(&proposed)?);
    }

    let profile = code
        .stack_profile()
        .map_err(InstrumentError::Unanalyzable)?;
    let accepted: Vec<Insertion> = proposed
        .into_iter()
        .filter(|ins| accept(ins, &profile))
        .collect();

    let instrumented = code.splice(&accepted)?;
    verify_depths(code, &profile, &accepted, &instrumented)?;
    debug!(
        code = code.name(),
        sites = accepted.len(),
        before = code.len(),
        after = instrumented.len(),
        "instrumented"
    );
    Ok(instrumented)
}

fn accept(ins: &Insertion, profile: &StackProfile) -> bool {
    let Some(entry) = profile.depth_at(ins.index) else {
        trace!(index = ins.index, "directive at unreachable site dropped");
        return false;
    };
    match simulate(&ins.ops, entry) {
        Some(exit) if exit == entry => true,
        outcome => {
            warn!(
                index = ins.index,
                entry,
                exit = ?outcome,
                "directive is not stack-neutral, dropped"
            );
            false
        }
    }
}

/// Depth after running `ops` from `entry`, or `None` if they underflow or
/// contain control flow. Values already on the stack may be consumed.
fn simulate(ops: &[Instruction], entry: usize) -> Option<usize> {
    let mut depth = entry;
    for op in ops {
        if op.jump_target().is_some() || op.is_terminal() {
            return None;
        }
        let effect = op.stack_effect(false);
        depth = depth.checked_sub(effect.pops)? + effect.pushes;
    }
    Some(depth)
}

/// Every original instruction must start at its original depth.
fn verify_depths(
    original: &Code,
    profile: &StackProfile,
    accepted: &[Insertion],
    instrumented: &Code,
) -> Result<(), InstrumentError> {
    let after = instrumented
        .stack_profile()
        .map_err(InstrumentError::Corrupted)?;

    let positions = original.spliced_positions(accepted);
    for (index, position) in positions.into_iter().enumerate() {
        let Some(expected) = profile.depth_at(index) else {
            continue;
        };
        let found = after.depth_at(position);
        if found != Some(expected) {
            return Err(InstrumentError::Drift {
                index,
                expected,
                found,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::{evaluate, Scope, Value};
    use crate::object::Record;
    use std::cell::Cell;
    use std::rc::Rc;

    struct Count(Cell<usize>);

    impl AttributeHook for Count {
        fn monitor_attribute(&self, _: &Value, _: &str) {
            self.0.set(self.0.get() + 1);
        }
    }

    impl CallHook for Count {
        fn monitor_function(&self, _: &Value, _: &[Value], _: &[(Rc<str>, Value)]) {
            self.0.set(self.0.get() + 1);
        }
    }

    /// Pushes an extra value and never pops it.
    struct Leaky;

    impl Monitor for Leaky {
        fn insertion_code(&self, code: &[Instruction]) -> Vec<Insertion> {
            vec![Insertion::new(
                code.len() - 1,
                vec![Instruction::LoadConst(Value::None)],
            )]
        }
    }

    fn sample() -> Code {
        // len(p.name) + p.size
        Code::parse_listing(
            "LOAD_NAME len\nLOAD_NAME p\nLOAD_ATTR name\nCALL_FUNCTION 1\nLOAD_NAME p\nLOAD_ATTR size\nBINARY_ADD\nRETURN_VALUE",
        )
        .unwrap()
    }

    fn scope() -> Scope {
        let p = Rc::new(Record::new("Item").with("name", "abc").with("size", 4));
        Scope::new().with("p", Value::Object(p))
    }

    #[test]
    fn combined_monitors_preserve_the_result() {
        let attrs = AttributeMonitor::new(Count(Cell::new(0)));
        let calls = CallMonitor::new(Count(Cell::new(0)));
        let code = sample();
        let instrumented = instrument(&code, &[&attrs, &calls]).unwrap();

        assert_eq!(instrumented.len(), code.len() + 2 * 6 + 7);
        assert_eq!(evaluate(&instrumented, &scope()), Ok(Value::Int(7)));
        assert_eq!(attrs.hook().0.get(), 2);
        assert_eq!(calls.hook().0.get(), 1);
    }

    #[test]
    fn non_neutral_directives_are_dropped() {
        let code = sample();
        let instrumented = instrument(&code, &[&Leaky]).unwrap();
        assert_eq!(instrumented, code);
    }

    #[test]
    fn unverified_instrumentation_splices_everything() {
        let code = sample();
        let instrumented = instrument_with(&code, &[&Leaky], false).unwrap();
        assert_eq!(instrumented.len(), code.len() + 1);
    }

    #[test]
    fn unanalyzable_code_is_rejected() {
        let code = Code::new(vec![Instruction::PopTop, Instruction::ReturnValue]);
        assert!(matches!(
            instrument(&code, &[]),
            Err(InstrumentError::Unanalyzable(StackError::Underflow { .. }))
        ));
    }

    #[test]
    fn verify_depths_reports_drift_and_corruption() {
        let code = sample();
        let profile = code.stack_profile().unwrap();
        assert_eq!(verify_depths(&code, &profile, &[], &code), Ok(()));

        let leaky = Leaky.insertion_code(code.instructions());
        let spliced = code.splice(&leaky).unwrap();
        assert_eq!(
            verify_depths(&code, &profile, &leaky, &spliced),
            Err(InstrumentError::Drift {
                index: 7,
                expected: 1,
                found: Some(2),
            })
        );

        let popping = [Insertion::new(0, vec![Instruction::PopTop])];
        let spliced = code.splice(&popping).unwrap();
        assert!(matches!(
            verify_depths(&code, &profile, &popping, &spliced),
            Err(InstrumentError::Corrupted(StackError::Underflow { .. }))
        ));
    }

    #[test]
    fn simulate_tracks_depth() {
        assert_eq!(simulate(&[Instruction::DupTop, Instruction::PopTop], 1), Some(1));
        assert_eq!(simulate(&[Instruction::PopTop], 0), None);
        assert_eq!(simulate(&[Instruction::ReturnValue], 1), None);
    }
}
