//! Step-by-step execution traces.

use crate::vm::{Code, EvalError, Frame, Scope, Value};

/// One executed instruction: its index and the stack depth on entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub index: usize,
    pub depth: usize,
}

/// Run `code` and record every instruction executed.
pub fn depth_trace(code: &Code, scope: &Scope) -> Result<(Vec<Step>, Value), EvalError> {
    let mut frame = Frame::new(code, scope);
    let mut steps = Vec::new();
    loop {
        steps.push(Step {
            index: frame.pc(),
            depth: frame.depth(),
        });
        if let Some(value) = frame.step()? {
            return Ok((steps, value));
        }
    }
}

/// Keep the steps of an instrumented trace that executed original
/// instructions, mapped back to their original indices.
///
/// `positions` is [`Code::spliced_positions`] of the original code.
pub fn original_steps(steps: &[Step], positions: &[usize]) -> Vec<Step> {
    steps
        .iter()
        .filter_map(|step| {
            positions
                .binary_search(&step.index)
                .ok()
                .map(|index| Step {
                    index,
                    depth: step.depth,
                })
        })
        .collect()
}

/// Opcode names of `code`, one per instruction.
pub fn opnames(code: &Code) -> Vec<&'static str> {
    code.instructions().iter().map(|op| op.opname()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::Insertion;
    use crate::vm::Instruction;

    #[test]
    fn trace_records_entry_depths() {
        let code = Code::parse_listing("LOAD_CONST 1\nLOAD_CONST 2\nBINARY_ADD\nRETURN_VALUE").unwrap();
        let (steps, value) = depth_trace(&code, &Scope::new()).unwrap();
        assert_eq!(value, Value::Int(3));
        let depths: Vec<usize> = steps.iter().map(|s| s.depth).collect();
        assert_eq!(depths, vec![0, 1, 2, 1]);
    }

    #[test]
    fn original_steps_skip_inserted_ops() {
        let code = Code::parse_listing("LOAD_CONST 1\nRETURN_VALUE").unwrap();
        let insertions = [Insertion::new(1, vec![Instruction::DupTop, Instruction::PopTop])];
        let spliced = code.splice(&insertions).unwrap();
        let (steps, _) = depth_trace(&spliced, &Scope::new()).unwrap();
        assert_eq!(steps.len(), 4);

        let kept = original_steps(&steps, &code.spliced_positions(&insertions));
        assert_eq!(
            kept,
            vec![Step { index: 0, depth: 0 }, Step { index: 1, depth: 1 }]
        );
        assert_eq!(opnames(&spliced), vec!["LOAD_CONST", "DUP_TOP", "POP_TOP", "RETURN_VALUE"]);
    }
}
