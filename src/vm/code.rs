//! Compiled expression code: an immutable instruction sequence plus splicing
//! and static stack-depth analysis.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use super::error::{SpliceError, StackError};
use super::instruction::{Instruction, Label};

// ---------------------------------------------------------------------------
// Insertion
// ---------------------------------------------------------------------------

/// An insertion directive: splice `ops` immediately before the instruction
/// currently at `index`.
#[derive(Debug, Clone, PartialEq)]
pub struct Insertion {
    pub index: usize,
    pub ops: Vec<Instruction>,
}

impl Insertion {
    pub fn new(index: usize, ops: Vec<Instruction>) -> Self {
        Self { index, ops }
    }
}

// ---------------------------------------------------------------------------
// StackProfile
// ---------------------------------------------------------------------------

/// Result of stack-depth analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackProfile {
    /// Stack depth on entry to each instruction; `None` when unreachable.
    pub entry_depths: Vec<Option<usize>>,
    /// Deepest the stack ever gets.
    pub max_depth: usize,
}

impl StackProfile {
    /// Depth on entry to the instruction at `index`.
    ///
    /// `index == len` is never reachable (every path ends in a terminal
    /// instruction) and reports `None`.
    pub fn depth_at(&self, index: usize) -> Option<usize> {
        self.entry_depths.get(index).copied().flatten()
    }
}

// ---------------------------------------------------------------------------
// Code
// ---------------------------------------------------------------------------

/// A compiled expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Code {
    name: Rc<str>,
    instructions: Rc<[Instruction]>,
}

impl Code {
    /// Wrap an instruction sequence under the default name `<expr>`.
    pub fn new(instructions: Vec<Instruction>) -> Self {
        Self::named("<expr>", instructions)
    }

    pub fn named(name: impl AsRef<str>, instructions: Vec<Instruction>) -> Self {
        Self {
            name: Rc::from(name.as_ref()),
            instructions: instructions.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Map every label to the index of its `SET_LABEL` instruction.
    pub fn label_table(&self) -> Result<HashMap<Label, usize>, StackError> {
        let mut table = HashMap::new();
        for (idx, op) in self.instructions.iter().enumerate() {
            if let Instruction::SetLabel(label) = op {
                if table.insert(*label, idx).is_some() {
                    return Err(StackError::DuplicateLabel(*label));
                }
            }
        }
        Ok(table)
    }

    /// Build a new code object with the given directives spliced in.
    ///
    /// Directives are applied in ascending index order; directives sharing
    /// an index keep the order in which they were given. An index equal to
    /// the length appends.
    pub fn splice(&self, insertions: &[Insertion]) -> Result<Code, SpliceError> {
        let len = self.instructions.len();
        if let Some(bad) = insertions.iter().find(|ins| ins.index > len) {
            return Err(SpliceError::OutOfRange {
                index: bad.index,
                len,
            });
        }

        let mut ordered: Vec<&Insertion> = insertions.iter().collect();
        ordered.sort_by_key(|ins| ins.index);

        let extra: usize = ordered.iter().map(|ins| ins.ops.len()).sum();
        let mut out = Vec::with_capacity(len + extra);
        let mut pending = ordered.into_iter().peekable();
        for idx in 0..=len {
            while let Some(ins) = pending.next_if(|ins| ins.index == idx) {
                out.extend(ins.ops.iter().cloned());
            }
            if let Some(op) = self.instructions.get(idx) {
                out.push(op.clone());
            }
        }

        Ok(Code {
            name: Rc::clone(&self.name),
            instructions: out.into(),
        })
    }

    /// Where each of this code's instructions lands after `splice`.
    pub fn spliced_positions(&self, insertions: &[Insertion]) -> Vec<usize> {
        let len = self.instructions.len();
        let mut added = vec![0usize; len + 1];
        for ins in insertions.iter().filter(|ins| ins.index <= len) {
            added[ins.index] += ins.ops.len();
        }
        let mut shift = 0;
        (0..len)
            .map(|idx| {
                shift += added[idx];
                idx + shift
            })
            .collect()
    }

    /// Compute the entry stack depth of every reachable instruction.
    ///
    /// Walks the control-flow graph from instruction 0 with an empty stack.
    /// Every join point must agree on depth, no instruction may pop more
    /// than is present, and no path may run past the last instruction.
    pub fn stack_profile(&self) -> Result<StackProfile, StackError> {
        let labels = self.label_table()?;
        let len = self.instructions.len();
        let mut depths: Vec<Option<usize>> = vec![None; len];
        let mut max_depth = 0;
        let mut worklist: Vec<(usize, usize)> = vec![(0, 0)];

        if len == 0 {
            return Err(StackError::FallsOffEnd);
        }

        while let Some((idx, depth)) = worklist.pop() {
            if idx >= len {
                return Err(StackError::FallsOffEnd);
            }
            match depths[idx] {
                Some(seen) if seen == depth => continue,
                Some(seen) => {
                    return Err(StackError::Inconsistent {
                        index: idx,
                        first: seen,
                        second: depth,
                    })
                }
                None => depths[idx] = Some(depth),
            }

            let op = &self.instructions[idx];
            if let Some(label) = op.jump_target() {
                let target = *labels.get(&label).ok_or(StackError::UndefinedLabel(label))?;
                let after = apply_effect(idx, op, depth, true)?;
                max_depth = max_depth.max(after);
                worklist.push((target, after));
            }
            let after = apply_effect(idx, op, depth, false)?;
            max_depth = max_depth.max(after).max(depth);
            if !op.is_terminal() {
                worklist.push((idx + 1, after));
            }
        }

        Ok(StackProfile {
            entry_depths: depths,
            max_depth,
        })
    }
}

fn apply_effect(
    index: usize,
    op: &Instruction,
    depth: usize,
    jump: bool,
) -> Result<usize, StackError> {
    let effect = op.stack_effect(jump);
    if depth < effect.pops {
        return Err(StackError::Underflow {
            index,
            opname: op.opname(),
            depth,
            needs: effect.pops,
        });
    }
    // DUP_TOP and friends momentarily hold `depth - pops + pushes` items.
    Ok(depth - effect.pops + effect.pushes)
}

/// One instruction per line. Labels render as `L<n>:` lines.
impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, op) in self.instructions.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{op}")?;
        }
        Ok(())
    }
}

impl From<Vec<Instruction>> for Code {
    fn from(instructions: Vec<Instruction>) -> Self {
        Code::new(instructions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::instruction::BinaryOp;
    use crate::vm::value::Value;
    use pretty_assertions::assert_eq;

    fn load(name: &str) -> Instruction {
        Instruction::LoadName(name.into())
    }

    fn attr(name: &str) -> Instruction {
        Instruction::LoadAttr(name.into())
    }

    fn sample() -> Code {
        Code::new(vec![
            load("a"),
            attr("x"),
            load("b"),
            attr("y"),
            Instruction::Binary(BinaryOp::Add),
            Instruction::ReturnValue,
        ])
    }

    #[test]
    fn splice_inserts_before_index_in_ascending_order() {
        let code = sample();
        let spliced = code
            .splice(&[
                Insertion::new(3, vec![Instruction::DupTop, Instruction::PopTop]),
                Insertion::new(1, vec![Instruction::LoadConst(Value::None), Instruction::PopTop]),
            ])
            .unwrap();
        assert_eq!(
            spliced.instructions(),
            &[
                load("a"),
                Instruction::LoadConst(Value::None),
                Instruction::PopTop,
                attr("x"),
                load("b"),
                Instruction::DupTop,
                Instruction::PopTop,
                attr("y"),
                Instruction::Binary(BinaryOp::Add),
                Instruction::ReturnValue,
            ]
        );
        // The original is untouched.
        assert_eq!(code.len(), 6);
    }

    #[test]
    fn splice_same_index_keeps_given_order() {
        let code = sample();
        let spliced = code
            .splice(&[
                Insertion::new(1, vec![Instruction::DupTop]),
                Insertion::new(1, vec![Instruction::PopTop]),
            ])
            .unwrap();
        assert_eq!(spliced.instructions()[1], Instruction::DupTop);
        assert_eq!(spliced.instructions()[2], Instruction::PopTop);
    }

    #[test]
    fn splice_at_len_appends_and_past_len_fails() {
        let code = sample();
        let appended = code.splice(&[Insertion::new(6, vec![Instruction::PopTop])]).unwrap();
        assert_eq!(appended.instructions().last(), Some(&Instruction::PopTop));
        assert_eq!(
            code.splice(&[Insertion::new(7, vec![])]),
            Err(SpliceError::OutOfRange { index: 7, len: 6 })
        );
    }

    #[test]
    fn spliced_positions_follow_insertions() {
        let code = sample();
        let insertions = [
            Insertion::new(3, vec![Instruction::DupTop, Instruction::PopTop]),
            Insertion::new(1, vec![Instruction::DupTop]),
        ];
        let positions = code.spliced_positions(&insertions);
        assert_eq!(positions, vec![0, 2, 3, 6, 7, 8]);
        let spliced = code.splice(&insertions).unwrap();
        for (idx, pos) in positions.into_iter().enumerate() {
            assert_eq!(spliced.instructions()[pos], code.instructions()[idx]);
        }
    }

    #[test]
    fn profile_of_straight_line_code() {
        let profile = sample().stack_profile().unwrap();
        assert_eq!(
            profile.entry_depths,
            vec![Some(0), Some(1), Some(1), Some(2), Some(2), Some(1)]
        );
        assert_eq!(profile.max_depth, 2);
    }

    #[test]
    fn profile_follows_both_branches() {
        // a and b
        let code = Code::new(vec![
            load("a"),
            Instruction::JumpIfFalseOrPop(Label(0)),
            load("b"),
            Instruction::SetLabel(Label(0)),
            Instruction::ReturnValue,
        ]);
        let profile = code.stack_profile().unwrap();
        assert_eq!(profile.depth_at(3), Some(1));
        assert_eq!(profile.depth_at(4), Some(1));
    }

    #[test]
    fn profile_reports_underflow() {
        let code = Code::new(vec![Instruction::PopTop, Instruction::ReturnValue]);
        assert!(matches!(
            code.stack_profile(),
            Err(StackError::Underflow { index: 0, .. })
        ));
    }

    #[test]
    fn profile_reports_inconsistent_join() {
        let code = Code::new(vec![
            load("a"),
            Instruction::PopJumpIfFalse(Label(0)),
            load("b"),
            Instruction::SetLabel(Label(0)),
            load("c"),
            Instruction::ReturnValue,
        ]);
        assert!(matches!(
            code.stack_profile(),
            Err(StackError::Inconsistent { index: 3, .. })
        ));
    }

    #[test]
    fn profile_reports_bad_labels_and_fallthrough() {
        let undefined = Code::new(vec![Instruction::Jump(Label(9))]);
        assert_eq!(undefined.stack_profile(), Err(StackError::UndefinedLabel(Label(9))));

        let duplicate = Code::new(vec![
            Instruction::SetLabel(Label(1)),
            Instruction::SetLabel(Label(1)),
            load("a"),
            Instruction::ReturnValue,
        ]);
        assert_eq!(duplicate.stack_profile(), Err(StackError::DuplicateLabel(Label(1))));

        let open = Code::new(vec![load("a")]);
        assert_eq!(open.stack_profile(), Err(StackError::FallsOffEnd));
    }

    #[test]
    fn display_listing() {
        assert_eq!(
            sample().to_string(),
            "LOAD_NAME a\nLOAD_ATTR x\nLOAD_NAME b\nLOAD_ATTR y\nBINARY_ADD\nRETURN_VALUE"
        );
    }
}
