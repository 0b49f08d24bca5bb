//! Dialect-agnostic instruction rewrites applied before rendering
//! (spec.md §4.9 "Optimizer"): collapsing adjacent `EMIT_STATIC`s keeps
//! the renderer's main loop from doing a flush per source token, and it
//! is the only rewrite safe to apply without touching control-flow
//! opcodes or the `EMIT_UNLESS_BOUNDARY`/`BOUNDARY` pairing the renderer
//! itself interprets at render time.
//!
//! Placeholder-syntax substitution is *not* done here: the renderer asks
//! `DialectConfig` for the right placeholder text as it emits each
//! `ADD_PARAM`, so there is nothing to rewrite ahead of time.

use snapsql_core::ir::OpCode;

/// Returns a copy of `instructions` with runs of consecutive
/// `EmitStatic` opcodes merged into one.
pub fn optimize(instructions: &[OpCode]) -> Vec<OpCode> {
    let mut out: Vec<OpCode> = Vec::with_capacity(instructions.len());
    for op in instructions {
        match (out.last_mut(), op) {
            (Some(OpCode::EmitStatic { value: prev }), OpCode::EmitStatic { value: next }) => {
                prev.push_str(next);
            }
            _ => out.push(op.clone()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merges_adjacent_static_emits() {
        let input = vec![
            OpCode::EmitStatic { value: "SELECT ".to_string() },
            OpCode::EmitStatic { value: "id ".to_string() },
            OpCode::EmitStatic { value: "FROM t".to_string() },
        ];
        let merged = optimize(&input);
        assert_eq!(merged, vec![OpCode::EmitStatic { value: "SELECT id FROM t".to_string() }]);
    }

    #[test]
    fn leaves_non_static_opcodes_untouched() {
        let input = vec![
            OpCode::EmitStatic { value: "a".to_string() },
            OpCode::AddParam { expr_index: 0 },
            OpCode::EmitStatic { value: "b".to_string() },
            OpCode::EmitStatic { value: "c".to_string() },
        ];
        let merged = optimize(&input);
        assert_eq!(
            merged,
            vec![
                OpCode::EmitStatic { value: "a".to_string() },
                OpCode::AddParam { expr_index: 0 },
                OpCode::EmitStatic { value: "bc".to_string() },
            ]
        );
    }
}
