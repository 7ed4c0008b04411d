//! crates/dictation_core/src/align.rs
//!
//! Minimum edit distance alignment over code points.
//!
//! `align(a, b)` explains how to turn `a` (what the learner typed) into `b`
//! (the reference). Every position of both inputs is covered by exactly one
//! operation, and the operations are ordered left to right in both strings.
//! When several minimum-cost paths exist the backtrace prefers the diagonal
//! (match or substitution), then insertion, then deletion, so the output is
//! deterministic.

/// One step of an alignment. Indices are code point positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    /// `a[a_idx] == b[b_idx]`.
    Equal { a: usize, b: usize },
    /// `a[a_idx]` stands where `b[b_idx]` should be.
    Replace { a: usize, b: usize },
    /// `b[b_idx]` has no counterpart in `a`.
    Insert { b: usize },
    /// `a[a_idx]` has no counterpart in `b`.
    Delete { a: usize },
}

impl Op {
    /// Position consumed from `a`, if any.
    pub fn a_index(&self) -> Option<usize> {
        match *self {
            Op::Equal { a, .. } | Op::Replace { a, .. } | Op::Delete { a } => Some(a),
            Op::Insert { .. } => None,
        }
    }

    /// Position consumed from `b`, if any.
    pub fn b_index(&self) -> Option<usize> {
        match *self {
            Op::Equal { b, .. } | Op::Replace { b, .. } | Op::Insert { b } => Some(b),
            Op::Delete { .. } => None,
        }
    }
}

/// Aligns two strings code point by code point.
pub fn align(a: &str, b: &str) -> Vec<Op> {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    align_chars(&a, &b)
}

pub fn align_chars(a: &[char], b: &[char]) -> Vec<Op> {
    let table = cost_table(a, b);
    let (mut i, mut j) = (a.len(), b.len());
    let mut ops = Vec::with_capacity(a.len().max(b.len()));

    while i > 0 || j > 0 {
        let here = table[i][j];
        if i > 0 && j > 0 {
            let same = a[i - 1] == b[j - 1];
            let cost = if same { 0 } else { 1 };
            if here == table[i - 1][j - 1] + cost {
                ops.push(if same {
                    Op::Equal { a: i - 1, b: j - 1 }
                } else {
                    Op::Replace { a: i - 1, b: j - 1 }
                });
                i -= 1;
                j -= 1;
                continue;
            }
        }
        if j > 0 && here == table[i][j - 1] + 1 {
            ops.push(Op::Insert { b: j - 1 });
            j -= 1;
        } else {
            ops.push(Op::Delete { a: i - 1 });
            i -= 1;
        }
    }

    ops.reverse();
    ops
}

/// Edit distance between two strings, in code points.
pub fn distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    cost_table(&a, &b)[a.len()][b.len()]
}

fn cost_table(a: &[char], b: &[char]) -> Vec<Vec<usize>> {
    let mut table = vec![vec![0usize; b.len() + 1]; a.len() + 1];
    for (i, row) in table.iter_mut().enumerate() {
        row[0] = i;
    }
    for j in 0..=b.len() {
        table[0][j] = j;
    }
    for i in 1..=a.len() {
        for j in 1..=b.len() {
            let cost = if a[i - 1] == b[j - 1] { 0 } else { 1 };
            table[i][j] = (table[i - 1][j] + 1)
                .min(table[i][j - 1] + 1)
                .min(table[i - 1][j - 1] + cost);
        }
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const MIXED_TEXT: &str = "[a-zA-Z0-9很久以前有一个皇帝你好，。!? ]{0,16}";

    #[test]
    fn identical_strings_are_all_equal() {
        let ops = align("皇帝", "皇帝");
        assert_eq!(ops, vec![Op::Equal { a: 0, b: 0 }, Op::Equal { a: 1, b: 1 }]);
    }

    #[test]
    fn substitution_is_preferred_over_insert_delete_pair() {
        assert_eq!(align("狗", "帝"), vec![Op::Replace { a: 0, b: 0 }]);
        let ops = align("皇狗", "皇帝");
        assert_eq!(ops[1], Op::Replace { a: 1, b: 1 });
    }

    #[test]
    fn missing_character_is_an_insert() {
        let ops = align("皇", "皇帝");
        assert_eq!(ops, vec![Op::Equal { a: 0, b: 0 }, Op::Insert { b: 1 }]);
    }

    #[test]
    fn extra_character_is_a_delete() {
        let ops = align("皇帝帝", "皇帝");
        assert_eq!(
            ops,
            vec![Op::Equal { a: 0, b: 0 }, Op::Delete { a: 1 }, Op::Equal { a: 2, b: 1 }]
        );
    }

    #[test]
    fn empty_sides() {
        assert!(align("", "").is_empty());
        assert_eq!(align("", "ab"), vec![Op::Insert { b: 0 }, Op::Insert { b: 1 }]);
        assert_eq!(align("ab", ""), vec![Op::Delete { a: 0 }, Op::Delete { a: 1 }]);
    }

    #[test]
    fn tie_break_is_diagonal_then_insert() {
        // "ab" -> "ba": cost 2 either as two substitutions or delete+insert;
        // diagonal-first backtracking picks the substitutions.
        assert_eq!(
            align("ab", "ba"),
            vec![Op::Replace { a: 0, b: 0 }, Op::Replace { a: 1, b: 1 }]
        );
        // With unequal lengths the remaining gap goes to an insertion at the front.
        assert_eq!(
            align("x", "ab"),
            vec![Op::Insert { b: 0 }, Op::Replace { a: 0, b: 1 }]
        );
    }

    #[test]
    fn cost_of_known_pairs() {
        assert_eq!(distance("kitten", "sitting"), 3);
        assert_eq!(distance("皇狗", "皇帝"), 1);
        assert_eq!(distance("", "abc"), 3);
    }

    proptest! {
        #[test]
        fn alignment_covers_both_inputs_exactly_once(a in MIXED_TEXT, b in MIXED_TEXT) {
            let ops = align(&a, &b);
            let a_seen: Vec<usize> = ops.iter().filter_map(Op::a_index).collect();
            let b_seen: Vec<usize> = ops.iter().filter_map(Op::b_index).collect();
            prop_assert_eq!(a_seen, (0..a.chars().count()).collect::<Vec<_>>());
            prop_assert_eq!(b_seen, (0..b.chars().count()).collect::<Vec<_>>());
        }

        #[test]
        fn op_cost_matches_distance(a in MIXED_TEXT, b in MIXED_TEXT) {
            let cost = align(&a, &b)
                .iter()
                .filter(|op| !matches!(op, Op::Equal { .. }))
                .count();
            prop_assert_eq!(cost, distance(&a, &b));
        }
    }
}
