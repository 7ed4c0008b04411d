//! crates/dictation_core/src/text.rs
//!
//! Punctuation/whitespace stripping with a map back to the original string.

use unicode_categories::UnicodeCategories;

/// A string with punctuation and whitespace removed.
///
/// `index_map[i]` is the code point index in the original string of the
/// `i`-th code point of `stripped`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
    pub stripped: String,
    pub index_map: Vec<usize>,
}

impl Normalized {
    /// Number of code points kept.
    pub fn len(&self) -> usize {
        self.index_map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index_map.is_empty()
    }

    pub fn chars(&self) -> Vec<char> {
        self.stripped.chars().collect()
    }
}

/// True for code points that never take part in a comparison: whitespace and
/// every Unicode punctuation category (ASCII and full-width CJK alike).
pub fn is_ignorable(ch: char) -> bool {
    ch.is_whitespace() || ch.is_punctuation()
}

pub fn normalize(text: &str) -> Normalized {
    let mut stripped = String::with_capacity(text.len());
    let mut index_map = Vec::new();
    for (idx, ch) in text.chars().enumerate() {
        if !is_ignorable(ch) {
            stripped.push(ch);
            index_map.push(idx);
        }
    }
    Normalized { stripped, index_map }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const MIXED_TEXT: &str = "[a-zA-Z0-9 很久以前有一个皇帝你好我谢再见，。！？、“”《》,.!?;:'-]{0,24}";

    #[test]
    fn strips_cjk_and_ascii_punctuation() {
        let n = normalize("很久以前，有一个皇帝。");
        assert_eq!(n.stripped, "很久以前有一个皇帝");
        assert_eq!(n.index_map, vec![0, 1, 2, 3, 5, 6, 7, 8, 9]);

        let n = normalize("Hello, world!");
        assert_eq!(n.stripped, "Helloworld");
        assert_eq!(n.index_map[5], 7);
    }

    #[test]
    fn full_width_marks_and_quotes_are_ignored() {
        let n = normalize("「你好」！ 《书》？……");
        assert_eq!(n.stripped, "你好书");
    }

    #[test]
    fn empty_and_all_punctuation_inputs() {
        assert!(normalize("").is_empty());
        assert!(normalize(" ，。!? \t\n").is_empty());
    }

    #[test]
    fn symbols_and_digits_are_kept() {
        let n = normalize("I have 3 cats +");
        assert_eq!(n.stripped, "Ihave3cats+");
    }

    proptest! {
        #[test]
        fn normalization_is_idempotent(text in MIXED_TEXT) {
            let once = normalize(&text);
            let twice = normalize(&once.stripped);
            prop_assert_eq!(&twice.stripped, &once.stripped);
            prop_assert_eq!(twice.index_map, (0..once.len()).collect::<Vec<_>>());
        }

        #[test]
        fn index_map_points_at_kept_characters(text in MIXED_TEXT) {
            let chars: Vec<char> = text.chars().collect();
            let n = normalize(&text);
            let picked: String = n.index_map.iter().map(|&i| chars[i]).collect();
            prop_assert_eq!(picked, n.stripped.clone());
            prop_assert!(n.index_map.windows(2).all(|w| w[0] < w[1]));
            prop_assert!(n.stripped.chars().all(|c| !is_ignorable(c)));
        }
    }
}
