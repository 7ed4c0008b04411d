//! crates/dictation_core/src/correction.rs
//!
//! Turns a learner's transcription and the reference sentence into annotated
//! feedback.
//!
//! The markup is built by walking the *original* reference string so its
//! punctuation and spacing come through untouched. Only the stripped forms
//! take part in the alignment: a reference character that was matched is
//! emitted plain, a substituted one is emitted as the learner's character
//! (deleted) followed by the reference character (inserted), and a missing one
//! as inserted. Extra characters typed by the learner have no place in the
//! reference, so they are gathered and appended as one deleted run at the end.

use crate::align::{align_chars, Op};
use crate::domain::PASS_THRESHOLD;
use crate::error::{CoreError, CoreResult};
use crate::text::{is_ignorable, normalize};

/// Longest submission accepted, in code points.
pub const MAX_INPUT_CHARS: usize = 1000;

/// A run of the rendered correction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Plain(String),
    /// Typed by the learner but not part of the reference.
    Deleted(String),
    /// Part of the reference but not typed by the learner.
    Inserted(String),
}

impl Segment {
    pub fn text(&self) -> &str {
        match self {
            Segment::Plain(s) | Segment::Deleted(s) | Segment::Inserted(s) => s,
        }
    }
}

/// Coarse verdict shown next to the accuracy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feedback {
    Perfect,
    VeryGood,
    Good,
    GettingThere,
    NeedsPractice,
    Poor,
}

impl Feedback {
    pub fn from_accuracy(accuracy: u8) -> Self {
        match accuracy {
            100..=u8::MAX => Feedback::Perfect,
            85..=99 => Feedback::VeryGood,
            70..=84 => Feedback::Good,
            50..=69 => Feedback::GettingThere,
            25..=49 => Feedback::NeedsPractice,
            _ => Feedback::Poor,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Feedback::Perfect => "Perfect!",
            Feedback::VeryGood => "Very Good!",
            Feedback::Good => "Good!",
            Feedback::GettingThere => "Getting there..",
            Feedback::NeedsPractice => "Needs Practice..",
            Feedback::Poor => "Poor..",
        }
    }

    pub fn color(&self) -> &'static str {
        match self {
            Feedback::Perfect => "#00ff00",
            Feedback::VeryGood => "#00cc00",
            Feedback::Good => "#008000",
            Feedback::GettingThere => "#fbc02d",
            Feedback::NeedsPractice => "#ffa500",
            Feedback::Poor => "#c62828",
        }
    }
}

/// The outcome of checking one submission against one reference.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrectionResult {
    pub markup: Vec<Segment>,
    /// 0..=100.
    pub accuracy: u8,
    /// Code point positions in the reference that were matched exactly.
    pub correct_codepoints: Vec<usize>,
    /// The matched reference characters, in order.
    pub correct_text: String,
    pub is_exact_match: bool,
}

impl CorrectionResult {
    pub fn passed(&self) -> bool {
        self.accuracy >= PASS_THRESHOLD
    }

    pub fn feedback(&self) -> Feedback {
        Feedback::from_accuracy(self.accuracy)
    }

    /// Renders the markup with `diff-del` / `diff-ins` spans.
    pub fn to_html(&self) -> String {
        let mut html = String::new();
        for segment in &self.markup {
            match segment {
                Segment::Plain(text) => html.push_str(&escape_html(text)),
                Segment::Deleted(text) => {
                    html.push_str("<span class='diff-del'>");
                    html.push_str(&escape_html(text));
                    html.push_str("</span>");
                }
                Segment::Inserted(text) => {
                    html.push_str("<span class='diff-ins'>");
                    html.push_str(&escape_html(text));
                    html.push_str("</span>");
                }
            }
        }
        html
    }

    /// The markup without annotations, i.e. the reference text plus any
    /// learner-only characters.
    pub fn plain_text(&self) -> String {
        self.markup.iter().map(Segment::text).collect()
    }
}

/// Rejects submissions that cannot be a transcription and trims the rest.
pub fn validate_submission(user_input: &str) -> CoreResult<&str> {
    let trimmed = user_input.trim();
    if trimmed.chars().count() > MAX_INPUT_CHARS {
        return Err(CoreError::InvalidInput(format!(
            "submission is longer than {} characters",
            MAX_INPUT_CHARS
        )));
    }
    if trimmed.chars().any(|c| c.is_control() && !c.is_whitespace()) {
        return Err(CoreError::InvalidInput(
            "submission contains control characters".to_string(),
        ));
    }
    Ok(trimmed)
}

/// Validates the submission and renders its correction.
pub fn check(user_input: &str, reference: &str) -> CoreResult<CorrectionResult> {
    let user_input = validate_submission(user_input)?;
    Ok(render(user_input, reference))
}

#[derive(Clone, Copy)]
enum Mark {
    Missing,
    Matched,
    Replaced(char),
}

/// Compares a submission to the reference. Never fails.
pub fn render(user_input: &str, reference: &str) -> CorrectionResult {
    let user = normalize(user_input);
    let expected = normalize(reference);

    if user.is_empty() {
        let mut markup = Vec::new();
        if !reference.is_empty() {
            markup.push(Segment::Inserted(reference.to_string()));
        }
        return CorrectionResult {
            markup,
            accuracy: 0,
            correct_codepoints: Vec::new(),
            correct_text: String::new(),
            is_exact_match: false,
        };
    }

    let user_chars = user.chars();
    let expected_chars = expected.chars();
    let mut marks = vec![Mark::Missing; expected_chars.len()];
    let mut extra = String::new();
    for op in align_chars(&user_chars, &expected_chars) {
        match op {
            Op::Equal { b, .. } => marks[b] = Mark::Matched,
            Op::Replace { a, b } => marks[b] = Mark::Replaced(user_chars[a]),
            Op::Insert { .. } => {}
            Op::Delete { a } => extra.push(user_chars[a]),
        }
    }

    let mut builder = MarkupBuilder::default();
    let mut correct_codepoints = Vec::new();
    let mut correct_text = String::new();
    let mut cursor = 0;
    for (idx, ch) in reference.chars().enumerate() {
        if is_ignorable(ch) {
            builder.plain(ch);
            continue;
        }
        match marks[cursor] {
            Mark::Matched => {
                builder.plain(ch);
                correct_codepoints.push(idx);
                correct_text.push(ch);
            }
            Mark::Replaced(typed) => {
                builder.deleted(typed);
                builder.inserted(ch);
            }
            Mark::Missing => builder.inserted(ch),
        }
        cursor += 1;
    }
    if !extra.is_empty() {
        builder.push(Segment::Deleted(extra));
    }

    let is_exact_match =
        correct_codepoints.len() == expected.len() && user.stripped == correct_text;
    let mut accuracy = if expected.is_empty() {
        0
    } else {
        (100.0 * correct_codepoints.len() as f64 / expected.len() as f64).round() as u8
    };
    // Rounding or extra typed characters must not look like a perfect answer.
    if accuracy == 100 && !is_exact_match {
        accuracy = 99;
    }

    CorrectionResult {
        markup: builder.finish(),
        accuracy,
        correct_codepoints,
        correct_text,
        is_exact_match,
    }
}

/// Collects segments, merging adjacent runs of the same kind.
#[derive(Default)]
struct MarkupBuilder {
    segments: Vec<Segment>,
}

impl MarkupBuilder {
    fn plain(&mut self, ch: char) {
        self.push(Segment::Plain(ch.to_string()));
    }

    fn deleted(&mut self, ch: char) {
        self.push(Segment::Deleted(ch.to_string()));
    }

    fn inserted(&mut self, ch: char) {
        self.push(Segment::Inserted(ch.to_string()));
    }

    fn push(&mut self, segment: Segment) {
        match (self.segments.last_mut(), segment) {
            (Some(Segment::Plain(run)), Segment::Plain(s))
            | (Some(Segment::Deleted(run)), Segment::Deleted(s))
            | (Some(Segment::Inserted(run)), Segment::Inserted(s)) => run.push_str(&s),
            (_, segment) => self.segments.push(segment),
        }
    }

    fn finish(self) -> Vec<Segment> {
        self.segments
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}
