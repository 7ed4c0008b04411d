//! crates/dictation_core/src/stats.rs
//!
//! Daily work accounting shared by every `DailySummaryStore`.

use chrono::{Duration, NaiveDate};

use crate::domain::{DailyStats, DailyWorkRow, DayStats, PASS_THRESHOLD};

/// How many days the activity window covers, today included.
pub const WINDOW_DAYS: i64 = 7;

/// Contribution of one finished session to `sentences_above_threshold`.
pub fn above_threshold_increment(average_accuracy: f64) -> u32 {
    if average_accuracy >= f64::from(PASS_THRESHOLD) {
        1
    } else {
        0
    }
}

/// Folds a learner's daily rows into today's totals, the current streak and
/// the last seven days (oldest first).
///
/// The streak counts consecutive days, ending today, on which at least one
/// session finished above the threshold. A day without any work, or with
/// work but nothing above threshold, ends it.
pub fn summarize(rows: &[DailyWorkRow], today: NaiveDate) -> DailyStats {
    let day = |date: NaiveDate| rows.iter().filter(move |row| row.date == date);

    let today_above_threshold = day(today).map(|r| r.sentences_above_threshold).sum();
    let today_total_sentences = day(today).map(|r| r.total_sentences).sum();
    let today_sessions = day(today).count();

    let mut streak_days = 0;
    let mut check = today;
    loop {
        let mut worked = day(check).peekable();
        if worked.peek().is_none() {
            break;
        }
        if !worked.any(|r| r.sentences_above_threshold > 0) {
            break;
        }
        streak_days += 1;
        check -= Duration::days(1);
    }

    let last_7_days = (0..WINDOW_DAYS)
        .rev()
        .map(|offset| {
            let date = today - Duration::days(offset);
            let sentences_above_threshold: u32 = day(date).map(|r| r.sentences_above_threshold).sum();
            DayStats {
                date,
                weekday: date.format("%a").to_string(),
                sentences_above_threshold,
                total_sentences: day(date).map(|r| r.total_sentences).sum(),
                completed: sentences_above_threshold > 0,
            }
        })
        .collect();

    DailyStats {
        today_above_threshold,
        today_total_sentences,
        today_sessions,
        streak_days,
        last_7_days,
    }
}
