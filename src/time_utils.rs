// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared helpers for date/time formatting.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};

/// Format a UTC timestamp as RFC3339 using a `Z` suffix.
pub fn format_utc_rfc3339(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Long-form deadline label, e.g. `October 16, 2026`.
pub fn format_deadline(date: NaiveDate) -> String {
    date.format("%B %-d, %Y").to_string()
}

/// Human countdown to a deadline relative to `today`.
pub fn due_status(deadline: NaiveDate, today: NaiveDate) -> String {
    let days = (deadline - today).num_days();
    match days {
        d if d > 1 => format!("{d} days left"),
        1 => "1 day left".to_string(),
        0 => "Due today".to_string(),
        _ => "Overdue".to_string(),
    }
}
