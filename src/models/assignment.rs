// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Assignment models: the stored document, its editable fields and the
//! per-viewer view entry.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Firestore field names of an assignment document.
pub mod fields {
    pub const TITLE: &str = "title";
    pub const DEADLINE: &str = "deadline";
    pub const DESCRIPTION: &str = "description";
    pub const SUBJECT: &str = "subject";
    pub const STARRED: &str = "starred";
    pub const COMPLETED_BY: &str = "completedBy";

    /// Every field an edit writes; `completedBy` is not one of them.
    pub const EDITABLE: [&str; 5] = [TITLE, DEADLINE, DESCRIPTION, SUBJECT, STARRED];
}

/// School subject an assignment belongs to (closed set).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub enum Subject {
    #[default]
    #[serde(rename = "math")]
    Math,
    #[serde(rename = "ag")]
    Ag,
    #[serde(rename = "values")]
    Values,
    #[serde(rename = "science")]
    Science,
    #[serde(rename = "r2")]
    R2,
    #[serde(rename = "fil")]
    Fil,
    #[serde(rename = "er")]
    Er,
    #[serde(rename = "eng")]
    Eng,
    #[serde(rename = "mapeh/music")]
    MapehMusic,
    #[serde(rename = "mapeh/arts")]
    MapehArts,
    #[serde(rename = "mapeh/pe")]
    MapehPe,
    #[serde(rename = "mapeh/health")]
    MapehHealth,
    #[serde(rename = "ap")]
    Ap,
}

impl Subject {
    /// All subjects in display order.
    pub const ALL: [Subject; 13] = [
        Subject::Math,
        Subject::Ag,
        Subject::Values,
        Subject::Science,
        Subject::R2,
        Subject::Fil,
        Subject::Er,
        Subject::Eng,
        Subject::MapehMusic,
        Subject::MapehArts,
        Subject::MapehPe,
        Subject::MapehHealth,
        Subject::Ap,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Subject::Math => "math",
            Subject::Ag => "ag",
            Subject::Values => "values",
            Subject::Science => "science",
            Subject::R2 => "r2",
            Subject::Fil => "fil",
            Subject::Er => "er",
            Subject::Eng => "eng",
            Subject::MapehMusic => "mapeh/music",
            Subject::MapehArts => "mapeh/arts",
            Subject::MapehPe => "mapeh/pe",
            Subject::MapehHealth => "mapeh/health",
            Subject::Ap => "ap",
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Subject {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Subject::ALL
            .into_iter()
            .find(|subject| subject.as_str() == s)
            .ok_or_else(|| format!("unknown subject: {s}"))
    }
}

/// Editable assignment fields; also the editor's form state.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct AssignmentFields {
    pub title: String,
    #[serde(default, with = "deadline_format")]
    #[cfg_attr(feature = "binding-generation", ts(type = "string | null"))]
    pub deadline: Option<NaiveDate>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub subject: Subject,
    #[serde(default)]
    pub starred: bool,
}

/// Assignment document as stored in the shared collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    /// Store-assigned document ID (not written as a field)
    #[serde(alias = "_firestore_id", default, skip_serializing)]
    pub id: String,
    pub title: String,
    #[serde(default, with = "deadline_format")]
    pub deadline: Option<NaiveDate>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub subject: Subject,
    #[serde(default)]
    pub starred: bool,
    /// IDs of users who marked the assignment done (set semantics)
    #[serde(default)]
    pub completed_by: Vec<String>,
}

impl Assignment {
    /// A new document built from form fields, with nobody having completed it.
    pub fn new(id: impl Into<String>, fields: AssignmentFields) -> Self {
        Self {
            id: id.into(),
            title: fields.title,
            deadline: fields.deadline,
            description: fields.description,
            subject: fields.subject,
            starred: fields.starred,
            completed_by: Vec::new(),
        }
    }

    /// Whether `viewer_id` has marked this assignment done.
    pub fn is_completed_by(&self, viewer_id: &str) -> bool {
        self.completed_by.iter().any(|id| id == viewer_id)
    }

    /// Overwrite the editable fields, leaving `completed_by` untouched.
    pub fn apply_fields(&mut self, fields: &AssignmentFields) {
        self.title = fields.title.clone();
        self.deadline = fields.deadline;
        self.description = fields.description.clone();
        self.subject = fields.subject;
        self.starred = fields.starred;
    }
}

/// One entry of the synchronized list as seen by a particular user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct AssignmentView {
    pub id: String,
    pub title: String,
    #[serde(with = "deadline_format")]
    #[cfg_attr(feature = "binding-generation", ts(type = "string | null"))]
    pub deadline: Option<NaiveDate>,
    pub description: String,
    pub subject: Subject,
    pub starred: bool,
    pub completed_by: Vec<String>,
    /// Whether the viewing user is in `completed_by`
    pub completed: bool,
    /// e.g. "October 16, 2026"
    pub deadline_label: Option<String>,
    /// e.g. "3 days left", "Due today", "Overdue"
    pub due_status: Option<String>,
}

impl AssignmentView {
    /// The editable fields of this entry, as loaded into the editor.
    pub fn fields(&self) -> AssignmentFields {
        AssignmentFields {
            title: self.title.clone(),
            deadline: self.deadline,
            description: self.description.clone(),
            subject: self.subject,
            starred: self.starred,
        }
    }
}

/// Deadlines are stored as `YYYY-MM-DD`; an empty string or null means none.
mod deadline_format {
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%d";

    pub fn serialize<S: Serializer>(value: &Option<NaiveDate>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(date) => s.serialize_str(&date.format(FORMAT).to_string()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<NaiveDate>, D::Error> {
        let raw: Option<String> = Option::deserialize(d)?;
        match raw.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(s) => NaiveDate::parse_from_str(s, FORMAT)
                .map(Some)
                .map_err(serde::de::Error::custom),
        }
    }
}
