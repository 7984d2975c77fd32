//! Splitting a raw multi-block payload into labeled sections.
//!
//! The vendor's CSV export is a single text body holding up to four
//! blank-line-delimited blocks (glucose readings, IOB, basal, bolus),
//! with no manifest saying which blocks are present. Each block is
//! identified by the leading value of its first data row.

use std::fmt;

/// Number of section slots in a payload.
pub const SECTION_SLOTS: usize = 4;

/// Ordered prefix → kind table. First match wins; a section matching no
/// prefix is dropped. The ordering is load-bearing: a row can in principle
/// match more than one prefix.
const PREFIX_TABLE: [(&str, SectionKind); SECTION_SLOTS] = [
    ("t:slim X2 Insulin Pump", SectionKind::Reading),
    ("IOB", SectionKind::Iob),
    ("Basal", SectionKind::Basal),
    ("Bolus", SectionKind::Bolus),
];

/// One blank-line-delimited block of payload text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSection {
    pub lines: Vec<String>,
}

impl RawSection {
    /// Classifies this section by its second line, or `None` when the
    /// section is too short or matches no known prefix.
    ///
    /// Line 0 is the CSV header; line 1 is the first data row, whose
    /// leading value names the record family. A section needs at least
    /// one more line to carry data worth decoding.
    pub fn kind(&self) -> Option<SectionKind> {
        if self.lines.len() <= 2 {
            return None;
        }
        let probe = self.lines[1].replace('"', "");
        let probe = probe.trim();
        PREFIX_TABLE
            .iter()
            .find(|(prefix, _)| probe.starts_with(prefix))
            .map(|&(_, kind)| kind)
    }
}

/// The record family a section holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SectionKind {
    Reading,
    Iob,
    Basal,
    Bolus,
}

impl SectionKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Reading => "reading",
            Self::Iob => "iob",
            Self::Basal => "basal",
            Self::Bolus => "bolus",
        }
    }
}

impl fmt::Display for SectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Splits raw payload text into sections on blank lines.
///
/// The result is padded with `None` up to [`SECTION_SLOTS`] entries;
/// payloads may legitimately contain fewer sections (e.g. no boluses that
/// day). An empty payload yields one empty section plus padding, never an
/// error.
pub fn split_sections(text: &str) -> Vec<Option<RawSection>> {
    let mut sections = vec![RawSection { lines: Vec::new() }];
    for line in text.lines() {
        if line.trim().is_empty() {
            sections.push(RawSection { lines: Vec::new() });
        } else {
            // lines() guarantees at least one element
            sections.last_mut().unwrap().lines.push(line.to_string());
        }
    }

    let mut slots: Vec<Option<RawSection>> = sections.into_iter().map(Some).collect();
    while slots.len() < SECTION_SLOTS {
        slots.push(None);
    }
    slots
}

/// Classified sections of one payload.
#[derive(Debug, Default)]
pub struct TherapySections {
    pub reading: Option<RawSection>,
    pub iob: Option<RawSection>,
    pub basal: Option<RawSection>,
    pub bolus: Option<RawSection>,
}

/// Splits and classifies a payload in one pass.
///
/// Unclassifiable sections are dropped with a debug log; the absence of a
/// section type is a valid state, not a failure.
pub fn classify_sections(text: &str) -> TherapySections {
    let mut out = TherapySections::default();
    for section in split_sections(text).into_iter().flatten() {
        match section.kind() {
            Some(SectionKind::Reading) => out.reading = Some(section),
            Some(SectionKind::Iob) => out.iob = Some(section),
            Some(SectionKind::Basal) => out.basal = Some(section),
            Some(SectionKind::Bolus) => out.bolus = Some(section),
            None => {
                if !section.lines.is_empty() {
                    tracing::debug!(lines = section.lines.len(), "dropping unclassified section");
                }
            }
        }
    }
    out
}
