//! Conflict naming for keep-both resolution
//!
//! Generates unique file names for conflict copies, following the pattern:
//! `filename (conflicted copy YYYY-MM-DD XXXXXXXX).ext`

use chrono::NaiveDate;
use uuid::Uuid;

/// Generates unique conflict file names
pub struct ConflictNamer;

impl ConflictNamer {
    /// Generates a conflict copy filename
    ///
    /// Given "report.docx", produces something like:
    /// "report (conflicted copy 2026-08-01 a1b2c3d4).docx"
    pub fn generate(original_name: &str, date: NaiveDate) -> String {
        let stamp = date.format("%Y-%m-%d");
        let short_uuid = &Uuid::new_v4().to_string()[..8];

        if let Some(dot_pos) = original_name.rfind('.') {
            let stem = &original_name[..dot_pos];
            let ext = &original_name[dot_pos..];
            format!("{stem} (conflicted copy {stamp} {short_uuid}){ext}")
        } else {
            format!("{original_name} (conflicted copy {stamp} {short_uuid})")
        }
    }

    /// Verifies the generated name doesn't collide with existing names
    ///
    /// If the name already exists, appends an incrementing suffix.
    pub fn generate_unique<F>(original_name: &str, date: NaiveDate, mut exists: F) -> String
    where
        F: FnMut(&str) -> bool,
    {
        let candidate = Self::generate(original_name, date);
        if !exists(&candidate) {
            return candidate;
        }

        // Extremely unlikely with a UUID in the name, but handle it.
        for i in 2..=99 {
            let numbered = if let Some(dot_pos) = candidate.rfind('.') {
                let stem = &candidate[..dot_pos];
                let ext = &candidate[dot_pos..];
                format!("{stem} {i}{ext}")
            } else {
                format!("{candidate} {i}")
            };

            if !exists(&numbered) {
                return numbered;
            }
        }

        format!("{original_name}.conflict-{}", Uuid::new_v4())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 8, 1).unwrap()
    }

    #[test]
    fn generate_with_extension() {
        let name = ConflictNamer::generate("report.docx", date());
        assert!(name.starts_with("report (conflicted copy 2026-08-01 "));
        assert!(name.ends_with(").docx"));
    }

    #[test]
    fn generate_without_extension() {
        let name = ConflictNamer::generate("Makefile", date());
        assert!(name.starts_with("Makefile (conflicted copy "));
        assert!(name.ends_with(')'));
    }

    #[test]
    fn generate_with_multiple_dots() {
        let name = ConflictNamer::generate("archive.tar.gz", date());
        assert!(name.ends_with(").gz"));
        assert!(name.contains("archive.tar (conflicted copy"));
    }

    #[test]
    fn generate_unique_avoids_collisions() {
        let taken: Vec<String> = Vec::new();
        let name = ConflictNamer::generate_unique("a.txt", date(), |n| {
            taken.iter().any(|t| t == n)
        });
        assert!(name.contains("conflicted copy"));
    }

    #[test]
    fn generate_unique_numbered_fallback() {
        // Claim every candidate once so the numbered branch is exercised.
        let mut first: Option<String> = None;
        let name = ConflictNamer::generate_unique("a.txt", date(), |n| {
            if first.is_none() {
                first = Some(n.to_string());
                true
            } else {
                false
            }
        });
        assert_ne!(Some(&name), first.as_ref());
        assert!(name.ends_with(".txt"));
    }
}
