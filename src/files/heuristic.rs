//! Network-free analysis used as the guaranteed feedback floor.

use super::extract::{decode_text, extension, guess_mime_type, kind_label};
use super::schema::{AnalysisResult, AnalysisSource, FileInfo};
use std::fmt::Write;

const LONG_LINE: usize = 120;
const LARGE_FILE: u64 = 10 * 1024 * 1024;

/// Simple statistics over a text body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextStats {
    pub lines: usize,
    pub non_empty_lines: usize,
    pub words: usize,
    pub characters: usize,
    pub longest_line: usize,
    pub long_lines: usize,
    pub trailing_whitespace_lines: usize,
}

impl TextStats {
    pub fn compute(text: &str) -> Self {
        let mut stats = Self {
            characters: text.chars().count(),
            ..Self::default()
        };
        for line in text.lines() {
            stats.lines += 1;
            let width = line.chars().count();
            if !line.trim().is_empty() {
                stats.non_empty_lines += 1;
            }
            if line.ends_with(|c: char| c == ' ' || c == '\t') {
                stats.trailing_whitespace_lines += 1;
            }
            if width > LONG_LINE {
                stats.long_lines += 1;
            }
            stats.longest_line = stats.longest_line.max(width);
            stats.words += line.split_whitespace().count();
        }
        stats
    }

    pub fn average_words_per_line(&self) -> f64 {
        if self.non_empty_lines == 0 {
            0.0
        } else {
            self.words as f64 / self.non_empty_lines as f64
        }
    }
}

/// Guidance the heuristic echoes back when an instruction was selected.
#[derive(Debug, Clone, Default)]
pub struct Guidance<'a> {
    pub instruction_name: Option<&'a str>,
    pub custom_prompt: Option<&'a str>,
}

/// Build baseline feedback from file metadata and, for text files, statistics.
pub fn analyze(filename: &str, data: &[u8], guidance: &Guidance<'_>) -> AnalysisResult {
    let mime_type = guess_mime_type(filename);
    let size = data.len() as u64;
    let info = FileInfo {
        name: filename.to_string(),
        size,
        mime_type: mime_type.clone(),
        extension: extension(filename),
    };

    let mut md = String::new();
    let _ = writeln!(md, "## File Analysis: {}\n", filename);
    let _ = writeln!(md, "- **Type:** {} (`{}`)", kind_label(&mime_type), mime_type);
    let _ = writeln!(md, "- **Size:** {} ({} bytes)", human_size(size), size);

    let mut observations = Vec::new();
    if size == 0 {
        observations.push("The file is empty.".to_string());
    } else if size > LARGE_FILE {
        observations.push(format!(
            "The file is large ({}); consider splitting it for review.",
            human_size(size)
        ));
    }

    match decode_text(data, filename) {
        Some(text) => {
            let stats = TextStats::compute(&text);
            let _ = writeln!(md, "\n### Text Statistics\n");
            let _ = writeln!(md, "- Lines: {} ({} non-empty)", stats.lines, stats.non_empty_lines);
            let _ = writeln!(md, "- Words: {}", stats.words);
            let _ = writeln!(md, "- Characters: {}", stats.characters);
            let _ = writeln!(
                md,
                "- Average words per line: {:.1}",
                stats.average_words_per_line()
            );
            let _ = writeln!(md, "- Longest line: {} characters", stats.longest_line);

            if stats.long_lines > 0 {
                observations.push(format!(
                    "{} line(s) exceed {} characters; shorter lines are easier to review.",
                    stats.long_lines, LONG_LINE
                ));
            }
            if stats.trailing_whitespace_lines > 0 {
                observations.push(format!(
                    "{} line(s) end with trailing whitespace.",
                    stats.trailing_whitespace_lines
                ));
            }
            if size > 0 && stats.words == 0 {
                observations.push("The file contains only whitespace.".to_string());
            }
        }
        None if size > 0 => {
            observations.push(format!(
                "Content of this {} was not inspected locally.",
                kind_label(&mime_type)
            ));
        }
        None => {}
    }

    if !observations.is_empty() {
        let _ = writeln!(md, "\n### Observations\n");
        for o in &observations {
            let _ = writeln!(md, "- {}", o);
        }
    }

    if guidance.instruction_name.is_some() || guidance.custom_prompt.is_some() {
        let _ = writeln!(md, "\n### Guidance\n");
        if let Some(name) = guidance.instruction_name {
            let _ = writeln!(md, "- Instruction file: {}", name);
        }
        if let Some(prompt) = guidance.custom_prompt {
            let _ = writeln!(md, "- Custom prompt: {}", prompt);
        }
        let _ = writeln!(
            md,
            "- Detailed review against this guidance requires AI analysis."
        );
    }

    let _ = write!(md, "\n_Generated locally without AI analysis._");

    AnalysisResult::new(AnalysisSource::Local, md, Some(info))
}

/// Format a byte count with binary units.
pub fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64;
    let mut unit = "B";
    for u in UNITS {
        if value < 1024.0 {
            break;
        }
        value /= 1024.0;
        unit = u;
    }
    format!("{:.1} {}", value, unit)
}
