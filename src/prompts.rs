//! Prompt text sent to the inference provider.

use crate::files::extract::{excerpt, guess_mime_type};
use crate::files::heuristic::human_size;
use crate::instructions::InstructionRecord;
use std::fmt::Write;

/// Where the model can find the uploaded file.
#[derive(Debug, Clone, Copy)]
pub struct FileRef<'a> {
    pub name: &'a str,
    pub size: u64,
    pub view_url: &'a str,
    pub download_url: &'a str,
}

/// Free-text review of an uploaded file.
pub fn upload_review(
    file: FileRef<'_>,
    text: Option<&str>,
    instruction: Option<&InstructionRecord>,
) -> String {
    let mut p = String::from(
        "You are an experienced reviewer. Give constructive, specific feedback on the file \
         described below. Answer in markdown with the sections Summary, Strengths, Issues \
         and Suggestions.\n\n",
    );
    let _ = writeln!(p, "File name: {}", file.name);
    let _ = writeln!(p, "File type: {}", guess_mime_type(file.name));
    let _ = writeln!(p, "File size: {}", human_size(file.size));
    let _ = writeln!(p, "File URL: {}", file.download_url);
    let _ = writeln!(p, "Viewer URL: {}", file.view_url);

    if let Some(record) = instruction {
        let guidance = record.guidance_text();
        if !guidance.is_empty() {
            let _ = write!(
                p,
                "\nFollow these reviewer instructions when judging the file:\n{}\n",
                guidance
            );
        }
    }
    if let Some(text) = text {
        let _ = write!(p, "\nFile content:\n{}\n", excerpt(text));
    }
    p
}

/// Text the checklist prompt scores: inline content when available, else a pointer.
pub fn checklist_subject(file: FileRef<'_>, text: Option<&str>) -> String {
    match text {
        Some(t) => excerpt(t).to_string(),
        None => format!(
            "The document \"{}\" is available at {} (viewer: {}).",
            file.name, file.download_url, file.view_url
        ),
    }
}

/// Feedback on an instruction file itself.
pub fn instruction_review(record: &InstructionRecord) -> Option<String> {
    let body = if !record.is_binary {
        excerpt(&record.content).to_string()
    } else {
        let url = record.backup_url.as_deref()?;
        format!("The document is available at {}", url)
    };

    let mut p = String::from(
        "You are helping an author improve a set of reviewer instructions. Point out \
         ambiguities, gaps and contradictions, then suggest concrete improvements. Answer in \
         markdown.\n\n",
    );
    let _ = writeln!(p, "Instruction file: {}", record.filename);
    if let Some(prompt) = &record.custom_prompt {
        let _ = writeln!(p, "Author's note: {}", prompt);
    }
    let _ = write!(p, "\nInstructions:\n{}", body);
    Some(p)
}
