/// Maximum text forwarded to the inference provider (100KB) to keep prompts bounded.
pub const MAX_EXCERPT_LEN: usize = 102_400;

/// Extensions whose bytes are kept verbatim as editable text.
const TEXT_EXTENSIONS: &[&str] = &[
    "txt", "md", "markdown", "csv", "json", "xml", "html", "htm", "yaml", "yml", "toml", "log",
    "rst",
];

/// Lower-cased extension of `filename`, or an empty string.
pub fn extension(filename: &str) -> String {
    match filename.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => ext.to_lowercase(),
        _ => String::new(),
    }
}

/// Whether a file with this name is treated as text.
pub fn is_text_filename(filename: &str) -> bool {
    TEXT_EXTENSIONS.contains(&extension(filename).as_str())
}

/// Decode the bytes of a text-classified file.
///
/// Returns `None` for binary names and for text names whose bytes are not valid
/// UTF-8, so callers never store a lossy rendition of the upload.
pub fn decode_text(data: &[u8], filename: &str) -> Option<String> {
    if !is_text_filename(filename) {
        return None;
    }
    std::str::from_utf8(data).ok().map(str::to_string)
}

/// Bounded prefix of `text` for prompts, cut on a char boundary.
pub fn excerpt(text: &str) -> &str {
    if text.len() <= MAX_EXCERPT_LEN {
        return text;
    }
    let mut end = MAX_EXCERPT_LEN;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Guess MIME type from filename extension.
pub fn guess_mime_type(filename: &str) -> String {
    match extension(filename).as_str() {
        "txt" | "log" => "text/plain",
        "md" | "markdown" => "text/markdown",
        "rst" => "text/x-rst",
        "csv" => "text/csv",
        "json" => "application/json",
        "xml" => "application/xml",
        "yaml" | "yml" => "application/yaml",
        "toml" => "application/toml",
        "html" | "htm" => "text/html",
        "pdf" => "application/pdf",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xls" => "application/vnd.ms-excel",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "ppt" => "application/vnd.ms-powerpoint",
        "pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "svg" => "image/svg+xml",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "ogg" => "audio/ogg",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mov" => "video/quicktime",
        "zip" => "application/zip",
        "tar" => "application/x-tar",
        "gz" => "application/gzip",
        _ => "application/octet-stream",
    }
    .to_string()
}

/// Coarse human label for a MIME type, used in feedback text.
pub fn kind_label(mime_type: &str) -> &'static str {
    match mime_type {
        t if t.starts_with("text/") => "text document",
        "application/json" | "application/xml" | "application/yaml" | "application/toml" => {
            "structured text"
        }
        "application/pdf" => "PDF document",
        t if t.contains("wordprocessing") || t == "application/msword" => "word-processor document",
        t if t.contains("spreadsheet") || t == "application/vnd.ms-excel" => "spreadsheet",
        t if t.contains("presentation") || t == "application/vnd.ms-powerpoint" => "presentation",
        t if t.starts_with("image/") => "image",
        t if t.starts_with("audio/") => "audio file",
        t if t.starts_with("video/") => "video file",
        "application/zip" | "application/x-tar" | "application/gzip" => "archive",
        _ => "binary file",
    }
}
