//! File blobs and the small helpers the composer uses to describe them.

use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;

/// An attachment's bytes plus the metadata needed to send and label it.
///
/// Cloning is cheap; the bytes are shared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileBlob {
    pub name: String,
    pub media_type: String,
    pub bytes: Arc<[u8]>,
}

impl FileBlob {
    pub fn new(name: impl Into<String>, media_type: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            media_type: media_type.into(),
            bytes: Arc::from(bytes.into()),
        }
    }

    /// Read a file from disk, inferring its media type from the extension.
    pub fn from_path(path: &Path) -> io::Result<Self> {
        let bytes = fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "file".to_string());
        Ok(Self::new(name, media_type_for_path(path), bytes))
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn is_image(&self) -> bool {
        is_image(&self.media_type)
    }

    pub fn is_pdf(&self) -> bool {
        is_pdf(&self.media_type)
    }

    pub fn extension(&self) -> String {
        file_extension(&self.name)
    }
}

/// Lowercase extension without the dot, or "" when the name has none.
pub fn file_extension(name: &str) -> String {
    match name.rsplit_once('.') {
        Some((_, ext)) => ext.to_lowercase(),
        None => String::new(),
    }
}

pub fn is_image(media_type: &str) -> bool {
    media_type.starts_with("image/")
}

pub fn is_pdf(media_type: &str) -> bool {
    media_type == "application/pdf"
}

/// Best-effort MIME type from a path's extension.
pub fn media_type_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "svg" => "image/svg+xml",
        "pdf" => "application/pdf",
        "txt" => "text/plain",
        "md" => "text/markdown",
        "csv" => "text/csv",
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "js" | "jsx" => "text/javascript",
        "ts" | "tsx" => "application/typescript",
        "json" => "application/json",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xls" => "application/vnd.ms-excel",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "ppt" => "application/vnd.ms-powerpoint",
        "pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        "zip" => "application/zip",
        "rar" => "application/vnd.rar",
        "7z" => "application/x-7z-compressed",
        _ => "application/octet-stream",
    }
}

/// Icon category for an attachment chip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Pdf,
    Word,
    Excel,
    PowerPoint,
    Image,
    Text,
    Archive,
    JavaScript,
    TypeScript,
    Json,
    Html,
    Css,
    Markdown,
    Other,
}

impl FileKind {
    pub fn from_name(name: &str) -> Self {
        match file_extension(name).as_str() {
            "pdf" => FileKind::Pdf,
            "doc" | "docx" => FileKind::Word,
            "xls" | "xlsx" => FileKind::Excel,
            "ppt" | "pptx" => FileKind::PowerPoint,
            "jpg" | "jpeg" | "png" | "gif" | "webp" => FileKind::Image,
            "txt" => FileKind::Text,
            "zip" | "rar" | "7z" => FileKind::Archive,
            "js" | "jsx" => FileKind::JavaScript,
            "ts" | "tsx" => FileKind::TypeScript,
            "json" => FileKind::Json,
            "html" => FileKind::Html,
            "css" => FileKind::Css,
            "md" => FileKind::Markdown,
            _ => FileKind::Other,
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            FileKind::Pdf => "📕",
            FileKind::Word => "📘",
            FileKind::Excel => "📗",
            FileKind::PowerPoint => "📙",
            FileKind::Image => "🖼",
            FileKind::Text => "📄",
            FileKind::Archive => "🗜",
            FileKind::JavaScript | FileKind::TypeScript => "📜",
            FileKind::Json => "🧾",
            FileKind::Html | FileKind::Css => "🌐",
            FileKind::Markdown => "📝",
            FileKind::Other => "📎",
        }
    }
}

/// Human-readable size: "0 Bytes", "10 Bytes", "1.5 KB", "2 MB".
pub fn format_file_size(bytes: u64, decimals: usize) -> String {
    const UNITS: [&str; 5] = ["Bytes", "KB", "MB", "GB", "TB"];

    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let mut unit = 0;
    let mut value = bytes as f64;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let formatted = format!("{:.*}", decimals, value);
    let trimmed = if formatted.contains('.') {
        formatted.trim_end_matches('0').trim_end_matches('.')
    } else {
        formatted.as_str()
    };
    format!("{} {}", trimmed, UNITS[unit])
}

/// Shorten a file name to `max_len` characters, keeping its extension.
///
/// `"quarterly-report-final.pdf"` at 20 becomes `"quarterly-repo...pdf"`.
pub fn truncate_file_name(name: &str, max_len: usize) -> String {
    if name.chars().count() <= max_len {
        return name.to_string();
    }

    let ext = file_extension(name);
    let stem = match name.rsplit_once('.') {
        Some((stem, _)) => stem,
        None => name,
    };

    let keep = max_len.saturating_sub(3 + ext.chars().count());
    if keep == 0 {
        return format!("...{}", ext);
    }

    let truncated: String = stem.chars().take(keep).collect();
    format!("{}...{}", truncated, ext)
}

pub fn validate_file_size(blob: &FileBlob, max_size_mb: u64) -> bool {
    blob.size() <= max_size_mb.saturating_mul(1024 * 1024)
}

/// `allowed` entries may be MIME types ("image/png"), dotted (".pdf") or bare ("pdf") extensions.
pub fn validate_file_type(blob: &FileBlob, allowed: &[String]) -> bool {
    let ext = blob.extension();
    allowed.iter().any(|t| {
        t.eq_ignore_ascii_case(&blob.media_type)
            || (!ext.is_empty()
                && (t.eq_ignore_ascii_case(&ext)
                    || t.strip_prefix('.')
                        .is_some_and(|e| e.eq_ignore_ascii_case(&ext))))
    })
}
