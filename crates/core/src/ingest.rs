use crate::models::DEFAULT_CATEGORY;
use crate::{IngestError, SourceDocument};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

const DOCUMENT_EXTENSIONS: [&str; 3] = ["txt", "md", "markdown"];

pub fn discover_text_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let is_document = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                DOCUMENT_EXTENSIONS
                    .iter()
                    .any(|known| ext.eq_ignore_ascii_case(known))
            });

        if is_document {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

pub struct SkippedDocument {
    pub path: PathBuf,
    pub reason: String,
}

pub struct CorpusLoad {
    pub documents: Vec<SourceDocument>,
    pub skipped_files: Vec<SkippedDocument>,
}

/// Reads every text document under `folder`. Files that cannot be read are
/// reported in `skipped_files` instead of failing the whole load.
pub fn load_corpus(folder: &Path) -> Result<CorpusLoad, IngestError> {
    let files = discover_text_files(folder);

    if files.is_empty() {
        return Err(IngestError::InvalidArgument(format!(
            "no text documents found in {}",
            folder.display()
        )));
    }

    let mut documents = Vec::new();
    let mut skipped_files = Vec::new();

    for path in files {
        match load_document(folder, &path) {
            Ok(document) => documents.push(document),
            Err(error) => {
                warn!(path = %path.display(), %error, "skipping unreadable document");
                skipped_files.push(SkippedDocument {
                    path,
                    reason: error.to_string(),
                });
            }
        }
    }

    Ok(CorpusLoad {
        documents,
        skipped_files,
    })
}

pub fn load_document(root: &Path, path: &Path) -> Result<SourceDocument, IngestError> {
    let text = fs::read_to_string(path)?;
    let title = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| {
            IngestError::MissingFileName(format!("path missing filename: {}", path.display()))
        })?;

    Ok(SourceDocument {
        doc_id: generate_document_id(path),
        title: title.to_string(),
        category: category_for(root, path),
        text,
    })
}

/// Name of the directory holding the document, relative to the corpus root.
fn category_for(root: &Path, path: &Path) -> String {
    path.parent()
        .filter(|parent| *parent != root)
        .and_then(|parent| parent.file_name())
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| DEFAULT_CATEGORY.to_string())
}

pub fn generate_document_id(path: &Path) -> String {
    let mut hasher = Sha256::new();
    hasher.update(path.to_string_lossy().as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..16].to_string()
}
