use std::path::{Path, PathBuf};

use rayon::prelude::*;

use crate::{
    chunking::{self, Chunk},
    config::RetrieverConfig,
    error::{Error, Result},
    tokens::TokenCounter,
};

/// Separator placed between the fields of a tabular row.
pub const FIELD_SEPARATOR: &str = " → ";

/// How a file's text is extracted, decided by its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// Comma-separated values; one text unit per data row.
    Tabular,
    /// Page-oriented documents split into paragraphs.
    Pdf,
    /// Plain text and markdown, split into word windows.
    Text,
    Unsupported,
}

impl FileKind {
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);

        match ext.as_deref() {
            Some("csv") => Self::Tabular,
            Some("pdf") => Self::Pdf,
            Some("md" | "txt") => Self::Text,
            _ => Self::Unsupported,
        }
    }
}

/// A file found in the input directory.
#[derive(Debug, Clone)]
pub struct DiscoveredFile {
    /// File name, used as the chunk source.
    pub name: String,
    /// File name without its extension.
    pub stem: String,
    pub path: PathBuf,
    pub kind: FileKind,
}

/// List the regular files directly inside `dir`, sorted by name.
///
/// Hidden files and sub-directories are skipped. Unsupported files are
/// still returned (with [`FileKind::Unsupported`]) so callers can report
/// them.
pub fn discover_files(dir: &Path) -> Result<Vec<DiscoveredFile>> {
    if !dir.is_dir() {
        return Err(Error::Config(format!(
            "input directory does not exist: {}",
            dir.display()
        )));
    }

    let mut results = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();

        // Skip hidden files.
        if name.starts_with('.') {
            continue;
        }

        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&name)
            .to_string();
        let kind = FileKind::from_path(&path);
        results.push(DiscoveredFile {
            name,
            stem,
            path,
            kind,
        });
    }

    results.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(results)
}

/// Load every supported file in the input directory and chunk it.
///
/// Files are processed in parallel but the result keeps the sorted file
/// order, and chunk order within each file.
pub fn load_chunks(
    config: &RetrieverConfig,
    counter: &TokenCounter,
) -> Result<Vec<Chunk>> {
    let files = discover_files(&config.input_dir)?;

    for file in files.iter().filter(|f| f.kind == FileKind::Unsupported) {
        tracing::info!(file = %file.name, "skipping unsupported file type");
    }

    let per_file: Vec<Vec<Chunk>> = files
        .par_iter()
        .filter(|f| f.kind != FileKind::Unsupported)
        .map(|file| chunk_file(file, config, counter))
        .collect::<Result<_>>()?;

    let chunks: Vec<Chunk> = per_file.into_iter().flatten().collect();
    if chunks.is_empty() {
        return Err(Error::EmptyCorpus {
            dir: config.input_dir.clone(),
        });
    }

    Ok(chunks)
}

/// Extract and chunk a single file according to its kind.
pub fn chunk_file(
    file: &DiscoveredFile,
    config: &RetrieverConfig,
    counter: &TokenCounter,
) -> Result<Vec<Chunk>> {
    let texts = match file.kind {
        FileKind::Tabular => read_table(&file.path, &file.stem)?,
        FileKind::Pdf => {
            chunk_paragraph_text(&read_pdf(&file.path)?, config, counter)
        }
        FileKind::Text => {
            let content = std::fs::read_to_string(&file.path)
                .map_err(|e| extract_error(&file.path, e))?;
            chunking::split_words(&content, config.text_window_words())
                .into_iter()
                .map(|window| format!("{}: {window}", file.stem))
                .collect()
        }
        FileKind::Unsupported => Vec::new(),
    };

    tracing::debug!(file = %file.name, chunks = texts.len(), "chunked file");

    Ok(texts
        .into_iter()
        .map(|text| Chunk::new(file.name.as_str(), text))
        .collect())
}

/// Chunk blank-line separated text.
///
/// With a token target the paragraphs are packed up to the target;
/// otherwise every paragraph is a chunk of its own. No source prefix is
/// added.
pub fn chunk_paragraph_text(
    text: &str,
    config: &RetrieverConfig,
    counter: &TokenCounter,
) -> Vec<String> {
    let paragraphs = chunking::split_paragraphs(text);
    if config.target_chunk_tokens > 0 {
        chunking::pack_paragraphs(
            &paragraphs,
            config.target_chunk_tokens,
            counter,
        )
    } else {
        paragraphs
    }
}

/// Turn every data row of a CSV file into `"{stem}: a → b → c"`.
///
/// The first row is the header. Empty fields are skipped, and rows left
/// with no fields produce nothing.
fn read_table(path: &Path, stem: &str) -> Result<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)?;

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let line = record
            .iter()
            .map(str::trim)
            .filter(|field| !field.is_empty())
            .collect::<Vec<_>>()
            .join(FIELD_SEPARATOR);
        if !line.is_empty() {
            rows.push(format!("{stem}: {line}"));
        }
    }
    Ok(rows)
}

/// Extract the full text of a PDF, pages separated by a blank line.
fn read_pdf(path: &Path) -> Result<String> {
    let mut doc = pdf_oxide::PdfDocument::open(path)
        .map_err(|e| extract_error(path, e))?;
    let page_count = doc.page_count().map_err(|e| extract_error(path, e))?;

    let mut pages = Vec::with_capacity(page_count);
    for page in 0..page_count {
        let text =
            doc.extract_text(page).map_err(|e| extract_error(path, e))?;
        pages.push(text);
    }
    Ok(pages.join("\n\n"))
}

fn extract_error(path: &Path, e: impl std::fmt::Display) -> Error {
    Error::Extract {
        path: path.to_path_buf(),
        reason: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_for(dir: &Path) -> RetrieverConfig {
        RetrieverConfig::new(dir, dir.join("db"))
    }

    #[test]
    fn file_kind_dispatch_is_case_insensitive() {
        assert_eq!(FileKind::from_path(Path::new("a.CSV")), FileKind::Tabular);
        assert_eq!(FileKind::from_path(Path::new("a.Pdf")), FileKind::Pdf);
        assert_eq!(FileKind::from_path(Path::new("a.md")), FileKind::Text);
        assert_eq!(FileKind::from_path(Path::new("a.TXT")), FileKind::Text);
        assert_eq!(
            FileKind::from_path(Path::new("a.png")),
            FileKind::Unsupported
        );
        assert_eq!(
            FileKind::from_path(Path::new("Makefile")),
            FileKind::Unsupported
        );
    }

    #[test]
    fn discovery_is_sorted_and_flat() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("z.md"), "z").unwrap();
        std::fs::write(tmp.path().join("a.txt"), "a").unwrap();
        std::fs::write(tmp.path().join(".hidden.md"), "h").unwrap();
        let sub = tmp.path().join("sub");
        std::fs::create_dir(&sub).unwrap();
        std::fs::write(sub.join("deep.md"), "deep").unwrap();

        let files = discover_files(tmp.path()).unwrap();
        let names: Vec<_> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["a.txt", "z.md"]);
        assert_eq!(files[0].stem, "a");
    }

    const PAGE_TEXT: &str = "aaaa\n\n  bbbb  \n\n\n\ncccccccccccc\n\ndd";

    #[test]
    fn paragraphs_stay_separate_without_token_target() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = config_for(tmp.path());
        config.target_chunk_tokens = 0;

        let chunks =
            chunk_paragraph_text(PAGE_TEXT, &config, &TokenCounter::Approximate);
        assert_eq!(chunks, vec!["aaaa", "bbbb", "cccccccccccc", "dd"]);
    }

    #[test]
    fn paragraphs_are_packed_up_to_token_target() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = config_for(tmp.path());
        config.target_chunk_tokens = 2;

        // Approximate counts: 1, 1, 3 and 1 tokens.
        let chunks =
            chunk_paragraph_text(PAGE_TEXT, &config, &TokenCounter::Approximate);
        assert_eq!(chunks, vec!["aaaa bbbb", "cccccccccccc", "dd"]);
    }

    #[test]
    fn missing_directory_is_a_config_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err = discover_files(&tmp.path().join("nope")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn csv_rows_become_prefixed_lines() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join("devices.csv"),
            "name,room,note\nStudio 7, Basement ,\n,,\nProjector,,ceiling\n",
        )
        .unwrap();

        let chunks =
            load_chunks(&config_for(tmp.path()), &TokenCounter::Approximate)
                .unwrap();
        let texts: Vec<_> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(
            texts,
            vec![
                "devices: Studio 7 → Basement",
                "devices: Projector → ceiling"
            ]
        );
        assert!(chunks.iter().all(|c| c.source == "devices.csv"));
    }

    #[test]
    fn ragged_csv_rows_are_accepted() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("t.csv"), "a,b\n1\n2,3,4\n").unwrap();

        let chunks =
            load_chunks(&config_for(tmp.path()), &TokenCounter::Approximate)
                .unwrap();
        let texts: Vec<_> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["t: 1", "t: 2 → 3 → 4"]);
    }

    #[test]
    fn text_files_use_word_windows_with_stem_prefix() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("guide.md"), "one two three four five")
            .unwrap();

        let mut config = config_for(tmp.path());
        config.target_chunk_tokens = 0;
        config.default_chunk_words = 2;

        let chunks = load_chunks(&config, &TokenCounter::Approximate).unwrap();
        let texts: Vec<_> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(
            texts,
            vec!["guide: one two", "guide: three four", "guide: five"]
        );
    }

    #[test]
    fn smart_chunking_sizes_text_windows_by_target() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("n.txt"), "a b c d e f g").unwrap();

        let mut config = config_for(tmp.path());
        config.target_chunk_tokens = 3;
        config.default_chunk_words = 100;

        let chunks = load_chunks(&config, &TokenCounter::Approximate).unwrap();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].text, "n: a b c");
    }

    #[test]
    fn chunks_follow_file_name_order() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("b.md"), "bravo").unwrap();
        std::fs::write(tmp.path().join("a.md"), "alpha").unwrap();
        std::fs::write(tmp.path().join("c.csv"), "h\ncharlie\n").unwrap();

        let chunks =
            load_chunks(&config_for(tmp.path()), &TokenCounter::Approximate)
                .unwrap();
        let sources: Vec<_> =
            chunks.iter().map(|c| c.source.as_str()).collect();
        assert_eq!(sources, vec!["a.md", "b.md", "c.csv"]);
    }

    #[test]
    fn unsupported_only_directory_is_empty_corpus() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("image.png"), "binary").unwrap();
        std::fs::write(tmp.path().join("empty.md"), "   \n").unwrap();

        let err =
            load_chunks(&config_for(tmp.path()), &TokenCounter::Approximate)
                .unwrap_err();
        assert!(matches!(err, Error::EmptyCorpus { .. }));
    }

    #[test]
    fn broken_pdf_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("broken.pdf"), "not a pdf").unwrap();

        let err =
            load_chunks(&config_for(tmp.path()), &TokenCounter::Approximate)
                .unwrap_err();
        assert!(matches!(err, Error::Extract { .. }));
    }
}
