//! Source ingestion
//!
//! Enumerates candidate files, enforces the count and size caps before any
//! file is read, then decodes, strips, validates and parses each file. A bad
//! file becomes a [`SkippedFile`] record; it never aborts the batch.

use crate::error::{IngestError, ServiceError};
use crate::imports;
use crate::service::{guarded, CompileService, SourceFile, SyntaxTree};
use crate::syntax;
use encoding_rs::{Encoding, BIG5, GB18030, GBK, UTF_8, WINDOWS_1252};
use hotbuild_config::BuildConfig;
use hotbuild_vfs::VirtualFileSystem;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

const TARGET: &str = "hotbuild::ingest";

/// Extension of full-build source files
pub const SOURCE_EXTENSION: &str = "cs";

/// One input file after decoding
#[derive(Debug, Clone)]
pub struct SourceUnit {
    pub path: PathBuf,
    pub raw_bytes: Vec<u8>,
    pub detected_encoding: &'static str,
    pub normalized_text: String,
}

/// A successfully parsed file, ready for grouping
#[derive(Debug, Clone)]
pub struct ParsedUnit {
    pub path: PathBuf,
    /// Text handed to the compile service (imports already rewritten)
    pub text: String,
    pub tree: SyntaxTree,
    pub namespace: String,
    pub root_namespace: String,
    pub public_type_names: Vec<String>,
}

impl ParsedUnit {
    pub fn source_file(&self) -> SourceFile {
        SourceFile {
            path: self.path.clone(),
            text: self.text.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    Empty,
    Blank,
    /// Parsed with error-severity diagnostics
    Invalid { errors: usize },
    ReadFailed(String),
    ParseFailed(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Empty => f.write_str("(empty)"),
            SkipReason::Blank => f.write_str("(blank)"),
            SkipReason::Invalid { .. } => f.write_str("(invalid)"),
            SkipReason::ReadFailed(msg) => write!(f, "(read failed: {})", msg),
            SkipReason::ParseFailed(msg) => write!(f, "(parse failed: {})", msg),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: SkipReason,
}

/// Result of one ingestion pass
#[derive(Debug, Default)]
pub struct IngestReport {
    /// Parsed files in enumeration order
    pub units: Vec<ParsedUnit>,
    pub skipped: Vec<SkippedFile>,
}

enum FileOutcome {
    Parsed(ParsedUnit),
    Skipped(SkipReason),
}

/// Encodings tried in order; the first clean decoding wins
fn probe_order() -> [&'static Encoding; 5] {
    [UTF_8, GBK, GB18030, BIG5, WINDOWS_1252]
}

/// Decode raw bytes by probing candidate encodings.
///
/// A decoding qualifies when it reports no malformed sequences and contains
/// no U+FFFD. When none qualify the bytes are read as lossy UTF-8.
pub fn decode_source(bytes: &[u8]) -> (String, &'static str) {
    for encoding in probe_order() {
        let (text, had_errors) = encoding.decode_with_bom_removal(bytes);
        if !had_errors && !text.contains('\u{FFFD}') {
            return (text.into_owned(), encoding.name());
        }
    }
    (String::from_utf8_lossy(bytes).into_owned(), "UTF-8 (lossy)")
}

pub struct SourceIngestor<'a> {
    vfs: &'a dyn VirtualFileSystem,
    service: &'a dyn CompileService,
    config: &'a BuildConfig,
}

impl<'a> SourceIngestor<'a> {
    pub fn new(
        vfs: &'a dyn VirtualFileSystem,
        service: &'a dyn CompileService,
        config: &'a BuildConfig,
    ) -> Self {
        Self {
            vfs,
            service,
            config,
        }
    }

    /// Candidate paths under `root`, after both caps have been checked.
    ///
    /// A missing root is created and reported as `SourceRootCreated`.
    pub fn discover(&self, root: &Path) -> Result<Vec<PathBuf>, IngestError> {
        if !self.vfs.is_dir(root) {
            self.vfs.create_dir_all(root)?;
            warn!(target: TARGET, root = %root.display(), "source directory created");
            return Err(IngestError::SourceRootCreated(root.to_path_buf()));
        }

        let files = self.vfs.list_files(
            root,
            SOURCE_EXTENSION,
            self.config.include_subdirectories,
        )?;

        if files.len() > self.config.max_files {
            return Err(IngestError::TooManyFiles {
                count: files.len(),
                limit: self.config.max_files,
            });
        }

        let mut total_bytes: u64 = 0;
        for path in &files {
            total_bytes += self.vfs.file_len(path)?;
        }
        let size_mb = total_bytes / 1024 / 1024;
        if size_mb > self.config.max_size_mb {
            return Err(IngestError::TooLarge {
                size_mb,
                limit_mb: self.config.max_size_mb,
            });
        }

        debug!(target: TARGET, count = files.len(), total_bytes, "sources discovered");
        Ok(files)
    }

    /// Discover, then ingest every candidate file.
    ///
    /// Only an out-of-memory service failure aborts the batch.
    #[instrument(target = "hotbuild::ingest", skip(self), fields(root = %root.display()))]
    pub fn ingest(&self, root: &Path) -> Result<IngestReport, IngestError> {
        let files = self.discover(root)?;
        let mut report = IngestReport::default();

        for path in files {
            match self.ingest_file(&path) {
                Ok(FileOutcome::Parsed(unit)) => report.units.push(unit),
                Ok(FileOutcome::Skipped(reason)) => {
                    debug!(target: TARGET, path = %path.display(), %reason, "file skipped");
                    report.skipped.push(SkippedFile { path, reason });
                }
                Err(err) if err.is_resource_exhaustion() => return Err(err.into()),
                Err(err) => report.skipped.push(SkippedFile {
                    path,
                    reason: SkipReason::ParseFailed(err.to_string()),
                }),
            }
        }

        info!(
            target: TARGET,
            parsed = report.units.len(),
            skipped = report.skipped.len(),
            "ingestion finished"
        );
        Ok(report)
    }

    /// Read and decode one file. `None` for a zero-length file.
    pub fn read_unit(&self, path: &Path) -> Result<Option<SourceUnit>, hotbuild_vfs::VfsError> {
        if self.vfs.file_len(path)? == 0 {
            return Ok(None);
        }
        let raw_bytes = self.vfs.read_file(path)?;
        let (normalized_text, detected_encoding) = decode_source(&raw_bytes);
        Ok(Some(SourceUnit {
            path: path.to_path_buf(),
            raw_bytes,
            detected_encoding,
            normalized_text,
        }))
    }

    fn ingest_file(&self, path: &Path) -> Result<FileOutcome, ServiceError> {
        let unit = match self.read_unit(path) {
            Ok(Some(unit)) => unit,
            Ok(None) => return Ok(FileOutcome::Skipped(SkipReason::Empty)),
            Err(err) => return Ok(FileOutcome::Skipped(SkipReason::ReadFailed(err.to_string()))),
        };
        if unit.detected_encoding != UTF_8.name() {
            debug!(target: TARGET, path = %path.display(), encoding = unit.detected_encoding, "non UTF-8 source");
        }

        let text = imports::strip_imports(&unit.normalized_text, &self.config.removed_imports);
        if text.trim().is_empty() {
            return Ok(FileOutcome::Skipped(SkipReason::Blank));
        }

        let probe = self.parse(path, &text)?;
        let errors = probe.error_count();
        if errors > 0 {
            return Ok(FileOutcome::Skipped(SkipReason::Invalid { errors }));
        }

        let rewritten =
            imports::add_default_imports(&text, &probe.import_texts(), &self.config.default_imports);
        let tree = if rewritten == text {
            probe
        } else {
            self.parse(path, &rewritten)?
        };

        let namespace = syntax::namespace_of(&tree);
        Ok(FileOutcome::Parsed(ParsedUnit {
            path: path.to_path_buf(),
            root_namespace: syntax::root_namespace(&namespace),
            public_type_names: syntax::public_type_names(&tree),
            namespace,
            text: rewritten,
            tree,
        }))
    }

    fn parse(&self, path: &Path, text: &str) -> Result<SyntaxTree, ServiceError> {
        let source = SourceFile {
            path: path.to_path_buf(),
            text: text.to_string(),
        };
        guarded(|| self.service.parse(&source, self.config.language_version))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedCompileService;
    use hotbuild_vfs::MemoryFileSystem;

    fn config() -> BuildConfig {
        BuildConfig {
            default_imports: vec!["System".into()],
            ..BuildConfig::default()
        }
    }

    #[test]
    fn test_decode_utf8_and_bom() {
        let (text, enc) = decode_source("\u{feff}namespace Foo {}".as_bytes());
        assert_eq!(text, "namespace Foo {}");
        assert_eq!(enc, "UTF-8");
    }

    #[test]
    fn test_decode_gbk() {
        let (bytes, _, _) = GBK.encode("// 中文注释\nclass A {}");
        let (text, enc) = decode_source(&bytes);
        assert_eq!(text, "// 中文注释\nclass A {}");
        assert_eq!(enc, "GBK");
    }

    #[test]
    fn test_skip_reasons_are_collected() {
        let fs = MemoryFileSystem::with_files([
            ("/src/empty.cs", Vec::new()),
            ("/src/blank.cs", b"   \n\t\n".to_vec()),
            ("/src/broken.cs", b"namespace Foo { class A {".to_vec()),
            ("/src/good.cs", b"namespace Foo.Bar { public class A {} }".to_vec()),
        ]);
        let service = ScriptedCompileService::new();
        let cfg = config();
        let report = SourceIngestor::new(&fs, &service, &cfg)
            .ingest(Path::new("/src"))
            .unwrap();

        assert_eq!(report.units.len(), 1);
        let unit = &report.units[0];
        assert_eq!(unit.namespace, "Foo.Bar");
        assert_eq!(unit.root_namespace, "Foo");
        assert_eq!(unit.public_type_names, vec!["A"]);
        assert!(unit.text.starts_with("using System;\n"));

        let reasons: Vec<String> = report.skipped.iter().map(|s| s.reason.to_string()).collect();
        assert_eq!(reasons, vec!["(blank)", "(invalid)", "(empty)"]);
    }

    #[test]
    fn test_removed_imports_never_reach_the_service() {
        let fs = MemoryFileSystem::with_files([(
            "/src/a.cs",
            b"using System.Drawing;\nnamespace Foo { class A {} }".to_vec(),
        )]);
        let service = ScriptedCompileService::new();
        let cfg = BuildConfig {
            removed_imports: vec!["System.Drawing".into()],
            default_imports: vec![],
            ..BuildConfig::default()
        };
        let report = SourceIngestor::new(&fs, &service, &cfg)
            .ingest(Path::new("/src"))
            .unwrap();
        assert!(!report.units[0].text.contains("Drawing"));
        assert!(service.parsed_texts().iter().all(|t| !t.contains("Drawing")));
    }

    #[test]
    fn test_file_cap_rejects_before_parsing() {
        let files: Vec<(String, Vec<u8>)> = (0..3)
            .map(|i| (format!("/src/f{}.cs", i), b"class A {}".to_vec()))
            .collect();
        let fs = MemoryFileSystem::with_files(files);
        let service = ScriptedCompileService::new();
        let cfg = BuildConfig {
            max_files: 2,
            ..BuildConfig::default()
        };
        let err = SourceIngestor::new(&fs, &service, &cfg)
            .ingest(Path::new("/src"))
            .unwrap_err();
        assert!(matches!(err, IngestError::TooManyFiles { count: 3, limit: 2 }));
        assert_eq!(service.parse_calls(), 0);
    }

    #[test]
    fn test_size_cap_uses_whole_megabytes() {
        let fs = MemoryFileSystem::with_files([("/src/big.cs", vec![b' '; 2 * 1024 * 1024])]);
        let service = ScriptedCompileService::new();
        let cfg = BuildConfig {
            max_size_mb: 1,
            ..BuildConfig::default()
        };
        let err = SourceIngestor::new(&fs, &service, &cfg)
            .discover(Path::new("/src"))
            .unwrap_err();
        assert!(matches!(err, IngestError::TooLarge { size_mb: 2, limit_mb: 1 }));
    }

    #[test]
    fn test_missing_root_is_created() {
        let fs = MemoryFileSystem::new();
        let service = ScriptedCompileService::new();
        let cfg = config();
        let err = SourceIngestor::new(&fs, &service, &cfg)
            .discover(Path::new("/work/source"))
            .unwrap_err();
        assert!(matches!(err, IngestError::SourceRootCreated(_)));
        assert!(fs.is_dir(Path::new("/work/source")));
    }

    #[test]
    fn test_subdirectories_follow_config() {
        let fs = MemoryFileSystem::with_files([
            ("/src/a.cs", b"class A {}".to_vec()),
            ("/src/sub/b.cs", b"class B {}".to_vec()),
        ]);
        let service = ScriptedCompileService::new();
        let cfg = BuildConfig {
            include_subdirectories: false,
            ..BuildConfig::default()
        };
        let files = SourceIngestor::new(&fs, &service, &cfg)
            .discover(Path::new("/src"))
            .unwrap();
        assert_eq!(files, vec![PathBuf::from("/src/a.cs")]);
    }
}
