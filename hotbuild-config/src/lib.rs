//! Hotbuild Config - Pure configuration data structures
//!
//! This crate contains only data structures, no logic or global state.
//! It serves as the shared configuration vocabulary across all Hotbuild crates.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// The configuration document consumed read-only by the build engine.
///
/// Keys are camelCase on disk; every field has a default so partial
/// documents load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BuildConfig {
    /// Master switch for the build verbs
    pub enabled: bool,
    /// Whether source discovery descends into subdirectories
    pub include_subdirectories: bool,
    /// Self-healing retry budget per compilation group
    pub retry_count: u32,
    /// Language version handed to the compile service
    pub language_version: LanguageVersion,
    /// Maximum number of source files per build
    pub max_files: usize,
    /// Maximum cumulative source size in MB
    #[serde(rename = "maxSizeMB")]
    pub max_size_mb: u64,
    /// Imports prepended to every source file that lacks them
    pub default_imports: Vec<String>,
    /// Import lines stripped before parsing
    pub removed_imports: Vec<String>,
    /// Core platform binaries, relative to the runtime install directory
    pub system_assembly_names: Vec<String>,
    /// Delete persisted failure logs after a fully successful build
    pub clear_logs_on_success: bool,
    /// Write the original diagnostic text into failure logs
    pub show_original_errors: bool,
    /// Write the translated diagnostic text into failure logs
    pub show_translated_errors: bool,
    /// Base-type token that marks a plugin entry class
    pub plugin_base_type: String,
    /// Primary host interface library, relative to the host root
    pub host_interface_library: String,
    /// Host runtime binaries, relative to the host root
    pub host_runtime_binaries: Vec<String>,
    /// Imports applied to every script unit
    pub script_imports: Vec<String>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            include_subdirectories: true,
            retry_count: 3,
            language_version: LanguageVersion::CSharp11,
            max_files: 100,
            max_size_mb: 50,
            default_imports: to_strings(DEFAULT_IMPORTS),
            removed_imports: Vec::new(),
            system_assembly_names: to_strings(SYSTEM_ASSEMBLIES),
            clear_logs_on_success: true,
            show_original_errors: true,
            show_translated_errors: true,
            plugin_base_type: "TerrariaPlugin".to_string(),
            host_interface_library: "ServerPlugins/TShockAPI.dll".to_string(),
            host_runtime_binaries: to_strings(HOST_RUNTIME_BINARIES),
            script_imports: to_strings(SCRIPT_IMPORTS),
        }
    }
}

impl BuildConfig {
    /// Parse a configuration document
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Render the configuration document
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

const DEFAULT_IMPORTS: &[&str] = &[
    "System",
    "System.Collections",
    "System.Collections.Generic",
    "System.Linq",
    "System.Text",
    "System.Threading",
    "System.Threading.Tasks",
    "System.IO",
    "System.IO.Compression",
    "System.Reflection",
    "System.Diagnostics",
    "System.Globalization",
    "System.Security",
    "System.Security.Cryptography",
    "System.Net",
    "System.Net.Http",
    "System.Runtime.CompilerServices",
    "System.Runtime.InteropServices",
    "Microsoft.Xna.Framework",
];

const SCRIPT_IMPORTS: &[&str] = &[
    "System",
    "System.Linq",
    "System.Text",
    "System.Threading.Tasks",
    "System.Collections.Generic",
    "Terraria",
    "TShockAPI",
    "Microsoft.Xna.Framework",
];

const HOST_RUNTIME_BINARIES: &[&str] = &[
    "bin/OTAPI.dll",
    "bin/OTAPI.Runtime.dll",
    "bin/HttpServer.dll",
    "bin/ModFramework.dll",
    "bin/TerrariaServer.dll",
];

const SYSTEM_ASSEMBLIES: &[&str] = &[
    "System.dll",
    "System.Net.dll",
    "System.Net.Http.dll",
    "System.Net.Primitives.dll",
    "System.Private.CoreLib.dll",
    "System.Private.Uri.dll",
    "System.Runtime.dll",
    "netstandard.dll",
    "System.Core.dll",
    "System.Collections.dll",
    "System.Collections.Concurrent.dll",
    "System.Collections.Immutable.dll",
    "System.Linq.dll",
    "System.Linq.Expressions.dll",
    "System.IO.dll",
    "System.IO.FileSystem.dll",
    "System.IO.Compression.dll",
    "System.Text.Json.dll",
    "System.Text.RegularExpressions.dll",
    "System.Text.Encoding.Extensions.dll",
    "System.Threading.dll",
    "System.Threading.Tasks.dll",
    "System.Threading.Thread.dll",
    "System.Runtime.Extensions.dll",
    "System.Runtime.InteropServices.dll",
    "System.Runtime.Numerics.dll",
    "System.ComponentModel.dll",
    "System.ComponentModel.Primitives.dll",
    "System.Memory.dll",
    "System.Reflection.dll",
    "System.Reflection.Primitives.dll",
    "System.ObjectModel.dll",
    "System.Globalization.dll",
    "System.Diagnostics.Process.dll",
    "System.Console.dll",
    "System.Security.Cryptography.Algorithms.dll",
    "System.Security.Cryptography.Primitives.dll",
];

/// Language version requested from the compile service
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LanguageVersion {
    CSharp8,
    CSharp9,
    CSharp10,
    #[default]
    CSharp11,
    CSharp12,
    CSharp13,
    CSharp14,
    /// Unrecognized names fall back to the newest version the service knows
    #[serde(other)]
    Latest,
}

impl LanguageVersion {
    /// Get the string name of the version
    pub fn as_str(&self) -> &'static str {
        match self {
            LanguageVersion::CSharp8 => "CSharp8",
            LanguageVersion::CSharp9 => "CSharp9",
            LanguageVersion::CSharp10 => "CSharp10",
            LanguageVersion::CSharp11 => "CSharp11",
            LanguageVersion::CSharp12 => "CSharp12",
            LanguageVersion::CSharp13 => "CSharp13",
            LanguageVersion::CSharp14 => "CSharp14",
            LanguageVersion::Latest => "Latest",
        }
    }
}

impl fmt::Display for LanguageVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed directory layout under the host-supplied storage path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    base: PathBuf,
}

impl Workspace {
    pub const SOURCE_DIR: &'static str = "source";
    pub const OUTPUT_DIR: &'static str = "compiled output";
    pub const ASSEMBLIES_DIR: &'static str = "assemblies";
    pub const LOGS_DIR: &'static str = "compile logs";
    pub const CONFIG_FILE: &'static str = "hotbuild.json";

    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Ingestion root
    pub fn source_dir(&self) -> PathBuf {
        self.base.join(Self::SOURCE_DIR)
    }

    /// Artifact root
    pub fn output_dir(&self) -> PathBuf {
        self.base.join(Self::OUTPUT_DIR)
    }

    /// User-provided reference binaries
    pub fn assemblies_dir(&self) -> PathBuf {
        self.base.join(Self::ASSEMBLIES_DIR)
    }

    /// Persisted failure logs
    pub fn logs_dir(&self) -> PathBuf {
        self.base.join(Self::LOGS_DIR)
    }

    pub fn config_path(&self) -> PathBuf {
        self.base.join(Self::CONFIG_FILE)
    }
}

/// Engine stage, used as the log target vocabulary
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Ingest,
    Imports,
    Group,
    References,
    Compile,
    Report,
    Script,
}

impl Stage {
    /// Get the string name of the stage
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Ingest => "ingest",
            Stage::Imports => "imports",
            Stage::Group => "group",
            Stage::References => "references",
            Stage::Compile => "compile",
            Stage::Report => "report",
            Stage::Script => "script",
        }
    }

    /// Get the log target name for this stage
    pub fn target(&self) -> String {
        format!("hotbuild::{}", self.as_str())
    }

    pub const ALL: [Stage; 7] = [
        Stage::Ingest,
        Stage::Imports,
        Stage::Group,
        Stage::References,
        Stage::Compile,
        Stage::Report,
        Stage::Script,
    ];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_build_config() {
        let cfg = BuildConfig::default();
        assert!(cfg.enabled);
        assert!(cfg.include_subdirectories);
        assert_eq!(cfg.retry_count, 3);
        assert_eq!(cfg.language_version, LanguageVersion::CSharp11);
        assert_eq!(cfg.max_files, 100);
        assert_eq!(cfg.max_size_mb, 50);
        assert!(cfg.default_imports.iter().any(|u| u == "System.Linq"));
        assert!(cfg.removed_imports.is_empty());
    }

    #[test]
    fn test_partial_document_uses_defaults() {
        let cfg = BuildConfig::from_json(r#"{ "retryCount": 1, "maxSizeMB": 5 }"#).unwrap();
        assert_eq!(cfg.retry_count, 1);
        assert_eq!(cfg.max_size_mb, 5);
        assert_eq!(cfg.max_files, 100);
        assert!(cfg.clear_logs_on_success);
    }

    #[test]
    fn test_config_round_trips_keys() {
        let json = BuildConfig::default().to_json_pretty().unwrap();
        assert!(json.contains("\"includeSubdirectories\""));
        assert!(json.contains("\"maxSizeMB\""));
        assert!(json.contains("\"languageVersion\": \"CSharp11\""));
        assert_eq!(BuildConfig::from_json(&json).unwrap(), BuildConfig::default());
    }

    #[test]
    fn test_unknown_language_version_is_latest() {
        let cfg = BuildConfig::from_json(r#"{ "languageVersion": "CSharp99" }"#).unwrap();
        assert_eq!(cfg.language_version, LanguageVersion::Latest);
        assert_eq!(cfg.language_version.to_string(), "Latest");
    }

    #[test]
    fn test_workspace_layout() {
        let ws = Workspace::new("/srv/host");
        assert_eq!(ws.source_dir(), PathBuf::from("/srv/host/source"));
        assert_eq!(ws.output_dir(), PathBuf::from("/srv/host/compiled output"));
        assert_eq!(ws.assemblies_dir(), PathBuf::from("/srv/host/assemblies"));
        assert_eq!(ws.logs_dir(), PathBuf::from("/srv/host/compile logs"));
    }

    #[test]
    fn test_stage_as_str() {
        assert_eq!(Stage::Ingest.as_str(), "ingest");
        assert_eq!(Stage::Script.target(), "hotbuild::script");
        assert_eq!(Stage::ALL.len(), 7);
    }
}
