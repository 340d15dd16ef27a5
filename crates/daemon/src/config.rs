// Process-wide configuration for the daemon.
//
// Global config: `~/.fuzzy/config.toml`
// Command-line flags override file values. The result is validated once at
// startup and shared read-only for the life of the process.

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

use fuzzy_common::document::{DocumentFormat, HeaderLayout};
use serde::{Deserialize, Serialize};

/// Ellipsis appended to truncated search snippets.
pub const ELLIPSIS: &str = "...";

/// Default collaborator pipeline. Positional arguments: `$1` query,
/// `$2` result cap, then optional paths to search (none means the cwd).
/// Paths follow `--` so a file name can never be read as an option.
pub const DEFAULT_SEARCH_PIPELINE: &str = concat!(
    r#"q="$1"; n="$2"; shift 2; "#,
    r#"ag --follow --nobreak --noheading --filename ".+" -- "$@" | "#,
    r#"fzf -f "$q" | head -n "$n""#,
);

/// Root directory for fuzzy global state: `~/.fuzzy/`.
pub fn global_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".fuzzy"))
}

/// Path to the global config file: `~/.fuzzy/config.toml`.
pub fn global_config_path() -> Option<PathBuf> {
    global_dir().map(|d| d.join("config.toml"))
}

// ── Daemon config ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct DaemonConfig {
    /// Sandbox root holding the documents.
    pub root: PathBuf,
    /// WebSocket listen address.
    pub listen_addr: SocketAddr,
    /// Private staging area for atomic writes (defaults under the root).
    pub staging_dir: Option<PathBuf>,
    /// Fallback tracing filter when `RUST_LOG` is unset.
    pub log_filter: String,
    pub document: DocumentConfig,
    pub editing: EditingConfig,
    pub search: SearchConfig,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::new(),
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 9020)),
            staging_dir: None,
            log_filter: "info".into(),
            document: DocumentConfig::default(),
            editing: EditingConfig::default(),
            search: SearchConfig::default(),
        }
    }
}

impl DaemonConfig {
    /// Load from `~/.fuzzy/config.toml`. Returns defaults if the file
    /// doesn't exist; a file that exists but doesn't parse is an error.
    pub fn load() -> Result<Self, ConfigError> {
        match global_config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        toml::from_str(&contents).map_err(ConfigError::Parse)
    }

    /// Apply command-line overrides on top of file values.
    pub fn apply(&mut self, overrides: ConfigOverrides) {
        if let Some(root) = overrides.root {
            self.root = root;
        }
        if let Some(ip) = overrides.ip {
            self.listen_addr.set_ip(ip);
        }
        if let Some(port) = overrides.port {
            self.listen_addr.set_port(port);
        }
        if let Some(tag) = overrides.tag_marker {
            self.document.tag_marker = tag;
        }
        if let Some(head) = overrides.header_marker {
            self.document.header_marker = head;
        }
        if overrides.separated {
            self.document.layout = HeaderLayout::Separated;
        }
        if overrides.editable {
            self.editing.enabled = true;
        }
        if overrides.no_rename {
            self.editing.rename_on_save = false;
        }
    }

    /// Check values that serde cannot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.root.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("root path is required".into()));
        }
        for (name, marker) in
            [
                ("header_marker", &self.document.header_marker),
                ("tag_marker", &self.document.tag_marker),
            ]
        {
            if marker.is_empty() || marker.chars().any(char::is_whitespace) {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be non-empty and free of whitespace"
                )));
            }
        }
        if self.search.max_results == 0 {
            return Err(ConfigError::Invalid("search.max_results must be positive".into()));
        }
        if self.search.max_line_len <= ELLIPSIS.len() {
            return Err(ConfigError::Invalid(format!(
                "search.max_line_len must exceed {}",
                ELLIPSIS.len()
            )));
        }
        if self.search.max_lines_per_result == Some(0) {
            return Err(ConfigError::Invalid(
                "search.max_lines_per_result must be positive when set".into(),
            ));
        }
        Ok(())
    }

    /// Staging directory, defaulting to `<root>/.fuzzy/staging`.
    pub fn staging_dir(&self) -> PathBuf {
        self.staging_dir.clone().unwrap_or_else(|| self.root.join(".fuzzy").join("staging"))
    }
}

/// Values supplied on the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub root: Option<PathBuf>,
    pub ip: Option<IpAddr>,
    pub port: Option<u16>,
    pub tag_marker: Option<String>,
    pub header_marker: Option<String>,
    pub separated: bool,
    pub editable: bool,
    pub no_rename: bool,
}

/// On-disk document format settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct DocumentConfig {
    /// Marker written in front of the header line.
    pub header_marker: String,
    /// Marker in front of every tag.
    pub tag_marker: String,
    /// Whether tags share the title line or sit on the next line.
    pub layout: HeaderLayout,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        let format = DocumentFormat::default();
        Self {
            header_marker: format.header_marker,
            tag_marker: format.tag_marker,
            layout: format.layout,
        }
    }
}

impl DocumentConfig {
    pub fn format(&self) -> DocumentFormat {
        DocumentFormat {
            header_marker: self.header_marker.clone(),
            tag_marker: self.tag_marker.clone(),
            layout: self.layout,
        }
    }
}

/// Edit capability. Disabled means the daemon serves read-only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct EditingConfig {
    pub enabled: bool,
    /// Rename the file when a save changes the title.
    pub rename_on_save: bool,
}

impl Default for EditingConfig {
    fn default() -> Self {
        Self { enabled: false, rename_on_save: true }
    }
}

/// Search collaborator settings and output limits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct SearchConfig {
    /// Maximum number of hit lines requested from the collaborator.
    pub max_results: usize,
    /// Maximum snippet length in characters, ellipsis included.
    pub max_line_len: usize,
    /// Optional cap on lines reported per file.
    pub max_lines_per_result: Option<usize>,
    /// Shell that runs `pipeline`.
    pub program: String,
    pub pipeline: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_results: 100,
            max_line_len: 90,
            max_lines_per_result: None,
            program: "sh".into(),
            pipeline: DEFAULT_SEARCH_PIPELINE.into(),
        }
    }
}

// ── Errors ─────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "config I/O error: {e}"),
            Self::Parse(e) => write!(f, "config parse error: {e}"),
            Self::Invalid(reason) => write!(f, "invalid config: {reason}"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn with_root(root: &str) -> DaemonConfig {
        DaemonConfig { root: root.into(), ..DaemonConfig::default() }
    }

    #[test]
    fn defaults_match_original_server() {
        let cfg = DaemonConfig::default();
        assert_eq!(cfg.listen_addr, "127.0.0.1:9020".parse().unwrap());
        assert_eq!(cfg.document.header_marker, "!");
        assert_eq!(cfg.document.tag_marker, "#");
        assert_eq!(cfg.document.layout, HeaderLayout::Inline);
        assert!(!cfg.editing.enabled);
        assert!(cfg.editing.rename_on_save);
        assert_eq!(cfg.search.max_results, 100);
        assert_eq!(cfg.search.max_line_len, 90);
        assert!(cfg.search.max_lines_per_result.is_none());
    }

    #[test]
    fn parse_from_toml() {
        let toml_str = r#"
root = "/srv/notes"
listen_addr = "0.0.0.0:8080"

[document]
tag_marker = "+"
layout = "separated"

[editing]
enabled = true
rename_on_save = false

[search]
max_results = 20
max_lines_per_result = 5
"#;
        let cfg: DaemonConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.root, PathBuf::from("/srv/notes"));
        assert_eq!(cfg.listen_addr.port(), 8080);
        assert_eq!(cfg.document.tag_marker, "+");
        assert_eq!(cfg.document.header_marker, "!"); // default
        assert_eq!(cfg.document.layout, HeaderLayout::Separated);
        assert!(cfg.editing.enabled);
        assert!(!cfg.editing.rename_on_save);
        assert_eq!(cfg.search.max_results, 20);
        assert_eq!(cfg.search.max_line_len, 90); // default
        assert_eq!(cfg.search.max_lines_per_result, Some(5));
    }

    #[test]
    fn rejects_unknown_keys() {
        let error = toml::from_str::<DaemonConfig>("[editing]\nreadonly = true\n")
            .expect_err("parse should fail");
        assert!(error.to_string().contains("unknown field `readonly`"));
    }

    #[test]
    fn missing_fields_use_defaults() {
        let cfg: DaemonConfig = toml::from_str("").unwrap();
        assert_eq!(cfg, DaemonConfig::default());
    }

    #[test]
    fn load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "root = \"/tmp/notes\"\n[editing]\nenabled = true\n").unwrap();

        let cfg = DaemonConfig::load_from(&path).unwrap();
        assert_eq!(cfg.root, PathBuf::from("/tmp/notes"));
        assert!(cfg.editing.enabled);
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let result = DaemonConfig::load_from(&dir.path().join("missing.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn overrides_replace_file_values() {
        let mut cfg = with_root("/from/file");
        cfg.apply(ConfigOverrides {
            root: Some("/from/flag".into()),
            ip: Some("0.0.0.0".parse().unwrap()),
            port: Some(7000),
            tag_marker: Some("@".into()),
            header_marker: Some("#!".into()),
            separated: true,
            editable: true,
            no_rename: true,
        });
        assert_eq!(cfg.root, PathBuf::from("/from/flag"));
        assert_eq!(cfg.listen_addr, "0.0.0.0:7000".parse().unwrap());
        assert_eq!(cfg.document.tag_marker, "@");
        assert_eq!(cfg.document.header_marker, "#!");
        assert_eq!(cfg.document.layout, HeaderLayout::Separated);
        assert!(cfg.editing.enabled);
        assert!(!cfg.editing.rename_on_save);
    }

    #[test]
    fn empty_overrides_keep_file_values() {
        let mut cfg = with_root("/from/file");
        cfg.editing.enabled = true;
        cfg.apply(ConfigOverrides::default());
        assert_eq!(cfg.root, PathBuf::from("/from/file"));
        assert!(cfg.editing.enabled);
        assert!(cfg.editing.rename_on_save);
    }

    #[test]
    fn validate_requires_root() {
        assert!(matches!(DaemonConfig::default().validate(), Err(ConfigError::Invalid(_))));
        assert!(with_root("/notes").validate().is_ok());
    }

    #[test]
    fn validate_rejects_bad_markers_and_limits() {
        let mut cfg = with_root("/notes");
        cfg.document.tag_marker = String::new();
        assert!(cfg.validate().is_err());

        let mut cfg = with_root("/notes");
        cfg.document.header_marker = "! ".into();
        assert!(cfg.validate().is_err());

        let mut cfg = with_root("/notes");
        cfg.search.max_line_len = 3;
        assert!(cfg.validate().is_err());

        let mut cfg = with_root("/notes");
        cfg.search.max_results = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = with_root("/notes");
        cfg.search.max_lines_per_result = Some(0);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn staging_dir_defaults_under_root() {
        let cfg = with_root("/notes");
        assert_eq!(cfg.staging_dir(), PathBuf::from("/notes/.fuzzy/staging"));

        let cfg =
            DaemonConfig { staging_dir: Some("/var/tmp/fuzzy".into()), ..with_root("/notes") };
        assert_eq!(cfg.staging_dir(), PathBuf::from("/var/tmp/fuzzy"));
    }

    #[test]
    fn document_config_builds_format() {
        let cfg = DocumentConfig { layout: HeaderLayout::Separated, ..DocumentConfig::default() };
        let format = cfg.format();
        assert_eq!(format.layout, HeaderLayout::Separated);
        assert_eq!(format.tag_marker, "#");
    }

    #[test]
    fn global_dir_is_under_home() {
        let dir = global_dir();
        assert!(dir.is_some());
        assert!(dir.unwrap().ends_with(".fuzzy"));
    }
}
