use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::frontmatter;
use crate::paths::normalize_path;
use crate::{Rule, RuleMetadata};

const RULE_EXTENSION: &str = ".md";

/// Read access to a set of rules.
pub trait RuleSource {
    /// Every valid rule in the store. Documents that are not rules are left out.
    fn list_all_rules(&self) -> Result<Vec<Rule>>;

    /// The rule stored under `id`, or None if there is no valid rule there.
    fn get_rule_by_id(&self, id: &str) -> Result<Option<Rule>>;
}

/// Full CRUD over a rule store.
pub trait RuleRepository: RuleSource {
    fn create_rule(&self, id: &str, content: &str, metadata: RuleMetadata) -> Result<Rule>;

    fn update_rule(&self, id: &str, content: &str, metadata: RuleMetadata) -> Result<Rule>;

    /// Deleting a rule that does not exist is not an error.
    fn delete_rule(&self, id: &str) -> Result<()>;
}

/// Rules stored as `.md` files anywhere below a root directory. The path
/// relative to the root is the rule id. Nothing is cached: every call
/// goes back to the filesystem.
#[derive(Debug, Clone)]
pub struct FileSystemRuleRepository {
    root: PathBuf,
}

impl FileSystemRuleRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Normalize an id and map it to a file below the root. Empty and `.`
    /// segments are dropped, so `./a.md` and `a//b.md` name `a.md` and `a/b.md`.
    fn resolve(&self, id: &str) -> Result<(String, PathBuf)> {
        let id = normalize_path(id);
        if id.starts_with('/') || Path::new(&id).is_absolute() {
            return Err(Error::InvalidRuleId {
                id,
                reason: "id must be relative to the rules directory",
            });
        }
        let id = id
            .split('/')
            .filter(|segment| !segment.is_empty() && *segment != ".")
            .collect::<Vec<_>>()
            .join("/");
        let reason = if id.is_empty() {
            Some("id is empty")
        } else if id.split('/').any(|segment| segment == "..") {
            Some("id must not leave the rules directory")
        } else if !id.ends_with(RULE_EXTENSION) {
            Some("id must end in .md")
        } else {
            None
        };
        if let Some(reason) = reason {
            return Err(Error::InvalidRuleId { id, reason });
        }
        let path = self.root.join(&id);
        Ok((id, path))
    }

    fn rule_id(&self, path: &Path) -> String {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Walk the tree below the root and collect `(id, path)` for every rule file.
    /// Symlinks are neither followed nor read.
    fn collect_rule_files(&self) -> Result<Vec<(String, PathBuf)>> {
        let mut files = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let entries = match fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) if e.kind() == io::ErrorKind::NotFound && dir == self.root => {
                    debug!(root = %self.root.display(), "rules directory does not exist");
                    return Ok(Vec::new());
                }
                Err(e) => return Err(Error::io(&dir, e)),
            };
            for entry in entries {
                let entry = entry.map_err(|e| Error::io(&dir, e))?;
                let path = entry.path();
                let file_type = entry.file_type().map_err(|e| Error::io(&path, e))?;
                if file_type.is_dir() {
                    pending.push(path);
                } else if file_type.is_file() && is_rule_file(&path) {
                    files.push((self.rule_id(&path), path));
                }
            }
        }

        files.sort();
        Ok(files)
    }

    /// Whether any component of `id` below the root is a symlink. Stops at the
    /// first component that does not exist.
    fn crosses_symlink(&self, id: &str) -> Result<bool> {
        let mut path = self.root.clone();
        for segment in id.split('/') {
            path.push(segment);
            match fs::symlink_metadata(&path) {
                Ok(meta) if meta.file_type().is_symlink() => return Ok(true),
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
                Err(e) => return Err(Error::io(&path, e)),
            }
        }
        Ok(false)
    }

    fn load_rule(&self, id: String, path: &Path) -> Result<Option<Rule>> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::io(path, e)),
        };
        let document = String::from_utf8_lossy(&bytes);

        let Some(parsed) = frontmatter::parse(&document) else {
            debug!(id = %id, "skipping document without rule frontmatter");
            return Ok(None);
        };
        if !parsed.metadata.is_valid() {
            debug!(id = %id, "skipping rule without file types or folders");
            return Ok(None);
        }
        Ok(Some(Rule {
            id,
            content: parsed.content,
            metadata: parsed.metadata,
        }))
    }

    /// Shared by create and update: both overwrite whatever is stored under the id.
    fn write_rule(&self, id: &str, content: &str, mut metadata: RuleMetadata) -> Result<Rule> {
        let (id, path) = self.resolve(id)?;
        if metadata.file_types.is_empty() {
            return Err(Error::InvalidRule {
                id,
                reason: "fileTypes must not be empty",
            });
        }
        if metadata.folders.is_empty() {
            return Err(Error::InvalidRule {
                id,
                reason: "folders must not be empty (use [\"\"] for every folder)",
            });
        }
        metadata.intent = metadata
            .intent
            .map(|intent| intent.trim().to_string())
            .filter(|intent| !intent.is_empty());
        if let Err(reason) = frontmatter::check_representable(&metadata) {
            return Err(Error::InvalidRule { id, reason });
        }

        let dir = path.parent().unwrap_or(&self.root);
        fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;

        // Write to a sibling temp file and rename, so readers never see a half-written rule.
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();
        let tmp = dir.join(format!(".{}.tmp", file_name));
        fs::write(&tmp, frontmatter::format(content, &metadata)).map_err(|e| Error::io(&tmp, e))?;
        if let Err(e) = fs::rename(&tmp, &path) {
            let _ = fs::remove_file(&tmp);
            return Err(Error::io(&path, e));
        }

        info!(id = %id, "wrote rule");
        Ok(Rule {
            id,
            content: content.trim().to_string(),
            metadata,
        })
    }
}

fn is_rule_file(path: &Path) -> bool {
    path.file_name()
        .is_some_and(|name| name.to_string_lossy().ends_with(RULE_EXTENSION))
}

impl RuleSource for FileSystemRuleRepository {
    fn list_all_rules(&self) -> Result<Vec<Rule>> {
        let files = self.collect_rule_files()?;
        let candidates = files.len();

        let mut rules = Vec::with_capacity(candidates);
        for (id, path) in files {
            if let Some(rule) = self.load_rule(id, &path)? {
                rules.push(rule);
            }
        }

        debug!(candidates, loaded = rules.len(), "listed rules");
        Ok(rules)
    }

    fn get_rule_by_id(&self, id: &str) -> Result<Option<Rule>> {
        let Ok((id, path)) = self.resolve(id) else {
            return Ok(None);
        };
        // Listing never follows symlinks, so lookups by id do not either.
        if self.crosses_symlink(&id)? {
            debug!(id = %id, "not reading rule through a symlink");
            return Ok(None);
        }
        self.load_rule(id, &path)
    }
}

impl RuleRepository for FileSystemRuleRepository {
    fn create_rule(&self, id: &str, content: &str, metadata: RuleMetadata) -> Result<Rule> {
        self.write_rule(id, content, metadata)
    }

    fn update_rule(&self, id: &str, content: &str, metadata: RuleMetadata) -> Result<Rule> {
        self.write_rule(id, content, metadata)
    }

    fn delete_rule(&self, id: &str) -> Result<()> {
        let (id, path) = self.resolve(id)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                info!(id = %id, "deleted rule");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(id = %id, "rule to delete does not exist");
                Ok(())
            }
            Err(e) => Err(Error::io(&path, e)),
        }
    }
}
