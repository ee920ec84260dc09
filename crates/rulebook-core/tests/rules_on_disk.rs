use std::fs;
use std::path::Path;

use rulebook_core::{
    FileSystemRuleRepository, RuleMatchCriteria, RuleMatcher, RuleMetadata, RuleRepository,
    RuleSource,
};
use tempfile::TempDir;

fn write(root: &Path, relative: &str, contents: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

fn matched_ids(matcher: &RuleMatcher<FileSystemRuleRepository>, criteria: RuleMatchCriteria) -> Vec<String> {
    matcher
        .match_rules(&criteria)
        .unwrap()
        .into_iter()
        .map(|rule| rule.id)
        .collect()
}

/// Rule A applies to every TypeScript file with priority 5, rule B only to
/// TypeScript under src/legacy with no priority.
fn scenario(root: &Path) {
    write(
        root,
        "a.md",
        "---\nfileTypes: [\"*.ts\"]\nfolders: [\"\"]\npriority: 5\n---\n\nAlways type exports.\n",
    );
    write(
        root,
        "legacy/b.md",
        "---\nfileTypes: [\"*.ts\"]\nfolders: [\"src/legacy\"]\n---\n\nDo not add features to legacy code.\n",
    );
}

#[test]
fn folder_scope_limits_matches() {
    let dir = TempDir::new().unwrap();
    scenario(dir.path());
    let matcher = RuleMatcher::new(FileSystemRuleRepository::new(dir.path()));

    assert_eq!(
        matched_ids(&matcher, RuleMatchCriteria::for_paths(["src/app.ts"])),
        vec!["a.md"]
    );
}

#[test]
fn batch_query_ranks_by_priority() {
    let dir = TempDir::new().unwrap();
    scenario(dir.path());
    let matcher = RuleMatcher::new(FileSystemRuleRepository::new(dir.path()));

    assert_eq!(
        matched_ids(
            &matcher,
            RuleMatchCriteria::for_paths(["src/legacy/old.ts", "readme.md"])
        ),
        vec!["a.md", "legacy/b.md"]
    );
    assert!(matched_ids(&matcher, RuleMatchCriteria::default()).is_empty());
}

#[test]
fn service_runs_before_any_rule_exists() {
    let dir = TempDir::new().unwrap();
    let repo = FileSystemRuleRepository::new(dir.path().join("rules"));
    assert!(repo.list_all_rules().unwrap().is_empty());

    let matcher = RuleMatcher::new(repo);
    assert!(matched_ids(&matcher, RuleMatchCriteria::for_paths(["src/app.ts"])).is_empty());
}

#[test]
fn malformed_file_does_not_hide_valid_rules() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "notes.md", "Just some notes, no frontmatter.\n");
    write(
        dir.path(),
        "valid.md",
        "---\nfileTypes: [\"*.rs\"]\nfolders: [\"\"]\n---\nPrefer ? over unwrap.\n",
    );

    let repo = FileSystemRuleRepository::new(dir.path());
    let rules = repo.list_all_rules().unwrap();
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].id, "valid.md");
    assert_eq!(rules[0].content, "Prefer ? over unwrap.");
}

#[test]
fn edits_are_visible_to_the_next_query() {
    let dir = TempDir::new().unwrap();
    let matcher = RuleMatcher::new(FileSystemRuleRepository::new(dir.path()));
    let repo = matcher.source();
    let criteria = || RuleMatchCriteria::for_paths(["src/lib.rs"]).with_intent("style");

    let metadata = RuleMetadata {
        file_types: vec!["*.rs".into()],
        folders: vec!["src".into()],
        intent: Some("style".into()),
        priority: Some(2),
    };
    repo.create_rule("rust/style.md", "Run rustfmt.", metadata.clone())
        .unwrap();
    assert_eq!(matched_ids(&matcher, criteria()), vec!["rust/style.md"]);

    let refactor = RuleMetadata {
        intent: Some("refactor".into()),
        ..metadata
    };
    repo.update_rule("rust/style.md", "Run rustfmt.", refactor)
        .unwrap();
    assert!(matched_ids(&matcher, criteria()).is_empty());

    repo.delete_rule("rust/style.md").unwrap();
    assert!(matched_ids(&matcher, RuleMatchCriteria::for_paths(["src/lib.rs"])).is_empty());
}
