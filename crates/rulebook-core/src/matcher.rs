use std::cmp::Reverse;

use tracing::debug;

use crate::error::Result;
use crate::paths::{matches_file_type, path_under_folder};
use crate::repository::RuleSource;
use crate::{Rule, RuleMatchCriteria};

/// Select the rules that apply to any of the criteria's paths, highest priority first.
///
/// A rule applies to a path when the path has one of the rule's file types and lies
/// under one of its folders. If the criteria carry an intent, only rules with exactly
/// that intent are considered. Rules of equal priority keep their input order.
pub fn match_rules(rules: Vec<Rule>, criteria: &RuleMatchCriteria) -> Vec<Rule> {
    let mut matching: Vec<Rule> = rules
        .into_iter()
        .filter(|rule| rule_matches(rule, criteria))
        .collect();
    matching.sort_by_key(|rule| Reverse(rule.metadata.effective_priority()));
    matching
}

fn rule_matches(rule: &Rule, criteria: &RuleMatchCriteria) -> bool {
    if let Some(intent) = &criteria.intent {
        if rule.metadata.intent.as_deref() != Some(intent.as_str()) {
            return false;
        }
    }
    criteria
        .file_paths
        .iter()
        .any(|path| path_matches_rule(path, rule))
}

fn path_matches_rule(path: &str, rule: &Rule) -> bool {
    let metadata = &rule.metadata;
    metadata
        .file_types
        .iter()
        .any(|pattern| matches_file_type(path, pattern))
        && metadata
            .folders
            .iter()
            .any(|folder| path_under_folder(path, folder))
}

/// Matches queries against whatever a [`RuleSource`] currently holds.
#[derive(Debug, Clone)]
pub struct RuleMatcher<S> {
    source: S,
}

impl<S: RuleSource> RuleMatcher<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Reads every rule from the source, then filters and ranks them.
    /// Storage errors are returned as-is, never as an empty match.
    pub fn match_rules(&self, criteria: &RuleMatchCriteria) -> Result<Vec<Rule>> {
        let rules = self.source.list_all_rules()?;
        let total = rules.len();
        let matched = match_rules(rules, criteria);
        debug!(
            paths = criteria.file_paths.len(),
            intent = criteria.intent.as_deref().unwrap_or(""),
            total,
            matched = matched.len(),
            "matched rules"
        );
        Ok(matched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Error, RuleMetadata};
    use std::io;
    use std::path::PathBuf;

    fn rule(id: &str, file_types: &[&str], folders: &[&str], priority: Option<i64>) -> Rule {
        Rule {
            id: id.to_string(),
            content: format!("content of {id}"),
            metadata: RuleMetadata {
                file_types: file_types.iter().map(|s| s.to_string()).collect(),
                folders: folders.iter().map(|s| s.to_string()).collect(),
                intent: None,
                priority,
            },
        }
    }

    fn with_intent(mut rule: Rule, intent: &str) -> Rule {
        rule.metadata.intent = Some(intent.to_string());
        rule
    }

    fn ids(rules: &[Rule]) -> Vec<&str> {
        rules.iter().map(|r| r.id.as_str()).collect()
    }

    fn scenario_rules() -> Vec<Rule> {
        vec![
            rule("b.md", &["*.ts"], &["src/legacy"], None),
            rule("a.md", &["*.ts"], &[""], Some(5)),
        ]
    }

    #[test]
    fn folder_scope_excludes_rules() {
        let matched = match_rules(scenario_rules(), &RuleMatchCriteria::for_paths(["src/app.ts"]));
        assert_eq!(ids(&matched), vec!["a.md"]);
    }

    #[test]
    fn higher_priority_ranks_first() {
        let criteria = RuleMatchCriteria::for_paths(["src/legacy/old.ts", "readme.md"]);
        let matched = match_rules(scenario_rules(), &criteria);
        assert_eq!(ids(&matched), vec!["a.md", "b.md"]);
    }

    #[test]
    fn empty_paths_match_nothing() {
        let matched = match_rules(scenario_rules(), &RuleMatchCriteria::default());
        assert!(matched.is_empty());
    }

    #[test]
    fn ties_keep_input_order() {
        let rules = vec![
            rule("first.md", &["*.rs"], &[""], None),
            rule("high.md", &["*.rs"], &[""], Some(2)),
            rule("second.md", &["*.rs"], &[""], Some(0)),
            rule("negative.md", &["*.rs"], &[""], Some(-1)),
            rule("third.md", &["*.rs"], &[""], None),
        ];
        let matched = match_rules(rules, &RuleMatchCriteria::for_paths(["main.rs"]));
        assert_eq!(
            ids(&matched),
            vec!["high.md", "first.md", "second.md", "third.md", "negative.md"]
        );
        let priorities: Vec<i64> = matched.iter().map(|r| r.metadata.effective_priority()).collect();
        assert!(priorities.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn one_path_must_satisfy_type_and_folder_together() {
        let rules = vec![rule("tests.md", &["*.ts"], &["tests"], None)];
        // One path has the type, the other the folder; neither has both.
        let criteria = RuleMatchCriteria::for_paths(["src/app.ts", "tests/fixture.json"]);
        assert!(match_rules(rules.clone(), &criteria).is_empty());

        let criteria = RuleMatchCriteria::for_paths(["src/app.ts", "tests\\unit\\app.test.ts"]);
        assert_eq!(ids(&match_rules(rules, &criteria)), vec!["tests.md"]);
    }

    #[test]
    fn any_type_and_any_folder_may_combine() {
        let rules = vec![rule("web.md", &["*.css", "*.tsx"], &["web", "shared/ui"], None)];
        for path in ["web/index.css", "shared/ui/Button.tsx", "web/App.tsx"] {
            let matched = match_rules(rules.clone(), &RuleMatchCriteria::for_paths([path]));
            assert_eq!(matched.len(), 1, "{path}");
        }
        let matched = match_rules(rules, &RuleMatchCriteria::for_paths(["shared/api.tsx"]));
        assert!(matched.is_empty());
    }

    #[test]
    fn intent_query_requires_equal_rule_intent() {
        let rules = vec![
            with_intent(rule("style.md", &["*.ts"], &[""], None), "style"),
            with_intent(rule("refactor.md", &["*.ts"], &[""], Some(9)), "refactor"),
            rule("untagged.md", &["*.ts"], &[""], Some(3)),
        ];
        let paths = ["src/a.ts"];

        let criteria = RuleMatchCriteria::for_paths(paths).with_intent("style");
        assert_eq!(ids(&match_rules(rules.clone(), &criteria)), vec!["style.md"]);

        let criteria = RuleMatchCriteria::for_paths(paths).with_intent("Style");
        assert!(match_rules(rules.clone(), &criteria).is_empty());

        let criteria = RuleMatchCriteria::for_paths(paths);
        assert_eq!(
            ids(&match_rules(rules, &criteria)),
            vec!["refactor.md", "untagged.md", "style.md"]
        );
    }

    struct StaticSource(Vec<Rule>);

    impl RuleSource for StaticSource {
        fn list_all_rules(&self) -> Result<Vec<Rule>> {
            Ok(self.0.clone())
        }

        fn get_rule_by_id(&self, id: &str) -> Result<Option<Rule>> {
            Ok(self.0.iter().find(|r| r.id == id).cloned())
        }
    }

    struct FailingSource;

    impl RuleSource for FailingSource {
        fn list_all_rules(&self) -> Result<Vec<Rule>> {
            Err(Error::Io {
                path: PathBuf::from("rules"),
                source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
            })
        }

        fn get_rule_by_id(&self, _id: &str) -> Result<Option<Rule>> {
            Ok(None)
        }
    }

    #[test]
    fn bound_matcher_reads_its_source() {
        let matcher = RuleMatcher::new(StaticSource(scenario_rules()));
        let matched = matcher
            .match_rules(&RuleMatchCriteria::for_paths(["src/legacy/old.ts"]))
            .unwrap();
        assert_eq!(ids(&matched), vec!["a.md", "b.md"]);
        assert!(matcher.source().get_rule_by_id("a.md").unwrap().is_some());
    }

    #[test]
    fn storage_errors_propagate() {
        let matcher = RuleMatcher::new(FailingSource);
        let err = matcher
            .match_rules(&RuleMatchCriteria::for_paths(["src/a.ts"]))
            .unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }
}
