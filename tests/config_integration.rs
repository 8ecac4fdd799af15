//! End-to-end tests through the TOML loader and the runner: rule sets are
//! declared as data, applied to files in a temporary project root, and must
//! be idempotent and all-or-nothing on disk.

use anchorpatch::config::{load_from_str, ConfigError};
use anchorpatch::runner::{run, RunOptions, RunOutcome};
use std::fs;
use tempfile::TempDir;

const TEMPLATE: &str = "\
Resources:
  ListGamesFunction:
    Events:
      ListGames:
        Type: Api
        Properties:
          Path: /games
          Method: get
";

const PAGE: &str = "\
<section>
  <p>Normal rounds + solo - no wedding</p>
  <label>
    Re
  </label>
  stray-attribute
</section>
";

const RULES: &str = r#"
[meta]
name = "score-app-fixes"
description = "Template and page repairs"
root-relative = true

[[rules]]
id = "rest-api-id"
file = "template.yaml"
anchor = { contains = "ListGames:" }
lookahead = { contains = "Properties:" }
guard = { contains = "RestApiId" }

[rules.operation]
type = "insert-after"
text = "RestApiId: !Ref AppApi"
indent = { policy = "copy-from", offset = 1 }

[[rules]]
id = "subtitle-wedding"
file = "page.tsx"
anchor = { contains = "<section>" }

[rules.operation]
type = "replace-block"
old = "  <p>Normal rounds + solo - no wedding</p>"
new = "  <p>Normal rounds + solo + wedding</p>"

[[rules]]
id = "drop-stray"
file = "page.tsx"
anchor = { contains = "</label>" }
guard = { contains = "never-present" }

[rules.operation]
type = "delete-lines"
predicate = { regex = '^\s*stray-attribute$' }
window = 2
"#;

fn setup() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("template.yaml"), TEMPLATE).unwrap();
    fs::write(dir.path().join("page.tsx"), PAGE).unwrap();
    dir
}

#[test]
fn rule_set_applies_across_files() {
    let dir = setup();
    let set = load_from_str(RULES).unwrap().compile().unwrap();

    let reports = run(&set, dir.path(), &RunOptions::default());
    assert_eq!(reports.len(), 3);
    for report in &reports {
        assert!(
            matches!(report.outcome, RunOutcome::Applied { .. }),
            "rule {} was {:?}",
            report.id,
            report.outcome
        );
    }

    let template = fs::read_to_string(dir.path().join("template.yaml")).unwrap();
    assert!(template.contains("          RestApiId: !Ref AppApi\n"));

    let page = fs::read_to_string(dir.path().join("page.tsx")).unwrap();
    assert!(page.contains("solo + wedding"));
    assert!(!page.contains("stray-attribute"));
}

#[test]
fn second_run_reports_already_applied_everywhere() {
    let dir = setup();
    let set = load_from_str(RULES).unwrap().compile().unwrap();

    run(&set, dir.path(), &RunOptions::default());
    let template_after = fs::read_to_string(dir.path().join("template.yaml")).unwrap();
    let page_after = fs::read_to_string(dir.path().join("page.tsx")).unwrap();

    let reports = run(&set, dir.path(), &RunOptions::default());
    for report in &reports {
        assert!(
            matches!(report.outcome, RunOutcome::AlreadyApplied { .. }),
            "rule {} was {:?}",
            report.id,
            report.outcome
        );
    }

    assert_eq!(
        fs::read_to_string(dir.path().join("template.yaml")).unwrap(),
        template_after
    );
    assert_eq!(
        fs::read_to_string(dir.path().join("page.tsx")).unwrap(),
        page_after
    );
}

#[test]
fn failing_rule_leaves_its_file_unwritten_but_not_others() {
    let rules = format!(
        "{RULES}\n{}",
        r#"
[[rules]]
id = "bad-anchor"
file = "page.tsx"
anchor = { contains = "no such line anywhere" }

[rules.operation]
type = "insert-after"
text = "never"
indent = { policy = "explicit", width = 0 }
"#
    );

    let dir = setup();
    let set = load_from_str(&rules).unwrap().compile().unwrap();

    let reports = run(&set, dir.path(), &RunOptions::default());

    // template.yaml's pipeline is independent and must land.
    let template = fs::read_to_string(dir.path().join("template.yaml")).unwrap();
    assert!(template.contains("RestApiId"));

    // page.tsx's pipeline aborted; every one of its rules failed and the
    // file is byte-identical.
    assert_eq!(fs::read_to_string(dir.path().join("page.tsx")).unwrap(), PAGE);
    for id in ["subtitle-wedding", "drop-stray", "bad-anchor"] {
        let report = reports.iter().find(|r| r.id == id).unwrap();
        assert!(
            matches!(report.outcome, RunOutcome::Failed { .. }),
            "rule {id} was {:?}",
            report.outcome
        );
    }
}

#[test]
fn reports_serialize_for_the_json_surface() {
    let dir = setup();
    let set = load_from_str(RULES).unwrap().compile().unwrap();

    let reports = run(&set, dir.path(), &RunOptions::default());
    let json = serde_json::to_string(&reports).unwrap();
    assert!(json.contains("\"status\":\"applied\""));
    assert!(json.contains("\"id\":\"rest-api-id\""));
}

#[test]
fn loader_rejects_rule_with_absolute_line_number_field() {
    // There deliberately is no such field; an unknown key is a parse error,
    // not a silently ignored hint.
    let rules = r#"
[[rules]]
id = "positional"
file = "page.tsx"
line = 447
anchor = { contains = "x" }

[rules.operation]
type = "insert-after"
text = "y"
indent = { policy = "explicit", width = 0 }
"#;
    let err = load_from_str(rules).unwrap_err();
    assert!(matches!(err, ConfigError::Toml { .. }));
}

#[test]
fn version_gated_set_skips_and_ungated_run_applies() {
    let rules = format!("[meta]\nversion-range = \">=2.0\"\nroot-relative = true\n{}",
        r#"
[[rules]]
id = "rest-api-id"
file = "template.yaml"
anchor = { contains = "ListGames:" }
lookahead = { contains = "Properties:" }
guard = { contains = "RestApiId" }

[rules.operation]
type = "insert-after"
text = "RestApiId: !Ref AppApi"
indent = { policy = "copy-from", offset = 1 }
"#
    );

    let dir = setup();
    let set = load_from_str(&rules).unwrap().compile().unwrap();

    let gated = RunOptions {
        dry_run: false,
        target_version: Some("1.9.0".to_string()),
    };
    let reports = run(&set, dir.path(), &gated);
    assert!(matches!(
        reports[0].outcome,
        RunOutcome::SkippedVersion { .. }
    ));
    assert_eq!(
        fs::read_to_string(dir.path().join("template.yaml")).unwrap(),
        TEMPLATE
    );

    // Without a target version there is nothing to gate on.
    let reports = run(&set, dir.path(), &RunOptions::default());
    assert!(matches!(reports[0].outcome, RunOutcome::Applied { .. }));
}
