//! Golden fixture tests: realistic rule pipelines over a deployment
//! template and a markup source, checked against expected output and for
//! second-application no-ops.

use anchorpatch::{
    apply, AnchorPattern, Document, Guard, IndentPolicy, Lookahead, Operation, PatchRule,
    RuleOutcome,
};
use std::fs;

fn load_fixture(name: &str) -> String {
    fs::read_to_string(format!("tests/fixtures/{name}"))
        .unwrap_or_else(|err| panic!("failed to load fixture {name}: {err}"))
}

fn rest_api_rule(id: &str, event: &str) -> PatchRule {
    PatchRule::new(
        id,
        AnchorPattern::substring(event),
        Operation::InsertAfter {
            lines: vec!["RestApiId: !Ref AppApi".to_string()],
            indent: IndentPolicy::CopyFrom(1),
        },
    )
    .with_lookahead(Lookahead::new(AnchorPattern::substring("Properties:")))
    .with_guard(Guard::new(AnchorPattern::substring("RestApiId")))
}

#[test]
fn template_gains_rest_api_id_under_each_event() {
    let input = load_fixture("template.yaml.input");
    let expected = load_fixture("template.yaml.expected");

    let rules = [
        rest_api_rule("list-games-rest-api", "ListGames:"),
        rest_api_rule("create-game-rest-api", "CreateGame:"),
    ];

    let doc = Document::from_text(&input);
    let once = apply(&doc, &rules).unwrap();
    assert_eq!(once.document.to_text(), expected);

    let twice = apply(&once.document, &rules).unwrap();
    assert_eq!(twice.document.to_text(), expected);
    assert!(twice
        .outcomes
        .iter()
        .all(|(_, o)| *o == RuleOutcome::AlreadyApplied));
}

fn page_rules() -> Vec<PatchRule> {
    let subtitle = PatchRule::new(
        "subtitle-wedding",
        AnchorPattern::substring("<h1>"),
        Operation::ReplaceBlock {
            old: vec![
                r#"      <p className="subtitle">Normal rounds + solo - no wedding</p>"#
                    .to_string(),
            ],
            new: vec![
                r#"      <p className="subtitle">Normal rounds + solo + wedding</p>"#.to_string(),
            ],
        },
    );

    // The orphaned attribute line sits between the two labels; the window
    // keeps the real type="checkbox" attributes (inside <input>) safe.
    let drop_orphan = PatchRule::new(
        "drop-orphan-checkbox",
        AnchorPattern::substring("Re"),
        Operation::DeleteLines {
            predicate: AnchorPattern::regex(r#"^\s*type="checkbox"$"#).unwrap(),
            window: 3,
        },
    );

    let wedding_label = PatchRule::new(
        "wedding-checkbox",
        AnchorPattern::substring("Re"),
        Operation::InsertAfter {
            lines: vec![
                "<label style={{ display: 'block' }}>".to_string(),
                "  <input".to_string(),
                r#"    type="checkbox""#.to_string(),
                "    checked={roles[i] === 'wedding'}".to_string(),
                "    onChange={() => toggleRole(i, 'wedding')}".to_string(),
                "  />".to_string(),
                "  Wedding".to_string(),
                "</label>".to_string(),
            ],
            indent: IndentPolicy::Explicit(8),
        },
    )
    .with_lookahead(Lookahead::with_window(
        AnchorPattern::substring("</label>"),
        1,
    ))
    .with_guard(Guard::new(AnchorPattern::substring("wedding")));

    vec![subtitle, drop_orphan, wedding_label]
}

#[test]
fn page_is_repaired_and_gains_wedding_checkbox() {
    let input = load_fixture("page.tsx.input");
    let expected = load_fixture("page.tsx.expected");
    let rules = page_rules();

    let doc = Document::from_text(&input);
    let once = apply(&doc, &rules).unwrap();
    assert_eq!(once.document.to_text(), expected);
}

#[test]
fn page_rules_are_idempotent_even_after_repair() {
    let input = load_fixture("page.tsx.input");
    let rules = page_rules();

    let doc = Document::from_text(&input);
    let once = apply(&doc, &rules).unwrap();
    let twice = apply(&once.document, &rules).unwrap();

    assert_eq!(once.document, twice.document);
    assert!(twice
        .outcomes
        .iter()
        .all(|(_, o)| *o == RuleOutcome::AlreadyApplied));
}

#[test]
fn already_patched_fixture_is_left_alone() {
    let expected = load_fixture("template.yaml.expected");
    let rules = [
        rest_api_rule("list-games-rest-api", "ListGames:"),
        rest_api_rule("create-game-rest-api", "CreateGame:"),
    ];

    let doc = Document::from_text(&expected);
    let outcome = apply(&doc, &rules).unwrap();
    assert_eq!(outcome.document.to_text(), expected);
}
