//! Placeholder resolution.

use rstest::rstest;

use crate::command::{Params, TemplateError, escape_braces, resolve};

fn params() -> Params {
    [
        ("db.name", "shop"),
        ("github.url", "https://example.com/r.git"),
        ("user", "app"),
    ]
    .into_iter()
    .collect()
}

#[rstest]
#[case("echo plain", "echo plain")]
#[case("createdb {db.name}", "createdb shop")]
#[case("git clone {github.url} /home/{user}/ROOT", "git clone https://example.com/r.git /home/app/ROOT")]
#[case("awk '{{print $1}}'", "awk '{print $1}'")]
fn resolves_placeholders(#[case] template: &str, #[case] expected: &str) {
    assert_eq!(resolve(template, &params()).expect("resolve"), expected);
}

#[rstest]
#[case("echo {", 5)]
#[case("echo }", 5)]
#[case("echo {}", 5)]
#[case("echo {a b}", 5)]
fn malformed_templates_are_rejected(#[case] template: &str, #[case] position: usize) {
    assert_eq!(
        resolve(template, &params()),
        Err(TemplateError::Malformed {
            position,
            template: template.to_owned(),
        })
    );
}

#[rstest]
fn escaped_text_round_trips() {
    let text = "python -c 'print({\"a\": 1})'";

    assert_eq!(resolve(&escape_braces(text), &Params::new()).expect("resolve"), text);
}

#[rstest]
fn later_bindings_replace_earlier_ones() {
    let mut merged = params();
    merged.extend_from(&Params::new().with("user", "deploy"));

    assert_eq!(merged.get("user"), Some("deploy"));
    assert_eq!(merged.get("db.name"), Some("shop"));
}
