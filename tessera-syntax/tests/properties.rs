//! Property-based tests over generated, well formed sources
//!
//! Properties:
//! - parsing is deterministic
//! - well formed input produces no diagnostics and every declaration
//! - spans nest: fields inside their collection, members inside their page
//! - re-lexing the text of a field, annotation or page gives the same token
//!   kinds as the matching slice of the full token stream
//! - a line of garbage never costs the collections that follow it

mod common;

use proptest::prelude::*;
use tessera_core::Span;
use tessera_syntax::{parse, tokenize, TokenKind};

// ============================================================================
// GENERATORS
// ============================================================================

fn arb_name() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-z][a-z0-9_]{0,8}",
        // Keywords are valid names
        prop::sample::select(vec!["date", "list", "import", "from", "str", "one", "theme", "error"])
            .prop_map(String::from),
    ]
}

fn arb_field_type() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("str".to_string()),
        (1u32..500).prop_map(|n| format!("str({n})")),
        Just("longtext".to_string()),
        Just("int[1, 2: \"two\", -3]".to_string()),
        Just("bool(true)".to_string()),
        Just("datetime".to_string()),
        Just("decimal(10, 2)".to_string()),
        Just("slug(title)".to_string()),
        Just("image(thumb(120, 80) crop)".to_string()),
        "[A-Z][a-z]{0,6}".prop_map(|t| format!("one[#{t}]")),
        "[A-Z][a-z]{0,6}".prop_map(|t| format!("many!![#{t} -> items]")),
    ]
}

fn arb_field() -> impl Strategy<Value = String> {
    (
        prop::sample::subsequence(vec!["!", "?", "^", "~"], 0..3),
        arb_name(),
        arb_field_type(),
        prop::option::of("[A-Za-z ]{0,10}"),
    )
        .prop_map(|(modifiers, name, ty, label)| {
            let mut line = format!("  {}{}: {}", modifiers.concat(), name, ty);
            if let Some(label) = label {
                line.push_str(&format!(" \"{label}\""));
            }
            line
        })
}

fn arb_code_line() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9 ().+*]{0,10}".prop_map(|line| line.trim_end().to_string())
}

/// A computed field whose body is an indented block
fn arb_code_field() -> impl Strategy<Value = String> {
    (arb_name(), prop::collection::vec(arb_code_line(), 1..3)).prop_map(|(name, lines)| {
        let mut text = format!("  {name}:");
        for line in &lines {
            text.push_str(&format!("\n    {line}"));
        }
        text
    })
}

fn arb_names() -> impl Strategy<Value = String> {
    prop::collection::vec(arb_name(), 1..4).prop_map(|names| names.join(", "))
}

fn arb_annotation() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("  @api".to_string()),
        prop::collection::vec((any::<bool>(), arb_name()), 1..3).prop_map(|terms| {
            let terms: Vec<_> = terms
                .iter()
                .map(|(descending, name)| format!("{}{name}", if *descending { "-" } else { "" }))
                .collect();
            format!("  @ordering({})", terms.join(", "))
        }),
        (arb_names(), arb_names())
            .prop_map(|(fields, counts)| format!("  @rest {{\n    i18n\n    fields: {fields}\n    count: {counts}\n  }}")),
        arb_names().prop_map(|names| format!("  @admin {{\n    search: {names}\n  }}")),
        prop::collection::vec(arb_code_line(), 1..3)
            .prop_map(|lines| format!("  @validate:\n    {}", lines.join("\n    "))),
    ]
}

/// One body line of a collection: a field or an annotation
fn arb_member() -> impl Strategy<Value = (String, bool)> {
    prop_oneof![
        3 => arb_field().prop_map(|f| (f, true)),
        1 => arb_code_field().prop_map(|f| (f, true)),
        1 => arb_annotation().prop_map(|a| (a, false)),
    ]
}

fn arb_collection() -> impl Strategy<Value = (String, usize, usize)> {
    ("[A-Z][a-zA-Z0-9]{0,8}", prop::collection::vec(arb_member(), 0..6)).prop_map(|(name, members)| {
        let mut text = format!("#{name}\n");
        for (member, _) in &members {
            text.push_str(member);
            text.push('\n');
        }
        let fields = members.iter().filter(|(_, is_field)| *is_field).count();
        (text, fields, members.len() - fields)
    })
}

fn arb_page_annotation() -> impl Strategy<Value = String> {
    prop_oneof![
        ("[A-Z][a-z]{0,6}", arb_names())
            .prop_map(|(model, fields)| format!("  @crud(#{model}) {{\n    fields: {fields}\n    url: \"x\"\n  }}")),
        "[A-Z][a-z]{0,6}".prop_map(|model| format!("  @list(#{model})")),
        Just("  @get = handle(request)".to_string()),
        (400u32..600).prop_map(|code| format!("  @error({code})")),
    ]
}

fn arb_page() -> impl Strategy<Value = (String, usize)> {
    (
        arb_name(),
        prop::collection::vec("[a-z]{1,6}", 0..3),
        prop::collection::vec(arb_page_annotation(), 0..3),
        prop::collection::vec((arb_name(), "[a-z0-9][a-z0-9 +*.()]{0,11}"), 0..4),
    )
        .prop_map(|(name, segments, annotations, members)| {
            let mut text = format!("[{name}: /{}]\n", segments.join("/"));
            for annotation in &annotations {
                text.push_str(annotation);
                text.push('\n');
            }
            for (member, code) in &members {
                text.push_str(&format!("  {member} = {}\n", code.trim_end()));
            }
            (text, members.len())
        })
}

/// A generated source with the declaration counts it was built from
#[derive(Debug, Clone)]
struct Generated {
    source: String,
    members: Vec<usize>,
    fields: Vec<usize>,
    annotations: Vec<usize>,
}

/// Pages then collections, separated by blank lines
fn arb_source() -> impl Strategy<Value = Generated> {
    (
        prop::collection::vec(arb_page(), 0..4),
        prop::collection::vec(arb_collection(), 0..5),
    )
        .prop_map(|(pages, collections)| {
            let mut source = String::new();
            for (text, _) in &pages {
                source.push_str(text);
                source.push('\n');
            }
            for (text, _, _) in &collections {
                source.push_str(text);
                source.push('\n');
            }
            Generated {
                source,
                members: pages.iter().map(|(_, n)| *n).collect(),
                fields: collections.iter().map(|(_, n, _)| *n).collect(),
                annotations: collections.iter().map(|(_, _, n)| *n).collect(),
            }
        })
}

/// Text that is never a declaration: no `#`, `[`, `@`, quotes or line breaks
fn arb_garbage() -> impl Strategy<Value = String> {
    "[a-z][a-z(){}:,=+*!?<>.-]{0,12}"
}

// ============================================================================
// HELPERS
// ============================================================================

fn kinds_within(source: &str, span: Span) -> Vec<TokenKind> {
    tokenize(source)
        .into_iter()
        .filter(|t| t.kind != TokenKind::Eof && span.contains(&t.span))
        .map(|t| t.kind)
        .collect()
}

fn relexed_kinds(source: &str, span: Span) -> Vec<TokenKind> {
    let text = span.slice(source).unwrap_or_default();
    tokenize(text)
        .into_iter()
        .filter(|t| t.kind != TokenKind::Eof)
        .map(|t| t.kind)
        .collect()
}

fn assert_ordered(spans: &[Span]) {
    for pair in spans.windows(2) {
        assert!(pair[0].end.offset <= pair[1].start.offset, "overlapping {} and {}", pair[0], pair[1]);
    }
}

// ============================================================================
// PROPERTIES
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn prop_well_formed_parses_cleanly(generated in arb_source()) {
        common::init_tracing();
        let source = &generated.source;
        let output = parse(source);
        prop_assert!(output.diagnostics.is_empty(), "{:?}\n{}", output.diagnostics, source);

        let members: Vec<_> = output.file.pages.iter().map(|p| p.inner.body.fields.len()).collect();
        let fields: Vec<_> = output.file.collections.iter().map(|c| c.inner.fields.len()).collect();
        let annotations: Vec<_> = output.file.collections.iter().map(|c| c.inner.annotations.len()).collect();
        prop_assert_eq!(members, generated.members);
        prop_assert_eq!(fields, generated.fields);
        prop_assert_eq!(annotations, generated.annotations);
    }

    #[test]
    fn prop_deterministic(generated in arb_source()) {
        let first = parse(&generated.source);
        let second = parse(&generated.source);
        prop_assert_eq!(first.file, second.file);
        prop_assert_eq!(first.diagnostics, second.diagnostics);
    }

    #[test]
    fn prop_spans_nest(generated in arb_source()) {
        let source = &generated.source;
        let file = parse(source).file;

        let mut top: Vec<Span> = file.pages.iter().map(|p| p.span).collect();
        top.extend(file.collections.iter().map(|c| c.span));
        assert_ordered(&top);

        for page in &file.pages {
            let mut spans: Vec<_> = page.inner.body.fields.iter().map(|f| f.span).collect();
            spans.extend(page.inner.annotations.iter().map(|a| a.span));
            spans.sort_by_key(|s| s.start.offset);
            assert_ordered(&spans);
            for span in &spans {
                prop_assert!(page.span.contains(span));
            }
            prop_assert!(page.span.slice(source).unwrap().starts_with('['));
        }

        for collection in &file.collections {
            let fields: Vec<_> = collection.inner.fields.iter().map(|f| f.span).collect();
            for (span, field) in fields.iter().zip(&collection.inner.fields) {
                let text = span.slice(source).unwrap();
                prop_assert!(text.contains(field.inner.name.as_str()));
                prop_assert!(!text.ends_with(char::is_whitespace));
            }
            for annotation in &collection.inner.annotations {
                prop_assert!(annotation.span.slice(source).unwrap().starts_with('@'));
            }

            let mut spans = fields;
            spans.extend(collection.inner.annotations.iter().map(|a| a.span));
            spans.sort_by_key(|s| s.start.offset);
            assert_ordered(&spans);
            for span in &spans {
                prop_assert!(collection.span.contains(span));
            }
            prop_assert!(collection.span.slice(source).unwrap().starts_with('#'));
        }
    }

    #[test]
    fn prop_relex_matches(generated in arb_source()) {
        let source = &generated.source;
        let file = parse(source).file;
        let fields = file.collections.iter().flat_map(|c| c.inner.fields.iter().map(|f| f.span));
        let annotations = file.collections.iter().flat_map(|c| c.inner.annotations.iter().map(|a| a.span));
        let pages = file.pages.iter().map(|p| p.span);
        for span in fields.chain(annotations).chain(pages) {
            prop_assert_eq!(relexed_kinds(source, span), kinds_within(source, span));
        }
    }

    #[test]
    fn prop_garbage_never_loses_later_collections(
        (count, broken) in (2usize..6).prop_flat_map(|n| (Just(n), 0..n)),
        garbage in arb_garbage(),
    ) {
        let header = format!("#Model{broken}\n");
        let source = common::collections(count).replacen(&header, &format!("{header}  {garbage}\n"), 1);
        let output = parse(&source);

        let names: Vec<_> = output.file.collections.iter().map(|c| c.inner.name.clone()).collect();
        let expected: Vec<_> = (0..count).map(|i| format!("Model{i}")).collect();
        prop_assert_eq!(names, expected, "{}", source);
        for collection in output.file.collections.iter().skip(broken + 1) {
            prop_assert_eq!(collection.inner.fields.len(), 2, "{}", source);
        }
    }
}
