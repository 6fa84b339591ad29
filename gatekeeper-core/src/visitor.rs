//! Structural visitor over one Python source file.
//!
//! Walks class, function and parameter nodes of the tree-sitter syntax tree
//! and reports every missing engineering requirement as a [`Finding`]. The
//! rules are applied independently per construct: failing one never
//! short-circuits another.

use std::fmt;

use tree_sitter::{Node, Parser, Tree};

use crate::labels::Requirement;

/// Token prefixing an interactively-verifiable usage example in a docstring.
pub const DOCTEST_MARKER: &str = ">>>";

/// Canonical constructor method name, exempt from the doctest requirement.
const CONSTRUCTOR_NAME: &str = "__init__";

/// Longest source excerpt carried by a parse failure.
const PARSE_EXCERPT_LEN: usize = 80;

/// The syntax element a finding is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubjectKind {
    Class,
    Function,
    Parameter,
}

impl SubjectKind {
    fn noun(self) -> &'static str {
        match self {
            SubjectKind::Class => "class",
            SubjectKind::Function => "function",
            SubjectKind::Parameter => "parameter",
        }
    }
}

/// One detected missing-requirement occurrence. Immutable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub file: String,
    pub line: usize,
    pub subject_name: String,
    pub subject_kind: SubjectKind,
    pub requirement: Requirement,
}

impl Finding {
    /// Human-readable message, addressed to the pull-request author.
    pub fn message(&self) -> String {
        let name = &self.subject_name;
        match self.requirement {
            Requirement::MissingDoctest => format!(
                "Please include a doctest in the docstring of `{name}` \
                 demonstrating its usage (lines starting with `{DOCTEST_MARKER}`)."
            ),
            Requirement::MissingTypeHint => {
                format!("Please provide a type hint for the parameter `{name}`.")
            }
            Requirement::MissingReturnTypeHint => format!(
                "Please provide a return type hint for the function `{name}`. \
                 If the function does not return a value, annotate it as `-> None`."
            ),
            Requirement::MissingDescriptiveName => format!(
                "Please use a descriptive name for the {} `{name}`; \
                 single-letter names are hard to follow.",
                self.subject_kind.noun()
            ),
        }
    }
}

/// The file's text could not be parsed into a syntax tree.
///
/// Surfaces as a review comment like any other finding, but never
/// participates in label computation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseFailure {
    /// First line the parser reported an error on (1 when unknown).
    pub line: usize,
    pub detail: String,
}

impl fmt::Display for ParseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.detail)
    }
}

impl std::error::Error for ParseFailure {}

/// Check one source file and collect every finding.
///
/// `skip_doctests` suppresses the doctest requirement for the whole file;
/// callers set it when the pull request carries a test file or the file
/// defines its own test constructs (see [`contains_test_definitions`]).
pub fn check_source(
    file: &str,
    source: &str,
    skip_doctests: bool,
) -> Result<Vec<Finding>, ParseFailure> {
    let tree = parse_python(source)?;
    let root = tree.root_node();
    if root.has_error() {
        return Err(parse_failure(root, source));
    }

    let mut findings = Vec::new();
    let scope = Scope {
        skip_doctests,
        in_class: false,
    };
    walk(root, source.as_bytes(), file, &mut findings, scope);
    Ok(findings)
}

/// Whether the module body defines test constructs: a function whose name
/// starts with `test_` or a class whose name starts with `Test`.
///
/// Unparsable sources report `false`; the parse failure itself is reported
/// by [`check_source`].
pub fn contains_test_definitions(source: &str) -> bool {
    let Ok(tree) = parse_python(source) else {
        return false;
    };
    let root = tree.root_node();
    let mut cursor = root.walk();
    let found = root
        .children(&mut cursor)
        .any(|child| is_test_definition(child, source.as_bytes()));
    found
}

/// Only direct module-body statements count: a `test_` helper nested inside
/// another function, or a method of a non-`Test` class, does not make the
/// file a test file.
fn is_test_definition(node: Node, src: &[u8]) -> bool {
    match node.kind() {
        "decorated_definition" => node
            .child_by_field_name("definition")
            .is_some_and(|definition| is_test_definition(definition, src)),
        "function_definition" => {
            field_text(node, "name", src).is_some_and(|name| name.starts_with("test_"))
        }
        "class_definition" => {
            field_text(node, "name", src).is_some_and(|name| name.starts_with("Test"))
        }
        _ => false,
    }
}

fn parse_python(source: &str) -> Result<Tree, ParseFailure> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_python::LANGUAGE.into())
        .map_err(|e| ParseFailure {
            line: 1,
            detail: format!("failed to load the Python grammar: {e}"),
        })?;
    parser.parse(source, None).ok_or_else(|| ParseFailure {
        line: 1,
        detail: "the parser produced no syntax tree".to_string(),
    })
}

fn parse_failure(root: Node, source: &str) -> ParseFailure {
    let error_node = first_error(root);
    let line = error_node.map_or(1, |node| node.start_position().row + 1);
    let excerpt: String = source
        .lines()
        .nth(line.saturating_sub(1))
        .unwrap_or("")
        .trim()
        .chars()
        .take(PARSE_EXCERPT_LEN)
        .collect();
    ParseFailure {
        line,
        detail: format!("invalid syntax near `{excerpt}`"),
    }
}

fn first_error(node: Node) -> Option<Node> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    if !node.has_error() {
        return None;
    }
    let mut cursor = node.walk();
    let children: Vec<Node> = node.children(&mut cursor).collect();
    children.into_iter().find_map(first_error)
}

/// Traversal state, passed by value so that leaving a class body naturally
/// restores the pre-class suppression flag.
#[derive(Debug, Clone, Copy)]
struct Scope {
    skip_doctests: bool,
    in_class: bool,
}

fn walk(node: Node, src: &[u8], file: &str, out: &mut Vec<Finding>, scope: Scope) {
    match node.kind() {
        "decorated_definition" => {
            if let Some(definition) = node.child_by_field_name("definition") {
                walk(definition, src, file, out, scope);
            }
        }
        "class_definition" => visit_class(node, src, file, out, scope),
        "function_definition" => visit_function(node, src, file, out, scope),
        _ => {
            let mut cursor = node.walk();
            for child in node.named_children(&mut cursor) {
                walk(child, src, file, out, scope);
            }
        }
    }
}

fn visit_class(node: Node, src: &[u8], file: &str, out: &mut Vec<Finding>, scope: Scope) {
    let Some(name) = field_text(node, "name", src) else {
        return;
    };
    check_name_length(node, &name, SubjectKind::Class, file, out);

    // A class-level docstring with an example covers the class's methods,
    // and only them: the flag is scoped to this body visit.
    let body_scope = Scope {
        skip_doctests: scope.skip_doctests || docstring_has_example(node, src),
        in_class: true,
    };
    if let Some(body) = node.child_by_field_name("body") {
        let mut cursor = body.walk();
        for child in body.named_children(&mut cursor) {
            walk(child, src, file, out, body_scope);
        }
    }
}

fn visit_function(node: Node, src: &[u8], file: &str, out: &mut Vec<Finding>, scope: Scope) {
    let Some(name) = field_text(node, "name", src) else {
        return;
    };
    check_name_length(node, &name, SubjectKind::Function, file, out);

    if !scope.skip_doctests && name != CONSTRUCTOR_NAME && !docstring_has_example(node, src) {
        out.push(Finding {
            file: file.to_string(),
            line: line_of(node),
            subject_name: name.clone(),
            subject_kind: SubjectKind::Function,
            requirement: Requirement::MissingDoctest,
        });
    }

    if node.child_by_field_name("return_type").is_none() {
        out.push(Finding {
            file: file.to_string(),
            line: line_of(node),
            subject_name: name,
            subject_kind: SubjectKind::Function,
            requirement: Requirement::MissingReturnTypeHint,
        });
    }

    visit_parameters(node, src, file, out, scope.in_class);

    // Nested definitions inside the function body are not methods.
    let body_scope = Scope {
        skip_doctests: scope.skip_doctests,
        in_class: false,
    };
    if let Some(body) = node.child_by_field_name("body") {
        let mut cursor = body.walk();
        for child in body.named_children(&mut cursor) {
            walk(child, src, file, out, body_scope);
        }
    }
}

fn visit_parameters(node: Node, src: &[u8], file: &str, out: &mut Vec<Finding>, in_class: bool) {
    let Some(params) = node.child_by_field_name("parameters") else {
        return;
    };
    let mut cursor = params.walk();
    for (index, param) in params.named_children(&mut cursor).enumerate() {
        // (name node, whether an annotation is required and absent)
        let checked = match param.kind() {
            "identifier" => Some((param, true)),
            "default_parameter" => param.child_by_field_name("name").map(|n| (n, true)),
            "typed_parameter" => param.named_child(0).map(|n| (n, false)),
            "typed_default_parameter" => param.child_by_field_name("name").map(|n| (n, false)),
            // Annotation syntax on bare splats is uncommon; only the name rule applies.
            "list_splat_pattern" | "dictionary_splat_pattern" => {
                param.named_child(0).map(|n| (n, false))
            }
            _ => None,
        };
        let Some((name_node, missing_annotation)) = checked else {
            continue;
        };
        let Some(name) = node_text(name_node, src) else {
            continue;
        };
        // The implicit receiver of an instance method carries no annotation.
        if in_class && index == 0 && name == "self" {
            continue;
        }
        check_name_length(name_node, &name, SubjectKind::Parameter, file, out);
        if missing_annotation {
            out.push(Finding {
                file: file.to_string(),
                line: line_of(name_node),
                subject_name: name,
                subject_kind: SubjectKind::Parameter,
                requirement: Requirement::MissingTypeHint,
            });
        }
    }
}

fn check_name_length(
    node: Node,
    name: &str,
    kind: SubjectKind,
    file: &str,
    out: &mut Vec<Finding>,
) {
    if name.chars().count() == 1 {
        out.push(Finding {
            file: file.to_string(),
            line: line_of(node),
            subject_name: name.to_string(),
            subject_kind: kind,
            requirement: Requirement::MissingDescriptiveName,
        });
    }
}

/// Docstring of a definition's body, if the body opens with a string literal.
fn docstring(node: Node, src: &[u8]) -> Option<String> {
    let body = node.child_by_field_name("body")?;
    let first = body.named_child(0)?;
    if first.kind() != "expression_statement" {
        return None;
    }
    let expression = first.named_child(0)?;
    if expression.kind() != "string" {
        return None;
    }
    node_text(expression, src)
}

fn docstring_has_example(node: Node, src: &[u8]) -> bool {
    docstring(node, src).is_some_and(|doc| {
        doc.lines()
            .any(|line| line.trim_start().starts_with(DOCTEST_MARKER))
    })
}

fn field_text(node: Node, field: &str, src: &[u8]) -> Option<String> {
    node.child_by_field_name(field)
        .and_then(|child| node_text(child, src))
}

fn node_text(node: Node, src: &[u8]) -> Option<String> {
    node.utf8_text(src).ok().map(str::to_string)
}

fn line_of(node: Node) -> usize {
    node.start_position().row + 1
}
