//! Source parsing
//!
//! Thin layer over tree-sitter's Python grammar. It runs on arbitrary,
//! possibly mid-edit source, so every entry point returns
//! `Result<_, ParseError>` and never panics; callers degrade to "nothing
//! known" on error.

use std::path::{Path, PathBuf};

use tree_sitter::{Node, Parser, Tree};

/// Why a source file produced no usable syntax tree
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ParseError {
    #[error("Failed to read {path:?}: {message}")]
    Unreadable { path: PathBuf, message: String },

    #[error("Syntax error at line {line}, column {column}")]
    Syntax { line: usize, column: usize },

    #[error("Parser unavailable: {0}")]
    Parser(String),
}

/// One import statement, before resolution against the source tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportStatement {
    /// `import a.b.c` (aliases are dropped)
    Module { name: String },
    /// `from <dots><module> import <names>`; `level` is the number of dots
    From {
        level: usize,
        module: Option<String>,
        names: Vec<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DefinitionKind {
    Class,
    Function,
}

/// A top-level class or function, with its full source text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Definition {
    pub name: String,
    pub kind: DefinitionKind,
    pub text: String,
}

/// Python parser
pub struct SourceParser {
    parser: Parser,
}

impl SourceParser {
    pub fn new() -> Result<Self, ParseError> {
        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_python::LANGUAGE.into())
            .map_err(|e| ParseError::Parser(e.to_string()))?;
        Ok(Self { parser })
    }

    fn parse(&mut self, source: &str) -> Result<Tree, ParseError> {
        let tree = self
            .parser
            .parse(source, None)
            .ok_or_else(|| ParseError::Parser("parse was cancelled".to_string()))?;

        let root = tree.root_node();
        if root.has_error() {
            let (line, column) = first_error(root)
                .map(|node| {
                    let pos = node.start_position();
                    (pos.row + 1, pos.column + 1)
                })
                .unwrap_or((1, 1));
            return Err(ParseError::Syntax { line, column });
        }
        Ok(tree)
    }

    /// Check that the source parses cleanly
    pub fn validate(&mut self, source: &str) -> Result<(), ParseError> {
        self.parse(source).map(|_| ())
    }

    pub fn validate_file(&mut self, path: &Path) -> Result<(), ParseError> {
        let source = read_source(path)?;
        self.validate(&source)
    }

    /// Every import statement in the module, including nested ones
    pub fn imports(&mut self, source: &str) -> Result<Vec<ImportStatement>, ParseError> {
        let tree = self.parse(source)?;
        Ok(collect_imports(tree.root_node(), source.as_bytes()))
    }

    pub fn file_imports(&mut self, path: &Path) -> Result<Vec<ImportStatement>, ParseError> {
        let source = read_source(path)?;
        self.imports(&source)
    }

    /// Top-level class and function definitions, decorated ones included
    pub fn definitions(&mut self, source: &str) -> Result<Vec<Definition>, ParseError> {
        let tree = self.parse(source)?;
        let bytes = source.as_bytes();
        let root = tree.root_node();

        let mut definitions = Vec::new();
        let mut cursor = root.walk();
        for node in root.named_children(&mut cursor) {
            let target = match node.kind() {
                "decorated_definition" => match node.child_by_field_name("definition") {
                    Some(inner) => inner,
                    None => continue,
                },
                _ => node,
            };
            let kind = match target.kind() {
                "class_definition" => DefinitionKind::Class,
                "function_definition" => DefinitionKind::Function,
                _ => continue,
            };
            let Some(name) = target
                .child_by_field_name("name")
                .and_then(|n| text(n, bytes))
            else {
                continue;
            };
            definitions.push(Definition {
                name,
                kind,
                text: text(node, bytes).unwrap_or_default(),
            });
        }
        Ok(definitions)
    }
}

fn read_source(path: &Path) -> Result<String, ParseError> {
    std::fs::read_to_string(path).map_err(|e| ParseError::Unreadable {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

fn text(node: Node<'_>, source: &[u8]) -> Option<String> {
    node.utf8_text(source).ok().map(str::to_string)
}

/// First error or missing node in document order.
fn first_error(root: Node<'_>) -> Option<Node<'_>> {
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if node.is_error() || node.is_missing() {
            return Some(node);
        }
        let mut cursor = node.walk();
        let children: Vec<Node<'_>> = node
            .children(&mut cursor)
            .filter(|child| child.has_error())
            .collect();
        stack.extend(children.into_iter().rev());
    }
    None
}

/// Nodes whose children can be statements. Imports never appear inside
/// expressions, so the walk stops there.
fn holds_statements(kind: &str) -> bool {
    matches!(
        kind,
        "module"
            | "block"
            | "decorated_definition"
            | "function_definition"
            | "class_definition"
            | "if_statement"
            | "elif_clause"
            | "else_clause"
            | "for_statement"
            | "while_statement"
            | "try_statement"
            | "except_clause"
            | "except_group_clause"
            | "finally_clause"
            | "with_statement"
            | "match_statement"
            | "case_clause"
    )
}

fn imported_name(node: Node<'_>, source: &[u8]) -> Option<String> {
    match node.kind() {
        "dotted_name" => text(node, source),
        "aliased_import" => node
            .child_by_field_name("name")
            .and_then(|n| text(n, source)),
        _ => None,
    }
}

fn collect_imports(root: Node<'_>, source: &[u8]) -> Vec<ImportStatement> {
    let mut out = Vec::new();
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        match node.kind() {
            "import_statement" => {
                let mut cursor = node.walk();
                for child in node.children_by_field_name("name", &mut cursor) {
                    if let Some(name) = imported_name(child, source) {
                        out.push(ImportStatement::Module { name });
                    }
                }
            }
            "import_from_statement" => {
                if let Some(import) = from_import(node, source) {
                    out.push(import);
                }
            }
            kind if holds_statements(kind) => {
                let mut cursor = node.walk();
                let children: Vec<Node<'_>> = node.named_children(&mut cursor).collect();
                stack.extend(children.into_iter().rev());
            }
            _ => {}
        }
    }
    out
}

fn from_import(node: Node<'_>, source: &[u8]) -> Option<ImportStatement> {
    let module_node = node.child_by_field_name("module_name")?;
    let (level, module) = match module_node.kind() {
        "relative_import" => {
            let mut level = 0;
            let mut module = None;
            let mut cursor = module_node.walk();
            for part in module_node.named_children(&mut cursor) {
                match part.kind() {
                    "import_prefix" => {
                        level = text(part, source)
                            .map(|dots| dots.chars().filter(|c| *c == '.').count())
                            .unwrap_or(0);
                    }
                    "dotted_name" => module = text(part, source),
                    _ => {}
                }
            }
            (level, module)
        }
        _ => (0, text(module_node, source)),
    };

    let mut cursor = node.walk();
    let names = node
        .children_by_field_name("name", &mut cursor)
        .filter_map(|child| imported_name(child, source))
        .collect();

    Some(ImportStatement::From {
        level,
        module,
        names,
    })
}
