use crate::syntax::errors::SyntaxError;
use ast_grep_language::{LanguageExt, SupportLang};
use std::path::Path;
use tree_sitter::{Parser, Tree};

/// Pick a grammar from a file extension.
pub fn language_for_path(path: &Path) -> Option<SupportLang> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    let lang = match ext.as_str() {
        "py" | "pyi" | "pyw" => SupportLang::Python,
        "rs" => SupportLang::Rust,
        "js" | "mjs" | "cjs" | "jsx" => SupportLang::JavaScript,
        "ts" | "mts" | "cts" => SupportLang::TypeScript,
        "tsx" => SupportLang::Tsx,
        "go" => SupportLang::Go,
        "java" => SupportLang::Java,
        "rb" => SupportLang::Ruby,
        _ => return None,
    };
    Some(lang)
}

/// Tree-sitter parser bound to one grammar.
pub struct SourceParser {
    parser: Parser,
    lang: SupportLang,
}

impl SourceParser {
    pub fn new(lang: SupportLang) -> Result<Self, SyntaxError> {
        let mut parser = Parser::new();
        // Get the tree-sitter Language from ast-grep-language
        let ts_lang = lang.get_ts_language();
        parser
            .set_language(&ts_lang)
            .map_err(|_| SyntaxError::LanguageSet {
                lang: format!("{lang:?}"),
            })?;

        Ok(Self { parser, lang })
    }

    pub fn lang(&self) -> SupportLang {
        self.lang
    }

    /// Parse source code into a tree-sitter Tree.
    pub fn parse(&mut self, source: &str) -> Result<Tree, SyntaxError> {
        self.parser
            .parse(source, None)
            .ok_or(SyntaxError::ParseFailed)
    }

    /// Parse source code and return the tree along with the source.
    pub fn parse_with_source<'a>(
        &mut self,
        source: &'a str,
    ) -> Result<ParsedSource<'a>, SyntaxError> {
        let tree = self.parse(source)?;
        Ok(ParsedSource { source, tree })
    }
}

/// A parsed source file with its tree-sitter tree.
pub struct ParsedSource<'a> {
    pub source: &'a str,
    pub tree: Tree,
}

impl<'a> ParsedSource<'a> {
    pub fn root_node(&self) -> tree_sitter::Node<'_> {
        self.tree.root_node()
    }

    pub fn has_errors(&self) -> bool {
        self.tree.root_node().has_error()
    }

    /// Outermost ERROR and MISSING nodes, in document order.
    ///
    /// Children of an ERROR node are not reported separately.
    pub fn error_nodes(&self) -> Vec<tree_sitter::Node<'_>> {
        let mut errors = Vec::new();
        collect_error_nodes(self.tree.root_node(), &mut errors);
        errors
    }

    pub fn node_text(&self, node: tree_sitter::Node<'_>) -> &'a str {
        &self.source[node.byte_range()]
    }
}

fn collect_error_nodes<'t>(node: tree_sitter::Node<'t>, errors: &mut Vec<tree_sitter::Node<'t>>) {
    if node.is_error() || node.is_missing() {
        errors.push(node);
        return;
    }

    // Subtrees without errors can be skipped entirely
    if !node.has_error() {
        return;
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_error_nodes(child, errors);
    }
}
