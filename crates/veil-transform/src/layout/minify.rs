use crate::util::is_word_char;
use crate::{PassContext, Transform};
use veil_core::{EditSet, Result, Span, SyntaxTree};
use veil_parser::TokenKind;

const OPERATOR_CHARS: &str = "+-*/%&|^<>=!~?:.";

fn is_operator_char(c: char) -> bool {
    OPERATOR_CHARS.contains(c)
}

/// True when `left` followed directly by `right` would lex differently from the two apart.
fn needs_space(left: char, right: char) -> bool {
    (is_word_char(left) && is_word_char(right)) || (is_operator_char(left) && is_operator_char(right))
}

/// Collapses the layout to the fewest characters the lexer still reads the same way. Line
/// comments keep the newline that ends them.
pub struct Minifier;

impl Transform for Minifier {
    fn name(&self) -> &'static str {
        "minify"
    }

    fn description(&self) -> &'static str {
        "Removes formatting whitespace"
    }

    fn plan(&self, tree: &SyntaxTree, _cx: &mut PassContext) -> Result<EditSet> {
        let source = tree.source();
        let tokens = veil_parser::tokens(source)?;

        let mut out = String::with_capacity(source.len());
        for token in &tokens {
            let text = token.span.slice(source);
            if let (Some(left), Some(right)) = (out.chars().next_back(), text.chars().next()) {
                if left != '\n' && needs_space(left, right) {
                    out.push(' ');
                }
            }
            out.push_str(text);
            if token.kind == TokenKind::LineComment {
                out.push('\n');
            }
        }

        let mut edits = EditSet::new();
        if out != source {
            edits.replace(Span::new(0, source.len()), out);
        }
        Ok(edits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use veil_core::ObfuscationConfig;

    #[test]
    fn test_minified_layout() {
        let source = "// SPDX-License-Identifier: MIT\npragma solidity ^0.8.0;\n\ncontract C {\n    uint256 x = 1;\n    function f(int256 a) public pure returns (int256) {\n        return a - -a;\n    }\n}\n";
        let output = Minifier.apply(source, &ObfuscationConfig::default()).unwrap();
        assert_eq!(
            output.source,
            "// SPDX-License-Identifier: MIT\npragma solidity ^0.8.0;contract C{uint256 x=1;function f(int256 a)public pure returns(int256){return a- -a;}}"
        );
        veil_parser::parse(&output.source).unwrap();
    }

    #[test]
    fn test_strings_untouched() {
        let source = "contract C { string s = \"a   b\"; }";
        let output = Minifier.apply(source, &ObfuscationConfig::default()).unwrap();
        assert_eq!(output.source, "contract C{string s=\"a   b\";}");
    }

    #[test]
    fn test_already_minified_is_ineligible() {
        let source = "contract C{}";
        let output = Minifier.apply(source, &ObfuscationConfig::default()).unwrap();
        assert!(!output.changed);
    }
}
