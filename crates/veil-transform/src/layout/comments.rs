use crate::util::is_word_char;
use crate::{PassContext, Transform};
use veil_core::{EditSet, Result, SyntaxTree};

const LICENSE_MARKER: &str = "SPDX-License-Identifier";

/// Strips every comment, NatSpec included. The license line survives when the config asks for it.
pub struct CommentRemoval;

impl Transform for CommentRemoval {
    fn name(&self) -> &'static str {
        "comments"
    }

    fn description(&self) -> &'static str {
        "Removes comments and documentation"
    }

    fn plan(&self, tree: &SyntaxTree, cx: &mut PassContext) -> Result<EditSet> {
        let source = tree.source();
        let mut edits = EditSet::new();
        for &span in tree.comments() {
            let text = span.slice(source);
            if cx.config.keep_license && text.contains(LICENSE_MARKER) {
                continue;
            }
            let before = source[..span.offset].chars().next_back();
            let after = source[span.end()..].chars().next();
            let joins_words = !text.starts_with("//")
                && before.is_some_and(is_word_char)
                && after.is_some_and(is_word_char);
            edits.replace(span, if joins_words { " " } else { "" });
        }
        Ok(edits)
    }
}
