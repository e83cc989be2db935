/// Node categories an evaluator reports in its syntax tree.
///
/// Only the distinction between `Identifier` (a name being read) and the
/// declaration or key forms matters to the host; everything else is `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyntaxKind {
    Program,
    Statement,
    Expression,
    /// A name reference, such as `Player` in `Player.name` or `new Player()`
    Identifier,
    /// A name being declared (variable, function or parameter)
    Binding,
    /// The name after a `.` in a member access
    PropertyName,
    /// A key in an object literal
    ObjectKey,
    StringLiteral,
    Literal,
    Other,
}

/// A generic syntax tree, independent of the language that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct SyntaxNode {
    pub kind: SyntaxKind,
    pub text: Option<String>,
    pub children: Vec<SyntaxNode>,
}

impl SyntaxNode {
    pub fn new(kind: SyntaxKind) -> Self {
        Self {
            kind,
            text: None,
            children: Vec::new(),
        }
    }

    pub fn leaf(kind: SyntaxKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: Some(text.into()),
            children: Vec::new(),
        }
    }

    pub fn with_children(kind: SyntaxKind, children: Vec<SyntaxNode>) -> Self {
        Self {
            kind,
            text: None,
            children,
        }
    }

    pub fn push(&mut self, child: SyntaxNode) {
        self.children.push(child);
    }

    /// Depth-first pre-order walk. Iterative so deep trees can't overflow the stack.
    pub fn walk<F: FnMut(&SyntaxNode)>(&self, mut visit: F) {
        let mut pending = vec![self];
        while let Some(node) = pending.pop() {
            visit(node);
            pending.extend(node.children.iter().rev());
        }
    }

    /// Texts of every `Identifier` node, in source order, duplicates included
    pub fn identifiers(&self) -> Vec<&str> {
        let mut names = Vec::new();
        let mut pending = vec![self];
        while let Some(node) = pending.pop() {
            if node.kind == SyntaxKind::Identifier {
                if let Some(text) = node.text.as_deref() {
                    names.push(text);
                }
            }
            pending.extend(node.children.iter().rev());
        }
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifiers_skip_declarations_and_keys() {
        let mut program = SyntaxNode::new(SyntaxKind::Program);
        program.push(SyntaxNode::with_children(
            SyntaxKind::Statement,
            vec![
                SyntaxNode::leaf(SyntaxKind::Binding, "Location"),
                SyntaxNode::leaf(SyntaxKind::Identifier, "Player"),
            ],
        ));
        program.push(SyntaxNode::with_children(
            SyntaxKind::Expression,
            vec![
                SyntaxNode::leaf(SyntaxKind::Identifier, "World"),
                SyntaxNode::leaf(SyntaxKind::PropertyName, "Server"),
                SyntaxNode::leaf(SyntaxKind::ObjectKey, "Chunk"),
                SyntaxNode::leaf(SyntaxKind::StringLiteral, "Block"),
                SyntaxNode::leaf(SyntaxKind::Identifier, "Player"),
            ],
        ));

        assert_eq!(program.identifiers(), vec!["Player", "World", "Player"]);
    }

    #[test]
    fn test_walk_visits_in_preorder() {
        let tree = SyntaxNode::with_children(
            SyntaxKind::Program,
            vec![
                SyntaxNode::with_children(
                    SyntaxKind::Statement,
                    vec![SyntaxNode::leaf(SyntaxKind::Literal, "1")],
                ),
                SyntaxNode::leaf(SyntaxKind::Literal, "2"),
            ],
        );
        let mut seen = Vec::new();
        tree.walk(|node| seen.push(node.kind));

        assert_eq!(
            seen,
            vec![
                SyntaxKind::Program,
                SyntaxKind::Statement,
                SyntaxKind::Literal,
                SyntaxKind::Literal
            ]
        );
    }
}
