//! The operator table driving the scanner, parser and renderer.
//!
//! Priorities are plain numbers: a lower priority binds later, so the
//! sequence operators sit at the bottom and arithmetic near the top.
//! Declaration and sequence operators associate to the right, which gives
//! programs their natural right-leaning spine of `\n` infixes.

use std::{collections::HashMap, sync::OnceLock};

use ecow::EcoString;

/// Name of the infix joining statements on separate lines.
pub const SEQUENCE_NEWLINE: &str = "\n";
/// Name of the infix joining statements on one line, and separating
/// hash-ordered rewrites inside a scope frame.
pub const SEQUENCE_SEMICOLON: &str = ";";
/// Name of the rewrite-declaration infix.
pub const DECLARATION: &str = "is";
/// Name of the mutable-binding infix.
pub const ASSIGNMENT: &str = ":=";
/// Name of the guard infix.
pub const GUARD: &str = "when";
/// Names of the type-annotation infixes.
pub const TYPE_COLON: &str = ":";
/// The expression-level type ascription.
pub const TYPE_AS: &str = "as";

/// Priority at which a prefix applies to an operand (plain application).
pub const APPLICATION_PRIORITY: u32 = 200;

/// Associativity of an infix operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Associativity {
    /// `a ~ b ~ c` parses as `(a ~ b) ~ c`
    Left,
    /// `a ~ b ~ c` parses as `a ~ (b ~ c)`
    Right,
}

/// One infix entry of the table.
#[derive(Debug, Clone, Copy)]
pub struct InfixEntry {
    /// Binding priority, higher binds tighter.
    pub priority: u32,
    /// Which side consumes an equal-priority neighbour.
    pub associativity: Associativity,
}

/// The operator table.
#[derive(Debug, Default)]
pub struct Syntax {
    infix: HashMap<EcoString, InfixEntry>,
    prefix: HashMap<EcoString, u32>,
    postfix: HashMap<EcoString, u32>,
}

impl Syntax {
    /// An empty table; see [`Syntax::standard`] for the default one.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn infix_entry(
        &mut self,
        name: &str,
        priority: u32,
        associativity: Associativity,
    ) -> &mut Self {
        let _ = self.infix.insert(
            name.into(),
            InfixEntry {
                priority,
                associativity,
            },
        );
        self
    }

    fn prefix_entry(&mut self, name: &str, priority: u32) -> &mut Self {
        let _ = self.prefix.insert(name.into(), priority);
        self
    }

    fn postfix_entry(&mut self, name: &str, priority: u32) -> &mut Self {
        let _ = self.postfix.insert(name.into(), priority);
        self
    }

    /// The table for the default syntax.
    pub fn standard() -> &'static Syntax {
        static STANDARD: OnceLock<Syntax> = OnceLock::new();
        STANDARD.get_or_init(|| {
            use Associativity::{Left, Right};
            let mut syntax = Syntax::new();
            let _ = syntax
                .infix_entry(SEQUENCE_NEWLINE, 10, Right)
                .infix_entry(SEQUENCE_SEMICOLON, 20, Right)
                .infix_entry(DECLARATION, 30, Right)
                .infix_entry(ASSIGNMENT, 30, Right)
                .infix_entry(GUARD, 40, Left)
                .infix_entry(",", 50, Right)
                .infix_entry(TYPE_AS, 60, Left)
                .infix_entry(TYPE_COLON, 240, Left)
                .infix_entry("or", 75, Left)
                .infix_entry("and", 80, Left)
                .infix_entry("=", 100, Left)
                .infix_entry("<>", 100, Left)
                .infix_entry("<", 100, Left)
                .infix_entry(">", 100, Left)
                .infix_entry("<=", 100, Left)
                .infix_entry(">=", 100, Left)
                .infix_entry("&", 110, Left)
                .infix_entry("+", 120, Left)
                .infix_entry("-", 120, Left)
                .infix_entry("*", 130, Left)
                .infix_entry("/", 130, Left)
                .infix_entry("rem", 130, Left)
                .infix_entry("mod", 130, Left)
                .prefix_entry("-", 120)
                .prefix_entry("not", 85)
                .postfix_entry("!", 260)
                .postfix_entry("%", 260);
            syntax
        })
    }

    /// The infix entry for `name`, if declared.
    #[must_use]
    pub fn infix(&self, name: &str) -> Option<InfixEntry> {
        self.infix.get(name).copied()
    }

    /// The priority an explicit prefix operator binds at.
    #[must_use]
    pub fn prefix(&self, name: &str) -> Option<u32> {
        self.prefix.get(name).copied()
    }

    /// The priority a postfix operator binds at.
    #[must_use]
    pub fn postfix(&self, name: &str) -> Option<u32> {
        self.postfix.get(name).copied()
    }

    /// Is this infix one of the statement sequence separators?
    #[must_use]
    pub fn is_sequence(name: &str) -> bool {
        name == SEQUENCE_NEWLINE || name == SEQUENCE_SEMICOLON
    }

    /// Is this infix a declaration (`is`) or a mutable binding (`:=`)?
    #[must_use]
    pub fn is_definition(name: &str) -> bool {
        name == DECLARATION || name == ASSIGNMENT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_sits_below_declaration() {
        let syntax = Syntax::standard();
        let newline = syntax.infix(SEQUENCE_NEWLINE).map(|e| e.priority);
        let is = syntax.infix(DECLARATION).map(|e| e.priority);
        let comma = syntax.infix(",").map(|e| e.priority);
        assert!(newline < is);
        assert!(is < comma);
    }

    #[test]
    fn test_guard_binds_looser_than_comma() {
        let syntax = Syntax::standard();
        let when = syntax.infix(GUARD).map(|e| e.priority);
        let comma = syntax.infix(",").map(|e| e.priority);
        assert!(when < comma);
    }

    #[test]
    fn test_arithmetic_priorities() {
        let syntax = Syntax::standard();
        let plus = syntax.infix("+").map(|e| e.priority);
        let times = syntax.infix("*").map(|e| e.priority);
        let less = syntax.infix("<").map(|e| e.priority);
        assert!(less < plus);
        assert!(plus < times);
    }
}
