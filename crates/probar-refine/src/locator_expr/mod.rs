//! Locator expression interpreter.
//!
//! Script steps may carry locators written as builder chains, for example
//! `page.getByRole('button', { name: 'Save' }).first()`. Such text comes
//! from recorded scripts and is never trusted: it is parsed by a general
//! expression parser, checked by an allowlist, and only then replayed
//! against a [`LocatorRoot`].
//!
//! ```text
//! source ──► Tokenizer ──► Parser ──► Expr ──► Allowlist ──► LocatorChain ──► LocatorRoot
//! ```

mod allowlist;
mod chain;
mod eval;
mod lexer;
mod parser;

pub use allowlist::{Allowlist, CHAIN_METHODS, PAGE_RECEIVER, ROOT_METHODS};
pub use chain::{
    quote, FilterOptions, Literal, LocatorCall, LocatorChain, RoleOptions, TextLookup, TextMatch,
    TextQuery,
};
pub use eval::{evaluate_chain, CanonicalRenderer, LocatorRoot};
pub use lexer::{Spanned, Token, Tokenizer};
pub use parser::{Expr, ExprKind, Parser, Property, PropertyKey, Span};

use crate::result::RefineResult;

/// Parse and validate a locator expression
pub fn compile(source: &str) -> RefineResult<LocatorChain> {
    let expr = Parser::parse_program(source)?;
    Allowlist::new(source).validate(&expr)
}

/// Compile `source` and replay it against `root`.
///
/// Validation completes before the first call reaches the root, so a
/// rejected expression never partially evaluates.
pub fn evaluate<R: LocatorRoot>(source: &str, root: R) -> RefineResult<R> {
    let chain = compile(source)?;
    evaluate_chain(&chain, root)
}

/// Canonical form of a locator expression
pub fn canonicalize(source: &str) -> RefineResult<String> {
    evaluate(source, CanonicalRenderer::new()).map(CanonicalRenderer::into_string)
}
