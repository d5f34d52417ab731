//! Replaying validated chains against a locator root.

use super::chain::{
    FilterOptions, LocatorCall, LocatorChain, RoleOptions, TextLookup, TextMatch, TextQuery,
};
use crate::result::RefineResult;

/// Something a locator chain can be replayed against.
///
/// Each method consumes the current locator and returns the narrowed one.
/// Nested chains (`and`, `or`, `filter({ has })`) are evaluated by the
/// implementation, starting from [`LocatorRoot::fresh`].
pub trait LocatorRoot: Sized {
    /// A new root in the same context, used for nested chains
    fn fresh(&self) -> Self;

    /// `getByRole(role, options)`
    fn get_by_role(self, role: &str, options: &RoleOptions) -> RefineResult<Self>;

    /// `getByText` and friends
    fn get_by(self, lookup: TextLookup, query: &TextQuery) -> RefineResult<Self>;

    /// `getByTestId(id)`
    fn get_by_test_id(self, id: &TextMatch) -> RefineResult<Self>;

    /// `locator(selector, options)`
    fn locator(self, selector: &str, options: &FilterOptions) -> RefineResult<Self>;

    /// `frameLocator(selector)`
    fn frame_locator(self, selector: &str) -> RefineResult<Self>;

    /// `filter(options)`
    fn filter(self, options: &FilterOptions) -> RefineResult<Self>;

    /// `first()`
    fn first(self) -> RefineResult<Self>;

    /// `last()`
    fn last(self) -> RefineResult<Self>;

    /// `nth(index)`; negative counts from the end
    fn nth(self, index: i64) -> RefineResult<Self>;

    /// `and(other)`
    fn and(self, other: Self) -> RefineResult<Self>;

    /// `or(other)`
    fn or(self, other: Self) -> RefineResult<Self>;

    /// `contentFrame()`
    fn content_frame(self) -> RefineResult<Self>;

    /// `owner()`
    fn owner(self) -> RefineResult<Self>;
}

/// Replay `chain` starting from `root`
pub fn evaluate_chain<R: LocatorRoot>(chain: &LocatorChain, root: R) -> RefineResult<R> {
    chain.calls.iter().try_fold(root, apply_call)
}

fn apply_call<R: LocatorRoot>(root: R, call: &LocatorCall) -> RefineResult<R> {
    match call {
        LocatorCall::GetByRole { role, options } => root.get_by_role(role, options),
        LocatorCall::GetBy { lookup, query } => root.get_by(*lookup, query),
        LocatorCall::GetByTestId(id) => root.get_by_test_id(id),
        LocatorCall::Locator { selector, options } => root.locator(selector, options),
        LocatorCall::FrameLocator(selector) => root.frame_locator(selector),
        LocatorCall::Filter(options) => root.filter(options),
        LocatorCall::First => root.first(),
        LocatorCall::Last => root.last(),
        LocatorCall::Nth(index) => root.nth(*index),
        LocatorCall::And(chain) => {
            let other = evaluate_chain(chain, root.fresh())?;
            root.and(other)
        }
        LocatorCall::Or(chain) => {
            let other = evaluate_chain(chain, root.fresh())?;
            root.or(other)
        }
        LocatorCall::ContentFrame => root.content_frame(),
        LocatorCall::Owner => root.owner(),
    }
}

/// Root that re-renders a chain in canonical form.
///
/// Quotes are normalized to single quotes, the `page.` receiver is dropped
/// and option objects are written in a fixed key order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CanonicalRenderer {
    text: String,
}

impl CanonicalRenderer {
    /// Empty renderer
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rendered expression
    #[must_use]
    pub fn into_string(self) -> String {
        self.text
    }

    fn push(mut self, call: LocatorCall) -> RefineResult<Self> {
        if !self.text.is_empty() {
            self.text.push('.');
        }
        self.text.push_str(&call.to_string());
        Ok(self)
    }

    fn push_raw(mut self, method: &str, inner: &str) -> RefineResult<Self> {
        if !self.text.is_empty() {
            self.text.push('.');
        }
        self.text.push_str(&format!("{method}({inner})"));
        Ok(self)
    }
}

impl LocatorRoot for CanonicalRenderer {
    fn fresh(&self) -> Self {
        Self::new()
    }

    fn get_by_role(self, role: &str, options: &RoleOptions) -> RefineResult<Self> {
        self.push(LocatorCall::GetByRole {
            role: role.to_string(),
            options: options.clone(),
        })
    }

    fn get_by(self, lookup: TextLookup, query: &TextQuery) -> RefineResult<Self> {
        self.push(LocatorCall::GetBy {
            lookup,
            query: query.clone(),
        })
    }

    fn get_by_test_id(self, id: &TextMatch) -> RefineResult<Self> {
        self.push(LocatorCall::GetByTestId(id.clone()))
    }

    fn locator(self, selector: &str, options: &FilterOptions) -> RefineResult<Self> {
        self.push(LocatorCall::Locator {
            selector: selector.to_string(),
            options: options.clone(),
        })
    }

    fn frame_locator(self, selector: &str) -> RefineResult<Self> {
        self.push(LocatorCall::FrameLocator(selector.to_string()))
    }

    fn filter(self, options: &FilterOptions) -> RefineResult<Self> {
        self.push(LocatorCall::Filter(options.clone()))
    }

    fn first(self) -> RefineResult<Self> {
        self.push(LocatorCall::First)
    }

    fn last(self) -> RefineResult<Self> {
        self.push(LocatorCall::Last)
    }

    fn nth(self, index: i64) -> RefineResult<Self> {
        self.push(LocatorCall::Nth(index))
    }

    fn and(self, other: Self) -> RefineResult<Self> {
        self.push_raw("and", &other.text)
    }

    fn or(self, other: Self) -> RefineResult<Self> {
        self.push_raw("or", &other.text)
    }

    fn content_frame(self) -> RefineResult<Self> {
        self.push(LocatorCall::ContentFrame)
    }

    fn owner(self) -> RefineResult<Self> {
        self.push(LocatorCall::Owner)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct CallLog {
        calls: Vec<String>,
    }

    impl CallLog {
        fn log(mut self, entry: &str) -> RefineResult<Self> {
            self.calls.push(entry.to_string());
            Ok(self)
        }
    }

    impl LocatorRoot for CallLog {
        fn fresh(&self) -> Self {
            Self::default()
        }
        fn get_by_role(self, role: &str, _: &RoleOptions) -> RefineResult<Self> {
            self.log(&format!("role:{role}"))
        }
        fn get_by(self, lookup: TextLookup, _: &TextQuery) -> RefineResult<Self> {
            self.log(lookup.method())
        }
        fn get_by_test_id(self, _: &TextMatch) -> RefineResult<Self> {
            self.log("testid")
        }
        fn locator(self, selector: &str, _: &FilterOptions) -> RefineResult<Self> {
            self.log(&format!("locator:{selector}"))
        }
        fn frame_locator(self, _: &str) -> RefineResult<Self> {
            self.log("frame")
        }
        fn filter(self, _: &FilterOptions) -> RefineResult<Self> {
            self.log("filter")
        }
        fn first(self) -> RefineResult<Self> {
            self.log("first")
        }
        fn last(self) -> RefineResult<Self> {
            self.log("last")
        }
        fn nth(self, index: i64) -> RefineResult<Self> {
            self.log(&format!("nth:{index}"))
        }
        fn and(self, other: Self) -> RefineResult<Self> {
            let joined = other.calls.join(",");
            self.log(&format!("and[{joined}]"))
        }
        fn or(self, other: Self) -> RefineResult<Self> {
            let joined = other.calls.join(",");
            self.log(&format!("or[{joined}]"))
        }
        fn content_frame(self) -> RefineResult<Self> {
            self.log("contentFrame")
        }
        fn owner(self) -> RefineResult<Self> {
            self.log("owner")
        }
    }

    #[test]
    fn test_replay_order_and_nesting() {
        let chain = LocatorChain::new(vec![
            LocatorCall::GetByRole {
                role: "row".to_string(),
                options: RoleOptions::default(),
            },
            LocatorCall::And(LocatorChain::new(vec![LocatorCall::GetByTestId(
                TextMatch::Text("r1".to_string()),
            )])),
            LocatorCall::Nth(0),
        ]);
        let log = evaluate_chain(&chain, CallLog::default()).unwrap();
        assert_eq!(log.calls, vec!["role:row", "and[testid]", "nth:0"]);
    }

    #[test]
    fn test_canonical_renderer_matches_display() {
        let chain = LocatorChain::new(vec![
            LocatorCall::GetByRole {
                role: "button".to_string(),
                options: RoleOptions::named("Save"),
            },
            LocatorCall::Or(LocatorChain::new(vec![LocatorCall::GetBy {
                lookup: TextLookup::Text,
                query: TextQuery::text("Save"),
            }])),
        ]);
        let rendered = evaluate_chain(&chain, CanonicalRenderer::new())
            .unwrap()
            .into_string();
        assert_eq!(rendered, chain.to_expression());
        assert_eq!(
            rendered,
            "getByRole('button', { name: 'Save' }).or(getByText('Save'))"
        );
    }
}
