//! Expansion error types
//!
//! Every error aborts expansion of the unit it was raised in and nothing
//! else. Messages carry the offending rule identifier and, when the
//! front-end recorded one, the source position of the invocation.

use crate::rule::RuleId;
use miette::Diagnostic;
use wv_span::FileSpan;
use wv_tree::Name;

/// Error type for rule registration, expansion and finalization
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Diagnostic)]
pub enum ExpandError {
    /// A rule with the same name and shape is already registered
    #[error("rule {rule} is already registered in `{owner}`")]
    #[diagnostic(
        code(expand::duplicate_rule),
        help("rules are never overridden; give the new rule a distinct shape")
    )]
    DuplicateRule {
        /// Rule being registered
        rule: RuleId,
        /// Table or unit that already holds it
        owner: Name,
    },

    /// A template placeholder had no binding
    #[error("placeholder `{placeholder}` is unbound in the output of {rule}{}", at(.span))]
    #[diagnostic(code(expand::unbound_splice))]
    UnboundSplice {
        /// Placeholder name
        placeholder: Name,
        /// Rule whose template contained it
        rule: RuleId,
        /// Invocation position
        span: Option<FileSpan>,
    },

    /// Rule applications nested deeper than the configured limit
    #[error("expansion depth limit of {limit} exceeded while expanding {rule}{}", at(.span))]
    #[diagnostic(
        code(expand::depth_exceeded),
        help("a rule that reintroduces its own invocation never reaches a fixed point")
    )]
    ExpansionDepthExceeded {
        /// Rule that would have been applied past the limit
        rule: RuleId,
        /// Configured limit
        limit: usize,
        /// Invocation position
        span: Option<FileSpan>,
    },

    /// An entry was accumulated after finalize began
    #[error("`{tag}` accumulated into unit `{unit}` after finalize began{}{}", by(.rule), at(.span))]
    #[diagnostic(code(expand::late_accumulation))]
    LateAccumulation {
        /// Unit whose registry is sealed
        unit: Name,
        /// Tag of the rejected entry
        tag: Name,
        /// Rule that tried to accumulate, if any
        rule: Option<RuleId>,
        /// Invocation position
        span: Option<FileSpan>,
    },

    /// A caller-scope escape names nothing in the caller's scope
    #[error("{rule} escapes `{name}` into the caller's scope, but the caller never binds it{}", at(.span))]
    #[diagnostic(code(expand::hygiene_violation))]
    HygieneViolation {
        /// Escaped identifier
        name: Name,
        /// Rule that wrote the escape
        rule: RuleId,
        /// Invocation position
        span: Option<FileSpan>,
    },

    /// A rule rejected its input
    #[error("{rule} failed: {message}{}", at(.span))]
    #[diagnostic(code(expand::transform_failed))]
    Transform {
        /// Rule that failed
        rule: RuleId,
        /// Reason given by the rule
        message: String,
        /// Invocation position
        span: Option<FileSpan>,
    },

    /// `finalize` was called on a unit that already ran it
    #[error("unit `{unit}` has already been finalized")]
    #[diagnostic(code(expand::already_finalized))]
    AlreadyFinalized {
        /// Unit name
        unit: Name,
    },

    /// The unit was closed or aborted
    #[error("unit `{unit}` is closed")]
    #[diagnostic(code(expand::unit_closed))]
    UnitClosed {
        /// Unit name
        unit: Name,
    },
}

fn at(span: &Option<FileSpan>) -> String {
    span.map(|span| format!(" at {span}")).unwrap_or_default()
}

fn by(rule: &Option<RuleId>) -> String {
    rule.as_ref().map(|rule| format!(" by {rule}")).unwrap_or_default()
}

/// Lookup found no rule for an invocation
///
/// Never surfaced by expansion: an unmatched invocation is an ordinary call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("no rule matches this invocation")]
pub struct NoMatch;

/// A template placeholder with no binding
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unbound placeholder `{0}`")]
pub struct UnboundPlaceholder(pub Name);
