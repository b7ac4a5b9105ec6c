// SPDX-License-Identifier: MIT OR Apache-2.0
//! Share rules: who may receive a shared specification's results.

use fg_spec::Specification;

/// The audience a share rule admits.
#[derive(Debug, Clone)]
pub enum WithSpec {
    /// Every principal may receive the shared results.
    Everyone,
    /// Only the `User` facts returned by this specification's last match.
    /// The last match's unknown must be of type `"User"`; it identifies the
    /// label the distribution engine joins against the requesting
    /// principal.
    Users(Specification),
}

/// A `(shareSpec, withSpec)` rule: principals matching `with` may receive
/// any feed subsumed by `share`.
#[derive(Debug, Clone)]
pub struct ShareRule {
    /// The specification whose feeds this rule covers.
    pub share: Specification,
    /// Who may receive those feeds' results.
    pub with: WithSpec,
}

/// The outcome of a distribution check: every feed of the requested
/// specification was subsumed by a rule that admits the principal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admitted;
