//! PEP token alignment and DP applicability.
//!
//! Both predicates are total: a misaligned or disallowed call yields `None`
//! or `false`, never an error.

use super::arguments::{bind_call, group_by_pep_with};
use super::implementation::{BoundArguments, OpImplementation};
use crate::dataspec::{Arg, DataSpec, ExternalNode, Node, PepToken, PublicContext, Transform};
use crate::dp::PrivacyLimit;
use log::{debug, trace};
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap};
use uuid::Uuid;

/// Hex SHA-256 of `token` followed by `bytes`.
pub fn token_hash(token: &str, bytes: &[u8]) -> PepToken {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Token of a protected source: the hash of its identifier.
pub fn source_token(ds: &DataSpec) -> PepToken {
    token_hash(&ds.uuid().to_string(), &[])
}

/// Tokens already computed during one walk of the DAG, by dataspec.
pub(crate) type TokenMemo = HashMap<Uuid, Option<PepToken>>;

/// Computes the PEP token of a dataspec, or `None` when it is not PEP.
pub fn pep_token(ds: &DataSpec, public_context: &PublicContext) -> Option<PepToken> {
    match ds.node() {
        Node::Source(source) => source.is_protected().then(|| source_token(ds)),
        Node::External(node) => external_token(node, public_context, &mut TokenMemo::new()),
    }
}

/// Token of a parent dataspec. Under an empty context each node caches its
/// own token; otherwise `memo` holds the tokens of this walk.
pub(crate) fn pep_token_with(
    ds: &DataSpec,
    public_context: &PublicContext,
    memo: &mut TokenMemo,
) -> Option<PepToken> {
    if public_context.is_empty() {
        return ds.pep_token();
    }
    if let Some(token) = memo.get(&ds.uuid()) {
        return token.clone();
    }
    let token = match ds.node() {
        Node::Source(source) => source.is_protected().then(|| source_token(ds)),
        Node::External(node) => external_token(node, public_context, memo),
    };
    memo.insert(ds.uuid(), token.clone());
    token
}

fn external_token(
    node: &ExternalNode,
    public_context: &PublicContext,
    memo: &mut TokenMemo,
) -> Option<PepToken> {
    let implementation = node.registry.get_implementation(&node.transform.id).ok()?;
    if !implementation.is_pep() || implementation.allowed_pep_args().is_empty() {
        return None;
    }
    let bound = bound_arguments(&implementation, node)?;
    let token = aligned_token(&bound, implementation.allowed_pep_args(), public_context, memo)?;
    if implementation.is_token_preserving(&bound) {
        return Some(token);
    }
    let bytes = node.transform.to_bytes().ok()?;
    Some(token_hash(&token, &bytes))
}

fn bound_arguments(implementation: &OpImplementation, node: &ExternalNode) -> Option<BoundArguments<Arg>> {
    bind_call(
        implementation.signature(),
        &node.transform,
        &node.parent_args,
        &node.parent_kwargs,
    )
    .map_err(|e| debug!("Cannot bind {}: {}", node.transform.id, e))
    .ok()
}

/// Shared token of the PEP arguments when the call is aligned under
/// `allowed`: every non-PEP dataspec is public, the PEP argument names form
/// an allowed combination, and all PEP arguments carry the same token.
fn aligned_token(
    bound: &BoundArguments<Arg>,
    allowed: &[BTreeSet<String>],
    public_context: &PublicContext,
    memo: &mut TokenMemo,
) -> Option<PepToken> {
    let groups = group_by_pep_with(bound, public_context, memo);
    if let Some((name, _)) = groups
        .non_pep
        .iter()
        .find(|(_, ds)| !public_context.contains(ds) && !ds.is_public())
    {
        trace!("Argument '{}' is neither PEP nor public", name);
        return None;
    }

    let names = groups.pep_names();
    if !allowed.contains(&names) {
        trace!("PEP arguments {:?} are not an allowed combination", names);
        return None;
    }

    let token = groups.shared_token().cloned();
    if token.is_none() {
        trace!("PEP arguments are not aligned");
    }
    token
}

/// Whether the DP-equivalent of this dataspec's operator may replace it.
pub fn is_dp_applicable(
    ds: &DataSpec,
    public_context: &PublicContext,
    privacy_limit: &PrivacyLimit,
) -> bool {
    let Node::External(node) = ds.node() else {
        return false;
    };
    let Some(dp_implementation) = node.registry.dp_equivalent(&node.transform.id) else {
        return false;
    };
    if !privacy_limit.is_acceptable() {
        debug!("Privacy limit {:?} rejected", privacy_limit);
        return false;
    }
    let Ok(implementation) = node.registry.get_implementation(&node.transform.id) else {
        return false;
    };
    let Some(bound) = bound_arguments(&implementation, node) else {
        return false;
    };
    aligned_token(
        &bound,
        dp_implementation.allowed_pep_args(),
        public_context,
        &mut TokenMemo::new(),
    )
    .is_some()
}

/// The same call routed to the DP-equivalent operator, if there is one.
pub fn dp_transform(ds: &DataSpec) -> Option<Transform> {
    let Node::External(node) = ds.node() else {
        return None;
    };
    let dp_id = node.registry.dp_equivalent_id(&node.transform.id)?;
    Some(Transform::new(dp_id, node.transform.call.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_hash_is_deterministic() {
        assert_eq!(token_hash("T1", b"abc"), token_hash("T1", b"abc"));
        assert_ne!(token_hash("T1", b"abc"), token_hash("T2", b"abc"));
        assert_ne!(token_hash("T1", b"abc"), token_hash("T1", b"abd"));
        assert_eq!(token_hash("T1", b"").len(), 64);
    }
}
