//! Argument reorganisation and PEP grouping.
//!
//! A transform stores literal arguments apart from its parent dataspecs,
//! together with the positions the parents originally occupied. This module
//! splits a call into that form and interleaves it back.

use super::implementation::{BoundArguments, Signature};
use super::protection_utils::{self, TokenMemo};
use crate::dataspec::{Arg, DataSpec, PepToken, PublicContext, SerializedCall, Transform};
use crate::error::{DataSpecError, DataSpecResult};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Splits call-site arguments into a serialized call and its parents.
///
/// Parent keyword arguments are returned, and recorded, in name order.
pub fn serialize_call(
    args: Vec<Arg>,
    kwargs: Vec<(String, Arg)>,
) -> (SerializedCall, Vec<Arc<DataSpec>>, BTreeMap<String, Arc<DataSpec>>) {
    let mut call = SerializedCall::default();
    let mut parent_args = Vec::new();
    for (position, arg) in args.into_iter().enumerate() {
        match arg {
            Arg::DataSpec(ds) => {
                call.dataspec_positions.push(position);
                parent_args.push(ds);
            }
            Arg::Literal(value) => {
                call.literal_args.insert(position, value);
            }
        }
    }

    let mut parent_kwargs = BTreeMap::new();
    for (name, arg) in kwargs {
        match arg {
            Arg::DataSpec(ds) => {
                parent_kwargs.insert(name, ds);
            }
            Arg::Literal(value) => {
                call.literal_kwargs.insert(name, value);
            }
        }
    }
    call.dataspec_kwargs = parent_kwargs.keys().cloned().collect();
    (call, parent_args, parent_kwargs)
}

/// Rebuilds the original call by putting each parent back at its recorded
/// position and filling the remaining slots from the literals.
pub fn reorganize(
    transform: &Transform,
    parent_args: &[Arc<DataSpec>],
    parent_kwargs: &BTreeMap<String, Arc<DataSpec>>,
) -> DataSpecResult<(Vec<Arg>, BTreeMap<String, Arg>)> {
    let call = &transform.call;
    if call.dataspec_positions.len() != parent_args.len() {
        return Err(DataSpecError::argument(
            &transform.id,
            format!(
                "{} dataspec positions recorded for {} parents",
                call.dataspec_positions.len(),
                parent_args.len()
            ),
        ));
    }

    let mut slots: BTreeMap<usize, Arg> = call
        .literal_args
        .iter()
        .map(|(position, value)| (*position, Arg::Literal(value.clone())))
        .collect();
    for (position, parent) in call.dataspec_positions.iter().zip(parent_args) {
        if slots.insert(*position, Arg::DataSpec(Arc::clone(parent))).is_some() {
            return Err(DataSpecError::argument(
                &transform.id,
                format!("position {} holds both a literal and a dataspec", position),
            ));
        }
    }
    // Distinct positions fill 0..arity exactly when none lies beyond it.
    if let Some(position) = slots.keys().find(|&&position| position >= call.arity()) {
        return Err(DataSpecError::argument(
            &transform.id,
            format!(
                "argument at position {} leaves a gap in a call of {} arguments",
                position,
                call.arity()
            ),
        ));
    }
    let args: Vec<Arg> = slots.into_values().collect();

    let mut kwargs: BTreeMap<String, Arg> = call
        .literal_kwargs
        .iter()
        .map(|(name, value)| (name.clone(), Arg::Literal(value.clone())))
        .collect();
    for (name, parent) in parent_kwargs {
        if kwargs.insert(name.clone(), Arg::DataSpec(Arc::clone(parent))).is_some() {
            return Err(DataSpecError::argument(
                &transform.id,
                format!("keyword '{}' holds both a literal and a dataspec", name),
            ));
        }
    }
    Ok((args, kwargs))
}

/// Reorganises a transform's call and binds it to the operator signature.
pub fn bind_call(
    signature: &Signature,
    transform: &Transform,
    parent_args: &[Arc<DataSpec>],
    parent_kwargs: &BTreeMap<String, Arc<DataSpec>>,
) -> DataSpecResult<BoundArguments<Arg>> {
    let (args, kwargs) = reorganize(transform, parent_args, parent_kwargs)?;
    signature
        .bind(args, kwargs)
        .map_err(|message| DataSpecError::argument(&transform.id, message))
}

/// Dataspec arguments partitioned by their own PEP status. PEP arguments
/// keep the token they were grouped by.
#[derive(Debug, Default)]
pub struct PepGroups {
    pub pep: BTreeMap<String, (Arc<DataSpec>, PepToken)>,
    pub non_pep: BTreeMap<String, Arc<DataSpec>>,
}

impl PepGroups {
    /// Names of the PEP arguments.
    pub fn pep_names(&self) -> BTreeSet<String> {
        self.pep.keys().cloned().collect()
    }

    /// The token shared by every PEP argument, if there is exactly one.
    pub fn shared_token(&self) -> Option<&PepToken> {
        let mut tokens = self.pep.values().map(|(_, token)| token);
        let first = tokens.next()?;
        tokens.all(|token| token == first).then_some(first)
    }
}

/// Partitions the dataspec arguments of a bound call into PEP and non-PEP.
/// Literal arguments are ignored.
pub fn group_by_pep(bound: &BoundArguments<Arg>, public_context: &PublicContext) -> PepGroups {
    group_by_pep_with(bound, public_context, &mut TokenMemo::new())
}

pub(crate) fn group_by_pep_with(
    bound: &BoundArguments<Arg>,
    public_context: &PublicContext,
    memo: &mut TokenMemo,
) -> PepGroups {
    let mut groups = PepGroups::default();
    for (name, arg) in bound.iter() {
        let Some(ds) = arg.as_dataspec() else {
            continue;
        };
        match protection_utils::pep_token_with(ds, public_context, memo) {
            Some(token) => {
                groups.pep.insert(name.to_string(), (Arc::clone(ds), token));
            }
            None => {
                groups.non_pep.insert(name.to_string(), Arc::clone(ds));
            }
        }
    }
    groups
}
