//! Argument evaluation.

use super::executor::{Evaluation, Executor};
use super::implementation::Value;
use crate::dataspec::Arg;
use crate::error::DataSpecResult;
use crate::protection::{ProtectionCodec, ProtectionTable};
use crate::tabular::Tabular;
use log::trace;
use std::collections::BTreeMap;

/// Evaluated arguments plus the protections found among them.
#[derive(Debug, Default)]
pub struct EvaluatedArguments {
    pub args: Vec<Value>,
    pub kwargs: BTreeMap<String, Value>,
    /// Protection tables of the protected arguments, in argument order.
    pub pe_candidates: Vec<ProtectionTable>,
}

/// Computes concrete argument values through an [`Executor`].
pub struct ArgumentEvaluator<'a> {
    executor: &'a Executor,
}

impl<'a> ArgumentEvaluator<'a> {
    pub fn new(executor: &'a Executor) -> Self {
        Self { executor }
    }

    /// Evaluates one argument and splits off its protection.
    ///
    /// A dataset that arrives as a table in the protected format is
    /// unpacked into its data and side table.
    pub async fn extract_data_from_pe(&self, arg: &Arg) -> DataSpecResult<(Value, Option<ProtectionTable>)> {
        let ds = match arg {
            Arg::Literal(value) => return Ok((Value::Literal(value.clone()), None)),
            Arg::DataSpec(ds) => ds,
        };
        match self.executor.evaluate(ds).await? {
            Evaluation::Scalar(value) => Ok((Value::Literal(value), None)),
            Evaluation::Dataset(protected) => {
                let (data, protection) = protected.into_parts();
                if protection.is_some() {
                    return Ok((Value::Tabular(data), protection));
                }
                match data {
                    Tabular::Frame(table) if ProtectionCodec::is_protected_format(&table) => {
                        trace!("Unpacking protected-format table of {}", ds.uuid());
                        let (data, protection) = ProtectionCodec::extract(&table)?;
                        Ok((Value::Tabular(data), protection))
                    }
                    data => Ok((Value::Tabular(data), None)),
                }
            }
        }
    }

    /// Evaluates every argument, one at a time and in order.
    pub async fn evaluate_arguments(
        &self,
        args: &[Arg],
        kwargs: &BTreeMap<String, Arg>,
    ) -> DataSpecResult<EvaluatedArguments> {
        let mut evaluated = EvaluatedArguments::default();
        for arg in args {
            let (value, protection) = self.extract_data_from_pe(arg).await?;
            evaluated.args.push(value);
            evaluated.pe_candidates.extend(protection);
        }
        for (name, arg) in kwargs {
            let (value, protection) = self.extract_data_from_pe(arg).await?;
            evaluated.kwargs.insert(name.clone(), value);
            evaluated.pe_candidates.extend(protection);
        }
        Ok(evaluated)
    }
}
