//! Dataspec evaluation.
//!
//! An [`Executor`] is one evaluation session. It walks the DAG depth first,
//! awaiting parents one at a time, and evaluates each dataspec at most once.

use super::arguments::reorganize;
use super::evaluation::ArgumentEvaluator;
use super::implementation::{OpImplementation, Value};
use crate::config::ExecutionConfig;
use crate::constants::PRIVATE_QUERY;
use crate::dataspec::{DataSpec, ExternalNode, Node, SourceData};
use crate::dp::DpParameters;
use crate::error::{DataSpecError, DataSpecResult};
use crate::protection::{Protected, ProtectionCodec, ProtectionTable};
use crate::tabular::{Table, TableSchema, Tabular};
use futures::future::{BoxFuture, FutureExt};
use log::{debug, info, warn};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Computed value of a dataspec.
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation {
    Dataset(Protected<Tabular>),
    Scalar(JsonValue),
}

/// Evaluation session with per-dataspec memoisation.
///
/// ```
/// use dataspec::dataspec::{Arg, DataSpec, DataSpecKind, Source};
/// use dataspec::external_op::{Executor, OpRegistry};
/// use dataspec::tabular::Table;
/// use serde_json::json;
/// use std::sync::Arc;
///
/// # tokio_test::block_on(async {
/// let registry = Arc::new(OpRegistry::builtin().unwrap());
/// let people = Table::from_records(&json!([{"age": 31}, {"age": 45}])).unwrap();
/// let source = DataSpec::source(Source::public(people));
/// let shape = DataSpec::apply(
///     &registry,
///     DataSpecKind::Scalar,
///     "pandas.pd_shape",
///     vec![Arg::from(&source)],
///     vec![],
/// )
/// .unwrap();
/// assert_eq!(Executor::default().value(&shape).await.unwrap(), json!([2, 1]));
/// # });
/// ```
pub struct Executor {
    config: ExecutionConfig,
    memo: Mutex<HashMap<Uuid, Evaluation>>,
}

impl Default for Executor {
    fn default() -> Self {
        Self::new(ExecutionConfig::default())
    }
}

impl Executor {
    pub fn new(config: ExecutionConfig) -> Self {
        Self {
            config,
            memo: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    /// Number of dataspecs evaluated so far in this session.
    pub fn evaluated_count(&self) -> usize {
        self.memo.lock().map(|memo| memo.len()).unwrap_or(0)
    }

    /// The dataset as a single table, in the protected format when PEP.
    pub async fn to_table(&self, ds: &Arc<DataSpec>) -> DataSpecResult<Table> {
        let protected = self.evaluate_dataset(ds).await?;
        ProtectionCodec::merge(&protected.data, protected.protection.as_ref())
    }

    /// The dataset's data together with its protection.
    pub async fn evaluate_dataset(&self, ds: &Arc<DataSpec>) -> DataSpecResult<Protected<Tabular>> {
        match self.evaluate(ds).await? {
            Evaluation::Dataset(protected) => Ok(protected),
            Evaluation::Scalar(_) => Err(DataSpecError::execution(
                ds.uuid().to_string(),
                "expected a dataset, found a scalar",
            )),
        }
    }

    /// The value of a scalar dataspec.
    pub async fn value(&self, ds: &Arc<DataSpec>) -> DataSpecResult<JsonValue> {
        match self.evaluate(ds).await? {
            Evaluation::Scalar(value) => Ok(value),
            Evaluation::Dataset(_) => Err(DataSpecError::execution(
                ds.uuid().to_string(),
                "expected a scalar, found a dataset",
            )),
        }
    }

    /// Infers the dataset schema from its synthetic variant.
    pub async fn schema(&self, ds: &Arc<DataSpec>) -> DataSpecResult<TableSchema> {
        let synthetic = ds.synthetic()?;
        let sample = self
            .evaluate_dataset(&synthetic)
            .await?
            .data
            .head(self.config.schema_sample_rows);
        let schema = sample.schema()?;
        if ds.is_pep() && !schema.protected {
            return Ok(schema.into_protected());
        }
        Ok(schema)
    }

    /// Evaluates a dataspec, reusing earlier results of this session.
    pub fn evaluate<'a>(&'a self, ds: &'a Arc<DataSpec>) -> BoxFuture<'a, DataSpecResult<Evaluation>> {
        async move {
            if let Some(hit) = self.cached(ds.uuid())? {
                return Ok(hit);
            }
            let evaluation = match ds.node() {
                Node::Source(source) => match source.data() {
                    SourceData::Dataset(protected) => Evaluation::Dataset(protected.clone()),
                    SourceData::Scalar(value) => Evaluation::Scalar(value.clone()),
                },
                Node::External(node) => self.evaluate_external(ds, node).await?,
            };
            self.memo
                .lock()
                .map_err(|_| DataSpecError::execution(ds.uuid().to_string(), "memo lock poisoned"))?
                .insert(ds.uuid(), evaluation.clone());
            Ok(evaluation)
        }
        .boxed()
    }

    fn cached(&self, uuid: Uuid) -> DataSpecResult<Option<Evaluation>> {
        let memo = self
            .memo
            .lock()
            .map_err(|_| DataSpecError::execution(uuid.to_string(), "memo lock poisoned"))?;
        Ok(memo.get(&uuid).cloned())
    }

    #[tracing::instrument(level = "debug", skip_all, fields(transform = %node.transform.id))]
    async fn evaluate_external(&self, ds: &DataSpec, node: &ExternalNode) -> DataSpecResult<Evaluation> {
        let transform_id = node.transform.id.as_str();
        debug!("Evaluating {} ({})", transform_id, ds.uuid());
        let implementation = node.registry.get_implementation(transform_id)?;
        let (args, kwargs) = reorganize(&node.transform, &node.parent_args, &node.parent_kwargs)?;
        let evaluated = ArgumentEvaluator::new(self)
            .evaluate_arguments(&args, &kwargs)
            .await?;

        let is_pep = ds.is_pep();
        let protection = if is_pep || implementation.is_dp() {
            Some(select_protection(ds, evaluated.pe_candidates)?)
        } else {
            None
        };
        let bound = implementation
            .signature()
            .bind_values(transform_id, evaluated.args, evaluated.kwargs)?;

        let result = match (&*implementation, protection.clone()) {
            (OpImplementation::Plain(op), _) => op.function.call(bound).await,
            (OpImplementation::Pep(op), _) => op.function.call(bound).await,
            (OpImplementation::Dp(op), Some(protection)) => {
                let parameters = self.dp_parameters(transform_id, node.transform.dp.as_ref())?;
                let (value, query) = op
                    .function
                    .call(bound, protection, parameters)
                    .await
                    .map_err(|e| retag(e, transform_id))?;
                let subqueries = query.serialized_subqueries()?;
                if !ds.attach_property_once(PRIVATE_QUERY, subqueries)? {
                    warn!("Private query of {} already attached", ds.uuid());
                }
                Ok(value)
            }
            (OpImplementation::Dp(_), None) => {
                return Err(DataSpecError::MissingProtection {
                    dataspec: ds.uuid().to_string(),
                })
            }
        }
        .map_err(|e| retag(e, transform_id))?;

        if ds.is_scalar() {
            return match result {
                Value::Literal(value) => Ok(Evaluation::Scalar(value)),
                other => Err(DataSpecError::unsupported_result(transform_id, other.type_name())),
            };
        }

        let data = match result {
            Value::Tabular(tabular) => tabular,
            Value::Literal(value) => Table::from_records(&value)
                .map(Tabular::Frame)
                .ok_or_else(|| DataSpecError::unsupported_result(transform_id, json_kind(&value)))?,
        };
        let protection = match protection {
            Some(protection) if is_pep => Some(protection.reindex(data.index())?),
            _ => None,
        };
        Ok(Evaluation::Dataset(Protected::new(data, protection)))
    }

    fn dp_parameters(&self, transform_id: &str, parameters: Option<&DpParameters>) -> DataSpecResult<DpParameters> {
        let mut parameters = parameters.cloned().ok_or_else(|| {
            DataSpecError::invalid_budget(format!("{} was called without a privacy budget", transform_id))
        })?;
        if parameters.seed.is_none() {
            parameters.seed = Some(self.config.default_seed);
        }
        parameters.validate()?;
        info!(
            "Running {} with epsilon={} delta={}",
            transform_id, parameters.epsilon, parameters.delta
        );
        Ok(parameters)
    }
}

/// The single protection shared by the protected arguments.
fn select_protection(ds: &DataSpec, candidates: Vec<ProtectionTable>) -> DataSpecResult<ProtectionTable> {
    let mut distinct: Vec<ProtectionTable> = Vec::new();
    for candidate in candidates {
        if !distinct.contains(&candidate) {
            distinct.push(candidate);
        }
    }
    match distinct.len() {
        0 => Err(DataSpecError::MissingProtection {
            dataspec: ds.uuid().to_string(),
        }),
        1 => Ok(distinct.remove(0)),
        n => Err(DataSpecError::InconsistentProtection {
            dataspec: ds.uuid().to_string(),
            distinct: n,
        }),
    }
}

/// Argument errors raised inside data functions name the argument; attach
/// the transform id.
fn retag(error: DataSpecError, transform_id: &str) -> DataSpecError {
    match error {
        DataSpecError::Argument {
            transform_id: argument,
            message,
        } if argument != transform_id => DataSpecError::argument(
            transform_id,
            format!("argument '{}': {}", argument, message),
        ),
        other => other,
    }
}

fn json_kind(value: &JsonValue) -> &'static str {
    Value::Literal(value.clone()).type_name()
}
