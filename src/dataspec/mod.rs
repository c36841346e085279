//! # DataSpec graph
//!
//! A [`DataSpec`] is an immutable node of a lazily evaluated computation
//! DAG: either a source or an external operator applied to parent
//! dataspecs. Its PEP status and token are pure functions of its transform
//! and its parents; its value is computed on demand by an
//! [`Executor`](crate::external_op::Executor).

pub mod source;
pub mod transform;

pub use source::{Source, SourceData};
pub use transform::{Arg, SerializedCall, Transform};

use crate::dp::{DpParameters, PrivacyLimit};
use crate::error::{DataSpecError, DataSpecResult};
use crate::external_op::arguments::serialize_call;
use crate::external_op::protection_utils;
use crate::external_op::{OpImplementation, OpRegistry};
use log::{debug, warn};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

/// Opaque row-alignment identity of a PEP dataspec.
pub type PepToken = String;

/// Whether a dataspec evaluates to a dataset or to a scalar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataSpecKind {
    Dataset,
    Scalar,
}

/// Dataspecs the caller currently treats as publicly exposable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublicContext {
    ids: HashSet<Uuid>,
}

impl PublicContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, ds: &DataSpec) -> Self {
        self.insert(ds);
        self
    }

    pub fn insert(&mut self, ds: &DataSpec) {
        self.ids.insert(ds.uuid());
    }

    pub fn contains(&self, ds: &DataSpec) -> bool {
        self.ids.contains(&ds.uuid())
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl FromIterator<Uuid> for PublicContext {
    fn from_iter<I: IntoIterator<Item = Uuid>>(iter: I) -> Self {
        Self {
            ids: iter.into_iter().collect(),
        }
    }
}

pub(crate) struct ExternalNode {
    pub(crate) registry: Arc<OpRegistry>,
    pub(crate) transform: Transform,
    pub(crate) parent_args: Vec<Arc<DataSpec>>,
    pub(crate) parent_kwargs: BTreeMap<String, Arc<DataSpec>>,
}

pub(crate) enum Node {
    Source(Source),
    External(ExternalNode),
}

/// An immutable node of the transform DAG.
pub struct DataSpec {
    uuid: Uuid,
    kind: DataSpecKind,
    node: Node,
    properties: RwLock<HashMap<String, String>>,
    default_token: OnceCell<Option<PepToken>>,
    public: OnceCell<bool>,
    synthetic: OnceCell<Arc<DataSpec>>,
}

impl DataSpec {
    fn build(kind: DataSpecKind, node: Node) -> Arc<Self> {
        Arc::new(Self {
            uuid: Uuid::new_v4(),
            kind,
            node,
            properties: RwLock::new(HashMap::new()),
            default_token: OnceCell::new(),
            public: OnceCell::new(),
            synthetic: OnceCell::new(),
        })
    }

    /// Wraps a source value as a leaf dataspec.
    pub fn source(source: Source) -> Arc<Self> {
        let kind = match source.data() {
            SourceData::Dataset(_) => DataSpecKind::Dataset,
            SourceData::Scalar(_) => DataSpecKind::Scalar,
        };
        Self::build(kind, Node::Source(source))
    }

    /// Applies an operator to call-site arguments.
    ///
    /// Dataspec arguments become parents; everything else is recorded as a
    /// literal together with its position.
    pub fn apply(
        registry: &Arc<OpRegistry>,
        kind: DataSpecKind,
        transform_id: &str,
        args: Vec<Arg>,
        kwargs: Vec<(String, Arg)>,
    ) -> DataSpecResult<Arc<Self>> {
        let (call, parent_args, parent_kwargs) = serialize_call(args, kwargs);
        Self::from_transform(
            registry,
            kind,
            Transform::new(transform_id, call),
            parent_args,
            parent_kwargs,
        )
    }

    /// Builds a node from an already serialized transform and its parents.
    pub fn from_transform(
        registry: &Arc<OpRegistry>,
        kind: DataSpecKind,
        transform: Transform,
        parent_args: Vec<Arc<DataSpec>>,
        parent_kwargs: BTreeMap<String, Arc<DataSpec>>,
    ) -> DataSpecResult<Arc<Self>> {
        registry.get_implementation(&transform.id)?;
        if transform.call.dataspec_positions.len() != parent_args.len() {
            return Err(DataSpecError::argument(
                &transform.id,
                format!(
                    "{} dataspec positions recorded for {} parents",
                    transform.call.dataspec_positions.len(),
                    parent_args.len()
                ),
            ));
        }
        let recorded: Vec<&String> = transform.call.dataspec_kwargs.iter().collect();
        let given: Vec<&String> = parent_kwargs.keys().collect();
        if recorded != given {
            return Err(DataSpecError::argument(
                &transform.id,
                format!("dataspec keywords {:?} do not match parents {:?}", recorded, given),
            ));
        }
        debug!("Creating {:?} dataspec for transform {}", kind, transform.id);
        Ok(Self::build(
            kind,
            Node::External(ExternalNode {
                registry: Arc::clone(registry),
                transform,
                parent_args,
                parent_kwargs,
            }),
        ))
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn kind(&self) -> DataSpecKind {
        self.kind
    }

    pub fn is_dataset(&self) -> bool {
        self.kind == DataSpecKind::Dataset
    }

    pub fn is_scalar(&self) -> bool {
        self.kind == DataSpecKind::Scalar
    }

    pub(crate) fn node(&self) -> &Node {
        &self.node
    }

    pub fn is_source(&self) -> bool {
        matches!(self.node, Node::Source(_))
    }

    pub fn as_source(&self) -> Option<&Source> {
        match &self.node {
            Node::Source(source) => Some(source),
            Node::External(_) => None,
        }
    }

    pub fn transform(&self) -> Option<&Transform> {
        match &self.node {
            Node::External(node) => Some(&node.transform),
            Node::Source(_) => None,
        }
    }

    /// Positional and keyword parents; empty for sources.
    pub fn parents(&self) -> (Vec<Arc<DataSpec>>, BTreeMap<String, Arc<DataSpec>>) {
        match &self.node {
            Node::External(node) => (node.parent_args.clone(), node.parent_kwargs.clone()),
            Node::Source(_) => (Vec::new(), BTreeMap::new()),
        }
    }

    /// Resolves the operator of an external node.
    pub fn implementation(&self) -> DataSpecResult<Arc<OpImplementation>> {
        match &self.node {
            Node::External(node) => node.registry.get_implementation(&node.transform.id),
            Node::Source(_) => Err(DataSpecError::configuration(format!(
                "source dataspec {} has no operator",
                self.uuid
            ))),
        }
    }

    /// Sources are public as declared; DP results are public; anything else
    /// is public when all its parents are.
    pub fn is_public(&self) -> bool {
        *self.public.get_or_init(|| self.compute_public())
    }

    fn compute_public(&self) -> bool {
        match &self.node {
            Node::Source(source) => source.is_public(),
            Node::External(node) => match self.implementation() {
                Ok(implementation) if implementation.is_dp() => true,
                Ok(_) => node
                    .parent_args
                    .iter()
                    .chain(node.parent_kwargs.values())
                    .all(|parent| parent.is_public()),
                Err(e) => {
                    warn!("Dataspec {} treated as non-public: {}", self.uuid, e);
                    false
                }
            },
        }
    }

    /// PEP token under an empty public context.
    pub fn pep_token(&self) -> Option<PepToken> {
        self.default_token
            .get_or_init(|| protection_utils::pep_token(self, &PublicContext::default()))
            .clone()
    }

    /// PEP token when the given dataspecs may be treated as public.
    pub fn pep_token_in(&self, public_context: &PublicContext) -> Option<PepToken> {
        if public_context.is_empty() {
            return self.pep_token();
        }
        protection_utils::pep_token(self, public_context)
    }

    pub fn is_pep(&self) -> bool {
        self.pep_token().is_some()
    }

    pub fn is_dp_applicable(&self, public_context: &PublicContext, privacy_limit: &PrivacyLimit) -> bool {
        protection_utils::is_dp_applicable(self, public_context, privacy_limit)
    }

    /// The same call routed to the DP-equivalent operator, if one exists.
    pub fn dp_transform(&self) -> Option<Transform> {
        protection_utils::dp_transform(self)
    }

    /// A sibling dataspec computing the DP-equivalent with the given budget.
    pub fn dp_variant(&self, parameters: DpParameters) -> DataSpecResult<Option<Arc<DataSpec>>> {
        let (Node::External(node), Some(transform)) = (&self.node, self.dp_transform()) else {
            return Ok(None);
        };
        let variant = Self::from_transform(
            &node.registry,
            self.kind,
            transform.with_dp_parameters(parameters),
            node.parent_args.clone(),
            node.parent_kwargs.clone(),
        )?;
        Ok(Some(variant))
    }

    /// A non-real, safe-to-inspect stand-in for this dataspec.
    ///
    /// Built once per node. DP transforms are routed back to the operator
    /// they are the equivalent of, since the stand-in carries no protection.
    pub fn synthetic(self: &Arc<Self>) -> DataSpecResult<Arc<DataSpec>> {
        self.synthetic
            .get_or_try_init(|| match &self.node {
                Node::Source(source) => {
                    if source.is_public() && source.synthetic.is_none() {
                        return Ok(Arc::clone(self));
                    }
                    Ok(Self::source(Source {
                        data: source.synthetic_data()?,
                        public: true,
                        synthetic: None,
                    }))
                }
                Node::External(node) => {
                    let parent_args = node
                        .parent_args
                        .iter()
                        .map(|p| p.synthetic())
                        .collect::<DataSpecResult<Vec<_>>>()?;
                    let parent_kwargs = node
                        .parent_kwargs
                        .iter()
                        .map(|(name, p)| Ok((name.clone(), p.synthetic()?)))
                        .collect::<DataSpecResult<BTreeMap<_, _>>>()?;
                    let mut transform = node.transform.clone();
                    if let Some(plain_id) = node.registry.non_dp_equivalent_id(&transform.id) {
                        transform.id = plain_id.to_string();
                    }
                    transform.dp = None;
                    Self::from_transform(&node.registry, self.kind, transform, parent_args, parent_kwargs)
                }
            })
            .map(Arc::clone)
    }

    pub fn property(&self, name: &str) -> Option<String> {
        self.properties
            .read()
            .ok()
            .and_then(|properties| properties.get(name).cloned())
    }

    /// Attaches a named property unless one is already set.
    ///
    /// Returns whether this call stored the value; a second evaluation of the
    /// same dataspec leaves the first value in place.
    pub fn attach_property_once(&self, name: &str, value: String) -> DataSpecResult<bool> {
        let mut properties = self.properties.write().map_err(|_| {
            DataSpecError::execution(self.uuid.to_string(), "property lock poisoned")
        })?;
        if properties.contains_key(name) {
            return Ok(false);
        }
        properties.insert(name.to_string(), value);
        Ok(true)
    }
}

impl fmt::Debug for DataSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let origin = match &self.node {
            Node::Source(_) => "source",
            Node::External(node) => node.transform.id.as_str(),
        };
        f.debug_struct("DataSpec")
            .field("uuid", &self.uuid)
            .field("kind", &self.kind)
            .field("origin", &origin)
            .finish()
    }
}
