use super::compiler::{CompileContext, FilterCompiler};
use super::model::{Filter, FilterOperator, FilterParam};
use crate::engine::binding::ViewBinding;
use crate::engine::query::{CompiledFragment, Predicate};
use crate::engine::types::{RecordKey, Value};
use crate::error::FilterError;

pub const IDS_FILTER_ID: &str = "only_ids";
const INITIAL: &str = "initial";
const MUST: &str = "must";
const SHALL_NOT: &str = "shall_not";

/// Sticky "only these records" filter.
///
/// `initial` is the starting key set (absent means unrestricted), `must` keys
/// are always included and `shall_not` keys always excluded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IdsFilterData {
    pub initial: Option<Vec<RecordKey>>,
    pub must: Vec<RecordKey>,
    pub shall_not: Vec<RecordKey>,
}

impl IdsFilterData {
    pub fn only(keys: impl IntoIterator<Item = RecordKey>) -> Self {
        Self {
            initial: Some(keys.into_iter().collect()),
            ..Self::default()
        }
    }

    pub fn from_filter(filter: &Filter) -> Result<Self, FilterError> {
        let keys = |name: &str| -> Result<Option<Vec<RecordKey>>, FilterError> {
            match filter.param_value(name) {
                None => Ok(None),
                Some(Value::Array(items)) => Ok(Some(items.iter().filter_map(Value::to_text).collect())),
                Some(_) => Err(FilterError::invalid(filter.filter_id.clone(), name, "expected a list of ids")),
            }
        };
        Ok(Self {
            initial: keys(INITIAL)?,
            must: keys(MUST)?.unwrap_or_default(),
            shall_not: keys(SHALL_NOT)?.unwrap_or_default(),
        })
    }

    pub fn to_filter(&self) -> Filter {
        let list = |keys: &[RecordKey]| Value::Array(keys.iter().map(|k| Value::Str(k.clone())).collect());
        let mut filter = Filter::new(IDS_FILTER_ID);
        if let Some(initial) = &self.initial {
            filter.params.push(FilterParam::new(INITIAL, FilterOperator::In, list(initial)));
        }
        if !self.must.is_empty() {
            filter.params.push(FilterParam::new(MUST, FilterOperator::In, list(&self.must)));
        }
        if !self.shall_not.is_empty() {
            filter.params.push(FilterParam::new(SHALL_NOT, FilterOperator::In, list(&self.shall_not)));
        }
        filter
    }

    pub fn include(&mut self, keys: &[RecordKey]) {
        self.shall_not.retain(|k| !keys.contains(k));
        for key in keys {
            if !self.must.contains(key) {
                self.must.push(key.clone());
            }
        }
    }

    pub fn exclude(&mut self, keys: &[RecordKey]) {
        self.must.retain(|k| !keys.contains(k));
        for key in keys {
            if !self.shall_not.contains(key) {
                self.shall_not.push(key.clone());
            }
        }
    }

    pub fn to_predicate(&self) -> Predicate {
        let included = match &self.initial {
            None => Predicate::always(),
            Some(initial) if self.must.is_empty() => Predicate::key_in(initial.iter().cloned()),
            Some(initial) => Predicate::key_in(initial.iter().chain(self.must.iter()).cloned()),
        };
        if self.shall_not.is_empty() {
            return included;
        }
        Predicate::and_all([included, Predicate::not(Predicate::key_in(self.shall_not.iter().cloned()))])
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct IdsFilterCompiler;

impl FilterCompiler for IdsFilterCompiler {
    fn compile(
        &self,
        filter: &Filter,
        _binding: &ViewBinding,
        _ctx: &CompileContext<'_>,
    ) -> Result<CompiledFragment, FilterError> {
        Ok(CompiledFragment::new(IdsFilterData::from_filter(filter)?.to_predicate()))
    }
}
