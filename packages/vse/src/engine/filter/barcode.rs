use super::compiler::{CompileContext, FilterCompiler};
use super::model::Filter;
use crate::engine::binding::ViewBinding;
use crate::engine::query::{CompiledFragment, CompiledQuery, Operand, Predicate, SortOrder};
use crate::engine::types::{FastSet, Path, RecordKey, TableName, Value};
use crate::error::FilterError;
use smol_str::SmolStr;
use tracing::debug;

pub const BARCODE_PARAM: &str = "barcode";

/// Resolves a scanned barcode to candidate record keys with one bounded
/// lookup, then restricts the view to those keys.
#[derive(Debug, Clone)]
pub struct BarcodeFilterCompiler {
    /// Table searched for the barcode.
    pub lookup_table: TableName,
    /// Fields compared against the trimmed barcode.
    pub match_fields: Vec<Path>,
    /// Field of the lookup record holding the view record's key; `None` uses
    /// the lookup record's own key.
    pub target_field: Option<SmolStr>,
    pub limit: usize,
}

impl BarcodeFilterCompiler {
    pub fn new(lookup_table: impl Into<TableName>, match_fields: &[&str]) -> Self {
        Self {
            lookup_table: lookup_table.into(),
            match_fields: match_fields.iter().map(|f| Path::new(f)).collect(),
            target_field: None,
            limit: 100,
        }
    }

    pub fn targeting(mut self, field: impl Into<SmolStr>) -> Self {
        self.target_field = Some(field.into());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.max(1);
        self
    }
}

impl FilterCompiler for BarcodeFilterCompiler {
    fn compile(
        &self,
        filter: &Filter,
        _binding: &ViewBinding,
        ctx: &CompileContext<'_>,
    ) -> Result<CompiledFragment, FilterError> {
        let barcode = filter
            .param_value(BARCODE_PARAM)
            .and_then(Value::to_text)
            .map(|s| SmolStr::new(s.trim()))
            .unwrap_or_default();
        if barcode.is_empty() {
            return Err(FilterError::invalid(
                filter.filter_id.clone(),
                BARCODE_PARAM,
                "barcode must not be empty",
            ));
        }

        let matches = Predicate::Or {
            predicates: self
                .match_fields
                .iter()
                .map(|field| Predicate::Eq {
                    field: field.clone(),
                    value: Operand::Literal(Value::Str(barcode.clone())),
                })
                .collect(),
        };
        let lookup = CompiledQuery::new(self.lookup_table.clone()).and(matches);
        let found = ctx
            .store
            .fetch(&lookup, &SortOrder::default(), Some(self.limit))
            .map_err(|source| FilterError::Lookup {
                filter_id: filter.filter_id.clone(),
                source,
            })?;

        let keys: FastSet<RecordKey> = found
            .iter()
            .filter_map(|r| match &self.target_field {
                Some(field) => r.get_key(field),
                None => Some(r.key.clone()),
            })
            .collect();
        debug!(barcode = %barcode, candidates = keys.len(), "barcode resolved");

        if keys.is_empty() {
            return Ok(CompiledFragment::none());
        }
        let mut keys: Vec<RecordKey> = keys.into_iter().collect();
        keys.sort();
        Ok(CompiledFragment::new(Predicate::KeyIn { keys }))
    }
}
