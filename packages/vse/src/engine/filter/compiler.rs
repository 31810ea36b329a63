use super::model::Filter;
use crate::engine::binding::ViewBinding;
use crate::engine::query::{CompiledFragment, CompiledQuery};
use crate::engine::store::RecordStore;
use crate::error::FilterError;
use chrono::{Local, NaiveDate};
use smol_str::SmolStr;
use tracing::trace;

/// Turns one filter instance into a predicate fragment against a binding.
///
/// Compilation must not write anything. Read-only lookups through
/// [`CompileContext::store`] are allowed when they are bounded.
pub trait FilterCompiler: Send + Sync {
    fn compile(
        &self,
        filter: &Filter,
        binding: &ViewBinding,
        ctx: &CompileContext<'_>,
    ) -> Result<CompiledFragment, FilterError>;
}

/// Per-request inputs a compiler may consult.
pub struct CompileContext<'a> {
    pub store: &'a dyn RecordStore,
    pub principal: &'a str,
    pub today: NaiveDate,
}

impl<'a> CompileContext<'a> {
    pub fn new(store: &'a dyn RecordStore, principal: &'a str) -> Self {
        Self {
            store,
            principal,
            today: Local::now().date_naive(),
        }
    }

    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }
}

/// Compiles every filter and ANDs the fragments together with the binding's
/// static predicate. Parameters are namespaced by filter id.
pub fn compile_filters(
    binding: &ViewBinding,
    filters: &[Filter],
    ctx: &CompileContext<'_>,
) -> Result<CompiledQuery, FilterError> {
    let mut fragments: Vec<(SmolStr, CompiledFragment)> = Vec::with_capacity(filters.len() + 1);
    fragments.push((SmolStr::new("static"), CompiledFragment::new(binding.static_predicate.clone())));

    for filter in filters {
        let compiler = binding
            .compiler(&filter.filter_id)
            .ok_or_else(|| FilterError::Unsupported {
                filter_id: filter.filter_id.clone(),
                entity_type: binding.entity_type.0.clone(),
            })?;
        let fragment = compiler.compile(filter, binding, ctx)?;
        trace!(filter_id = %filter.filter_id, "filter compiled");
        fragments.push((filter.filter_id.clone(), fragment));
    }

    Ok(CompiledQuery::compose(binding.table.clone(), fragments))
}
