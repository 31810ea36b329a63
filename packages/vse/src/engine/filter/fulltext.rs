use super::compiler::{CompileContext, FilterCompiler};
use super::default::like_pattern;
use super::model::Filter;
use crate::engine::binding::ViewBinding;
use crate::engine::query::{CompiledFragment, Operand, Predicate};
use crate::engine::types::{Path, Value};
use crate::error::FilterError;

pub const TEXT_PARAM: &str = "text";
/// Internal parameter overriding the searched fields (array of field paths).
pub const FIELDS_INTERNAL: &str = "search_fields";

/// Case-insensitive contains search across several fields.
#[derive(Debug, Clone, Default)]
pub struct FullTextFilterCompiler {
    pub fields: Vec<Path>,
}

impl FullTextFilterCompiler {
    pub fn new(fields: &[&str]) -> Self {
        Self {
            fields: fields.iter().map(|f| Path::new(f)).collect(),
        }
    }
}

impl FilterCompiler for FullTextFilterCompiler {
    fn compile(
        &self,
        filter: &Filter,
        _binding: &ViewBinding,
        _ctx: &CompileContext<'_>,
    ) -> Result<CompiledFragment, FilterError> {
        let text = filter
            .param_value(TEXT_PARAM)
            .and_then(Value::to_text)
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| FilterError::invalid(filter.filter_id.clone(), TEXT_PARAM, "search text is empty"))?;

        let fields: Vec<Path> = match filter.internal(FIELDS_INTERNAL).and_then(Value::as_array) {
            Some(items) => items
                .iter()
                .filter_map(Value::as_str)
                .map(Path::new)
                .collect(),
            None => self.fields.clone(),
        };
        if fields.is_empty() {
            return Err(FilterError::invalid(
                filter.filter_id.clone(),
                FIELDS_INTERNAL,
                "no fields to search",
            ));
        }

        let predicates = fields
            .into_iter()
            .map(|field| Predicate::Like {
                field,
                pattern: Operand::param(TEXT_PARAM),
            })
            .collect();
        Ok(CompiledFragment::new(Predicate::Or { predicates })
            .with_param(TEXT_PARAM, Value::str(like_pattern(&text))))
    }
}
