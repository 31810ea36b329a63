use super::compiler::{CompileContext, FilterCompiler};
use super::model::{Filter, FilterOperator, FilterParam};
use crate::engine::binding::{FieldLoader, ViewBinding};
use crate::engine::query::{CompiledFragment, Operand, Predicate};
use crate::engine::types::{Path, Value};
use crate::error::FilterError;
use smol_str::SmolStr;

/// Generic compiler: every parameter names a column-backed field of the binding
/// and maps to one comparison. Parameters without a value are skipped unless
/// the filter descriptor marks them mandatory.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultFilterCompiler;

impl FilterCompiler for DefaultFilterCompiler {
    fn compile(
        &self,
        filter: &Filter,
        binding: &ViewBinding,
        _ctx: &CompileContext<'_>,
    ) -> Result<CompiledFragment, FilterError> {
        let descriptor = binding.filter_descriptor(&filter.filter_id);

        if let Some(descriptor) = descriptor {
            for required in descriptor.params.iter().filter(|p| p.mandatory) {
                let present = filter
                    .param(&required.name)
                    .is_some_and(|p| p.operator.is_unary() || !p.value.is_blank());
                if !present {
                    return Err(FilterError::invalid(
                        filter.filter_id.clone(),
                        required.name.clone(),
                        "mandatory parameter is missing",
                    ));
                }
            }
        }

        let mut fragment = CompiledFragment::new(Predicate::always());
        let mut predicates = Vec::with_capacity(filter.params.len());
        for param in &filter.params {
            let field = column_of(filter, binding, param)?;
            if let Some(predicate) = compile_param(filter, param, field, &mut fragment)? {
                predicates.push(predicate);
            }
        }
        fragment.predicate = Predicate::and_all(predicates);
        Ok(fragment)
    }
}

fn column_of<'b>(
    filter: &Filter,
    binding: &'b ViewBinding,
    param: &FilterParam,
) -> Result<&'b Path, FilterError> {
    match binding.field(&param.name).map(|f| &f.loader) {
        Some(FieldLoader::Column(path)) => Ok(path),
        Some(FieldLoader::Computed(_)) => Err(FilterError::invalid(
            filter.filter_id.clone(),
            param.name.clone(),
            "computed fields cannot be filtered",
        )),
        None => Err(FilterError::invalid(
            filter.filter_id.clone(),
            param.name.clone(),
            "unknown field",
        )),
    }
}

fn compile_param(
    filter: &Filter,
    param: &FilterParam,
    field: &Path,
    fragment: &mut CompiledFragment,
) -> Result<Option<Predicate>, FilterError> {
    let open_lower_range = param.operator == FilterOperator::Between && !param.value_to.is_null();
    if !param.operator.is_unary() && param.value.is_null() && !open_lower_range {
        return Ok(None);
    }

    let name = param.name.clone();
    let field = field.clone();
    let mut bind = |suffix: Option<&str>, value: Value| -> Operand {
        let key = match suffix {
            Some(s) => SmolStr::new(format!("{name}_{s}")),
            None => name.clone(),
        };
        fragment.params.insert(key.clone(), value);
        Operand::Param(key)
    };

    let predicate = match param.operator {
        FilterOperator::Equal => Predicate::Eq { field, value: bind(None, param.value.clone()) },
        FilterOperator::NotEqual => Predicate::Neq { field, value: bind(None, param.value.clone()) },
        FilterOperator::Greater => Predicate::Gt { field, value: bind(None, param.value.clone()) },
        FilterOperator::GreaterOrEqual => Predicate::Gte { field, value: bind(None, param.value.clone()) },
        FilterOperator::Less => Predicate::Lt { field, value: bind(None, param.value.clone()) },
        FilterOperator::LessOrEqual => Predicate::Lte { field, value: bind(None, param.value.clone()) },
        FilterOperator::Between => match (param.value.is_null(), param.value_to.is_null()) {
            (false, true) => Predicate::Gte { field, value: bind(Some("from"), param.value.clone()) },
            (true, _) => Predicate::Lte { field, value: bind(Some("to"), param.value_to.clone()) },
            (false, false) => {
                let lower = Predicate::Gte {
                    field: field.clone(),
                    value: bind(Some("from"), param.value.clone()),
                };
                let upper = Predicate::Lte { field, value: bind(Some("to"), param.value_to.clone()) };
                Predicate::And { predicates: vec![lower, upper] }
            }
        },
        FilterOperator::Like => {
            let Some(text) = param.value.to_text().filter(|t| !t.trim().is_empty()) else {
                return Ok(None);
            };
            Predicate::Like { field, pattern: bind(None, Value::str(like_pattern(&text))) }
        }
        FilterOperator::In => {
            let Some(values) = param.value.as_array() else {
                return Err(FilterError::invalid(
                    filter.filter_id.clone(),
                    param.name.clone(),
                    "IN expects a list",
                ));
            };
            Predicate::In { field, values: values.clone() }
        }
        FilterOperator::IsNull => Predicate::IsNull { field },
        FilterOperator::IsNotNull => Predicate::not(Predicate::IsNull { field }),
    };
    Ok(Some(predicate))
}

/// Plain text becomes a contains pattern; explicit wildcards are kept.
pub(crate) fn like_pattern(text: &str) -> String {
    let text = text.trim();
    if text.contains('%') || text.contains('_') {
        text.to_string()
    } else {
        format!("%{text}%")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::binding::{EntityDescriptor, FieldBinding, WidgetType};
    use crate::engine::filter::{compile_filters, FilterDescriptor, FilterParamDescriptor};
    use crate::engine::query::SortOrder;
    use crate::engine::store::{InMemoryRecordStore, RecordStore};
    use crate::engine::types::Record;
    use serde_json::json;

    fn matching(param: FilterParam) -> Vec<String> {
        let store = InMemoryRecordStore::with_records([
            Record::new("storage", "1", Value::from(json!({"qty": 1}))),
            Record::new("storage", "2", Value::from(json!({"qty": 50}))),
        ]);
        let binding = ViewBinding::from_descriptor(
            EntityDescriptor::new("storage", "storage")
                .field(FieldBinding::column("qty", WidgetType::Number))
                .filter(
                    FilterDescriptor::new("range")
                        .with_param(FilterParamDescriptor::new("qty", FilterOperator::Between)),
                ),
        );
        let ctx = CompileContext::new(&store, "tester");
        let query = compile_filters(&binding, &[Filter::new("range").with(param)], &ctx).unwrap();
        store
            .query(&query, &SortOrder::default())
            .unwrap()
            .map(|key| key.unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_between_with_open_bounds() {
        assert_eq!(matching(FilterParam::between("qty", 1.0, 5.0)), vec!["1"]);
        assert_eq!(matching(FilterParam::between("qty", Value::Null, 5.0)), vec!["1"]);
        assert_eq!(matching(FilterParam::between("qty", 5.0, Value::Null)), vec!["2"]);
        assert_eq!(matching(FilterParam::between("qty", Value::Null, Value::Null)), vec!["1", "2"]);
    }

    #[test]
    fn test_like_pattern() {
        assert_eq!(like_pattern(" pal "), "%pal%");
        assert_eq!(like_pattern("pal%"), "pal%");
        assert_eq!(like_pattern("p_l"), "p_l");
    }
}
