use super::compiler::CompileContext;
use crate::engine::query::QueryParams;
use crate::engine::types::Value;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    #[default]
    Equal,
    NotEqual,
    Greater,
    GreaterOrEqual,
    Less,
    LessOrEqual,
    /// Inclusive range `value ..= value_to`. An open upper bound degrades to `>=`,
    /// an open lower bound to `<=`; with both bounds open the parameter is skipped.
    Between,
    /// Case-insensitive contains; explicit `%`/`_` wildcards are honoured.
    Like,
    In,
    IsNull,
    IsNotNull,
}

impl FilterOperator {
    /// Operators that need no value.
    pub fn is_unary(&self) -> bool {
        matches!(self, FilterOperator::IsNull | FilterOperator::IsNotNull)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct FilterParam {
    pub name: SmolStr,
    #[serde(default)]
    pub operator: FilterOperator,
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub value_to: Value,
}

impl FilterParam {
    pub fn new(name: impl Into<SmolStr>, operator: FilterOperator, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            operator,
            value: value.into(),
            value_to: Value::Null,
        }
    }

    pub fn eq(name: impl Into<SmolStr>, value: impl Into<Value>) -> Self {
        Self::new(name, FilterOperator::Equal, value)
    }

    pub fn between(name: impl Into<SmolStr>, from: impl Into<Value>, to: impl Into<Value>) -> Self {
        Self {
            value_to: to.into(),
            ..Self::new(name, FilterOperator::Between, from)
        }
    }
}

/// A named filter with typed parameters. Carries no backend query vocabulary.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Filter {
    pub filter_id: SmolStr,
    #[serde(default)]
    pub params: Vec<FilterParam>,
    /// Compiler-only context, never shown to the caller.
    #[serde(default, skip_serializing_if = "QueryParams::is_empty")]
    pub internal_params: QueryParams,
}

impl Filter {
    pub fn new(filter_id: impl Into<SmolStr>) -> Self {
        Self {
            filter_id: filter_id.into(),
            params: Vec::new(),
            internal_params: QueryParams::new(),
        }
    }

    pub fn with(mut self, param: FilterParam) -> Self {
        self.params.push(param);
        self
    }

    pub fn with_internal(mut self, name: impl Into<SmolStr>, value: impl Into<Value>) -> Self {
        self.internal_params.insert(name.into(), value.into());
        self
    }

    pub fn param(&self, name: &str) -> Option<&FilterParam> {
        self.params.iter().find(|p| p.name == name)
    }

    pub fn param_value(&self, name: &str) -> Option<&Value> {
        self.param(name).map(|p| &p.value).filter(|v| !v.is_null())
    }

    pub fn internal(&self, name: &str) -> Option<&Value> {
        self.internal_params.get(name)
    }

    /// Replaces (or adds) a parameter by name.
    pub fn set_param(&mut self, param: FilterParam) {
        match self.params.iter_mut().find(|p| p.name == param.name) {
            Some(slot) => *slot = param,
            None => self.params.push(param),
        }
    }
}

/// Default a parameter takes when a view is opened without explicit filters.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum AutoValue {
    /// Current date as `YYYY-MM-DD`.
    Today,
    Constant(Value),
}

impl AutoValue {
    pub fn initial_value(&self, ctx: &CompileContext<'_>) -> Value {
        match self {
            AutoValue::Today => Value::str(ctx.today.format("%Y-%m-%d").to_string()),
            AutoValue::Constant(v) => v.clone(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct FilterParamDescriptor {
    pub name: SmolStr,
    #[serde(default)]
    pub operator: FilterOperator,
    #[serde(default)]
    pub mandatory: bool,
    #[serde(default)]
    pub auto_value: Option<AutoValue>,
}

impl FilterParamDescriptor {
    pub fn new(name: impl Into<SmolStr>, operator: FilterOperator) -> Self {
        Self {
            name: name.into(),
            operator,
            mandatory: false,
            auto_value: None,
        }
    }

    pub fn mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }

    pub fn auto(mut self, value: AutoValue) -> Self {
        self.auto_value = Some(value);
        self
    }
}

/// Static description of a filter an entity type offers.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct FilterDescriptor {
    pub filter_id: SmolStr,
    #[serde(default)]
    pub caption: String,
    #[serde(default)]
    pub params: Vec<FilterParamDescriptor>,
    #[serde(default)]
    pub frequent: bool,
}

impl FilterDescriptor {
    pub fn new(filter_id: impl Into<SmolStr>) -> Self {
        let filter_id = filter_id.into();
        Self {
            caption: filter_id.to_string(),
            filter_id,
            params: Vec::new(),
            frequent: false,
        }
    }

    pub fn with_param(mut self, param: FilterParamDescriptor) -> Self {
        self.params.push(param);
        self
    }

    pub fn param(&self, name: &str) -> Option<&FilterParamDescriptor> {
        self.params.iter().find(|p| p.name == name)
    }

    pub fn is_auto(&self) -> bool {
        self.params.iter().any(|p| p.auto_value.is_some())
    }

    /// Builds the filter instance an auto filter applies on view creation.
    pub fn auto_filter(&self, ctx: &CompileContext<'_>) -> Option<Filter> {
        if !self.is_auto() {
            return None;
        }
        let mut filter = Filter::new(self.filter_id.clone());
        for descriptor in &self.params {
            if let Some(auto) = &descriptor.auto_value {
                filter.params.push(FilterParam::new(
                    descriptor.name.clone(),
                    descriptor.operator,
                    auto.initial_value(ctx),
                ));
            }
        }
        Some(filter)
    }
}
