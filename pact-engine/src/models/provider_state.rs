use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// A named precondition the provider must satisfy before an interaction is
/// replayed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProviderState {
    pub name: String,
    pub params: BTreeMap<String, Value>,
}

impl ProviderState {
    pub fn new<S: Into<String>>(name: S) -> Self {
        ProviderState {
            name: name.into(),
            params: BTreeMap::new(),
        }
    }

    pub fn with_params<S: Into<String>>(name: S, params: BTreeMap<String, Value>) -> Self {
        ProviderState {
            name: name.into(),
            params,
        }
    }

    pub fn from_json(value: &Value) -> Option<Self> {
        let name = value.get("name")?.as_str()?;
        let params = value
            .get("params")
            .and_then(|p| p.as_object())
            .map(|p| p.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();
        Some(ProviderState::with_params(name, params))
    }

    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        map.insert("name".into(), Value::String(self.name.clone()));
        if !self.params.is_empty() {
            map.insert(
                "params".into(),
                Value::Object(self.params.clone().into_iter().collect()),
            );
        }
        Value::Object(map)
    }
}

/// Adds `state` to `states`, merging its parameters into an existing state
/// with the same name.
pub fn merge_provider_state(states: &mut Vec<ProviderState>, state: ProviderState) {
    match states.iter_mut().find(|existing| existing.name == state.name) {
        Some(existing) => existing.params.extend(state.params),
        None => states.push(state),
    }
}
